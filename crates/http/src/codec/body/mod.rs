//! Body framing for requests and responses.
//!
//! ## Decoders
//! - [`PayloadDecoder`]: picks the request body framing from the head and
//!   delegates to the fixed-length or chunked decoder
//!
//! ## Encoders
//! - [`PayloadEncoder`]: writes a response body as raw bytes checked against
//!   `content-length`, or with the chunked transfer coding

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
