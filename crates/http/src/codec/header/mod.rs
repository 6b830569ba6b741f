//! Header block codecs.
//!
//! - [`HeaderDecoder`]: parses and validates a request line plus header block
//! - [`HeaderEncoder`]: writes a response status line plus header block, adding
//!   the framing header
//! - [`TrailerEncoder`]: validates and writes the trailer section of a chunked
//!   response

mod header_decoder;
mod header_encoder;
mod trailer_encoder;

pub use header_decoder::{DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_HEADERS, HeaderDecoder};
pub use header_encoder::HeaderEncoder;
pub use trailer_encoder::TrailerEncoder;

pub(crate) use header_encoder::apply_framing;
