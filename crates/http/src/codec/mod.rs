//! Streaming HTTP/1.1 codecs built on `tokio_util::codec`.
//!
//! - Request side: [`RequestDecoder`] turns raw bytes into a request head
//!   followed by body items, using the [`header`] decoder for the head and the
//!   [`body`] decoders for the payload
//! - Response side: [`ResponseEncoder`] writes a response head, the body with
//!   the framing chosen for it, and optionally a trailer section
//!
//! Both sides are state machines fed by a [`tokio_util::codec::FramedRead`] or
//! by hand with a `BytesMut`.

pub mod body;
pub mod header;
mod request_decoder;
mod response_encoder;

pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
