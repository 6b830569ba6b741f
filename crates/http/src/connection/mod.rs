//! Per-connection request handling.
//!
//! - [`HttpConnection`]: reads requests off one byte stream, one at a time,
//!   and hands them out through a channel
//! - [`Request`]: a parsed request with a lazily read body; answered with
//!   [`Request::respond`]
//! - [`Responder`]: the answering half of a request, for handlers that split the
//!   request with [`Request::into_parts`]
//! - [`MessageWriter`]: encodes responses into the connection's write half
//!
//! The connection never reads the next request head before the current request
//! has been answered and its body consumed or discarded, so responses always go
//! out in request order.

mod http_connection;
mod message_writer;
mod request;

pub use http_connection::{HttpConnection, RequestSender};
pub use message_writer::MessageWriter;
pub use request::{Request, Responder};
