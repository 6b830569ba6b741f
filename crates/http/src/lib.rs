//! An asynchronous HTTP/1.1 server protocol engine
//!
//! This crate turns raw TCP byte streams into a stream of parsed requests and
//! writes correctly framed responses back. It is built on tokio and keeps the
//! parsing zero-copy where it can: header values are sliced out of the read
//! buffer instead of copied.
//!
//! # Features
//!
//! - Request head parsing with configurable size and header count limits
//! - Strict message framing: `content-length`, chunked transfer coding and
//!   rejection of ambiguous combinations
//! - Lazily read request bodies through [`http_body::Body`] or `AsyncRead`
//! - Buffered, streamed and chunked response bodies, with trailers
//! - Keep-alive with strict request/response ordering per connection
//! - `Expect: 100-continue`
//! - A listener that merges the requests of all connections into one stream
//!
//! # Example
//!
//! ```no_run
//! use micro_h1::protocol::Response;
//! use micro_h1::server::{Listener, ServerConfig};
//! use tracing::{info, warn, Level};
//! use tracing_subscriber::FmtSubscriber;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
//!     tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
//!
//!     let mut listener = Listener::bind("127.0.0.1:8080", ServerConfig::default()).await?;
//!     info!(addr = %listener.local_addr(), "start listening");
//!
//!     while let Some(next) = listener.next_request().await {
//!         let mut request = match next {
//!             Ok(request) => request,
//!             Err(e) => {
//!                 warn!(cause = %e, "bad request");
//!                 continue;
//!             }
//!         };
//!
//!         tokio::spawn(async move {
//!             info!(path = request.uri().path(), "request");
//!             if let Err(e) = request.respond(Response::new("Hello World!\r\n")).await {
//!                 warn!(cause = %e, "failed to respond");
//!             }
//!         });
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`server`]: the listener loop and its configuration
//! - [`connection`]: per-connection request loop, [`connection::Request`] and
//!   response writing
//! - [`handler`]: an optional handler trait and [`handler::serve`] on top of
//!   the listener
//! - [`protocol`]: message types, bodies and errors
//! - [`codec`]: the tokio codecs that decode requests and encode responses
//!
//! # Errors
//!
//! - [`protocol::ParseError`]: a request could not be read; the connection is
//!   answered with `400` and closed
//! - [`protocol::SendError`]: a response could not be written; the connection
//!   is closed
//! - [`protocol::TrailerError`]: response trailers do not match their
//!   declaration
//! - [`protocol::HttpError`]: either of the first two, as returned by a
//!   connection
//!
//! # Limitations
//!
//! - HTTP/1.1 only, HTTP/1.0 requests are served without keep-alive
//! - No TLS (use a reverse proxy for HTTPS)
//! - Request trailers are read and discarded

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod server;

mod utils;
pub(crate) use utils::ensure;
