//! Request body streaming.
//!
//! A request body is split in two halves connected by channels:
//!
//! - [`ReqBody`]: handed to the application with the request; implements
//!   `http_body::Body` and `tokio::io::AsyncRead`
//! - `BodySender`: stays with the connection and pulls payload items out of the
//!   request decoder each time the `ReqBody` asks for more
//!
//! Nothing is read from the connection until the application polls the body.
//! Once the response is sent the connection drains whatever the application
//! left unread, so the next request head starts at the right byte.

mod body_channel;
mod req_body;

pub(crate) use body_channel::{BodySender, create_body_sender_receiver};
pub use req_body::ReqBody;
