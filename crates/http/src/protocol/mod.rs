//! Core HTTP/1.1 protocol types.
//!
//! - **Messages** ([`Message`], [`PayloadItem`], [`PayloadSize`]): what the codecs
//!   produce and consume, a message head followed by payload items
//! - **Request head** ([`RequestHeader`]) and **version** ([`HttpVersion`])
//! - **Response description** ([`Response`], [`ResponseBody`])
//! - **Request bodies** ([`body::ReqBody`])
//! - **Errors** ([`HttpError`], [`ParseError`], [`SendError`], [`TrailerError`])

mod message;
pub use message::Message;
pub use message::PayloadItem;
pub use message::PayloadSize;

mod request;
pub use request::RequestHeader;

mod response;
pub use response::BoxError;
pub use response::Response;
pub use response::ResponseBody;
pub use response::ResponseHead;
pub use response::TrailerProducer;

mod version;
pub use version::HttpVersion;
pub use version::parse_version;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;
pub use error::TrailerError;

pub mod body;

pub(crate) use request::is_chunked;
