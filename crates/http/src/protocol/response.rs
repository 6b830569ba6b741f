//! HTTP response description.
//!
//! A [`Response`] is what the application hands back for a request: a status,
//! headers, a body and optionally a producer for trailer fields. It is a plain
//! description; the connection turns it into bytes when it is passed to
//! `respond`.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt, TryStreamExt};
use http::header::{IntoHeaderName, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::protocol::is_chunked;
use crate::protocol::PayloadSize;

/// Status line and headers of a response, before the body is attached.
pub type ResponseHead = http::Response<()>;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// Produces the trailer fields once the body has been written.
pub type TrailerProducer = Box<dyn FnOnce() -> BoxFuture<'static, HeaderMap> + Send>;

pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    trailers: Option<TrailerProducer>,
}

impl Response {
    /// A `200 OK` response with the given body.
    pub fn new<B: Into<ResponseBody>>(body: B) -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: body.into(), trailers: None }
    }

    /// A `200 OK` response without a body.
    pub fn empty() -> Self {
        Self::new(ResponseBody::empty())
    }

    pub fn with_status(status: StatusCode) -> Self {
        Self::empty().status(status)
    }

    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Appends a header field, keeping any previous value for the same name.
    #[must_use]
    pub fn header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn body<B: Into<ResponseBody>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Registers the trailer producer, run after the last body chunk is written.
    ///
    /// The response must declare the produced field names in a `trailer` header
    /// and be sent with chunked transfer coding.
    #[must_use]
    pub fn trailers<F, Fut>(mut self, producer: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HeaderMap> + Send + 'static,
    {
        self.trailers = Some(Box::new(move || producer().boxed()));
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn has_trailers(&self) -> bool {
        self.trailers.is_some()
    }

    /// How the body will be framed.
    ///
    /// A caller-supplied `transfer-encoding: chunked` forces chunked framing for
    /// any body; otherwise the body's size decides.
    pub fn payload_size(&self) -> PayloadSize {
        if is_chunked(self.headers.get(TRANSFER_ENCODING)) {
            return PayloadSize::new_chunked();
        }
        self.body.size_hint().into()
    }

    pub(crate) fn into_parts(self) -> (ResponseHead, ResponseBody, Option<TrailerProducer>) {
        let mut head = ResponseHead::new(());
        *head.status_mut() = self.status;
        *head.headers_mut() = self.headers;
        (head, self.body, self.trailers)
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("trailers", &self.trailers.is_some())
            .finish()
    }
}

impl<B: Into<ResponseBody>> From<http::Response<B>> for Response {
    fn from(response: http::Response<B>) -> Self {
        let (parts, body) = response.into_parts();
        Self { status: parts.status, headers: parts.headers, body: body.into(), trailers: None }
    }
}

/// The body of a [`Response`].
///
/// Either nothing, a buffer of known length, or a stream of unknown length.
pub struct ResponseBody {
    kind: Kind,
}

enum Kind {
    Empty,
    Full(Option<Bytes>),
    Stream(BoxStream<'static, Result<Bytes, BoxError>>),
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self { kind: Kind::Empty }
    }

    pub fn full<B: Into<Bytes>>(bytes: B) -> Self {
        Self { kind: Kind::Full(Some(bytes.into())) }
    }

    /// A body of unknown length read from a stream of byte chunks.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Self { kind: Kind::Stream(stream.map_err(Into::into).boxed()) }
    }

    /// A body of unknown length read from an async reader until it is exhausted.
    pub fn reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::stream(ReaderStream::new(reader))
    }

    /// Adapts any `http_body::Body`; its data frames are sent as a stream.
    pub fn from_body<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self::stream(body.into_data_stream())
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.kind, Kind::Stream(_))
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::Empty => f.write_str("ResponseBody::Empty"),
            Kind::Full(bytes) => f.debug_tuple("ResponseBody::Full").field(bytes).finish(),
            Kind::Stream(_) => f.write_str("ResponseBody::Stream"),
        }
    }
}

impl Body for ResponseBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match &mut self.get_mut().kind {
            Kind::Empty => Poll::Ready(None),
            Kind::Full(bytes) => Poll::Ready(bytes.take().map(|bytes| Ok(Frame::data(bytes)))),
            Kind::Stream(stream) => stream.poll_next_unpin(cx).map(|item| item.map(|result| result.map(Frame::data))),
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.kind {
            Kind::Empty => true,
            Kind::Full(bytes) => bytes.is_none(),
            Kind::Stream(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.kind {
            Kind::Empty => SizeHint::with_exact(0),
            Kind::Full(bytes) => SizeHint::with_exact(bytes.as_ref().map_or(0, |bytes| bytes.len() as u64)),
            Kind::Stream(_) => SizeHint::new(),
        }
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<()> for ResponseBody {
    fn from((): ()) -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::full(bytes)
    }
}

impl From<Vec<u8>> for ResponseBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::full(bytes)
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        Self::full(s)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        Self::full(s)
    }
}

impl From<&'static [u8]> for ResponseBody {
    fn from(bytes: &'static [u8]) -> Self {
        Self::full(bytes)
    }
}
