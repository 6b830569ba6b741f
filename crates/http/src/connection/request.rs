//! A request received on a connection, and the handle used to answer it.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use http::{HeaderMap, Method, Uri};
use tokio::io::AsyncWrite;
use tokio::sync::{Mutex, oneshot};
use tracing::{info, warn};

use crate::connection::message_writer::MessageWriter;
use crate::protocol::body::ReqBody;
use crate::protocol::{HttpVersion, PayloadSize, RequestHeader, Response, SendError};

pub(crate) type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State of one connection shared between its read loop and the requests it
/// produced.
///
/// Only one response is written at a time; the writer lock is held for the
/// whole response.
pub(crate) struct ConnectionShared {
    writer: Mutex<MessageWriter<BoxWriter>>,
    closed: AtomicBool,
}

impl ConnectionShared {
    pub(crate) fn new(writer: BoxWriter, write_buffer_size: usize) -> Self {
        Self { writer: Mutex::new(MessageWriter::with_capacity(writer, write_buffer_size)), closed: AtomicBool::new(false) }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Writes a response; any failure closes the connection.
    pub(crate) async fn send_response(&self, response: Response) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::ConnectionClosed);
        }

        let mut writer = self.writer.lock().await;
        let result = writer.send_response(response).await;
        if let Err(e) = &result {
            warn!(cause = %e, "failed to send response, closing connection");
            self.closed.store(true, Ordering::Release);
            if let Err(e) = writer.shutdown().await {
                info!(cause = %e, "shutdown connection writer failed");
            }
        }
        result
    }

    pub(crate) async fn write_continue(&self) -> Result<(), SendError> {
        let mut writer = self.writer.lock().await;
        let result = writer.write_continue().await;
        if result.is_err() {
            self.closed.store(true, Ordering::Release);
        }
        result
    }

    /// Marks the connection closed and shuts the write half down. Closing twice
    /// is a no-op.
    pub(crate) async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            info!(cause = %e, "shutdown connection writer failed");
        }
    }
}

impl fmt::Debug for ConnectionShared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionShared").field("closed", &self.is_closed()).finish_non_exhaustive()
    }
}

/// Answers exactly one request.
///
/// Signals the connection when the response has been written (or writing
/// failed), so the connection can move on to the next request. Dropping a
/// responder that never responded closes the connection.
#[derive(Debug)]
pub struct Responder {
    connection: Arc<ConnectionShared>,
    done: Option<oneshot::Sender<()>>,
}

impl Responder {
    pub(crate) fn new(connection: Arc<ConnectionShared>, done: oneshot::Sender<()>) -> Self {
        Self { connection, done: Some(done) }
    }

    /// Writes `response` to the connection and resolves once it is flushed.
    ///
    /// # Errors
    ///
    /// - [`SendError::ConnectionClosed`] when the connection was closed before,
    ///   for example by a failed earlier response
    /// - [`SendError::AlreadyResponded`] on a second call after a successful one
    /// - any write or trailer error of this response; the connection is closed
    pub async fn respond(&mut self, response: Response) -> Result<(), SendError> {
        let Some(done) = self.done.take() else {
            return Err(if self.connection.is_closed() { SendError::ConnectionClosed } else { SendError::AlreadyResponded });
        };

        let result = self.connection.send_response(response).await;
        let _ = done.send(());
        result
    }

    pub fn is_responded(&self) -> bool {
        self.done.is_none()
    }

    /// Whether the connection this request arrived on is closed.
    pub fn is_connection_closed(&self) -> bool {
        self.connection.is_closed()
    }
}

/// A request read from a connection.
///
/// The head is fully parsed and validated; the body is read lazily from the
/// connection while it is polled. Call [`Request::respond`] once to answer; the
/// connection reads its next request only after that and after the body has
/// been consumed or discarded.
#[derive(Debug)]
pub struct Request {
    header: RequestHeader,
    body: ReqBody,
    content_length: Option<u64>,
    remote_addr: Option<SocketAddr>,
    responder: Responder,
}

impl Request {
    pub(crate) fn new(
        header: RequestHeader,
        payload_size: PayloadSize,
        body: ReqBody,
        responder: Responder,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self { header, body, content_length: payload_size.content_length(), remote_addr, responder }
    }

    pub fn method(&self) -> &Method {
        self.header.method()
    }

    pub fn uri(&self) -> &Uri {
        self.header.uri()
    }

    pub fn version(&self) -> HttpVersion {
        self.header.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.header.headers()
    }

    pub fn header(&self) -> &RequestHeader {
        &self.header
    }

    /// The validated `content-length`, `None` for chunked bodies or when no
    /// length was sent.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn body(&mut self) -> &mut ReqBody {
        &mut self.body
    }

    pub fn is_connection_closed(&self) -> bool {
        self.responder.is_connection_closed()
    }

    /// See [`Responder::respond`].
    pub async fn respond(&mut self, response: Response) -> Result<(), SendError> {
        self.responder.respond(response).await
    }

    pub fn into_parts(self) -> (RequestHeader, ReqBody, Responder) {
        (self.header, self.body, self.responder)
    }
}
