use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use http::header::CONNECTION;
use http::{HeaderValue, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;
use tracing::{error, info, trace, warn};

use crate::codec::RequestDecoder;
use crate::connection::request::{ConnectionShared, Request, Responder};
use crate::protocol::body::{BodySender, ReqBody, create_body_sender_receiver};
use crate::protocol::{HttpError, Message, ParseError, PayloadSize, RequestHeader, Response};
use crate::server::ServerConfig;

/// Parsed requests, or the error that ended a connection, as handed to the
/// consumer of a connection.
pub type RequestSender = mpsc::Sender<Result<Request, ParseError>>;

/// The per-connection request loop.
///
/// Reads one request at a time, hands it to the consumer and waits until the
/// consumer has responded before reading the next one:
///
/// ```text
/// reading -> dispatched -> responding -> reading | closed
/// ```
///
/// The request body is pulled from the connection on demand while the request
/// is dispatched; whatever the consumer left unread is discarded afterwards.
pub struct HttpConnection<R> {
    framed_read: FramedRead<R, RequestDecoder>,
    shared: Arc<ConnectionShared>,
    remote_addr: Option<SocketAddr>,
}

impl<R> fmt::Debug for HttpConnection<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConnection")
            .field("remote_addr", &self.remote_addr)
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl<R> HttpConnection<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new<W>(reader: R, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_config(reader, writer, &ServerConfig::default())
    }

    pub fn with_config<W>(reader: R, writer: W, config: &ServerConfig) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let decoder = RequestDecoder::with_limits(config.max_header_bytes(), config.max_headers());
        Self {
            framed_read: FramedRead::with_capacity(reader, decoder, config.read_buffer_size()),
            shared: Arc::new(ConnectionShared::new(Box::new(writer), config.write_buffer_size())),
            remote_addr: None,
        }
    }

    #[must_use]
    pub fn with_remote_addr(mut self, remote_addr: SocketAddr) -> Self {
        self.remote_addr = Some(remote_addr);
        self
    }

    /// Runs the connection until the peer closes it, a request fails to parse,
    /// a response fails to write, or the consumer goes away.
    ///
    /// A parse error is sent to the consumer as `Err`, answered with a best
    /// effort `400 Bad Request` and ends the connection; it is not returned
    /// here. Errors returned are those that broke an exchange in progress.
    pub async fn process(mut self, sender: RequestSender) -> Result<(), HttpError> {
        let result = self.run(&sender).await;
        self.shared.close().await;
        result
    }

    async fn run(&mut self, sender: &RequestSender) -> Result<(), HttpError> {
        loop {
            let (header, payload_size) = match self.framed_read.next().await {
                Some(Ok(Message::Header(header))) => header,

                Some(Ok(Message::Payload(_))) => {
                    error!("receive body while expecting a request head");
                    return Err(ParseError::invalid_body("need header while receive body").into());
                }

                Some(Err(e)) => {
                    self.reject(sender, e).await;
                    return Ok(());
                }

                None => {
                    trace!("peer closed the connection between requests");
                    return Ok(());
                }
            };

            let keep_alive = header.keep_alive();
            if header.expects_continue() {
                self.shared.write_continue().await?;
                info!("receive expect request header, sent continue response");
            }

            let (done_sender, mut done_receiver) = oneshot::channel();
            let (mut body_sender, body_receiver) = create_body_sender_receiver(&mut self.framed_read, payload_size);
            let request = Request::new(
                header,
                payload_size,
                ReqBody::new(body_receiver),
                Responder::new(Arc::clone(&self.shared), done_sender),
                self.remote_addr,
            );

            if sender.send(Ok(request)).await.is_err() {
                info!("request consumer is gone, closing connection");
                return Ok(());
            }

            let outcome = drive_body_until_done(&mut body_sender, &mut done_receiver).await;

            if self.shared.is_closed() {
                // the response failed to write
                return Ok(());
            }
            if !outcome.responded {
                warn!("request dropped without a response, closing connection");
                return Ok(());
            }
            if let Some(e) = outcome.body_error {
                info!(cause = %e, "request body unreadable, closing connection");
                return Ok(());
            }

            if let Err(e) = body_sender.skip_data().await {
                warn!(cause = %e, "failed to discard unread request body");
                return Err(e.into());
            }

            if !keep_alive {
                trace!("request does not keep the connection alive");
                return Ok(());
            }
        }
    }

    /// Surfaces a parse error to the consumer and answers it with `400`.
    async fn reject(&self, sender: &RequestSender, e: ParseError) {
        warn!(cause = %e, "failed to read request");

        let response = (!matches!(e, ParseError::Io { .. })).then(|| bad_request(&e));
        if sender.send(Err(e)).await.is_err() {
            trace!("request consumer is gone, parse error dropped");
        }

        if let Some(response) = response {
            if let Err(e) = self.shared.send_response(response).await {
                info!(cause = %e, "failed to send 400 response");
            }
        }
    }
}

fn bad_request(e: &ParseError) -> Response {
    Response::new(e.to_string())
        .status(StatusCode::BAD_REQUEST)
        .header(CONNECTION, HeaderValue::from_static("close"))
}

struct BodyOutcome {
    /// the consumer responded, as opposed to dropping the request
    responded: bool,
    /// reading the request body failed; the stream position is lost
    body_error: Option<ParseError>,
}

/// Serves body reads for the dispatched request until it has been answered.
async fn drive_body_until_done<S>(body_sender: &mut BodySender<'_, S>, done: &mut oneshot::Receiver<()>) -> BodyOutcome
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    let mut body_result = None;

    let responded = {
        let serve = body_sender.serve();
        tokio::pin!(serve);

        loop {
            select! {
                biased;
                done_result = &mut *done => break done_result.is_ok(),
                result = &mut serve, if body_result.is_none() => body_result = Some(result),
            }
        }
    };

    BodyOutcome { responded, body_error: body_result.and_then(Result::err) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SendError;
    use http_body_util::BodyExt;
    use indoc::indoc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    fn spawn_connection(config: ServerConfig) -> (DuplexStream, mpsc::Receiver<Result<Request, ParseError>>) {
        let (client, server) = duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let (sender, receiver) = mpsc::channel(4);
        tokio::spawn(async move {
            let _ = HttpConnection::with_config(reader, writer, &config).process(sender).await;
        });
        (client, receiver)
    }

    async fn read_to_string(client: &mut DuplexStream) -> String {
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn keep_alive_requests_in_sequence() {
        let (mut client, mut requests) = spawn_connection(ServerConfig::default());
        let input = indoc! {"
            POST /first HTTP/1.1
            Content-Length: 5

            helloGET /second HTTP/1.1
            Connection: close

        "};
        client.write_all(input.replace('\n', "\r\n").as_bytes()).await.unwrap();

        let mut first = requests.recv().await.unwrap().unwrap();
        assert_eq!(first.uri().path(), "/first");
        assert_eq!(first.content_length(), Some(5));
        let body = first.body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello");
        first.respond(Response::new("one")).await.unwrap();

        let mut second = requests.recv().await.unwrap().unwrap();
        assert_eq!(second.uri().path(), "/second");
        second.respond(Response::new("two")).await.unwrap();

        assert_eq!(
            read_to_string(&mut client).await,
            "HTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\noneHTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\ntwo"
        );
        assert!(requests.recv().await.is_none());
    }

    #[tokio::test]
    async fn unread_body_is_discarded() {
        let (mut client, mut requests) = spawn_connection(ServerConfig::default());
        client
            .write_all(b"POST /a HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n0\r\n\r\nGET /b HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let mut first = requests.recv().await.unwrap().unwrap();
        assert_eq!(first.content_length(), None);
        first.respond(Response::empty()).await.unwrap();

        let mut second = requests.recv().await.unwrap().unwrap();
        assert_eq!(second.uri().path(), "/b");
        assert!(second.respond(Response::empty()).await.is_ok());
    }

    #[tokio::test]
    async fn parse_error_is_surfaced_and_answered() {
        let (mut client, mut requests) = spawn_connection(ServerConfig::default());
        client.write_all(b"HEAD / HTTP/1.1\r\nContent-Length:4\r\n\r\n").await.unwrap();

        let err = requests.recv().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "http: method cannot contain a Content-Length");

        let text = read_to_string(&mut client).await;
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.ends_with("http: method cannot contain a Content-Length"));
        assert!(requests.recv().await.is_none());
    }

    #[tokio::test]
    async fn clean_eof_ends_silently() {
        let (mut client, mut requests) = spawn_connection(ServerConfig::default());
        client.shutdown().await.unwrap();
        assert!(requests.recv().await.is_none());
    }

    #[tokio::test]
    async fn second_respond_reports_state() {
        let (mut client, mut requests) = spawn_connection(ServerConfig::default());
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();

        let mut request = requests.recv().await.unwrap().unwrap();
        request.respond(Response::new("ok")).await.unwrap();
        assert!(matches!(request.respond(Response::new("again")).await, Err(SendError::AlreadyResponded)));
    }

    #[tokio::test]
    async fn write_failure_closes_connection() {
        let (mut client, server) = duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let (sender, mut requests) = mpsc::channel(4);
        let connection = tokio::spawn(HttpConnection::new(reader, writer).process(sender));

        client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
        let mut request = requests.recv().await.unwrap().unwrap();
        drop(client);

        assert!(matches!(request.respond(Response::new("lost")).await, Err(SendError::Io { .. })));
        assert!(request.is_connection_closed());
        assert!(matches!(request.respond(Response::new("again")).await, Err(SendError::ConnectionClosed)));

        assert!(connection.await.unwrap().is_ok());
        assert!(requests.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_request_closes_connection() {
        let (mut client, mut requests) = spawn_connection(ServerConfig::default());
        client.write_all(b"GET / HTTP/1.1\r\n\r\nGET /never HTTP/1.1\r\n\r\n").await.unwrap();

        drop(requests.recv().await.unwrap().unwrap());
        assert!(requests.recv().await.is_none());
        assert_eq!(read_to_string(&mut client).await, "");
    }

    #[tokio::test]
    async fn expect_continue_is_answered_before_dispatch() {
        let (mut client, mut requests) = spawn_connection(ServerConfig::default());
        client
            .write_all(b"PUT /upload HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 4\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut request = requests.recv().await.unwrap().unwrap();
        let mut interim = [0u8; 25];
        client.read_exact(&mut interim).await.unwrap();
        assert_eq!(&interim, b"HTTP/1.1 100 Continue\r\n\r\n");

        client.write_all(b"data").await.unwrap();
        let mut body = String::new();
        request.body().read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "data");
        request.respond(Response::empty()).await.unwrap();
    }

    #[tokio::test]
    async fn truncated_body_is_unexpected_eof() {
        let (mut client, mut requests) = spawn_connection(ServerConfig::default());
        client.write_all(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await.unwrap();
        client.shutdown().await.unwrap();

        let mut request = requests.recv().await.unwrap().unwrap();
        let err = request.body().collect().await.unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[tokio::test]
    async fn http10_closes_after_response() {
        let (mut client, mut requests) = spawn_connection(ServerConfig::default());
        client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();

        let mut request = requests.recv().await.unwrap().unwrap();
        assert_eq!(request.version(), crate::protocol::HttpVersion::HTTP_10);
        request.respond(Response::new("bye")).await.unwrap();

        assert_eq!(read_to_string(&mut client).await, "HTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\nbye");
    }
}
