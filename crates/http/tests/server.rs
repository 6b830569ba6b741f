use std::time::Duration;

use bytes::Bytes;
use http::header::TRAILER;
use http::{HeaderMap, HeaderValue, Method};
use http_body_util::BodyExt;
use micro_h1::protocol::{BoxError, ParseError, Response, ResponseBody};
use micro_h1::server::{Listener, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn listener(config: ServerConfig) -> (Listener, TcpStream) {
    let listener = Listener::bind("127.0.0.1:0", config).await.unwrap();
    let client = TcpStream::connect(listener.local_addr()).await.unwrap();
    (listener, client)
}

async fn read_until_closed(client: &mut TcpStream) -> String {
    let mut response = String::new();
    timeout(TIMEOUT, client.read_to_string(&mut response)).await.unwrap().unwrap();
    response
}

#[tokio::test]
async fn hello_response_on_the_wire() {
    let (mut listener, mut client) = listener(ServerConfig::default()).await;
    client.write_all(b"GET / HTTP/1.1\r\nheader: foo\r\n\r\n").await.unwrap();

    let mut request = listener.next_request().await.unwrap().unwrap();
    assert_eq!(request.method(), Method::GET);
    assert_eq!(request.uri().path(), "/");
    assert_eq!(request.headers().get("header").unwrap(), "foo");
    assert_eq!(request.content_length(), None);
    assert!(request.body().collect().await.unwrap().to_bytes().is_empty());

    request.respond(Response::new("Hello")).await.unwrap();

    let expected = b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nHello";
    let mut buf = vec![0; expected.len()];
    timeout(TIMEOUT, client.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(buf, expected);
}

#[tokio::test]
async fn keep_alive_serves_pipelined_requests_in_order() {
    let (mut listener, mut client) = listener(ServerConfig::default()).await;
    client
        .write_all(b"POST /a HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /b HTTP/1.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut first = listener.next_request().await.unwrap().unwrap();
    assert_eq!(first.content_length(), Some(3));
    let body = first.body().collect().await.unwrap().to_bytes();
    first.respond(Response::new(body)).await.unwrap();

    let mut second = listener.next_request().await.unwrap().unwrap();
    assert_eq!(second.uri().path(), "/b");
    second.respond(Response::new("b")).await.unwrap();

    let response = read_until_closed(&mut client).await;
    assert_eq!(response, "HTTP/1.1 200 OK\r\ncontent-length: 3\r\n\r\nabcHTTP/1.1 200 OK\r\ncontent-length: 1\r\n\r\nb");
}

#[tokio::test]
async fn head_with_content_length_is_rejected() {
    let (mut listener, mut client) = listener(ServerConfig::default()).await;
    client.write_all(b"HEAD / HTTP/1.1\r\nContent-Length:4\r\n\r\n").await.unwrap();

    let err = listener.next_request().await.unwrap().unwrap_err();
    assert!(matches!(err, ParseError::UnexpectedContentLength));
    assert_eq!(err.to_string(), "http: method cannot contain a Content-Length");

    let response = read_until_closed(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.contains("connection: close\r\n"));
    assert!(response.ends_with("\r\n\r\nhttp: method cannot contain a Content-Length"));
}

#[tokio::test]
async fn oversized_head_is_rejected() {
    let config = ServerConfig::builder().max_header_bytes(64).build();
    let (mut listener, mut client) = listener(config).await;
    let request = format!("GET / HTTP/1.1\r\nx-long: {}\r\n\r\n", "a".repeat(128));
    client.write_all(request.as_bytes()).await.unwrap();

    let err = listener.next_request().await.unwrap().unwrap_err();
    assert!(matches!(err, ParseError::TooLargeHeader { max_size: 64, .. }));

    let response = read_until_closed(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[tokio::test]
async fn chunked_echo_with_trailers() {
    let (mut listener, mut client) = listener(ServerConfig::default()).await;
    client
        .write_all(
            b"POST /echo HTTP/1.1\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
              5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nx-ignored: yes\r\n\r\n",
        )
        .await
        .unwrap();

    let mut request = listener.next_request().await.unwrap().unwrap();
    assert_eq!(request.content_length(), None);

    let mut body = Vec::new();
    request.body().read_to_end(&mut body).await.unwrap();
    assert_eq!(body, b"hello world");

    let size = body.len();
    let chunks = futures::stream::iter(body.chunks(6).map(|c| Ok::<_, BoxError>(Bytes::copy_from_slice(c))).collect::<Vec<_>>());
    let response = Response::new(ResponseBody::stream(chunks))
        .header(TRAILER, HeaderValue::from_static("x-body-size"))
        .trailers(move || async move {
            let mut trailers = HeaderMap::new();
            trailers.insert("x-body-size", HeaderValue::from(size));
            trailers
        });
    request.respond(response).await.unwrap();

    let response = read_until_closed(&mut client).await;
    assert_eq!(
        response,
        "HTTP/1.1 200 OK\r\ntrailer: x-body-size\r\ntransfer-encoding: chunked\r\n\r\n\
         6\r\nhello \r\n5\r\nworld\r\n0\r\nx-body-size: 11\r\n\r\n"
    );
}

#[tokio::test]
async fn truncated_body_is_reported_to_the_reader() {
    let (mut listener, mut client) = listener(ServerConfig::default()).await;
    client.write_all(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc").await.unwrap();
    client.shutdown().await.unwrap();

    let mut request = listener.next_request().await.unwrap().unwrap();
    let err = request.body().collect().await.unwrap_err();
    assert!(err.is_unexpected_eof());
}

#[tokio::test]
async fn closing_the_listener_ends_the_sequence() {
    let (mut listener, _client) = listener(ServerConfig::default()).await;
    let handle = listener.handle();

    let pending = tokio::spawn(async move { listener.next_request().await.is_none() });
    handle.close();
    handle.close();

    assert!(timeout(TIMEOUT, pending).await.unwrap().unwrap());
}
