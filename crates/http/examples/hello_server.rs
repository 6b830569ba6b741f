use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, TRAILER};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use micro_h1::handler::{make_handler, serve};
use micro_h1::protocol::body::ReqBody;
use micro_h1::protocol::{BoxError, RequestHeader, Response, ResponseBody};
use micro_h1::server::{Listener, ServerConfig};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

// curl -v http://127.0.0.1:8080/
// curl -v -H "Transfer-Encoding: chunked" -d "hello world" http://127.0.0.1:8080/echo
// curl -v --raw http://127.0.0.1:8080/stream
async fn route(header: RequestHeader, body: ReqBody) -> Result<Response, BoxError> {
    info!(method = %header.method(), path = header.uri().path(), "request");

    let response = match (header.method(), header.uri().path()) {
        (&Method::GET, "/") => Response::new("Hello World!\r\n"),
        (&Method::POST, "/echo") => {
            let bytes = body.collect().await?.to_bytes();
            info!(size = bytes.len(), "echo request body");
            Response::new(bytes).header(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"))
        }
        (&Method::GET, "/stream") => {
            let chunks = futures::stream::iter(["streamed ", "in ", "chunks\r\n"].map(|s| Ok::<_, BoxError>(Bytes::from_static(s.as_bytes()))));
            Response::new(ResponseBody::stream(chunks))
                .header(TRAILER, HeaderValue::from_static("x-chunk-count"))
                .trailers(|| async {
                    let mut trailers = HeaderMap::new();
                    trailers.insert("x-chunk-count", HeaderValue::from_static("3"));
                    trailers
                })
        }
        _ => Response::with_status(StatusCode::NOT_FOUND).body("404 not found\r\n"),
    };
    Ok(response)
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = ServerConfig::builder().max_headers(32).build();
    let listener = match Listener::bind("127.0.0.1:8080", config).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };
    info!(addr = %listener.local_addr(), "start listening");

    let handle = listener.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            handle.close();
        }
    });

    serve(listener, Arc::new(make_handler(route))).await;
}
