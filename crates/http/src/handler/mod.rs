//! Request handlers on top of [`Listener`].
//!
//! A [`Handler`] turns a request head and body into a [`Response`]; [`serve`]
//! runs one on every request a listener produces. Plain async functions become
//! handlers through [`make_handler`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use tracing::{error, warn};

use crate::connection::Request;
use crate::protocol::body::ReqBody;
use crate::protocol::{BoxError, RequestHeader, Response};
use crate::server::Listener;

#[async_trait]
pub trait Handler: Send + Sync {
    type Error: Into<BoxError>;

    async fn call(&self, header: RequestHeader, body: ReqBody) -> Result<Response, Self::Error>;
}

#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<Err, F, Fut> Handler for HandlerFn<F>
where
    F: Fn(RequestHeader, ReqBody) -> Fut + Send + Sync,
    Err: Into<BoxError>,
    Fut: Future<Output = Result<Response, Err>> + Send,
{
    type Error = Err;

    async fn call(&self, header: RequestHeader, body: ReqBody) -> Result<Response, Self::Error> {
        (self.f)(header, body).await
    }
}

pub fn make_handler<F, Err, Ret>(f: F) -> HandlerFn<F>
where
    Err: Into<BoxError>,
    Ret: Future<Output = Result<Response, Err>>,
    F: Fn(RequestHeader, ReqBody) -> Ret,
{
    HandlerFn { f }
}

/// Runs `handler` on every request of `listener` until the listener is closed.
///
/// Each request is handled in its own task. A handler error is answered with
/// `500 Internal Server Error`; requests that failed to parse are only logged,
/// their connection has already answered them.
pub async fn serve<H>(mut listener: Listener, handler: Arc<H>)
where
    H: Handler + 'static,
{
    while let Some(next) = listener.next_request().await {
        match next {
            Ok(request) => {
                let handler = Arc::clone(&handler);
                tokio::spawn(handle_request(request, handler));
            }
            Err(e) => warn!(cause = %e, "rejected malformed request"),
        }
    }
}

async fn handle_request<H: Handler>(request: Request, handler: Arc<H>) {
    let remote_addr = request.remote_addr();
    let (header, body, mut responder) = request.into_parts();

    let response = match handler.call(header, body).await {
        Ok(response) => response,
        Err(e) => {
            let e: BoxError = e.into();
            error!(?remote_addr, cause = %e, "handler failed");
            Response::with_status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };

    if let Err(e) = responder.respond(response).await {
        warn!(?remote_addr, cause = %e, "failed to send response");
    }
}
