use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{error, info, trace, warn};

use crate::connection::{HttpConnection, Request, RequestSender};
use crate::protocol::ParseError;
use crate::server::ServerConfig;

/// The requests of every connection accepted on one TCP listener, as a single
/// stream.
///
/// Each accepted connection runs in its own task and pushes its requests into a
/// bounded queue; [`Listener::next_request`] pulls from that queue. A request
/// that fails to parse shows up as `Err` and ends its connection.
///
/// Closing the listener, through [`Listener::close`], a [`ListenerHandle`] or by
/// dropping it, stops accepting connections and ends the stream: a pending or
/// later `next_request` resolves to `None` at once. Connections already open
/// are not cut; they end when they next try to hand out a request.
///
/// ```no_run
/// use micro_h1::protocol::Response;
/// use micro_h1::server::{Listener, ServerConfig};
///
/// # async fn run() -> std::io::Result<()> {
/// let mut listener = Listener::bind("127.0.0.1:8080", ServerConfig::default()).await?;
/// while let Some(next) = listener.next_request().await {
///     let Ok(mut request) = next else { continue };
///     tokio::spawn(async move {
///         let _ = request.respond(Response::new("Hello World!")).await;
///     });
/// }
/// # Ok(())
/// # }
/// ```
pub struct Listener {
    receiver: mpsc::Receiver<Result<Request, ParseError>>,
    shutdown: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    local_addr: SocketAddr,
}

impl Listener {
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: ServerConfig) -> io::Result<Self> {
        let tcp_listener = TcpListener::bind(addr).await?;
        Self::from_tcp(tcp_listener, config)
    }

    /// Starts accepting on an already bound listener. Must be called inside a
    /// tokio runtime.
    pub fn from_tcp(tcp_listener: TcpListener, config: ServerConfig) -> io::Result<Self> {
        let local_addr = tcp_listener.local_addr()?;
        let (sender, receiver) = mpsc::channel(config.request_queue_size());
        let shutdown = CancellationToken::new();

        info!(%local_addr, "start listening");
        tokio::spawn(accept_loop(tcp_listener, sender, shutdown.clone(), Arc::new(config)));

        let cancelled = Box::pin(shutdown.clone().cancelled_owned());
        Ok(Self { receiver, shutdown, cancelled, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The next request of any connection, `None` once the listener is closed.
    pub async fn next_request(&mut self) -> Option<Result<Request, ParseError>> {
        self.next().await
    }

    /// Stops accepting and ends the request stream. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.shutdown.cancel();
        self.receiver.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// A handle that closes this listener from another task.
    pub fn handle(&self) -> ListenerHandle {
        ListenerHandle { shutdown: self.shutdown.clone() }
    }
}

impl Stream for Listener {
    type Item = Result<Request, ParseError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.cancelled.as_mut().poll(cx).is_ready() {
            this.receiver.close();
            return Poll::Ready(None);
        }

        this.receiver.poll_recv(cx)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("local_addr", &self.local_addr)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Closes a [`Listener`] from anywhere; clones close the same listener.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    shutdown: CancellationToken,
}

impl ListenerHandle {
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

async fn accept_loop(tcp_listener: TcpListener, sender: RequestSender, shutdown: CancellationToken, config: Arc<ServerConfig>) {
    loop {
        let (tcp_stream, remote_addr) = select! {
            () = shutdown.cancelled() => break,
            () = sender.closed() => break,
            accepted = tcp_listener.accept() => match accepted {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            },
        };

        trace!(%remote_addr, "accept connection");
        let sender = sender.clone();
        let config = Arc::clone(&config);

        tokio::spawn(async move {
            let (reader, writer) = tcp_stream.into_split();
            let connection = HttpConnection::with_config(reader, writer, &config).with_remote_addr(remote_addr);
            match connection.process(sender).await {
                Ok(()) => trace!(%remote_addr, "finished process, connection shutdown"),
                Err(e) => error!(%remote_addr, cause = %e, "connection failed, connection shutdown"),
            }
        });
    }

    info!("listener closed, stop accepting");
}
