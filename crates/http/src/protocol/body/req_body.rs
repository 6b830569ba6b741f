use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, Bytes};
use http_body::{Body, Frame, SizeHint};
use tokio::io::{AsyncRead, ReadBuf};

use crate::protocol::body::body_channel::BodyReceiver;
use crate::protocol::ParseError;

/// The body of a received request.
///
/// Data is pulled from the connection only when the body is polled, so a
/// handler can stream large bodies without buffering them. It can be consumed
/// frame by frame through [`http_body::Body`] (for example with
/// `http_body_util::BodyExt::collect`) or byte-wise through [`AsyncRead`].
///
/// Reading past the declared length never happens: a `content-length` body ends
/// after exactly that many bytes, a chunked body after its zero-size chunk. A
/// connection that closes early surfaces [`ParseError::UnexpectedEof`] (an
/// [`io::ErrorKind::UnexpectedEof`] through `AsyncRead`).
#[derive(Debug)]
pub struct ReqBody {
    receiver: BodyReceiver,
    // data frame partially handed out through AsyncRead
    remaining: Bytes,
}

impl ReqBody {
    pub(crate) fn new(receiver: BodyReceiver) -> Self {
        Self { receiver, remaining: Bytes::new() }
    }
}

impl Body for ReqBody {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        if self.remaining.has_remaining() {
            let bytes = std::mem::take(&mut self.remaining);
            return Poll::Ready(Some(Ok(Frame::data(bytes))));
        }
        Pin::new(&mut self.receiver).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        !self.remaining.has_remaining() && self.receiver.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.receiver.size_hint()
    }
}

impl AsyncRead for ReqBody {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        while !self.remaining.has_remaining() {
            match ready!(Pin::new(&mut self.receiver).poll_frame(cx)) {
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        self.remaining = data;
                    }
                }
                Some(Err(e)) => return Poll::Ready(Err(e.into())),
                // end of body, nothing written into buf
                None => return Poll::Ready(Ok(())),
            }
        }

        let len = self.remaining.len().min(buf.remaining());
        buf.put_slice(&self.remaining.split_to(len));
        Poll::Ready(Ok(()))
    }
}
