use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt, channel::mpsc};
use http_body::{Body, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{error, trace};

pub(crate) fn create_body_sender_receiver<S>(body_stream: &mut S, payload_size: PayloadSize) -> (BodySender<'_, S>, BodyReceiver)
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    let (signal_sender, signal_receiver) = mpsc::channel(1);
    let (data_sender, data_receiver) = mpsc::channel(1);

    (BodySender::new(body_stream, signal_receiver, data_sender), BodyReceiver::new(signal_sender, data_receiver, payload_size))
}

/// Asks the sender side for the next payload item.
#[derive(Debug)]
pub(crate) struct RequestData;

/// Connection side of a request body: pulls payload items out of the decoded
/// request stream whenever the [`BodyReceiver`] asks for one.
pub(crate) struct BodySender<'conn, S> {
    payload_stream: &'conn mut S,
    signal_receiver: mpsc::Receiver<RequestData>,
    data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    eof: bool,
}

impl<'conn, S> BodySender<'conn, S>
where
    S: Stream<Item = Result<Message<(RequestHeader, PayloadSize)>, ParseError>> + Unpin,
{
    pub fn new(
        payload_stream: &'conn mut S,
        signal_receiver: mpsc::Receiver<RequestData>,
        data_sender: mpsc::Sender<Result<PayloadItem, ParseError>>,
    ) -> Self {
        Self { payload_stream, signal_receiver, data_sender, eof: false }
    }

    /// Serves body reads until the payload ends, fails, or the receiver goes away.
    ///
    /// Read errors are forwarded to the receiver and returned.
    pub(crate) async fn serve(&mut self) -> Result<(), ParseError> {
        while !self.eof {
            if self.signal_receiver.next().await.is_none() {
                // receiver dropped, nobody reads the rest
                return Ok(());
            }

            match self.read_data().await {
                Ok(payload_item) => {
                    self.eof = payload_item.is_eof();
                    if self.data_sender.send(Ok(payload_item)).await.is_err() {
                        trace!("body receiver dropped while sending payload");
                        return Ok(());
                    }
                }

                Err(e) => {
                    error!(cause = %e, "failed to read request body");
                    let reason = e.to_string();
                    if self.data_sender.send(Err(e)).await.is_err() {
                        trace!("body receiver dropped while sending error");
                    }
                    self.eof = true;
                    return Err(ParseError::invalid_body(reason));
                }
            }
        }
        Ok(())
    }

    async fn read_data(&mut self) -> Result<PayloadItem, ParseError> {
        match self.payload_stream.next().await {
            Some(Ok(Message::Payload(payload_item))) => Ok(payload_item),
            Some(Ok(Message::Header(_))) => {
                error!("should not receive header in BodySender");
                Err(ParseError::invalid_body("should not receive header in BodySender"))
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::unexpected_eof("connection closed before request body completed")),
        }
    }

    /// Reads and discards whatever is left of the body so the next request head
    /// starts at the right place.
    pub(crate) async fn skip_data(&mut self) -> Result<(), ParseError> {
        let mut skipped: usize = 0;
        while !self.eof {
            match self.read_data().await? {
                PayloadItem::Eof => self.eof = true,
                PayloadItem::Chunk(bytes) => skipped += bytes.len(),
            }
        }

        if skipped > 0 {
            trace!(size = skipped, "skipped unread request body");
        }
        Ok(())
    }
}

/// Consumer side of a request body.
#[derive(Debug)]
pub(crate) struct BodyReceiver {
    signal_sender: mpsc::Sender<RequestData>,
    data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
    payload_size: PayloadSize,
    in_flight: bool,
    finished: bool,
}

impl BodyReceiver {
    pub(crate) fn new(
        signal_sender: mpsc::Sender<RequestData>,
        data_receiver: mpsc::Receiver<Result<PayloadItem, ParseError>>,
        payload_size: PayloadSize,
    ) -> Self {
        // an empty body never needs to ask the connection for data
        let finished = payload_size.is_empty();
        Self { signal_sender, data_receiver, payload_size, in_flight: false, finished }
    }
}

impl Body for BodyReceiver {
    type Data = Bytes;
    type Error = ParseError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        if !this.in_flight {
            match Pin::new(&mut this.signal_sender).poll_ready(cx) {
                Poll::Ready(Ok(())) => {
                    if let Err(e) = Pin::new(&mut this.signal_sender).start_send(RequestData) {
                        error!("failed to send request_more through channel, {}", e);
                        this.finished = true;
                        return Poll::Ready(Some(Err(ParseError::invalid_body("request body is no longer readable"))));
                    }
                    this.in_flight = true;
                }
                Poll::Ready(Err(_)) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(ParseError::invalid_body("request body is no longer readable"))));
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        match this.data_receiver.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(PayloadItem::Chunk(bytes)))) => {
                this.in_flight = false;
                Poll::Ready(Some(Ok(Frame::data(bytes))))
            }
            Poll::Ready(Some(Ok(PayloadItem::Eof))) => {
                this.in_flight = false;
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.in_flight = false;
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.in_flight = false;
                this.finished = true;
                Poll::Ready(Some(Err(ParseError::invalid_body("request body is no longer readable"))))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        self.payload_size.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::channel::mpsc;
    use futures::task::noop_waker_ref;
    use futures::{FutureExt, StreamExt};
    use std::pin::Pin;
    use std::task::{Context, Poll};

    #[tokio::test]
    async fn body_receiver_only_requests_once_until_response() {
        let (signal_sender, mut signal_receiver) = mpsc::channel(8);
        let (mut data_sender, data_receiver) = mpsc::channel(8);
        let mut body_receiver = BodyReceiver::new(signal_sender, data_receiver, PayloadSize::new_chunked());

        let waker = noop_waker_ref();
        let mut cx = Context::from_waker(waker);

        assert!(matches!(Pin::new(&mut body_receiver).poll_frame(&mut cx), Poll::Pending));
        assert!(matches!(signal_receiver.next().await, Some(RequestData)));

        assert!(matches!(Pin::new(&mut body_receiver).poll_frame(&mut cx), Poll::Pending));
        assert!(signal_receiver.next().now_or_never().is_none());

        data_sender.try_send(Ok(PayloadItem::Chunk(Bytes::from_static(b"hello")))).expect("send chunk");

        match Pin::new(&mut body_receiver).poll_frame(&mut cx) {
            Poll::Ready(Some(Ok(frame))) => {
                let data = frame.into_data().expect("expected data frame");
                assert_eq!(data, Bytes::from_static(b"hello"));
            }
            other => panic!("unexpected poll result: {:?}", other),
        }

        assert!(matches!(Pin::new(&mut body_receiver).poll_frame(&mut cx), Poll::Pending));
        assert!(matches!(signal_receiver.next().await, Some(RequestData)));

        data_sender.try_send(Ok(PayloadItem::Eof)).expect("send eof");

        assert!(matches!(Pin::new(&mut body_receiver).poll_frame(&mut cx), Poll::Ready(None)));
        // stays finished, no further signals
        assert!(matches!(Pin::new(&mut body_receiver).poll_frame(&mut cx), Poll::Ready(None)));
        assert!(signal_receiver.next().now_or_never().is_none());
    }

    #[test]
    fn empty_body_never_signals() {
        let (signal_sender, mut signal_receiver) = mpsc::channel(8);
        let (_data_sender, data_receiver) = mpsc::channel(8);
        let mut body_receiver = BodyReceiver::new(signal_sender, data_receiver, PayloadSize::new_empty());

        let mut cx = Context::from_waker(noop_waker_ref());
        assert!(matches!(Pin::new(&mut body_receiver).poll_frame(&mut cx), Poll::Ready(None)));
        assert!(signal_receiver.try_next().is_err());
    }
}
