use std::io;
use std::io::ErrorKind;

use bytes::{Buf, BytesMut};
use http::HeaderMap;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::{HeaderEncoder, TrailerEncoder};
use crate::protocol::{Message, PayloadSize, ResponseHead, SendError, TrailerError};

/// Encodes a response head followed by its body items.
///
/// The payload encoder chosen for the head stays active until the body is
/// finished; a head arriving before that, or a payload item without a head, is
/// rejected.
#[derive(Debug)]
pub struct ResponseEncoder {
    header_encoder: HeaderEncoder,
    payload_encoder: Option<PayloadEncoder>,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Ends a chunked body with the zero-size chunk followed by `trailers`.
    ///
    /// The trailers are checked against the declaration first; on failure
    /// nothing is written.
    pub fn encode_trailers(
        &mut self,
        trailer_encoder: &mut TrailerEncoder,
        trailers: HeaderMap,
        dst: &mut BytesMut,
    ) -> Result<(), SendError> {
        let Some(payload_encoder) = &mut self.payload_encoder else {
            error!("expect an unfinished body before trailers");
            return Err(io::Error::from(ErrorKind::InvalidInput).into());
        };

        trailer_encoder.validate(&trailers)?;
        if !payload_encoder.encode_last_chunk(dst) {
            return Err(TrailerError::NotChunked { transfer_encoding: None }.into());
        }
        self.payload_encoder.take();

        trailer_encoder.encode(trailers, dst)
    }
}

impl Default for ResponseEncoder {
    fn default() -> Self {
        Self { header_encoder: HeaderEncoder, payload_encoder: None }
    }
}

impl<D: Buf> Encoder<Message<(ResponseHead, PayloadSize), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(ResponseHead, PayloadSize), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, payload_size)) => {
                if self.payload_encoder.is_some() {
                    error!("expect payload item but receive response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                self.header_encoder.encode((head, payload_size), dst)?;
                self.payload_encoder = Some(payload_size.into());
                Ok(())
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response header but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let is_eof = payload_item.is_eof();
                let result = payload_encoder.encode(payload_item, dst);

                if is_eof || result.is_err() {
                    self.payload_encoder.take();
                }

                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadItem;
    use bytes::Bytes;
    use http::HeaderValue;
    use http::header::{TRAILER, TRANSFER_ENCODING};

    type ResponseMessage = Message<(ResponseHead, PayloadSize), Bytes>;

    #[test]
    fn hello_response() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();

        encoder.encode(ResponseMessage::Header((ResponseHead::new(()), PayloadSize::Length(5))), &mut dst).unwrap();
        encoder.encode(ResponseMessage::Payload(PayloadItem::Chunk(Bytes::from_static(b"Hello"))), &mut dst).unwrap();
        encoder.encode(ResponseMessage::Payload(PayloadItem::Eof), &mut dst).unwrap();

        assert_eq!(&dst[..], b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nHello");
    }

    #[test]
    fn chunked_response_with_trailers() {
        let mut head = ResponseHead::new(());
        head.headers_mut().insert(TRAILER, HeaderValue::from_static("deno"));
        head.headers_mut().insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        let mut trailer_encoder = TrailerEncoder::new(head.headers()).unwrap();

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(ResponseMessage::Header((head, PayloadSize::Chunked)), &mut dst).unwrap();
        encoder.encode(ResponseMessage::Payload(PayloadItem::Chunk(Bytes::from_static(b"ok"))), &mut dst).unwrap();

        let mut trailers = HeaderMap::new();
        trailers.insert("deno", HeaderValue::from_static("land"));
        encoder.encode_trailers(&mut trailer_encoder, trailers, &mut dst).unwrap();

        assert_eq!(
            &dst[..],
            &b"HTTP/1.1 200 OK\r\ntrailer: deno\r\ntransfer-encoding: chunked\r\n\r\n2\r\nok\r\n0\r\ndeno: land\r\n\r\n"[..]
        );
    }

    #[test]
    fn invalid_trailers_write_nothing() {
        let mut head = ResponseHead::new(());
        head.headers_mut().insert(TRAILER, HeaderValue::from_static("deno"));
        head.headers_mut().insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        let mut trailer_encoder = TrailerEncoder::new(head.headers()).unwrap();

        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        encoder.encode(ResponseMessage::Header((head, PayloadSize::Chunked)), &mut dst).unwrap();
        let written = dst.len();

        let err = encoder.encode_trailers(&mut trailer_encoder, HeaderMap::new(), &mut dst).unwrap_err();
        assert!(matches!(err, SendError::Trailer { .. }));
        assert_eq!(dst.len(), written);
    }

    #[test]
    fn payload_before_head_is_rejected() {
        let mut encoder = ResponseEncoder::new();
        let mut dst = BytesMut::new();
        assert!(encoder.encode(ResponseMessage::Payload(PayloadItem::Eof), &mut dst).is_err());
    }
}
