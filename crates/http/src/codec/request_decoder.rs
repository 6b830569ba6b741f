//! Streaming request decoder.
//!
//! Yields a [`Message::Header`] for each request head followed by the
//! [`Message::Payload`] items of its body, the last one being
//! [`PayloadItem::Eof`]. Requests on a keep-alive connection follow each other
//! in the same buffer.
//!
//! ```
//! use bytes::BytesMut;
//! use micro_h1::codec::RequestDecoder;
//! use micro_h1::protocol::Message;
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = RequestDecoder::new();
//! let mut buffer = BytesMut::from("GET / HTTP/1.1\r\nheader: foo\r\n\r\n");
//! let Some(Message::Header((head, _))) = decoder.decode(&mut buffer).unwrap() else { panic!("expected a head") };
//! assert_eq!(head.headers()["header"], "foo");
//! ```

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeaderDecoder;
use crate::protocol::{Message, ParseError, PayloadItem, PayloadSize, RequestHeader};

/// Decodes request heads and bodies.
///
/// The decoder is in one of two phases, tracked by `payload_decoder`:
/// - `None`: waiting for the next request head
/// - `Some(PayloadDecoder)`: inside the body of the last decoded head
pub struct RequestDecoder {
    header_decoder: HeaderDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// A decoder rejecting heads larger than `max_header_bytes` or with more
    /// than `max_headers` fields.
    pub fn with_limits(max_header_bytes: usize, max_headers: usize) -> Self {
        Self { header_decoder: HeaderDecoder::with_limits(max_header_bytes, max_headers), payload_decoder: None }
    }

    /// Whether the decoder is inside a request body.
    pub fn in_payload(&self) -> bool {
        self.payload_decoder.is_some()
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self { header_decoder: HeaderDecoder::default(), payload_decoder: None }
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHeader, PayloadSize)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let message = match payload_decoder.decode(src)? {
                Some(item @ PayloadItem::Chunk(_)) => Some(Message::Payload(item)),
                Some(item @ PayloadItem::Eof) => {
                    self.payload_decoder.take();
                    Some(Message::Payload(item))
                }
                None => None,
            };

            return Ok(message);
        }

        let message = match self.header_decoder.decode(src)? {
            Some((header, payload_size)) => {
                self.payload_decoder = Some(payload_size.into());
                Some(Message::Header((header, payload_size)))
            }
            None => None,
        };

        Ok(message)
    }

    /// Called once the peer closed its side.
    ///
    /// Closing between requests is a clean end of stream. Closing inside a head
    /// or a body is [`ParseError::UnexpectedEof`].
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None if self.payload_decoder.is_some() => {
                Err(ParseError::unexpected_eof("connection closed before the request body completed"))
            }
            None if buf.is_empty() => Ok(None),
            None => Err(ParseError::unexpected_eof("connection closed before the request head completed")),
        }
    }
}
