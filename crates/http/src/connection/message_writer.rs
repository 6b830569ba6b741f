use bytes::{Buf, Bytes, BytesMut};
use http_body_util::BodyExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::codec::ResponseEncoder;
use crate::codec::header::{TrailerEncoder, apply_framing};
use crate::protocol::{Message, PayloadItem, PayloadSize, Response, ResponseHead, SendError};

const CONTINUE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

/// Buffers encoded response bytes in front of the connection's write half.
#[derive(Debug)]
pub struct MessageWriter<W> {
    writer: W,
    buffer: BytesMut,
    encoder: ResponseEncoder,
    flush_threshold: usize,
}

impl<W> MessageWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn with_capacity(writer: W, buffer_size: usize) -> Self {
        Self {
            writer,
            buffer: BytesMut::with_capacity(buffer_size),
            encoder: ResponseEncoder::new(),
            flush_threshold: buffer_size.max(1),
        }
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    #[inline]
    pub fn write<D>(&mut self, item: Message<(ResponseHead, PayloadSize), D>) -> Result<(), SendError>
    where
        D: Buf,
    {
        self.encoder.encode(item, &mut self.buffer)
    }

    #[inline]
    pub async fn flush(&mut self) -> Result<(), SendError> {
        if !self.buffer.is_empty() {
            self.writer.write_all(self.buffer.as_ref()).await?;
            self.buffer.clear();
        }
        Ok(self.writer.flush().await?)
    }

    /// Writes the interim `100 Continue` response.
    pub async fn write_continue(&mut self) -> Result<(), SendError> {
        self.writer.write_all(CONTINUE).await?;
        Ok(self.writer.flush().await?)
    }

    /// Writes a complete response and flushes it.
    ///
    /// The framing follows [`Response::payload_size`]. A response carrying a
    /// trailer producer is checked against its `trailer` declaration before
    /// anything is written. On failure the writer is reset and the connection
    /// must not be reused, since part of the response may already be out.
    pub async fn send_response(&mut self, response: Response) -> Result<(), SendError> {
        let result = self.do_send_response(response).await;
        if result.is_err() {
            self.buffer.clear();
            self.encoder = ResponseEncoder::new();
        }
        result
    }

    async fn do_send_response(&mut self, response: Response) -> Result<(), SendError> {
        let payload_size = response.payload_size();
        let (mut head, mut body, trailers) = response.into_parts();

        apply_framing(head.headers_mut(), payload_size);
        let mut trailer_encoder = match &trailers {
            Some(_) => Some(TrailerEncoder::new(head.headers())?),
            None => None,
        };

        trace!(status = head.status().as_u16(), ?payload_size, "write response head");
        self.write(Message::<_, Bytes>::Header((head, payload_size)))?;

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| SendError::invalid_body(format!("resolve response body error: {e}")))?;
            // non-data frames of a generic body are not forwarded
            let Ok(data) = frame.into_data() else {
                continue;
            };

            self.write(Message::<(ResponseHead, PayloadSize), _>::Payload(PayloadItem::Chunk(data)))?;
            if self.buffer.len() >= self.flush_threshold {
                self.flush().await?;
            }
        }

        match (trailers, trailer_encoder.as_mut()) {
            (Some(producer), Some(trailer_encoder)) => {
                let fields = producer().await;
                self.encoder.encode_trailers(trailer_encoder, fields, &mut self.buffer)?;
            }
            _ => self.write(Message::<(ResponseHead, PayloadSize), Bytes>::Payload(PayloadItem::Eof))?,
        }

        self.flush().await
    }

    pub async fn shutdown(&mut self) -> Result<(), SendError> {
        self.buffer.clear();
        Ok(self.writer.shutdown().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ResponseBody, TrailerError};
    use futures::stream;
    use http::header::{TRAILER, TRANSFER_ENCODING};
    use http::{HeaderMap, HeaderValue, StatusCode};
    use std::convert::Infallible;

    async fn written(response: Response) -> Result<String, SendError> {
        let mut writer = MessageWriter::with_capacity(Vec::new(), 64);
        writer.send_response(response).await?;
        Ok(String::from_utf8(writer.get_mut().clone()).unwrap())
    }

    fn chunks(parts: &'static [&'static str]) -> ResponseBody {
        ResponseBody::stream(stream::iter(parts.iter().map(|part| Ok::<_, Infallible>(Bytes::from_static(part.as_bytes())))))
    }

    #[tokio::test]
    async fn hello() {
        assert_eq!(written(Response::new("Hello")).await.unwrap(), "HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\nHello");
    }

    #[tokio::test]
    async fn empty_body() {
        let response = Response::with_status(StatusCode::NO_CONTENT);
        assert_eq!(written(response).await.unwrap(), "HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n");
    }

    #[tokio::test]
    async fn streamed_body_is_chunked() {
        let response = Response::new(chunks(&["Hello", "", " World"]));
        assert_eq!(
            written(response).await.unwrap(),
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn large_streamed_body_is_flushed_in_parts() {
        let part = "x".repeat(100);
        let body = ResponseBody::stream(stream::iter((0..10).map(move |_| Ok::<_, Infallible>(Bytes::from(part.clone())))));
        let text = written(Response::new(body)).await.unwrap();
        assert_eq!(text.matches("64\r\n").count(), 10);
        assert!(text.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn trailers_after_chunked_body() {
        let response = Response::new(chunks(&["foo"]))
            .header(TRAILER, HeaderValue::from_static("deno, node"))
            .trailers(|| async {
                let mut trailers = HeaderMap::new();
                trailers.insert("deno", HeaderValue::from_static("land"));
                trailers.insert("node", HeaderValue::from_static("js"));
                trailers
            });

        assert_eq!(
            written(response).await.unwrap(),
            "HTTP/1.1 200 OK\r\ntrailer: deno, node\r\ntransfer-encoding: chunked\r\n\r\n3\r\nfoo\r\n0\r\ndeno: land\r\nnode: js\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn forced_chunking_carries_trailers_for_buffer_bodies() {
        let response = Response::new("foo")
            .header(TRANSFER_ENCODING, HeaderValue::from_static("chunked"))
            .header(TRAILER, HeaderValue::from_static("deno"))
            .trailers(|| async {
                let mut trailers = HeaderMap::new();
                trailers.insert("deno", HeaderValue::from_static("land"));
                trailers
            });

        assert_eq!(
            written(response).await.unwrap(),
            "HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\ntrailer: deno\r\n\r\n3\r\nfoo\r\n0\r\ndeno: land\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn trailer_contract_violations_write_nothing() {
        let mut writer = MessageWriter::with_capacity(Vec::new(), 64);

        let response = Response::new(chunks(&["foo"])).trailers(|| async { HeaderMap::new() });
        let err = writer.send_response(response).await.unwrap_err();
        assert!(matches!(err, SendError::Trailer { source: TrailerError::MissingDeclaration }));

        let response = Response::new("foo").header(TRAILER, HeaderValue::from_static("deno")).trailers(|| async { HeaderMap::new() });
        let err = writer.send_response(response).await.unwrap_err();
        assert!(matches!(err, SendError::Trailer { source: TrailerError::NotChunked { .. } }));

        assert!(writer.get_mut().is_empty());
    }

    #[tokio::test]
    async fn body_error_fails_the_response() {
        let body = ResponseBody::stream(stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("disk gone")),
        ]));
        let err = written(Response::new(body)).await.unwrap_err();
        assert!(err.to_string().contains("disk gone"));
    }

    #[tokio::test]
    async fn continue_response() {
        let mut writer = MessageWriter::with_capacity(Vec::new(), 64);
        writer.write_continue().await.unwrap();
        assert_eq!(writer.get_mut().as_slice(), b"HTTP/1.1 100 Continue\r\n\r\n");
    }
}
