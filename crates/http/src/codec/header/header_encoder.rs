//! Response head serialization.
//!
//! Writes the status line and the header block. Caller supplied headers come
//! first, in the order they were added; the framing header (`content-length`
//! or `transfer-encoding`) is then filled in from the payload size unless the
//! caller already set it.

use std::io;
use std::io::{ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Version};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{PayloadSize, ResponseHead, SendError};

/// Initial buffer size allocated for header serialization
const INIT_HEADER_SIZE: usize = 4 * 1024;

const CHUNKED: HeaderValue = HeaderValue::from_static("chunked");

/// Encoder for response heads implementing [`Encoder`].
#[derive(Debug)]
pub struct HeaderEncoder;

impl Encoder<(ResponseHead, PayloadSize)> for HeaderEncoder {
    type Error = SendError;

    /// # Errors
    ///
    /// Fails for any version other than HTTP/1.1.
    fn encode(&mut self, item: (ResponseHead, PayloadSize), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (mut header, payload_size) = item;

        dst.reserve(INIT_HEADER_SIZE);
        match header.version() {
            Version::HTTP_11 => {
                let status = header.status();
                write!(FastWrite(dst), "HTTP/1.1 {} {}\r\n", status.as_str(), status.canonical_reason().unwrap_or(""))?;
            }
            v => {
                error!(http_version = ?v, "unsupported http version");
                return Err(io::Error::from(ErrorKind::Unsupported).into());
            }
        }

        apply_framing(header.headers_mut(), payload_size);

        for (header_name, header_value) in header.headers().iter() {
            dst.put_slice(header_name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(header_value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

/// Sets the framing headers for the given payload size.
///
/// - no body: `content-length: 0`
/// - known length: `content-length: <n>`, replacing a caller supplied value
/// - unknown length: `transfer-encoding: chunked` unless the caller set it;
///   any `content-length` is dropped
pub(crate) fn apply_framing(headers: &mut HeaderMap, payload_size: PayloadSize) {
    match payload_size {
        PayloadSize::Length(n) => {
            headers.insert(CONTENT_LENGTH, n.into());
        }
        PayloadSize::Empty => {
            headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
        }
        PayloadSize::Chunked => {
            if headers.contains_key(CONTENT_LENGTH) {
                remove_in_order(headers, &CONTENT_LENGTH);
            }
            if !headers.contains_key(TRANSFER_ENCODING) {
                headers.insert(TRANSFER_ENCODING, CHUNKED);
            }
        }
    }
}

/// Writes into the `BytesMut` reserved up front.
struct FastWrite<'a>(&'a mut BytesMut);

impl Write for FastWrite<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.put_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Removes every value of `name` while keeping the other headers in their
/// original order; `HeaderMap::remove` swaps the last entry into the hole.
fn remove_in_order(headers: &mut HeaderMap, name: &HeaderName) {
    let mut kept = HeaderMap::with_capacity(headers.len());
    let mut current: Option<HeaderName> = None;
    for (next, value) in std::mem::take(headers) {
        if let Some(next) = next {
            current = Some(next);
        }
        if let Some(current) = current.as_ref().filter(|current| *current != name) {
            kept.append(current.clone(), value);
        }
    }
    *headers = kept;
}
