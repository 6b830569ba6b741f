//! HTTP request head decoder.
//!
//! Reads one request line and the header block that follows it, up to and
//! including the terminating blank line, and turns them into a validated
//! [`RequestHeader`] plus the [`PayloadSize`] that frames the body.
//!
//! # Stages
//!
//! 1. Split off the request line and parse `<method> SP <target> SP <version>`
//! 2. Tokenize the header block with `httparse::parse_headers`, recording the
//!    byte ranges of every name and value
//! 3. Freeze the head bytes and build the `HeaderMap` from those ranges
//! 4. Validate the framing headers and choose the payload framing
//!
//! # Limits
//!
//! The head (request line and headers) may not exceed `max_header_bytes`, and
//! the block may not contain more than `max_headers` fields. Both default to the
//! values in [`crate::server::ServerConfig`].

use bytes::{Buf, Bytes, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use httparse::Status;
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::ensure;
use crate::protocol::{HttpVersion, ParseError, PayloadSize, RequestHeader, is_chunked};

/// Default maximum number of header fields in a request
pub const DEFAULT_MAX_HEADERS: usize = 64;

/// Default maximum size in bytes of the request line plus header block
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;

/// Decoder for request heads implementing [`Decoder`].
///
/// Returns `Ok(None)` while the head is incomplete. An empty buffer is never an
/// error: whether the peer closing at that point is a clean end is decided by
/// the caller.
#[derive(Debug, Clone)]
pub struct HeaderDecoder {
    max_header_bytes: usize,
    max_headers: usize,
}

impl HeaderDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_header_bytes: usize, max_headers: usize) -> Self {
        Self { max_header_bytes, max_headers }
    }
}

impl Default for HeaderDecoder {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_HEADERS)
    }
}

impl Decoder for HeaderDecoder {
    type Item = (RequestHeader, PayloadSize);
    type Error = ParseError;

    /// # Errors
    ///
    /// - [`ParseError::MalformedRequestLine`], [`ParseError::InvalidMethod`],
    ///   [`ParseError::InvalidUri`], [`ParseError::InvalidVersion`] for a bad request line
    /// - [`ParseError::MalformedHeaderLine`] naming the first bad header line
    /// - [`ParseError::TooLargeHeader`] / [`ParseError::TooManyHeaders`] past the limits
    /// - the framing validation errors, see [`validate_framing`]
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        skip_leading_newlines(src);
        if src.is_empty() {
            return Ok(None);
        }

        let Some(line_end) = src.iter().position(|b| *b == b'\n') else {
            ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
            return Ok(None);
        };
        ensure!(line_end < self.max_header_bytes, ParseError::too_large_header(line_end, self.max_header_bytes));

        let (method, uri, version) = parse_request_line(&src[..line_end])?;

        let block_start = line_end + 1;
        let mut raw_headers = vec![httparse::EMPTY_HEADER; self.max_headers];
        let mut header_index = Vec::new();

        let head_size = match httparse::parse_headers(&src[block_start..], &mut raw_headers) {
            Ok(Status::Complete((consumed, parsed))) => {
                header_index.reserve(parsed.len());
                HeaderIndex::record(&src[..], parsed, &mut header_index);
                block_start + consumed
            }
            Ok(Status::Partial) => {
                ensure!(src.len() <= self.max_header_bytes, ParseError::too_large_header(src.len(), self.max_header_bytes));
                return Ok(None);
            }
            Err(httparse::Error::TooManyHeaders) => return Err(ParseError::too_many_headers(self.max_headers)),
            Err(e) => return Err(malformed_header(&src[block_start..], e)),
        };

        trace!(head_size, header_count = header_index.len(), "parsed request head");
        ensure!(head_size <= self.max_header_bytes, ParseError::too_large_header(head_size, self.max_header_bytes));

        let head_bytes = src.split_to(head_size).freeze();
        let mut headers = HeaderMap::with_capacity(header_index.len());
        for index in &header_index {
            let (name, value) = index.resolve(&head_bytes)?;
            headers.append(name, value);
        }

        let payload_size = validate_framing(&method, &mut headers)?;
        let header = RequestHeader::new(method, uri, version, headers);

        Ok(Some((header, payload_size)))
    }
}

/// Byte ranges of one header name and value inside the head buffer.
#[derive(Clone, Copy)]
struct HeaderIndex {
    name: (usize, usize),
    value: (usize, usize),
}

impl HeaderIndex {
    /// Records the positions of the parsed names and values relative to `bytes`,
    /// which must be the buffer the headers were parsed from.
    fn record(bytes: &[u8], headers: &[httparse::Header<'_>], indices: &mut Vec<HeaderIndex>) {
        let bytes_ptr = bytes.as_ptr() as usize;
        for header in headers {
            let name_start = header.name.as_ptr() as usize - bytes_ptr;
            let value_start = header.value.as_ptr() as usize - bytes_ptr;
            indices.push(HeaderIndex {
                name: (name_start, name_start + header.name.len()),
                value: (value_start, value_start + header.value.len()),
            });
        }
    }

    fn resolve(&self, head_bytes: &Bytes) -> Result<(HeaderName, HeaderValue), ParseError> {
        let name_bytes = &head_bytes[self.name.0..self.name.1];
        let line = || String::from_utf8_lossy(&head_bytes[self.name.0..self.value.1]).into_owned();

        let name = HeaderName::from_bytes(name_bytes).map_err(|_| ParseError::malformed_header_line(line()))?;
        let value = HeaderValue::from_maybe_shared(head_bytes.slice(self.value.0..self.value.1))
            .map_err(|_| ParseError::malformed_header_line(line()))?;
        Ok((name, value))
    }
}

fn skip_leading_newlines(src: &mut BytesMut) {
    loop {
        if src.starts_with(b"\r\n") {
            src.advance(2);
        } else if src.starts_with(b"\n") {
            src.advance(1);
        } else {
            return;
        }
    }
}

/// Parses `<method> SP <request-target> SP <version>`, with or without the
/// trailing CR.
fn parse_request_line(line: &[u8]) -> Result<(Method, Uri, HttpVersion), ParseError> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = std::str::from_utf8(line).map_err(|_| ParseError::malformed_request_line(String::from_utf8_lossy(line)))?;

    let (method, rest) = text.split_once(' ').ok_or_else(|| ParseError::malformed_request_line(text))?;
    let (target, version) = rest.split_once(' ').ok_or_else(|| ParseError::malformed_request_line(text))?;

    let method = Method::from_bytes(method.as_bytes()).map_err(|_| ParseError::InvalidMethod)?;
    let uri = Uri::from_maybe_shared(Bytes::copy_from_slice(target.as_bytes())).map_err(|_| ParseError::InvalidUri)?;
    let version = HttpVersion::parse(version)?;

    Ok((method, uri, version))
}

/// Builds the error for a header block `httparse` rejected, naming the first
/// line that is not a well-formed `name: value` field.
fn malformed_header(block: &[u8], cause: httparse::Error) -> ParseError {
    block
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .take_while(|line| !line.is_empty())
        .find(|line| !is_valid_field_line(line))
        .map_or_else(
            || ParseError::invalid_header(cause),
            |line| ParseError::malformed_header_line(String::from_utf8_lossy(line)),
        )
}

fn is_valid_field_line(line: &[u8]) -> bool {
    let Some(colon) = line.iter().position(|b| *b == b':') else {
        return false;
    };
    let (name, value) = (&line[..colon], &line[colon + 1..]);
    !name.is_empty() && name.iter().all(|b| is_token_byte(*b)) && value.iter().all(|b| is_field_value_byte(*b))
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn is_field_value_byte(b: u8) -> bool {
    b == b'\t' || b == b' ' || b.is_ascii_graphic() || b >= 0x80
}

/// Validates the framing headers and decides how the body is framed.
///
/// Checks run in this order:
///
/// 1. every `content-length` occurrence (fields and comma separated list items)
///    must carry the same value; repeats are collapsed into a single field
/// 2. a `HEAD` request must not carry `content-length`
/// 3. `transfer-encoding` and `content-length` must not appear together
///
/// The body is chunked when `chunked` is the final transfer coding, bounded when
/// a content length is declared, and empty otherwise.
pub(crate) fn validate_framing(method: &Method, headers: &mut HeaderMap) -> Result<PayloadSize, ParseError> {
    let content_length = collapse_content_length(headers)?;

    ensure!(!(method == Method::HEAD && content_length.is_some()), ParseError::UnexpectedContentLength);

    let transfer_encoding = headers.get(TRANSFER_ENCODING);
    ensure!(!(transfer_encoding.is_some() && content_length.is_some()), ParseError::ConflictingFraming);

    if transfer_encoding.is_some() {
        return Ok(if is_chunked(transfer_encoding) { PayloadSize::new_chunked() } else { PayloadSize::new_empty() });
    }

    match content_length {
        Some(value) => {
            let text = value.to_str().map_err(|_| ParseError::invalid_content_length("value is not visible ascii"))?;
            ensure!(
                !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()),
                ParseError::invalid_content_length(format!("value {text:?} is not a decimal length"))
            );
            let length = text.parse::<u64>().map_err(|_| ParseError::invalid_content_length(format!("value {text} is not u64")))?;
            Ok(PayloadSize::new_length(length))
        }
        None => Ok(PayloadSize::new_empty()),
    }
}

/// Returns the single effective `content-length` value, leaving exactly one
/// field in `headers` when any was present.
fn collapse_content_length(headers: &mut HeaderMap) -> Result<Option<HeaderValue>, ParseError> {
    let mut effective: Option<&[u8]> = None;
    let mut occurrences = 0usize;

    for value in headers.get_all(CONTENT_LENGTH).iter() {
        for item in value.as_bytes().split(|b| *b == b',') {
            let item = item.trim_ascii();
            occurrences += 1;
            match effective {
                None => effective = Some(item),
                Some(seen) if seen == item => {}
                Some(_) => return Err(ParseError::MultipleContentLength),
            }
        }
    }

    let Some(effective) = effective else {
        return Ok(None);
    };
    let value = HeaderValue::from_bytes(effective).map_err(|_| ParseError::invalid_content_length("value is not a valid header value"))?;

    if occurrences > 1 {
        // HeaderMap::insert drops every previous value of the name
        headers.insert(CONTENT_LENGTH, value.clone());
    }
    Ok(Some(value))
}
