//! HTTP request head.
//!
//! [`RequestHeader`] is the validated result of reading one request line plus its
//! header block. It keeps the headers in arrival order with case-insensitive
//! names; repeated fields stay repeated except for `content-length`, which the
//! decoder collapses to a single value.

use http::header::{CONNECTION, CONTENT_LENGTH, EXPECT, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderValue, Method, Uri};

use crate::protocol::HttpVersion;

#[derive(Debug, Clone)]
pub struct RequestHeader {
    method: Method,
    uri: Uri,
    version: HttpVersion,
    headers: HeaderMap,
}

impl RequestHeader {
    pub fn new(method: Method, uri: Uri, version: HttpVersion, headers: HeaderMap) -> Self {
        Self { method, uri, version, headers }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target exactly as it appeared on the request line
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Whether the body uses chunked transfer coding.
    ///
    /// Chunked applies only when `chunked` is the final transfer coding.
    pub fn is_chunked(&self) -> bool {
        is_chunked(self.headers.get(TRANSFER_ENCODING))
    }

    /// The declared body length.
    ///
    /// `None` when the body is chunked or no valid `content-length` is present.
    pub fn content_length(&self) -> Option<u64> {
        if self.is_chunked() {
            return None;
        }
        self.headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
    }

    /// Whether the client waits for an interim `100 Continue` before sending the body.
    pub fn expects_continue(&self) -> bool {
        self.headers
            .get(EXPECT)
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"))
    }

    /// Whether the connection may carry another request after this one.
    ///
    /// HTTP/1.1 and later keep the connection unless `connection: close` is sent,
    /// HTTP/1.0 closes it unless `connection: keep-alive` is sent.
    pub fn keep_alive(&self) -> bool {
        if self.version.is_persistent_by_default() {
            !has_connection_option(&self.headers, "close")
        } else {
            has_connection_option(&self.headers, "keep-alive")
        }
    }

    /// Converts into a bodiless `http::Request`, `None` when the version has no
    /// `http::Version` counterpart.
    pub fn into_http(self) -> Option<http::Request<()>> {
        let version = self.version.to_http()?;
        let mut request = http::Request::new(());
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.version_mut() = version;
        *request.headers_mut() = self.headers;
        Some(request)
    }
}

/// Checks whether `chunked` is the last coding of a `transfer-encoding` value.
pub(crate) fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    header_value
        .and_then(|value| value.as_bytes().rsplit(|b| *b == b',').next())
        .is_some_and(|last| last.trim_ascii().eq_ignore_ascii_case(CHUNKED))
}

fn has_connection_option(headers: &HeaderMap, option: &str) -> bool {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case(option))
}
