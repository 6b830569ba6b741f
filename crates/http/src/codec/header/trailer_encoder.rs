//! Trailer section writer for chunked responses.
//!
//! The response head must announce the trailer field names in a `trailer`
//! header and use the chunked transfer coding. The fields produced after the
//! body must then be exactly the announced set.

use bytes::{BufMut, BytesMut};
use http::header::{CONTENT_LENGTH, TRAILER, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName};
use tokio_util::codec::Encoder;
use tracing::trace;

use crate::protocol::{SendError, TrailerError, is_chunked};

/// Field names that can never be sent as trailers.
const PROHIBITED: [HeaderName; 3] = [CONTENT_LENGTH, TRAILER, TRANSFER_ENCODING];

/// Validates and writes the trailer section closing a chunked body.
///
/// Built from the response headers before anything is written, so a response
/// that cannot carry trailers fails without touching the connection.
#[derive(Debug, Clone)]
pub struct TrailerEncoder {
    declared: Vec<HeaderName>,
}

impl TrailerEncoder {
    /// Reads the `trailer` declaration out of the response headers.
    ///
    /// # Errors
    ///
    /// - [`TrailerError::InvalidName`] when a declared name is not a valid field name
    /// - [`TrailerError::MissingDeclaration`] without a non-empty `trailer` header
    /// - [`TrailerError::NotChunked`] unless `transfer-encoding` ends with `chunked`
    /// - [`TrailerError::Prohibited`] when a declared name is `content-length`,
    ///   `trailer` or `transfer-encoding`
    pub fn new(headers: &HeaderMap) -> Result<Self, TrailerError> {
        let mut declared = Vec::new();
        for value in headers.get_all(TRAILER).iter() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            for name in value.split(',').map(str::trim).filter(|name| !name.is_empty()) {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| TrailerError::InvalidName { name: name.to_string() })?;
                if !declared.contains(&name) {
                    declared.push(name);
                }
            }
        }

        if declared.is_empty() {
            return Err(TrailerError::MissingDeclaration);
        }

        let transfer_encoding = headers.get(TRANSFER_ENCODING);
        if !is_chunked(transfer_encoding) {
            let transfer_encoding = transfer_encoding.map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());
            return Err(TrailerError::NotChunked { transfer_encoding });
        }

        if let Some(name) = declared.iter().find(|name| PROHIBITED.contains(name)) {
            return Err(TrailerError::Prohibited { name: name.as_str().to_string() });
        }

        Ok(Self { declared })
    }

    pub fn declared(&self) -> &[HeaderName] {
        &self.declared
    }

    /// Checks that `trailers` carries exactly the declared field names.
    pub fn validate(&self, trailers: &HeaderMap) -> Result<(), TrailerError> {
        if let Some(name) = trailers.keys().find(|name| !self.declared.contains(name)) {
            return Err(TrailerError::Undeclared { name: name.as_str().to_string() });
        }
        if let Some(name) = self.declared.iter().find(|name| !trailers.contains_key(*name)) {
            return Err(TrailerError::Missing { name: name.as_str().to_string() });
        }
        Ok(())
    }
}

impl Encoder<HeaderMap> for TrailerEncoder {
    type Error = SendError;

    /// Writes every trailer field as `name: value\r\n`, then the blank line that
    /// ends the chunked body. Nothing is written when validation fails.
    fn encode(&mut self, trailers: HeaderMap, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.validate(&trailers)?;

        trace!(count = trailers.len(), "write trailer fields");
        for (name, value) in trailers.iter() {
            dst.put_slice(name.as_ref());
            dst.put_slice(b": ");
            dst.put_slice(value.as_ref());
            dst.put_slice(b"\r\n");
        }
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn writes_declared_trailers() {
        let response_headers = headers(&[("transfer-encoding", "chunked"), ("trailer", "deno, node")]);
        let mut encoder = TrailerEncoder::new(&response_headers).unwrap();

        let mut dst = BytesMut::new();
        encoder.encode(headers(&[("deno", "land"), ("node", "js")]), &mut dst).unwrap();
        assert_eq!(&dst[..], b"deno: land\r\nnode: js\r\n\r\n");
    }

    #[test]
    fn requires_trailer_declaration() {
        let err = TrailerEncoder::new(&headers(&[("transfer-encoding", "chunked")])).unwrap_err();
        assert_eq!(err, TrailerError::MissingDeclaration);
        assert_eq!(err.to_string(), r#"response headers must have "trailer" header field"#);
    }

    #[test]
    fn requires_chunked_transfer_encoding() {
        let err = TrailerEncoder::new(&headers(&[("trailer", "deno")])).unwrap_err();
        assert_eq!(err, TrailerError::NotChunked { transfer_encoding: None });

        let err = TrailerEncoder::new(&headers(&[("transfer-encoding", "gzip"), ("trailer", "deno")])).unwrap_err();
        assert!(err.to_string().starts_with(r#"trailer is only allowed with "transfer-encoding: chunked""#));
    }

    #[test]
    fn prohibited_names() {
        for name in ["content-length", "trailer", "transfer-encoding", "Content-Length"] {
            let mut response_headers = headers(&[("transfer-encoding", "chunked")]);
            response_headers.insert(TRAILER, HeaderValue::from_str(&format!("deno, {name}")).unwrap());

            let err = TrailerEncoder::new(&response_headers).unwrap_err();
            assert_eq!(err.to_string(), format!("\"{}\" is prohibited for trailer header", name.to_lowercase()));
        }
    }

    #[test]
    fn invalid_declared_name() {
        let response_headers = headers(&[("transfer-encoding", "chunked"), ("trailer", "deno, bad name")]);

        let err = TrailerEncoder::new(&response_headers).unwrap_err();
        assert_eq!(err, TrailerError::InvalidName { name: "bad name".to_string() });
        assert_eq!(err.to_string(), r#"invalid trailer header field name: "bad name""#);
    }

    #[test]
    fn supplied_keys_must_match_declaration() {
        let response_headers = headers(&[("transfer-encoding", "chunked"), ("trailer", "deno")]);
        let mut encoder = TrailerEncoder::new(&response_headers).unwrap();
        let mut dst = BytesMut::new();

        let err = encoder.encode(headers(&[("deno", "land"), ("node", "js")]), &mut dst).unwrap_err();
        assert!(matches!(err, SendError::Trailer { source: TrailerError::Undeclared { ref name } } if name == "node"));
        assert!(err.to_string().contains("Not trailer header field: node"));

        let err = encoder.encode(HeaderMap::new(), &mut dst).unwrap_err();
        assert!(matches!(err, SendError::Trailer { source: TrailerError::Missing { ref name } } if name == "deno"));
        assert!(dst.is_empty());
    }
}
