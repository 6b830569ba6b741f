use std::io;
use std::io::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request error: {source}")]
    RequestError {
        #[from]
        source: ParseError,
    },

    #[error("response error: {source}")]
    ResponseError {
        #[from]
        source: SendError,
    },
}

/// Errors raised while reading a request head or its body.
///
/// The `Display` output of the header validation variants is matched on by
/// consumers and must stay byte-for-byte stable.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("malformed HTTP request {line:?}")]
    MalformedRequestLine { line: String },

    #[error("malformed MIME header line: {line}")]
    MalformedHeaderLine { line: String },

    #[error("cannot contain multiple Content-Length headers")]
    MultipleContentLength,

    #[error("http: method cannot contain a Content-Length")]
    UnexpectedContentLength,

    #[error("http: Transfer-Encoding and Content-Length cannot be send together")]
    ConflictingFraming,

    #[error("header size too large, current: {current_size} exceed the limit {max_size}")]
    TooLargeHeader { current_size: usize, max_size: usize },

    #[error("header number exceed the limit {max_num}")]
    TooManyHeaders { max_num: usize },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("malformed HTTP version {version:?}")]
    InvalidVersion { version: String },

    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid http uri")]
    InvalidUri,

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: String },

    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("unexpected end of input: {reason}")]
    UnexpectedEof { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn malformed_request_line<S: ToString>(line: S) -> Self {
        Self::MalformedRequestLine { line: line.to_string() }
    }

    pub fn malformed_header_line<S: ToString>(line: S) -> Self {
        Self::MalformedHeaderLine { line: line.to_string() }
    }

    pub fn too_large_header(current_size: usize, max_size: usize) -> Self {
        Self::TooLargeHeader { current_size, max_size }
    }

    pub fn too_many_headers(max_num: usize) -> Self {
        Self::TooManyHeaders { max_num }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }

    pub fn invalid_version<S: ToString>(version: S) -> Self {
        Self::InvalidVersion { version: version.to_string() }
    }

    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn invalid_content_length<S: ToString>(str: S) -> Self {
        Self::InvalidContentLength { reason: str.to_string() }
    }

    pub fn unexpected_eof<S: ToString>(str: S) -> Self {
        Self::UnexpectedEof { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// True for truncated bodies and unreadable chunk framing.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof { .. })
    }
}

impl From<ParseError> for io::Error {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Io { source } => source,
            e @ ParseError::UnexpectedEof { .. } => io::Error::new(ErrorKind::UnexpectedEof, e),
            e => io::Error::new(ErrorKind::InvalidData, e),
        }
    }
}

/// Errors raised while writing a response.
#[derive(Error, Debug)]
pub enum SendError {
    #[error("invalid body: {reason}")]
    InvalidBody { reason: String },

    #[error("invalid trailer: {source}")]
    Trailer {
        #[from]
        source: TrailerError,
    },

    #[error("connection already closed")]
    ConnectionClosed,

    #[error("response already sent")]
    AlreadyResponded,

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl SendError {
    pub fn invalid_body<S: ToString>(str: S) -> Self {
        Self::InvalidBody { reason: str.to_string() }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }
}

/// Violations of the response trailer contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrailerError {
    #[error("response headers must have \"trailer\" header field")]
    MissingDeclaration,

    #[error("trailer is only allowed with \"transfer-encoding: chunked\", got {transfer_encoding:?}")]
    NotChunked { transfer_encoding: Option<String> },

    #[error("\"{name}\" is prohibited for trailer header")]
    Prohibited { name: String },

    #[error("invalid trailer header field name: {name:?}")]
    InvalidName { name: String },

    #[error("Not trailer header field: {name}")]
    Undeclared { name: String },

    #[error("declared trailer header field is missing: {name}")]
    Missing { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages_are_verbatim() {
        assert_eq!(ParseError::malformed_header_line("foo").to_string(), "malformed MIME header line: foo");
        assert_eq!(ParseError::UnexpectedContentLength.to_string(), "http: method cannot contain a Content-Length");
        assert_eq!(ParseError::MultipleContentLength.to_string(), "cannot contain multiple Content-Length headers");
        assert_eq!(
            ParseError::ConflictingFraming.to_string(),
            "http: Transfer-Encoding and Content-Length cannot be send together"
        );
    }

    #[test]
    fn unexpected_eof_maps_to_io_kind() {
        let e: io::Error = ParseError::unexpected_eof("chunk cut short").into();
        assert_eq!(e.kind(), ErrorKind::UnexpectedEof);

        let e: io::Error = ParseError::InvalidUri.into();
        assert_eq!(e.kind(), ErrorKind::InvalidData);
    }
}
