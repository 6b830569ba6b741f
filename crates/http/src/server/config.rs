use crate::codec::header::{DEFAULT_MAX_HEADER_BYTES, DEFAULT_MAX_HEADERS};

/// Default capacity of the per-connection read buffer
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Default capacity of the per-connection write buffer; a streamed body is
/// flushed whenever this much is buffered
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 8 * 1024;

/// Default number of parsed requests that may wait for the listener's consumer
pub const DEFAULT_REQUEST_QUEUE_SIZE: usize = 32;

/// Limits and buffer sizes shared by every connection of a listener.
///
/// ```
/// use micro_h1::server::ServerConfig;
///
/// let config = ServerConfig::builder().max_headers(32).read_buffer_size(16 * 1024).build();
/// assert_eq!(config.max_headers(), 32);
/// assert_eq!(config.max_header_bytes(), 8 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    max_header_bytes: usize,
    max_headers: usize,
    read_buffer_size: usize,
    write_buffer_size: usize,
    request_queue_size: usize,
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Upper bound for the request line plus header block, in bytes
    pub fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    /// Upper bound for the number of header fields of one request
    pub fn max_headers(&self) -> usize {
        self.max_headers
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn write_buffer_size(&self) -> usize {
        self.write_buffer_size
    }

    pub fn request_queue_size(&self) -> usize {
        self.request_queue_size
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_headers: DEFAULT_MAX_HEADERS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            request_queue_size: DEFAULT_REQUEST_QUEUE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    fn new() -> Self {
        Self { config: ServerConfig::default() }
    }

    #[must_use]
    pub fn max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.config.max_header_bytes = max_header_bytes;
        self
    }

    #[must_use]
    pub fn max_headers(mut self, max_headers: usize) -> Self {
        self.config.max_headers = max_headers;
        self
    }

    #[must_use]
    pub fn read_buffer_size(mut self, read_buffer_size: usize) -> Self {
        self.config.read_buffer_size = read_buffer_size;
        self
    }

    #[must_use]
    pub fn write_buffer_size(mut self, write_buffer_size: usize) -> Self {
        self.config.write_buffer_size = write_buffer_size;
        self
    }

    /// Zero is raised to one, a channel needs room for at least one request.
    #[must_use]
    pub fn request_queue_size(mut self, request_queue_size: usize) -> Self {
        self.config.request_queue_size = request_queue_size.max(1);
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.max_header_bytes(), 8 * 1024);
        assert_eq!(config.max_headers(), 64);
        assert_eq!(config.read_buffer_size(), 8 * 1024);
        assert_eq!(config.write_buffer_size(), 8 * 1024);
        assert_eq!(config.request_queue_size(), 32);
        assert_eq!(ServerConfig::builder().build(), config);
    }

    #[test]
    fn queue_size_is_at_least_one() {
        assert_eq!(ServerConfig::builder().request_queue_size(0).build().request_queue_size(), 1);
    }
}
