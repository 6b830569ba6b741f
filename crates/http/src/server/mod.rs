//! TCP listener loop and server configuration.
//!
//! - [`Listener`]: accepts connections and merges their requests into one stream
//! - [`ServerConfig`]: header limits, buffer sizes and request queue depth

mod config;
mod listener;

pub use config::{
    DEFAULT_READ_BUFFER_SIZE, DEFAULT_REQUEST_QUEUE_SIZE, DEFAULT_WRITE_BUFFER_SIZE, ServerConfig, ServerConfigBuilder,
};
pub use listener::{Listener, ListenerHandle};
