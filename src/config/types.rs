//! Configuration Types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::connection::{DEFAULT_ACCEPT_ERROR_BACKOFF, DEFAULT_MAX_RECORD_SIZE};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port`; an empty host binds every interface
    pub bind_addr: String,
    /// Largest accepted record in bytes, terminator excluded
    pub max_record_size: usize,
    /// Pause after a transient accept error
    #[serde(with = "humantime_serde")]
    pub accept_error_backoff: Duration,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub ansi: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ":3000".to_string(),
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            accept_error_backoff: DEFAULT_ACCEPT_ERROR_BACKOFF,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}
