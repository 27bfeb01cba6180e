//! Error Types
//!
//! Typed errors for the listener core. Configuration and the binary entry
//! point use `anyhow` on top of these.

use std::io;
use thiserror::Error;

/// Failure to bring the listening socket up. Fatal to `Server::start`.
#[derive(Error, Debug)]
pub enum BindError {
    #[error("invalid bind address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    #[error("failed to bind {addr}: {source}")]
    Io {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server has already been started")]
    AlreadyStarted,
}

impl BindError {
    /// Underlying I/O error kind, if the failure came from the OS.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            BindError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// A transient failure to accept a connection. Logged, never fatal.
#[derive(Error, Debug)]
#[error("accept failed: {0}")]
pub struct AcceptError(#[from] pub io::Error);

/// A failure that ends a single connection reader.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("read failed: {0}")]
    Io(#[from] io::Error),

    #[error("record exceeds maximum size of {limit} bytes")]
    RecordTooLong { limit: usize },
}
