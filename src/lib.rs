//! linesink
//!
//! A concurrent TCP listener that accepts connections indefinitely, reads
//! newline-delimited text from each one in its own task and reports what it
//! sees. Shutdown stops intake of new connections; readers already running
//! end when their peers disconnect.

pub mod address;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod server;
pub mod shutdown;

pub use config::Config;
pub use error::{AcceptError, BindError, ReadError};
pub use events::{
    ChannelObserver, CloseReason, ConnectionEvent, ConnectionObserver, TracingObserver,
};
pub use server::Server;
pub use shutdown::ShutdownSignal;

/// Common error type for configuration and application glue
pub type Result<T> = anyhow::Result<T>;
