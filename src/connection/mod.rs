//! Connection Handling Module
//!
//! Accepting connections, reading line records from them, and keeping
//! count of what is live.

pub mod acceptor;
pub mod reader;
pub mod tracker;

pub use acceptor::{Accept, AcceptLoop, AcceptState, Accepted, DEFAULT_ACCEPT_ERROR_BACKOFF};
pub use reader::{ConnectionReader, DEFAULT_MAX_RECORD_SIZE};
pub use tracker::{ConnectionGuard, ConnectionId, ConnectionStats, ConnectionTracker};
