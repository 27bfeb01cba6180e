//! Connection Events
//!
//! The core never formats or routes what it sees on the wire; it hands
//! events to a [`ConnectionObserver`]. [`TracingObserver`] turns them into
//! log lines, [`ChannelObserver`] forwards them to an mpsc channel.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Why a connection reader stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the connection cleanly
    Eof,
    /// A read failed; carries the rendered cause
    ReadError(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Eof => write!(f, "closed by peer"),
            CloseReason::ReadError(cause) => write!(f, "read error: {}", cause),
        }
    }
}

/// Something observable that happened on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened {
        remote: SocketAddr,
    },
    Record {
        remote: SocketAddr,
        record: String,
    },
    Closed {
        remote: SocketAddr,
        reason: CloseReason,
    },
}

impl ConnectionEvent {
    /// Remote address the event belongs to
    pub fn remote(&self) -> SocketAddr {
        match self {
            ConnectionEvent::Opened { remote }
            | ConnectionEvent::Record { remote, .. }
            | ConnectionEvent::Closed { remote, .. } => *remote,
        }
    }
}

/// Receiver of connection events.
///
/// Called from every connection task concurrently, so implementations must
/// not block.
pub trait ConnectionObserver: Send + Sync + 'static {
    fn on_event(&self, event: ConnectionEvent);
}

/// Shared observer handle
pub type SharedObserver = Arc<dyn ConnectionObserver>;

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ConnectionObserver for TracingObserver {
    fn on_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { remote } => {
                info!("New connection: {}", remote);
            }
            ConnectionEvent::Record { remote, record } => {
                info!("Received from {}: {}", remote, record);
            }
            ConnectionEvent::Closed { remote, reason: CloseReason::Eof } => {
                info!("Connection closed: {}", remote);
            }
            ConnectionEvent::Closed { remote, reason: CloseReason::ReadError(cause) } => {
                warn!("Read error from {}: {}", remote, cause);
                info!("Connection closed: {}", remote);
            }
        }
    }
}

/// Forwards events into an unbounded channel.
///
/// Events are dropped silently once the receiving side is gone.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ChannelObserver {
    /// Create an observer together with the receiver it feeds
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ConnectionObserver for ChannelObserver {
    fn on_event(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:4000".parse().unwrap()
    }

    #[test]
    fn test_event_remote() {
        let closed = ConnectionEvent::Closed { remote: addr(), reason: CloseReason::Eof };
        assert_eq!(closed.remote(), addr());

        let record = ConnectionEvent::Record { remote: addr(), record: "x".to_string() };
        assert_eq!(record.remote(), addr());
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::Eof.to_string(), "closed by peer");
        assert_eq!(
            CloseReason::ReadError("connection reset".to_string()).to_string(),
            "read error: connection reset"
        );
    }

    #[tokio::test]
    async fn test_channel_observer_forwards_in_order() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.on_event(ConnectionEvent::Opened { remote: addr() });
        observer.on_event(ConnectionEvent::Record { remote: addr(), record: "hi".to_string() });

        assert_eq!(rx.recv().await, Some(ConnectionEvent::Opened { remote: addr() }));
        assert_eq!(
            rx.recv().await,
            Some(ConnectionEvent::Record { remote: addr(), record: "hi".to_string() })
        );
    }

    #[test]
    fn test_channel_observer_ignores_closed_receiver() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_event(ConnectionEvent::Opened { remote: addr() });
    }
}
