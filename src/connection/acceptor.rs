//! Accept Loop
//!
//! Repeatedly accepts connections and hands each one to its own
//! [`ConnectionReader`] task. Transient accept errors are logged and the
//! loop keeps going; only the shutdown signal ends it.
//!
//! ```text
//! Running --(shutdown while waiting)--> Stopping --> Stopped
//! Running --(accept error, shutdown set)-----------> Stopped
//! Running --(accept error, shutdown unset)--> Running
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use super::reader::{ConnectionReader, DEFAULT_MAX_RECORD_SIZE};
use super::tracker::ConnectionTracker;
use crate::error::AcceptError;
use crate::events::{ConnectionEvent, SharedObserver};
use crate::shutdown::ShutdownSignal;

/// Pause after a transient accept error unless configured otherwise
pub const DEFAULT_ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Outcome of one accept: the connection and its peer address
pub type Accepted<C> = io::Result<(C, SocketAddr)>;

/// Source of inbound connections
pub trait Accept: Send + 'static {
    type Conn: AsyncRead + Unpin + Send + 'static;

    /// Wait for and accept the next connection
    fn accept_connection(&mut self) -> impl Future<Output = Accepted<Self::Conn>> + Send + '_;
}

impl Accept for TcpListener {
    type Conn = TcpStream;

    fn accept_connection(&mut self) -> impl Future<Output = Accepted<TcpStream>> + Send + '_ {
        TcpListener::accept(self)
    }
}

/// Accept loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptState {
    Running,
    Stopping,
    Stopped,
}

/// The accept loop over a listener `L`
pub struct AcceptLoop<L> {
    listener: L,
    shutdown: Arc<ShutdownSignal>,
    observer: SharedObserver,
    tracker: ConnectionTracker,
    state: Arc<watch::Sender<AcceptState>>,
    max_record_size: usize,
    error_backoff: Duration,
}

impl<L: Accept> AcceptLoop<L> {
    pub fn new(listener: L, shutdown: Arc<ShutdownSignal>, observer: SharedObserver) -> Self {
        let (state, _) = watch::channel(AcceptState::Running);
        Self {
            listener,
            shutdown,
            observer,
            tracker: ConnectionTracker::new(),
            state: Arc::new(state),
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            error_backoff: DEFAULT_ACCEPT_ERROR_BACKOFF,
        }
    }

    /// Share connection counters with the owner of the loop
    pub fn with_tracker(mut self, tracker: ConnectionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Publish state transitions on an existing channel
    pub fn with_state(mut self, state: Arc<watch::Sender<AcceptState>>) -> Self {
        state.send_replace(AcceptState::Running);
        self.state = state;
        self
    }

    pub fn with_max_record_size(mut self, max_record_size: usize) -> Self {
        self.max_record_size = max_record_size;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Subscribe to state transitions
    pub fn state(&self) -> watch::Receiver<AcceptState> {
        self.state.subscribe()
    }

    /// Run until shutdown. The listener is dropped before this returns.
    pub async fn run(mut self) {
        info!("Starting connection acceptance loop");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.shutdown.wait() => None,
                result = self.listener.accept_connection() => Some(result),
            };

            match accepted {
                None => {
                    self.state.send_replace(AcceptState::Stopping);
                    debug!("Shutdown signalled while waiting for a connection");
                    break;
                }
                Some(Ok((stream, remote))) => self.spawn_reader(stream, remote),
                Some(Err(e)) => {
                    if self.shutdown.is_triggered() {
                        debug!("Accept failed during shutdown, stopping: {}", e);
                        break;
                    }

                    warn!("{}", AcceptError::from(e));
                    if !self.error_backoff.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(self.error_backoff) => {}
                            _ = self.shutdown.wait() => {}
                        }
                    }
                }
            }
        }

        let AcceptLoop { listener, state, .. } = self;
        drop(listener);
        state.send_replace(AcceptState::Stopped);
        info!("Connection acceptance loop stopped");
    }

    fn spawn_reader(&self, stream: L::Conn, remote: SocketAddr) {
        let guard = self.tracker.track(remote);
        let span = info_span!("connection", connection_id = %guard.id(), remote = %remote);

        self.observer.on_event(ConnectionEvent::Opened { remote });

        let reader = ConnectionReader::new(stream, remote, Arc::clone(&self.observer))
            .with_max_record_size(self.max_record_size);

        tokio::spawn(
            async move {
                let _guard = guard;
                let reason = reader.run().await;
                debug!("Reader finished: {}", reason);
            }
            .instrument(span),
        );
    }
}
