//! Server Lifecycle
//!
//! Binds the listening socket, runs the accept loop as its own task and
//! parks the caller of [`Server::start`] until [`Server::stop`] is called.
//! The listener is owned by the accept loop task and is closed before
//! `start` returns. Connection readers that are still running are left
//! alone; they finish when their peers hang up.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::address::normalize_bind_addr;
use crate::config::ServerConfig;
use crate::connection::{AcceptLoop, AcceptState, ConnectionStats, ConnectionTracker};
use crate::error::BindError;
use crate::events::{SharedObserver, TracingObserver};
use crate::shutdown::ShutdownSignal;

/// A line listener bound to one address
pub struct Server {
    config: ServerConfig,
    shutdown: Arc<ShutdownSignal>,
    observer: SharedObserver,
    tracker: ConnectionTracker,
    started: AtomicBool,
    local_addr: watch::Sender<Option<SocketAddr>>,
    accept_state: Arc<watch::Sender<AcceptState>>,
}

impl Server {
    /// Create a server that logs connection events through `tracing`
    pub fn new(config: ServerConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    /// Create a server with default settings listening on `bind_addr`
    pub fn bind_to(bind_addr: impl Into<String>) -> Self {
        Self::new(ServerConfig {
            bind_addr: bind_addr.into(),
            ..ServerConfig::default()
        })
    }

    /// Create a server that reports connection events to `observer`
    pub fn with_observer(config: ServerConfig, observer: SharedObserver) -> Self {
        let (local_addr, _) = watch::channel(None);
        let (accept_state, _) = watch::channel(AcceptState::Running);
        Self {
            config,
            shutdown: Arc::new(ShutdownSignal::new()),
            observer,
            tracker: ConnectionTracker::new(),
            started: AtomicBool::new(false),
            local_addr,
            accept_state: Arc::new(accept_state),
        }
    }

    /// Configured bind address, as given
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Bind, accept connections until [`stop`](Self::stop) is called, then
    /// close the listener and return.
    ///
    /// A server can be started once; a failed bind may be retried.
    #[instrument(skip(self), fields(bind_addr = %self.config.bind_addr))]
    pub async fn start(&self) -> Result<(), BindError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BindError::AlreadyStarted);
        }

        // Reporting a bind failure is left to the caller.
        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let shutdown = Arc::clone(&self.shutdown);
        let accept_loop = AcceptLoop::new(listener.inner, shutdown, Arc::clone(&self.observer))
            .with_tracker(self.tracker.clone())
            .with_state(Arc::clone(&self.accept_state))
            .with_max_record_size(self.config.max_record_size)
            .with_error_backoff(self.config.accept_error_backoff);

        let mut task = AcceptTask(Some(tokio::spawn(accept_loop.run())));
        self.local_addr.send_replace(Some(listener.local_addr));
        info!("Server started on {}", listener.local_addr);

        self.shutdown.wait().await;
        debug!("Shutdown requested, waiting for accept loop to release the listener");

        if let Some(handle) = task.0.take() {
            if let Err(e) = handle.await {
                error!("Accept loop task failed: {}", e);
            }
        }

        self.local_addr.send_replace(None);
        info!(
            active_connections = self.tracker.active_count(),
            "Listener closed, server stopped"
        );
        Ok(())
    }

    async fn bind(&self) -> Result<BoundListener, BindError> {
        let addr = normalize_bind_addr(&self.config.bind_addr)?;

        info!("Binding TCP listener to {}", addr);
        let inner = TcpListener::bind(&addr)
            .await
            .map_err(|source| BindError::Io { addr: addr.clone(), source })?;
        let local_addr = inner
            .local_addr()
            .map_err(|source| BindError::Io { addr, source })?;

        Ok(BoundListener { inner, local_addr })
    }

    /// Request shutdown. Only the first call has any effect.
    pub fn stop(&self) {
        if self.shutdown.trigger() {
            info!(bind_addr = %self.config.bind_addr, "Stop requested");
        }
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopping(&self) -> bool {
        self.shutdown.is_triggered()
    }

    /// Address the listener is bound to, while it is open
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.borrow()
    }

    /// Wait until the listener is bound and return its address.
    ///
    /// Does not return if the server never binds.
    pub async fn wait_bound(&self) -> Option<SocketAddr> {
        self.local_addr
            .subscribe()
            .wait_for(|addr| addr.is_some())
            .await
            .ok()
            .and_then(|addr| *addr)
    }

    /// Watch the accept loop's state
    pub fn accept_state(&self) -> watch::Receiver<AcceptState> {
        self.accept_state.subscribe()
    }

    /// Snapshot of live and total connections
    pub fn stats(&self) -> ConnectionStats {
        self.tracker.stats()
    }
}

struct BoundListener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

/// Aborts the accept loop if `start` is dropped before it finishes, so the
/// listener never outlives the call that opened it.
struct AcceptTask(Option<JoinHandle<()>>);

impl Drop for AcceptTask {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}
