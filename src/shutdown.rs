//! Graceful Shutdown Handling
//!
//! A one-shot shutdown signal shared between the server lifecycle and the
//! accept loop, plus the OS signal listener the binary uses to trigger it.
//! Shutdown only stops intake of new connections; readers already running
//! finish on their own.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::signal;
use tokio::sync::Notify;
use tracing::{debug, info};
use crate::Result;

/// One-shot shutdown signal.
///
/// Transitions from unset to set exactly once and stays set. Any number of
/// tasks may check or wait on it concurrently.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Create a new, unset signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal and wake every waiter.
    ///
    /// Returns `true` only for the call that actually set it.
    pub fn trigger(&self) -> bool {
        if self.triggered.swap(true, Ordering::SeqCst) {
            debug!("Shutdown signal already triggered, ignoring");
            return false;
        }
        self.notify.notify_waiters();
        true
    }

    /// Check whether the signal has been set
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait until the signal is set. Returns immediately if it already is.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent trigger is not missed.
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

/// Block until the process receives SIGTERM or SIGINT (Ctrl+C elsewhere).
///
/// Returns the name of the signal that arrived.
pub async fn listen_for_signals() -> Result<&'static str> {
    info!("Starting shutdown signal listener");
    let name = wait_for_signal().await?;
    info!("Received {}, initiating graceful shutdown", name);
    Ok(name)
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<&'static str> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<&'static str> {
    signal::ctrl_c().await?;
    Ok("Ctrl+C")
}
