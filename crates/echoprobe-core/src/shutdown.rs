//! Cooperative shutdown.
//!
//! An interrupt never tears anything down itself. It flips a shared flag;
//! the session loop notices it at its next poll point, finishes the tick,
//! and exits through the normal path so the session and engine guards run.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::task::JoinHandle;

/// Shared stop-request flag.
///
/// Starts clear, may be set any number of times, never cleared.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// A fresh, unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Route SIGINT into this signal for the rest of the process.
    ///
    /// The handler is registered before this returns, so an interrupt that
    /// lands before the listener task is first polled still sets the flag
    /// instead of killing the process. Must be called from within a Tokio
    /// runtime.
    #[cfg(unix)]
    pub fn listen_for_interrupt(&self) -> io::Result<JoinHandle<()>> {
        use tokio::signal::unix::{SignalKind, signal};

        let mut interrupts = signal(SignalKind::interrupt())?;
        let flag = self.clone();
        Ok(tokio::spawn(async move {
            while interrupts.recv().await.is_some() {
                tracing::info!("interrupt received, stopping at next tick");
                flag.request();
            }
        }))
    }

    /// Route Ctrl-C into this signal for the rest of the process.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(not(unix))]
    pub fn listen_for_interrupt(&self) -> io::Result<JoinHandle<()>> {
        let flag = self.clone();
        Ok(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, stopping at next tick");
                flag.request();
            }
        }))
    }
}
