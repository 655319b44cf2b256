//! Graceful shutdown.
//!
//! Both halves are built on `tokio::sync::watch`: [`ShutdownSignal`] watches
//! a flag that flips once, [`ConnectionTracker`] watches the number of open
//! connections so the server can wait for it to reach zero.
//!
//! ```rust,ignore
//! use ctxware_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::new();
//! let handle = tokio::spawn(server.run_with_shutdown(shutdown.clone()));
//! shutdown.trigger();
//! handle.await??;
//! ```

use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable, trigger-once shutdown notification.
///
/// ```rust
/// use ctxware_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let observer = shutdown.clone();
///
/// shutdown.trigger();
/// assert!(observer.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    flag: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self { flag: Arc::new(flag) }
    }

    /// Triggers shutdown. Later calls do nothing.
    pub fn trigger(&self) {
        self.flag.send_if_modified(|triggered| !std::mem::replace(triggered, true));
    }

    /// Returns `true` once shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.flag.borrow()
    }

    /// Completes when shutdown is triggered, or at once if it already was.
    pub async fn recv(&self) {
        let mut flag = self.flag.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = flag.wait_for(|triggered| *triggered).await;
    }

    /// Creates a signal triggered by SIGTERM or SIGINT (Ctrl+C elsewhere).
    ///
    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            if os_signal().await {
                trigger.trigger();
            }
        });

        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for a termination signal. Returns `false` if none can be received.
#[cfg(unix)]
async fn os_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "cannot listen for termination signals, OS shutdown disabled");
            return false;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }
    true
}

#[cfg(not(unix))]
async fn os_signal() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("received Ctrl+C");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl+C, OS shutdown disabled");
            false
        }
    }
}

/// Counts open connections.
///
/// ```rust
/// use ctxware_server::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let open = tracker.open();
/// assert_eq!(tracker.active(), 1);
///
/// drop(open);
/// assert_eq!(tracker.active(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    count: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    /// Creates a tracker with no connections.
    #[must_use]
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count: Arc::new(count) }
    }

    /// Counts a connection until the returned guard is dropped.
    #[must_use]
    pub fn open(&self) -> OpenConnection {
        self.count.send_modify(|count| *count += 1);
        OpenConnection {
            count: Arc::clone(&self.count),
        }
    }

    /// Number of open connections.
    #[must_use]
    pub fn active(&self) -> usize {
        *self.count.borrow()
    }

    /// Completes once no connections are open.
    pub async fn idle(&self) {
        let mut count = self.count.subscribe();
        let _ = count.wait_for(|count| *count == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// An open connection, counted until dropped.
#[derive(Debug)]
pub struct OpenConnection {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.count.send_modify(|count| *count = count.saturating_sub(1));
    }
}
