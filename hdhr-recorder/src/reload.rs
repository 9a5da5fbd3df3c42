//! Reload and shutdown requests.
//!
//! Signal handlers only flip state on the [`ReloadCoordinator`]; the service
//! loop blocks in [`ReloadCoordinator::wait`] and does the actual work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why [`ReloadCoordinator::wait`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    Reload,
    Shutdown,
}

/// Process-wide reload flag and shutdown token.
#[derive(Debug, Default)]
pub struct ReloadCoordinator {
    reload_requested: AtomicBool,
    notify: Notify,
    shutdown: CancellationToken,
}

impl ReloadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the service loop to rebuild the schedule. Never blocks.
    pub fn request_reload(&self) {
        self.reload_requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Ask the service loop to stop.
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token cancelled once shutdown has been requested.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn reload_pending(&self) -> bool {
        self.reload_requested.load(Ordering::SeqCst)
    }

    /// Clear the reload flag, returning whether it was set.
    pub fn clear_reload(&self) -> bool {
        self.reload_requested.swap(false, Ordering::SeqCst)
    }

    /// Block until a reload or shutdown is requested.
    ///
    /// Shutdown wins when both are pending. Requests made before the call
    /// are not lost.
    pub async fn wait(&self) -> Wakeup {
        loop {
            if self.shutdown.is_cancelled() {
                return Wakeup::Shutdown;
            }
            if self.reload_pending() {
                return Wakeup::Reload;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Wakeup::Shutdown,
                _ = self.notify.notified() => {}
            }
        }
    }
}

/// Route process signals to `coordinator`.
///
/// SIGHUP requests a reload; SIGTERM and Ctrl-C request shutdown.
#[cfg(unix)]
pub fn spawn_signal_listener(
    coordinator: Arc<ReloadCoordinator>,
) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = hangup.recv() => {
                    info!("Received SIGHUP, re-reading the schedule-file");
                    coordinator.request_reload();
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM, shutting down");
                    coordinator.request_shutdown();
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl-C, shutting down");
                    coordinator.request_shutdown();
                    break;
                }
            }
        }
    }))
}

/// Route Ctrl-C to `coordinator`.
#[cfg(not(unix))]
pub fn spawn_signal_listener(
    coordinator: Arc<ReloadCoordinator>,
) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            coordinator.request_shutdown();
        }
    }))
}
