//! Idle wait and cooperative shutdown

use std::time::Duration;
use tokio::sync::watch;

/// Why an idle wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The full interval passed
    Elapsed,
    /// Shutdown was signalled during the wait
    Shutdown,
}

/// Sender side of the shutdown signal
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a shutdown handle and the receiver the supervisor watches
pub fn shutdown_channel() -> (ShutdownHandle, watch::Receiver<bool>) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, rx)
}

/// Fixed-interval wait used while the queue is empty.
///
/// Command files are not watched: a command dropped during the wait is
/// picked up when the interval ends. Only shutdown cuts the wait short.
pub struct IdleTimer {
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl IdleTimer {
    pub fn new(interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self { interval, shutdown }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether shutdown has been signalled
    pub fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep for the interval, or until shutdown is signalled
    pub async fn wait(&mut self) -> Wake {
        let sleep = tokio::time::sleep(self.interval);
        tokio::pin!(sleep);

        loop {
            if *self.shutdown.borrow_and_update() {
                return Wake::Shutdown;
            }

            tokio::select! {
                _ = &mut sleep => return Wake::Elapsed,
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        // Handle dropped: shutdown can no longer arrive
                        (&mut sleep).await;
                        return Wake::Elapsed;
                    }
                }
            }
        }
    }
}
