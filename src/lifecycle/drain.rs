use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::info;

/// Counts operations running against one instance graph and lets the
/// orchestrator wait for them to finish once the graph is superseded.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    draining: AtomicBool,
    idle: Notify,
}

impl InFlight {
    /// Register an operation. Fails once draining has begun, in which case
    /// the caller must pick up the new live graph instead.
    pub(crate) fn try_enter(&self) -> bool {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.draining.load(Ordering::SeqCst) {
            self.exit();
            return false;
        }
        true
    }

    /// Register an operation whether or not draining has begun.
    pub(crate) fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn exit(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Get current in-flight operation count
    pub fn active(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    pub(crate) fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    /// Wait until no operation is in flight. On timeout returns how many
    /// were still running.
    pub(crate) async fn wait_idle(&self, timeout: Duration) -> Result<(), usize> {
        let deadline = Instant::now() + timeout;
        let mut announced = false;

        loop {
            let notified = self.idle.notified();

            let active = self.active();
            if active == 0 {
                return Ok(());
            }

            if !announced {
                info!(
                    "Waiting for {} in-flight operation(s) to complete ({:.1}s deadline)",
                    active,
                    timeout.as_secs_f64()
                );
                announced = true;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return match self.active() {
                    0 => Ok(()),
                    remaining => Err(remaining),
                };
            }
        }
    }
}
