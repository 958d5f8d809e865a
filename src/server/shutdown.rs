use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shutdown coordinator shared by the listeners of one process
pub struct ShutdownCoordinator {
    /// Broadcast channel to notify accept loops of shutdown
    shutdown_tx: broadcast::Sender<()>,
    is_shutting_down: AtomicBool,
    active_connections: Arc<AtomicUsize>,
}

/// Held for the lifetime of one accepted connection.
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx,
            is_shutting_down: AtomicBool::new(false),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    pub fn connection(&self) -> ConnectionGuard {
        self.active_connections.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active: Arc::clone(&self.active_connections),
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::SeqCst)
    }

    /// Tell every listener to stop accepting. Returns false if shutdown was
    /// already under way.
    pub fn trigger(&self) -> bool {
        if self.is_shutting_down.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("Initiating graceful shutdown...");
        let _ = self.shutdown_tx.send(());
        true
    }

    /// Wait for open connections to close. Returns how many were still open
    /// at the deadline.
    pub async fn wait_for_connections(&self, timeout: Duration) -> usize {
        let start = Instant::now();
        let mut last_report = None::<Instant>;

        loop {
            let active = self.active_connections();

            if active == 0 {
                info!("All connections closed gracefully");
                return 0;
            }

            if start.elapsed() >= timeout {
                warn!(
                    "Graceful shutdown timeout ({:.1}s) reached with {} active connection(s), forcing shutdown",
                    timeout.as_secs_f64(),
                    active
                );
                return active;
            }

            if last_report.map_or(true, |t| t.elapsed() >= Duration::from_secs(1)) {
                info!(
                    "Waiting for {} active connection(s) to complete... ({:.1}s remaining)",
                    active,
                    timeout.saturating_sub(start.elapsed()).as_secs_f64()
                );
                last_report = Some(Instant::now());
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_guard_counts() {
        let coordinator = ShutdownCoordinator::new();
        assert_eq!(coordinator.active_connections(), 0);

        let a = coordinator.connection();
        let b = coordinator.connection();
        assert_eq!(coordinator.active_connections(), 2);
        drop(a);
        drop(b);
        assert_eq!(coordinator.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_trigger_broadcasts_once() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        assert!(coordinator.trigger());
        assert!(!coordinator.trigger());
        assert!(coordinator.is_shutting_down());
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_connections_times_out() {
        let coordinator = ShutdownCoordinator::new();
        let _open = coordinator.connection();
        let remaining = coordinator.wait_for_connections(Duration::from_millis(60)).await;
        assert_eq!(remaining, 1);
    }
}
