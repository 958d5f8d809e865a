use anyhow::{Context, Result};
use futures::stream::StreamExt;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGTERM or SIGINT
    Shutdown,
    /// SIGUSR1: reload the configuration file
    Reload,
}

/// Translate process signals into [`SignalEvent`]s for the run loop.
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<SignalEvent>> {
    let signals = Signals::new([SIGTERM, SIGINT, SIGUSR1]).context("Failed to register signal handlers")?;
    let mut signals = signals.fuse();
    let (tx, rx) = mpsc::channel(8);

    tokio::spawn(async move {
        while let Some(signal) = signals.next().await {
            let event = match signal {
                SIGTERM | SIGINT => {
                    info!("Received shutdown signal, gracefully shutting down...");
                    SignalEvent::Shutdown
                }
                SIGUSR1 => {
                    info!("Received USR1 signal - reloading configuration");
                    SignalEvent::Reload
                }
                _ => {
                    warn!("Received unknown signal: {}", signal);
                    continue;
                }
            };
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
