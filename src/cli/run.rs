use super::ConfigSource;
use crate::admin::UnixSocketServer;
use crate::metrics;
use crate::registry::Registry;
use crate::server::{FrontDoor, ShutdownCoordinator};
use crate::utils::{setup_signal_handlers, SignalEvent};
use crate::{Config, Host};
use anyhow::Result;
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinSet;
use tokio::time::Interval;
use tracing::{error, info, warn};

const WATCH_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Reload whenever the config file's modification time changes
    #[arg(long)]
    pub watch: bool,
}

pub async fn run(args: RunArgs, registry: Arc<Registry>) -> Result<()> {
    let source = Arc::new(args.source);
    let config = Config::from_file(&source.config, source.adapter.as_deref())?;

    crate::logging::init_logging(&config.logging.level, &config.logging.format)?;

    info!("Starting fe-host v{}", crate::VERSION);
    info!("Loading configuration from: {}", source.config.display());
    for warning in config.warnings() {
        warn!("{}", warning);
    }

    let mut signals = setup_signal_handlers()?;
    let host = Arc::new(Host::new(registry));
    let shutdown = Arc::new(ShutdownCoordinator::new());

    // Listeners are bound before any instance is activated.
    let listener = FrontDoor::bind(&config.server.listen_addr()).await?;
    let admin = if config.admin.enable {
        let admin = Arc::new(UnixSocketServer::new(
            config.admin.unix_socket.clone(),
            Arc::clone(&host),
            Arc::clone(&shutdown),
        ));
        let admin_listener = admin.bind()?;
        Some((admin, admin_listener))
    } else {
        None
    };

    if let Err(e) = host.start(&config).await {
        if let Some((admin, _)) = &admin {
            admin.remove_socket();
        }
        return Err(e.into());
    }

    let mut services = JoinSet::new();
    let front_door = Arc::new(FrontDoor::new(
        Arc::clone(&host),
        Arc::clone(&shutdown),
        config.lifecycle.drain_timeout(),
    ));
    services.spawn(front_door.serve(listener));
    if let Some((admin, admin_listener)) = admin {
        services.spawn(admin.serve(admin_listener));
    }

    let mut watcher = args.watch.then(|| tokio::time::interval(WATCH_INTERVAL));
    let mut last_modified = modified(&source.config);
    if args.watch {
        info!("Watching {} for changes", source.config.display());
    }

    let mut shutdown_rx = shutdown.subscribe();
    let mut reloads = JoinSet::new();

    loop {
        tokio::select! {
            Some(event) = signals.recv() => match event {
                SignalEvent::Shutdown => {
                    shutdown.trigger();
                }
                SignalEvent::Reload => {
                    reloads.spawn(reload_from_file(Arc::clone(&host), Arc::clone(&source)));
                }
            },

            _ = tick(&mut watcher) => {
                let current = modified(&source.config);
                if current.is_some() && current != last_modified {
                    last_modified = current;
                    info!("Configuration file changed: {}", source.config.display());
                    reloads.spawn(reload_from_file(Arc::clone(&host), Arc::clone(&source)));
                }
            }

            Some(finished) = reloads.join_next(), if !reloads.is_empty() => {
                if let Err(e) = finished {
                    error!("Reload task failed: {}", e);
                }
            }

            _ = shutdown_rx.recv() => break,
        }
    }

    // A reload still activating is aborted by stop().
    match host.stop().await {
        Ok(report) => {
            for failure in &report.failures {
                warn!(
                    "Module '{}' at {} failed to deactivate: {}",
                    failure.module, failure.path, failure.error
                );
            }
            if let Some(timeout) = report.drain {
                warn!("{}", timeout);
            }
        }
        Err(e) => error!("Stop failed: {}", e),
    }
    reloads.shutdown().await;

    while let Some(result) = services.join_next().await {
        match result {
            Ok(Err(e)) => error!("Service exited with error: {:#}", e),
            Err(e) => error!("Service task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Failures are logged and counted, never fatal: the live configuration
/// keeps serving.
async fn reload_from_file(host: Arc<Host>, source: Arc<ConfigSource>) {
    let config = match Config::from_file(&source.config, source.adapter.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            metrics::record_reload("rejected");
            error!("Configuration reload failed: {:#}", e);
            return;
        }
    };

    match host.reload(&config).await {
        Ok(outcome) => info!(
            generation = outcome.generation,
            drain_timed_out = outcome.drain.is_err(),
            "Configuration reloaded"
        ),
        Err(e) => error!("Configuration reload failed: {}", e),
    }
}

async fn tick(watcher: &mut Option<Interval>) {
    match watcher {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
