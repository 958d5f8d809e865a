use crate::error::ProvisionError;
use crate::module::{parse_params, Module, ProvisionContext};
use crate::registry::{Capability, ModuleDescriptor, ParamKind, ParamSchema};
use anyhow::Context;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub const ID: &str = "tasks.heartbeat";

pub fn descriptor() -> ModuleDescriptor {
    ModuleDescriptor::new(ID, || Box::<Heartbeat>::default())
        .capability(Capability::APP)
        .params(ParamSchema::new().required("interval_ms", ParamKind::Integer))
}

#[derive(Debug, Deserialize)]
struct Params {
    interval_ms: u64,
}

struct Task {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Background task that ticks on a fixed interval while its graph is active.
#[derive(Default)]
pub struct Heartbeat {
    interval: Duration,
    ticks: Arc<AtomicU64>,
    task: Mutex<Option<Task>>,
}

impl fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heartbeat")
            .field("interval", &self.interval)
            .field("ticks", &self.ticks())
            .field("running", &self.task.lock().is_some())
            .finish()
    }
}

impl Heartbeat {
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Module for Heartbeat {
    fn configure(&mut self, params: &Value, _ctx: &ProvisionContext<'_>) -> Result<(), ProvisionError> {
        let params: Params = parse_params(params)?;
        self.interval = Duration::from_millis(params.interval_ms);
        Ok(())
    }

    fn validate(&self) -> Result<(), ProvisionError> {
        if self.interval.is_zero() {
            return Err(ProvisionError::invalid("interval_ms must be greater than 0"));
        }
        Ok(())
    }

    fn activate(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let (stop, mut stopped) = oneshot::channel();
            let ticks = Arc::clone(&self.ticks);
            let period = self.interval;

            let handle = tokio::spawn(async move {
                let mut timer = tokio::time::interval(period);
                // The first tick completes immediately.
                timer.tick().await;
                loop {
                    tokio::select! {
                        _ = timer.tick() => {
                            let n = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                            debug!(ticks = n, "heartbeat");
                        }
                        _ = &mut stopped => break,
                    }
                }
            });

            info!(interval_ms = period.as_millis() as u64, "Heartbeat started");
            *self.task.lock() = Some(Task { stop, handle });
            Ok(())
        })
    }

    fn deactivate(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let task = self.task.lock().take();
            let Some(task) = task else {
                return Ok(());
            };
            let _ = task.stop.send(());
            task.handle.await.context("Heartbeat task panicked")?;
            info!(ticks = self.ticks(), "Heartbeat stopped");
            Ok(())
        })
    }
}
