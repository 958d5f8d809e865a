pub mod drain;

use crate::error::{ActivationError, DrainTimeoutError, LifecycleError};
use crate::metrics;
use crate::module::Instance;
use crate::provision::InstanceGraph;
use arc_swap::ArcSwapOption;
use drain::InFlight;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Empty,
    Starting,
    Running,
    Reloading,
    Stopping,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Reloading => write!(f, "reloading"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// One unit of work pinned to the graph that was live when it began.
pub struct GraphGuard {
    graph: Arc<InstanceGraph>,
}

impl GraphGuard {
    pub fn graph(&self) -> &Arc<InstanceGraph> {
        &self.graph
    }
}

impl Deref for GraphGuard {
    type Target = InstanceGraph;

    fn deref(&self) -> &InstanceGraph {
        &self.graph
    }
}

impl Drop for GraphGuard {
    fn drop(&mut self) {
        self.graph.inflight().exit();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeactivationFailure {
    pub path: String,
    pub module: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct StopReport {
    pub generation: Option<u64>,
    pub drain: Option<DrainTimeoutError>,
    pub failures: Vec<DeactivationFailure>,
}

#[derive(Debug)]
pub struct ReloadOutcome {
    pub generation: u64,
    pub previous_generation: Option<u64>,
    pub drain: Result<(), DrainTimeoutError>,
    pub failures: Vec<DeactivationFailure>,
}

struct PendingBuild {
    id: u64,
    cancel: watch::Sender<bool>,
}

/// Owns the single live instance graph and sequences its lifecycle.
pub struct Orchestrator {
    live: ArcSwapOption<InstanceGraph>,
    state: Mutex<LifecycleState>,
    pending: Mutex<Option<PendingBuild>>,
    next_build: AtomicU64,
    serial: tokio::sync::Mutex<()>,
    retiring: InFlight,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            live: ArcSwapOption::empty(),
            state: Mutex::new(LifecycleState::Empty),
            pending: Mutex::new(None),
            next_build: AtomicU64::new(0),
            serial: tokio::sync::Mutex::new(()),
            retiring: InFlight::default(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Current live graph, without registering an operation against it.
    pub fn live(&self) -> Option<Arc<InstanceGraph>> {
        self.live.load_full()
    }

    /// Superseded graphs that are still draining.
    pub fn retiring(&self) -> usize {
        self.retiring.active()
    }

    /// Pin one operation to the live graph. Dereference once per request
    /// and keep the guard until the response is complete.
    pub fn acquire(&self) -> Option<GraphGuard> {
        loop {
            let graph = self.live.load_full()?;
            if graph.inflight().try_enter() {
                return Some(GraphGuard { graph });
            }
            // Superseded between the load and the count; the pointer has
            // already moved to its replacement.
        }
    }

    pub async fn start(&self, graph: InstanceGraph) -> Result<(), LifecycleError> {
        let _serial = self.serial.lock().await;
        self.transition("start", &[LifecycleState::Empty], LifecycleState::Starting)?;

        let graph = Arc::new(graph);
        if let Err(e) = activate(&graph, None).await {
            self.set_state(LifecycleState::Empty);
            return Err(e);
        }

        self.live.store(Some(Arc::clone(&graph)));
        self.set_state(LifecycleState::Running);
        metrics::set_live_graph(graph.generation(), graph.len());

        info!(
            generation = graph.generation(),
            graph_id = %graph.id(),
            instances = graph.len(),
            "Configuration is live"
        );
        Ok(())
    }

    /// Activate `graph` next to the live one, swap it in, then drain and
    /// deactivate the previous graph. A failure before the swap leaves the
    /// live graph untouched.
    pub async fn reload(&self, graph: InstanceGraph) -> Result<ReloadOutcome, LifecycleError> {
        let build_id = self.next_build.fetch_add(1, Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        if let Some(previous) = self.pending.lock().replace(PendingBuild {
            id: build_id,
            cancel: cancel_tx,
        }) {
            debug!(superseded = previous.id, by = build_id, "Aborting reload still in progress");
            let _ = previous.cancel.send(true);
        }

        let swapped = self.swap_in(graph, &cancel_rx).await;

        {
            let mut pending = self.pending.lock();
            if pending.as_ref().map_or(false, |p| p.id == build_id) {
                *pending = None;
            }
        }

        let (generation, previous) = match swapped {
            Ok(swapped) => swapped,
            Err(e) => {
                metrics::record_reload("failed");
                return Err(e);
            }
        };
        metrics::record_reload("succeeded");

        let Some(previous) = previous else {
            return Ok(ReloadOutcome {
                generation,
                previous_generation: None,
                drain: Ok(()),
                failures: Vec::new(),
            });
        };

        let drained = drain(&previous).await;
        let failures = deactivate_all(&previous).await;
        self.retiring.exit();

        info!(
            generation = previous.generation(),
            failures = failures.len(),
            "Superseded configuration retired"
        );

        Ok(ReloadOutcome {
            generation,
            previous_generation: Some(previous.generation()),
            drain: drained,
            failures,
        })
    }

    async fn swap_in(
        &self,
        graph: InstanceGraph,
        cancel: &watch::Receiver<bool>,
    ) -> Result<(u64, Option<Arc<InstanceGraph>>), LifecycleError> {
        let _serial = self.serial.lock().await;

        // Superseded while queued behind another reload.
        if *cancel.borrow() {
            return Err(LifecycleError::Aborted);
        }

        self.transition("reload", &[LifecycleState::Running], LifecycleState::Reloading)?;

        let graph = Arc::new(graph);
        if let Err(e) = activate(&graph, Some(cancel)).await {
            self.set_state(LifecycleState::Running);
            warn!(generation = graph.generation(), "Reload failed, keeping current configuration: {}", e);
            return Err(e);
        }

        let previous = self.live.swap(Some(Arc::clone(&graph)));
        if let Some(previous) = &previous {
            previous.inflight().begin_drain();
            self.retiring.enter();
        }
        self.set_state(LifecycleState::Running);
        metrics::set_live_graph(graph.generation(), graph.len());

        info!(
            generation = graph.generation(),
            graph_id = %graph.id(),
            previous = previous.as_ref().map(|g| g.generation()),
            "Reloaded configuration is live"
        );

        Ok((graph.generation(), previous))
    }

    /// Detach, drain and deactivate the live graph. Every instance is asked
    /// to deactivate even when an earlier one fails.
    pub async fn stop(&self) -> Result<StopReport, LifecycleError> {
        if let Some(pending) = self.pending.lock().take() {
            let _ = pending.cancel.send(true);
        }

        let _serial = self.serial.lock().await;
        self.transition("stop", &[LifecycleState::Running], LifecycleState::Stopping)?;
        info!("Stopping");

        let mut report = StopReport::default();

        if let Some(graph) = self.live.swap(None) {
            report.generation = Some(graph.generation());
            report.drain = drain(&graph).await.err();
            report.failures = deactivate_all(&graph).await;

            if let Err(remaining) = self.retiring.wait_idle(graph.drain_timeout()).await {
                warn!("{} superseded configuration(s) still retiring at shutdown", remaining);
            }
        }

        metrics::clear_live_graph();
        self.set_state(LifecycleState::Stopped);
        info!(failures = report.failures.len(), "Stopped");
        Ok(report)
    }

    fn transition(
        &self,
        operation: &'static str,
        from: &[LifecycleState],
        to: LifecycleState,
    ) -> Result<(), LifecycleError> {
        let mut state = self.state.lock();
        if !from.contains(&*state) {
            return Err(LifecycleError::InvalidState {
                operation,
                state: *state,
            });
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, to: LifecycleState) {
        *self.state.lock() = to;
    }
}

fn cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.map_or(false, |rx| *rx.borrow())
}

/// Activate in provisioning order; roll back on failure or cancellation.
async fn activate(
    graph: &InstanceGraph,
    cancel: Option<&watch::Receiver<bool>>,
) -> Result<(), LifecycleError> {
    let order = graph.activation_order();

    for (i, instance) in order.iter().enumerate() {
        if cancelled(cancel) {
            rollback(&order[..i]).await;
            return Err(LifecycleError::Aborted);
        }

        if let Err(source) = instance.activate().await {
            error!(
                module = %instance.module_id(),
                path = %instance.path(),
                "Activation failed: {:#}",
                source
            );
            rollback(&order[..i]).await;
            return Err(ActivationError {
                path: instance.path().clone(),
                module: instance.module_id().clone(),
                source,
            }
            .into());
        }
    }

    if cancelled(cancel) {
        rollback(order).await;
        return Err(LifecycleError::Aborted);
    }

    Ok(())
}

async fn rollback(activated: &[Arc<Instance>]) {
    for instance in activated.iter().rev() {
        if let Err(e) = instance.deactivate().await {
            warn!(
                module = %instance.module_id(),
                path = %instance.path(),
                "Rollback deactivation failed: {:#}",
                e
            );
        }
    }
}

async fn drain(graph: &InstanceGraph) -> Result<(), DrainTimeoutError> {
    graph.inflight().begin_drain();
    graph
        .inflight()
        .wait_idle(graph.drain_timeout())
        .await
        .map_err(|remaining| {
            let e = DrainTimeoutError {
                generation: graph.generation(),
                remaining,
                timeout: graph.drain_timeout(),
            };
            warn!("{}", e);
            metrics::DRAIN_TIMEOUTS.inc();
            e
        })
}

/// Reverse provisioning order: parents go down before the children they use.
async fn deactivate_all(graph: &InstanceGraph) -> Vec<DeactivationFailure> {
    let mut failures = Vec::new();

    for instance in graph.activation_order().iter().rev() {
        if let Err(e) = instance.deactivate().await {
            error!(
                module = %instance.module_id(),
                path = %instance.path(),
                "Deactivation failed: {:#}",
                e
            );
            failures.push(DeactivationFailure {
                path: instance.path().to_string(),
                module: instance.module_id().to_string(),
                error: format!("{:#}", e),
            });
        }
    }

    failures
}
