use crate::lifecycle::drain::InFlight;
use crate::module::{Instance, Request, Response};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use hyper::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Fully provisioned tree of instances for one configuration.
///
/// Immutable once built; the orchestrator only flips its in-flight tracker
/// into draining mode when the graph is superseded.
pub struct InstanceGraph {
    id: Uuid,
    generation: u64,
    built_at: DateTime<Utc>,
    roots: Vec<Arc<Instance>>,
    order: Vec<Arc<Instance>>,
    names: HashMap<String, Arc<Instance>>,
    drain_timeout: Duration,
    inflight: InFlight,
}

impl InstanceGraph {
    pub(crate) fn new(
        generation: u64,
        roots: Vec<Arc<Instance>>,
        order: Vec<Arc<Instance>>,
        names: HashMap<String, Arc<Instance>>,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            built_at: Utc::now(),
            roots,
            order,
            names,
            drain_timeout,
            inflight: InFlight::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Top-level instances in document order.
    pub fn roots(&self) -> &[Arc<Instance>] {
        &self.roots
    }

    /// Children before parents, siblings in document order.
    pub fn activation_order(&self) -> &[Arc<Instance>] {
        &self.order
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Instance>> {
        self.names.get(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    pub fn inflight(&self) -> &InFlight {
        &self.inflight
    }

    /// Route a request through the top-level handlers; first answer wins.
    pub async fn handle(&self, req: &Request) -> Response {
        for instance in &self.roots {
            if let Some(handler) = instance.handler() {
                if let Some(response) = handler.handle(req).await {
                    return response;
                }
            }
        }

        let mut response = Response::new(Bytes::from(format!("no route for {}\n", req.uri().path())));
        *response.status_mut() = StatusCode::NOT_FOUND;
        response
    }
}

impl std::fmt::Debug for InstanceGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceGraph")
            .field("id", &self.id)
            .field("generation", &self.generation)
            .field("instances", &self.order.len())
            .field("inflight", &self.inflight.active())
            .finish_non_exhaustive()
    }
}
