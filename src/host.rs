use crate::config::{Config, GraphBuilder};
use crate::error::Error;
use crate::lifecycle::{LifecycleState, Orchestrator, ReloadOutcome, StopReport};
use crate::metrics;
use crate::provision::{provision, InstanceGraph};
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Snapshot reported by the admin `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct HostStatus {
    pub state: LifecycleState,
    pub generation: Option<u64>,
    pub graph_id: Option<Uuid>,
    pub built_at: Option<DateTime<Utc>>,
    pub instances: usize,
    pub in_flight: usize,
    pub retiring: usize,
}

/// Everything a running process needs between the sealed registry and the
/// live graph.
pub struct Host {
    registry: Arc<Registry>,
    orchestrator: Orchestrator,
    generation: AtomicU64,
    applied: Mutex<Option<Config>>,
}

impl Host {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            orchestrator: Orchestrator::new(),
            generation: AtomicU64::new(0),
            applied: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Build and provision `config` under a fresh generation number. The
    /// number is taken even if the build is then rejected, so generations
    /// are unique and increasing but not contiguous.
    pub fn build(&self, config: &Config) -> Result<InstanceGraph, Error> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.build_generation(config, generation)
    }

    /// Like [`Host::build`] without consuming a generation. Nothing is
    /// activated; the returned graph is only for inspection.
    pub fn validate(&self, config: &Config) -> Result<InstanceGraph, Error> {
        self.build_generation(config, 0)
    }

    fn build_generation(&self, config: &Config, generation: u64) -> Result<InstanceGraph, Error> {
        let tree = GraphBuilder::new(&self.registry).build(config)?;
        Ok(provision(&tree, generation)?)
    }

    pub async fn start(&self, config: &Config) -> Result<u64, Error> {
        let graph = self.build(config)?;
        let generation = graph.generation();
        self.orchestrator.start(graph).await?;
        *self.applied.lock() = Some(config.clone());
        Ok(generation)
    }

    /// Replace the live graph with one built from `config`. Any error leaves
    /// the live graph serving.
    pub async fn reload(&self, config: &Config) -> Result<ReloadOutcome, Error> {
        let graph = match self.build(config) {
            Ok(graph) => graph,
            Err(e) => {
                metrics::record_reload("rejected");
                warn!("Reload rejected, keeping current configuration: {}", e);
                return Err(e);
            }
        };

        self.warn_process_settings(config);
        let outcome = self.orchestrator.reload(graph).await?;
        *self.applied.lock() = Some(config.clone());
        Ok(outcome)
    }

    pub async fn stop(&self) -> Result<StopReport, Error> {
        Ok(self.orchestrator.stop().await?)
    }

    pub fn status(&self) -> HostStatus {
        let live = self.orchestrator.live();
        HostStatus {
            state: self.orchestrator.state(),
            generation: live.as_ref().map(|g| g.generation()),
            graph_id: live.as_ref().map(|g| g.id()),
            built_at: live.as_ref().map(|g| g.built_at()),
            instances: live.as_ref().map_or(0, |g| g.len()),
            in_flight: live.as_ref().map_or(0, |g| g.inflight().active()),
            retiring: self.orchestrator.retiring(),
        }
    }

    /// Listener, logging and admin socket belong to the process. A reload
    /// can change them in the document but they only take effect on restart.
    fn warn_process_settings(&self, next: &Config) {
        let applied = self.applied.lock();
        let Some(current) = applied.as_ref() else {
            return;
        };

        if current.server != next.server {
            warn!(
                current = %current.server.listen_addr(),
                requested = %next.server.listen_addr(),
                "Listen address changes require a restart"
            );
        }
        if current.admin != next.admin {
            warn!("Admin socket changes require a restart");
        }
        if current.logging != next.logging {
            info!("Logging changes require a restart");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::modules;
    use serde_json::{json, Value};

    fn host() -> Host {
        Host::new(modules::standard_registry().unwrap())
    }

    fn config(apps: Value) -> Config {
        Config::from_value(json!({ "apps": apps })).unwrap()
    }

    fn hello(body: &str) -> Config {
        config(json!([{"module": "http.handlers.static_response", "params": {"body": body}}]))
    }

    async fn served(host: &Host) -> String {
        let guard = host.orchestrator().acquire().unwrap();
        let req = hyper::Request::builder().uri("/").body(bytes::Bytes::new()).unwrap();
        String::from_utf8_lossy(guard.handle(&req).await.body()).into_owned()
    }

    #[test]
    fn test_validate_reports_unknown_module() {
        let err = host()
            .validate(&config(json!([{"module": "http.handlers.nope"}])))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_validate_reports_provisioning_error() {
        let err = host()
            .validate(&config(json!([
                {"module": "http.handlers.kv", "params": {"storage": "store1"}}
            ])))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Provision);
        assert!(err.to_string().contains("unresolved reference to 'store1'"));
    }

    #[test]
    fn test_validate_does_not_consume_generations() {
        let host = host();
        assert_eq!(host.validate(&hello("x")).unwrap().generation(), 0);
        assert_eq!(host.build(&hello("x")).unwrap().generation(), 1);
        assert_eq!(host.build(&hello("x")).unwrap().generation(), 2);
    }

    #[tokio::test]
    async fn test_reload_of_invalid_document_keeps_serving() {
        let host = host();
        host.start(&hello("v1")).await.unwrap();

        let err = host
            .reload(&config(json!([
                {"module": "http.handlers.kv", "params": {"storage": "store1"}},
                {"module": "storage.memory", "name": "store1"}
            ])))
            .await
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Provision);
        assert_eq!(served(&host).await, "v1");
        assert_eq!(host.status().state, LifecycleState::Running);
        assert_eq!(host.status().generation, Some(1));
    }

    #[tokio::test]
    async fn test_rejected_reload_consumes_a_generation() {
        let host = host();
        host.start(&hello("v1")).await.unwrap();
        host.reload(&config(json!([{"module": "http.handlers.nope"}])))
            .await
            .unwrap_err();

        let outcome = host.reload(&hello("v2")).await.unwrap();
        assert_eq!(outcome.previous_generation, Some(1));
        assert_eq!(outcome.generation, 3);
    }

    #[tokio::test]
    async fn test_reload_then_stop() {
        let host = host();
        assert_eq!(host.start(&hello("v1")).await.unwrap(), 1);

        let outcome = host
            .reload(&config(json!([
                {"module": "storage.memory", "name": "store1"},
                {"module": "http.handlers.kv", "params": {"storage": "store1"}},
                {"module": "http.handlers.static_response", "params": {"body": "v2"}}
            ])))
            .await
            .unwrap();
        assert_eq!(outcome.generation, 2);
        assert_eq!(outcome.previous_generation, Some(1));
        assert_eq!(served(&host).await, "v2");

        let status = host.status();
        assert_eq!(status.instances, 3);
        assert_eq!(status.in_flight, 0);

        let report = host.stop().await.unwrap();
        assert!(report.failures.is_empty());
        assert_eq!(host.status().state, LifecycleState::Stopped);
        assert_eq!(host.status().generation, None);
    }

    #[tokio::test]
    async fn test_reload_with_new_listen_address_still_applies_apps() {
        let host = host();
        host.start(&hello("v1")).await.unwrap();

        let mut next = hello("v2");
        next.server.port = 9999;
        host.reload(&next).await.unwrap();
        assert_eq!(served(&host).await, "v2");
    }

    #[test]
    fn test_status_serializes() {
        let value = serde_json::to_value(host().status()).unwrap();
        assert_eq!(value["state"], "empty");
        assert_eq!(value["generation"], Value::Null);
    }
}
