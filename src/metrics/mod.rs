pub mod exporter;

pub use exporter::export_metrics;

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_counter_vec, register_int_gauge};
use prometheus::{IntCounter, IntCounterVec, IntGauge};

lazy_static! {
    pub static ref RELOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fehost_reloads_total",
        "Configuration reload attempts by result",
        &["result"]
    )
    .expect("metric can be registered");
    pub static ref LIVE_GENERATION: IntGauge = register_int_gauge!(
        "fehost_live_generation",
        "Generation number of the live configuration, 0 when none is live"
    )
    .expect("metric can be registered");
    pub static ref ACTIVE_INSTANCES: IntGauge = register_int_gauge!(
        "fehost_active_instances",
        "Module instances in the live configuration"
    )
    .expect("metric can be registered");
    pub static ref DRAIN_TIMEOUTS: IntCounter = register_int_counter!(
        "fehost_drain_timeouts_total",
        "Superseded configurations deactivated with operations still in flight"
    )
    .expect("metric can be registered");
    pub static ref REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "fehost_requests_total",
        "Requests answered by the front door by status code",
        &["status"]
    )
    .expect("metric can be registered");
}

/// `result` is one of `succeeded`, `failed` or `rejected`.
pub fn record_reload(result: &str) {
    RELOADS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_request(status: u16) {
    REQUESTS_TOTAL.with_label_values(&[&status.to_string()]).inc();
}

pub fn set_live_graph(generation: u64, instances: usize) {
    LIVE_GENERATION.set(generation as i64);
    ACTIVE_INSTANCES.set(instances as i64);
}

pub fn clear_live_graph() {
    LIVE_GENERATION.set(0);
    ACTIVE_INSTANCES.set(0);
}
