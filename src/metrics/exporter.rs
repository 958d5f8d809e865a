use prometheus::{Encoder, TextEncoder};
use anyhow::Result;

/// Render every registered metric in the Prometheus text format.
pub fn export_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
