use crate::error::ValidationError;
use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(level)?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        "json" => registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init(),
        "pretty" => registry.with(fmt::layer().pretty()).try_init(),
        _ => registry.with(fmt::layer().compact()).try_init(),
    }
    .context("Failed to install log subscriber")?;

    Ok(())
}

/// Filter for a bare `logging.level`. Anything but a level name is refused
/// rather than read as a target directive.
fn level_filter(level: &str) -> Result<EnvFilter, ValidationError> {
    if !LEVELS.contains(&level) {
        return Err(ValidationError::document(format!(
            "Invalid log level: {}. Must be one of: {}",
            level,
            LEVELS.join(", ")
        )));
    }
    Ok(EnvFilter::new(level))
}
