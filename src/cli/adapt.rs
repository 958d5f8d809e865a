use super::ConfigSource;
use crate::config::adapter;
use crate::registry::Registry;
use crate::{Config, Host};
use anyhow::{Context, Result};
use clap::Args;
use std::sync::Arc;

#[derive(Args)]
pub struct AdaptArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Pretty-print the output
    #[arg(long)]
    pub pretty: bool,

    /// Also build and provision the adapted document
    #[arg(long)]
    pub validate: bool,
}

/// Print the canonical JSON document for a configuration file.
pub async fn run(args: AdaptArgs, registry: Arc<Registry>) -> Result<()> {
    let adapted = adapter::load(&args.source.config, args.source.adapter.as_deref())?;
    for warning in &adapted.warnings {
        eprintln!("{}", warning);
    }

    if args.validate {
        let config = Config::from_value(adapted.value.clone())?;
        Host::new(registry).validate(&config)?;
    }

    let output = if args.pretty {
        serde_json::to_string_pretty(&adapted.value)
    } else {
        serde_json::to_string(&adapted.value)
    }
    .context("Failed to encode adapted configuration")?;

    println!("{}", output);
    Ok(())
}
