use super::ConfigSource;
use crate::registry::Registry;
use crate::{Config, Host};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: ConfigSource,
}

/// Build and provision without activating anything.
pub async fn run(args: ValidateArgs, registry: Arc<Registry>) -> Result<()> {
    let config = Config::from_file(&args.source.config, args.source.adapter.as_deref())?;
    let graph = Host::new(registry).validate(&config)?;

    let warnings = config.warnings();
    if !warnings.is_empty() {
        println!("Configuration loaded with warnings:\n");
        for warning in &warnings {
            println!("{}", warning);
        }
        println!();
    }

    println!(
        " Configuration is valid! {} module instance(s) in {}",
        graph.len(),
        args.source.config.display()
    );
    Ok(())
}
