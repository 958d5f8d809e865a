pub mod adapt;
pub mod control;
pub mod list_modules;
pub mod run;
pub mod validate;

pub use adapt::AdaptArgs;
pub use control::{ReloadArgs, StopArgs};
pub use list_modules::ListModulesArgs;
pub use run::RunArgs;
pub use validate::ValidateArgs;

use clap::Args;
use std::path::PathBuf;

/// Where a command reads its configuration from.
#[derive(Args, Debug, Clone)]
pub struct ConfigSource {
    /// Path to configuration file
    #[arg(short, long, default_value = "fe-host.toml")]
    pub config: PathBuf,

    /// Config adapter (json, toml). Defaults to the file extension.
    #[arg(short, long)]
    pub adapter: Option<String>,
}
