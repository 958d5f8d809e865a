pub mod admin;
pub mod cli;
pub mod config;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod module;
pub mod modules;
pub mod provision;
pub mod registry;
pub mod server;
pub mod utils;

pub use config::Config;
pub use error::Error;
pub use host::Host;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
