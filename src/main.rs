use clap::{Parser, Subcommand};
use fe_host::{cli, error, modules, registry::RegistryBuilder};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "fe-host")]
#[command(version = fe_host::VERSION)]
#[command(about = "Configuration-driven module host with hot reload", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the host and serve the configured apps
    Run(cli::RunArgs),

    /// Build and provision a configuration without activating it
    Validate(cli::ValidateArgs),

    /// Print a configuration file as the canonical JSON document
    Adapt(cli::AdaptArgs),

    /// Send a new configuration to a running process
    Reload(cli::ReloadArgs),

    /// Ask a running process to stop
    Stop(cli::StopArgs),

    /// List registered modules
    ListModules(cli::ListModulesArgs),

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli.command).await {
        eprintln!("Error: {:#}", e);
        return ExitCode::from(error::exit_code(&e));
    }
    ExitCode::SUCCESS
}

async fn dispatch(command: Commands) -> anyhow::Result<()> {
    // Composition root: every module this binary ships is registered here,
    // then the table is sealed and passed down explicitly.
    let mut builder = RegistryBuilder::new();
    modules::register_standard(&mut builder)?;
    let registry = builder.seal();

    match command {
        Commands::Run(args) => cli::run::run(args, registry).await,
        Commands::Validate(args) => cli::validate::run(args, registry).await,
        Commands::Adapt(args) => cli::adapt::run(args, registry).await,
        Commands::Reload(args) => cli::control::reload(args).await,
        Commands::Stop(args) => cli::control::stop(args).await,
        Commands::ListModules(args) => cli::list_modules::run(args, registry).await,
        Commands::Version => {
            println!("fe-host {}", fe_host::VERSION);
            Ok(())
        }
    }
}
