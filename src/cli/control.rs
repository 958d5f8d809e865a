use super::ConfigSource;
use crate::admin::{AdminClient, ControlRequest, ControlResponse};
use crate::config::{adapter, default_admin_socket};
use crate::error::RemoteError;
use anyhow::{Context, Result};
use clap::Args;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Args)]
pub struct ReloadArgs {
    #[command(flatten)]
    pub source: ConfigSource,

    /// Admin socket of the running process. Defaults to `admin.unix_socket`
    /// from the configuration being sent.
    #[arg(long)]
    pub address: Option<PathBuf>,

    /// Send SIGUSR1 to this process instead; it re-reads its own config file
    #[arg(long, conflicts_with = "address")]
    pub pid: Option<i32>,
}

#[derive(Args)]
pub struct StopArgs {
    /// Admin socket of the running process
    #[arg(long)]
    pub address: Option<PathBuf>,

    /// Send SIGTERM to this process instead
    #[arg(long, conflicts_with = "address")]
    pub pid: Option<i32>,
}

pub async fn reload(args: ReloadArgs) -> Result<()> {
    if let Some(pid) = args.pid {
        return send_signal(pid, Signal::SIGUSR1);
    }

    let adapted = adapter::load(&args.source.config, args.source.adapter.as_deref())?;
    for warning in &adapted.warnings {
        eprintln!("{}", warning);
    }

    let address = args.address.unwrap_or_else(|| socket_in(&adapted.value));
    let response = AdminClient::new(&address)
        .send(&ControlRequest::Reload {
            config: adapted.value,
        })
        .await?;
    finish(response)
}

pub async fn stop(args: StopArgs) -> Result<()> {
    if let Some(pid) = args.pid {
        return send_signal(pid, Signal::SIGTERM);
    }

    let address = args.address.unwrap_or_else(default_admin_socket);
    let response = AdminClient::new(&address).send(&ControlRequest::Stop).await?;
    finish(response)
}

fn socket_in(document: &Value) -> PathBuf {
    document
        .pointer("/admin/unix_socket")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_else(default_admin_socket)
}

fn send_signal(pid: i32, signal: Signal) -> Result<()> {
    kill(Pid::from_raw(pid), signal)
        .with_context(|| format!("Failed to send {} to process {}", signal, pid))?;
    println!(" Sent {} to process {}", signal, pid);
    Ok(())
}

fn finish(response: ControlResponse) -> Result<()> {
    if response.ok {
        println!(" {}", response.message);
        return Ok(());
    }
    let exit_code = response.exit_code();
    Err(RemoteError {
        message: response.message,
        exit_code,
    }
    .into())
}
