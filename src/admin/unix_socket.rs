use super::{ControlRequest, ControlResponse};
use crate::config::Config;
use crate::error::{ErrorCategory, StartError};
use crate::host::Host;
use crate::metrics;
use crate::server::ShutdownCoordinator;
use anyhow::Result;
use serde_json::{json, Value};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

pub struct UnixSocketServer {
    socket_path: PathBuf,
    host: Arc<Host>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl UnixSocketServer {
    pub fn new(socket_path: PathBuf, host: Arc<Host>, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self {
            socket_path,
            host,
            shutdown,
        }
    }

    pub fn bind(&self) -> Result<UnixListener, StartError> {
        let failed =
            |e: std::io::Error| StartError::new("admin socket", self.socket_path.display(), e);

        // Remove a stale socket left by a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(failed)?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(failed)?;
        std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o600))
            .map_err(failed)?;
        Ok(listener)
    }

    pub fn remove_socket(&self) {
        if let Err(e) = std::fs::remove_file(&self.socket_path) {
            warn!("Failed to remove admin socket {}: {}", self.socket_path.display(), e);
        }
    }

    pub async fn serve(self: Arc<Self>, listener: UnixListener) -> Result<()> {
        info!("Admin Unix socket listening on: {}", self.socket_path.display());
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = server.serve_connection(stream).await {
                                    debug!("Admin connection ended: {:#}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept Unix socket connection: {}", e);
                        }
                    }
                }

                _ = shutdown_rx.recv() => break,
            }
        }

        self.remove_socket();
        Ok(())
    }

    async fn serve_connection(&self, stream: UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let (response, stop) = match serde_json::from_str::<ControlRequest>(&line) {
                Ok(ControlRequest::Stop) => (ControlResponse::success("stopping", Value::Null), true),
                Ok(request) => (self.dispatch(request).await, false),
                Err(e) => (ControlResponse::failure(format!("invalid request: {}", e), 1), false),
            };

            let mut out = serde_json::to_vec(&response)?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;

            if stop {
                info!("Stop requested over admin socket");
                self.shutdown.trigger();
                break;
            }
        }
        Ok(())
    }

    /// Execute every command except `stop`, which needs the connection to
    /// acknowledge before the process begins shutting down.
    pub async fn dispatch(&self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Reload { config } => self.reload(config).await,
            ControlRequest::Status => match serde_json::to_value(self.host.status()) {
                Ok(status) => ControlResponse::success("status", status),
                Err(e) => ControlResponse::failure(e.to_string(), 1),
            },
            ControlRequest::Metrics => match metrics::export_metrics() {
                Ok(text) => ControlResponse::success("metrics", Value::String(text)),
                Err(e) => ControlResponse::failure(format!("{:#}", e), 1),
            },
            ControlRequest::Stop => {
                self.shutdown.trigger();
                ControlResponse::success("stopping", Value::Null)
            }
        }
    }

    async fn reload(&self, document: Value) -> ControlResponse {
        let config = match Config::from_value(document) {
            Ok(config) => config,
            Err(e) => {
                metrics::record_reload("rejected");
                return ControlResponse::failure(e.to_string(), ErrorCategory::Validation.exit_code());
            }
        };

        match self.host.reload(&config).await {
            Ok(outcome) => ControlResponse::success(
                format!("configuration generation {} is live", outcome.generation),
                json!({
                    "generation": outcome.generation,
                    "previous_generation": outcome.previous_generation,
                    "drain_timed_out": outcome.drain.is_err(),
                    "deactivation_failures": outcome.failures,
                }),
            ),
            Err(e) => ControlResponse::failure(e.to_string(), e.category().exit_code()),
        }
    }
}
