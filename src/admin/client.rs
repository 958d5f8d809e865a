use super::{ControlRequest, ControlResponse};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

/// Talks to the admin socket of a running process.
pub struct AdminClient {
    socket_path: PathBuf,
}

impl AdminClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    pub async fn send(&self, request: &ControlRequest) -> Result<ControlResponse> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to admin socket {} (is the server running?)",
                    self.socket_path.display()
                )
            })?;
        let (reader, mut writer) = stream.into_split();

        let mut line = serde_json::to_vec(request).context("Failed to encode request")?;
        line.push(b'\n');
        writer.write_all(&line).await.context("Failed to send request")?;
        writer.flush().await?;

        let mut reply = String::new();
        BufReader::new(reader)
            .read_line(&mut reply)
            .await
            .context("Failed to read response")?;
        if reply.trim().is_empty() {
            anyhow::bail!("Admin socket closed without a response");
        }

        serde_json::from_str(reply.trim_end())
            .with_context(|| format!("Malformed response from admin socket: {}", reply.trim_end()))
    }
}
