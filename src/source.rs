// Counter source seam: whatever talks to the database server hands back raw rows here.

use std::future::Future;

use thiserror::Error;
use tokio::process::Command;
use tracing::instrument;

use crate::config::SourceConfig;
use crate::models::SnapshotRow;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("counter query timed out after {0}s")]
    Timeout(u64),
    #[error("counter query failed: {0}")]
    Failed(String),
    #[error("connection lost: {0}")]
    Disconnected(String),
}

/// Returns the full current set of file counter rows for one instant.
pub trait CounterSource: Send + Sync + 'static {
    fn fetch_rows(&self) -> impl Future<Output = Result<Vec<SnapshotRow>, TransportError>> + Send;
}

/// Runs an external command (e.g. a `sqlcmd` wrapper) whose stdout is a JSON array of rows.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }
}

impl CounterSource for CommandSource {
    #[instrument(
        skip(self),
        fields(source = "command", operation = "fetch_rows", program = %self.program)
    )]
    async fn fetch_rows(&self) -> Result<Vec<SnapshotRow>, TransportError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TransportError::Disconnected(format!("{}: {}", self.program, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        let rows = parse_rows(&output.stdout)?;
        tracing::debug!(rows = rows.len(), "counter rows fetched");
        Ok(rows)
    }
}

/// Parses a JSON array of rows (camelCase or native column names).
pub fn parse_rows(bytes: &[u8]) -> Result<Vec<SnapshotRow>, TransportError> {
    serde_json::from_slice(bytes)
        .map_err(|e| TransportError::Failed(format!("unparsable counter rows: {}", e)))
}
