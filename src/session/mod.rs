// Session files: versioned JSON of the capture history, with time-range filtering on load.

pub mod export;

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::instrument;

use crate::models::{DeltaCapture, SessionData};

const SUPPORTED_MAJOR: &str = "1";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed session: {0}")]
    Malformed(String),
    #[error("no captures match the selected time range")]
    EmptyResult,
    #[error("session path must stay inside the export directory: {0}")]
    InvalidPath(String),
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Malformed(e.to_string())
    }
}

pub fn serialize(
    server: &str,
    captured_at: DateTime<Local>,
    interval_seconds: u32,
    captures: &[DeltaCapture],
) -> Result<Vec<u8>, SessionError> {
    let session = SessionData::new(server, captured_at, interval_seconds, captures.to_vec());
    serialize_session(&session)
}

pub fn serialize_session(session: &SessionData) -> Result<Vec<u8>, SessionError> {
    Ok(serde_json::to_vec_pretty(session)?)
}

/// Parses a session. Unknown fields are ignored; a foreign major version or an
/// empty capture list is `Malformed`.
pub fn deserialize(bytes: &[u8]) -> Result<SessionData, SessionError> {
    let session: SessionData = serde_json::from_slice(bytes)?;
    let major = session.version.split('.').next().unwrap_or_default().trim();
    if major != SUPPORTED_MAJOR {
        return Err(SessionError::Malformed(format!(
            "unsupported session version {}",
            session.version
        )));
    }
    if session.captures.is_empty() {
        return Err(SessionError::Malformed("session has no captures".into()));
    }
    Ok(session)
}

/// Keeps captures with `from <= timestamp <= to`; either bound may be open.
pub fn filter_by_time_range(
    session: SessionData,
    from: Option<DateTime<Local>>,
    to: Option<DateTime<Local>>,
) -> Result<SessionData, SessionError> {
    let kept: Vec<DeltaCapture> = session
        .captures
        .iter()
        .filter(|c| {
            from.is_none_or(|f| c.timestamp >= f) && to.is_none_or(|t| c.timestamp <= t)
        })
        .cloned()
        .collect();
    if kept.is_empty() {
        return Err(SessionError::EmptyResult);
    }
    Ok(SessionData {
        captures: kept,
        ..session
    })
}

/// Joins a client-supplied relative name onto `base`. Absolute paths, drive
/// prefixes and `..` are rejected.
pub fn resolve_in(base: &Path, name: &str) -> Result<PathBuf, SessionError> {
    let relative = Path::new(name);
    let mut clean = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(SessionError::InvalidPath(name.to_string()));
            }
        }
    }
    // `C:\x` and `..\x` parse as plain names on unix
    if clean.as_os_str().is_empty() || name.contains('\\') || name.contains(':') {
        return Err(SessionError::InvalidPath(name.to_string()));
    }
    Ok(base.join(clean))
}

#[instrument(
    skip(session),
    fields(operation = "save_session", captures = session.captures.len())
)]
pub async fn save(path: &Path, session: &SessionData) -> Result<(), SessionError> {
    let bytes = serialize_session(session)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[instrument(fields(operation = "load_session"))]
pub async fn load(path: &Path) -> Result<SessionData, SessionError> {
    let bytes = tokio::fs::read(path).await?;
    deserialize(&bytes)
}

pub fn default_session_file_name(now: DateTime<Local>) -> String {
    format!("DiskMonitorSession_{}.json", now.format("%Y%m%d_%H%M%S"))
}
