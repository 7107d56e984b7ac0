// Persisted capture history (session file).

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::DeltaCapture;

/// Format version written by this build. Readers accept any `1.x`.
pub const SESSION_VERSION: &str = "1.0";

pub const APPLICATION_TAG: &str = concat!("diskmon v", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub version: String,
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub server: String,
    #[serde(with = "super::timestamp")]
    pub captured_at: DateTime<Local>,
    #[serde(default)]
    pub interval_seconds: u32,
    #[serde(default)]
    pub captures: Vec<DeltaCapture>,
}

impl SessionData {
    pub fn new(
        server: impl Into<String>,
        captured_at: DateTime<Local>,
        interval_seconds: u32,
        captures: Vec<DeltaCapture>,
    ) -> Self {
        Self {
            version: SESSION_VERSION.to_string(),
            application: APPLICATION_TAG.to_string(),
            server: server.into(),
            captured_at,
            interval_seconds,
            captures,
        }
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Local>> {
        self.captures.first().map(|c| c.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Local>> {
        self.captures.last().map(|c| c.timestamp)
    }
}
