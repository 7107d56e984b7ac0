// Raw cumulative counters for every monitored file at one instant.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One file's cumulative I/O counters. Identity is `(database_id, file_id)`.
///
/// Accepts the server's native column names so a transport can hand its result
/// set over unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRow {
    #[serde(alias = "database_id")]
    pub database_id: i32,
    #[serde(alias = "database_name", default)]
    pub database_name: String,
    #[serde(alias = "file_id")]
    pub file_id: i32,
    #[serde(alias = "drive_letter", default)]
    pub drive: String,
    #[serde(alias = "physical_name", default)]
    pub path: String,
    #[serde(alias = "type_desc", default)]
    pub type_desc: String,
    #[serde(alias = "num_of_reads", default)]
    pub reads: i64,
    #[serde(alias = "io_stall_read_ms", default)]
    pub read_stall_ms: i64,
    #[serde(alias = "num_of_writes", default)]
    pub writes: i64,
    #[serde(alias = "io_stall_write_ms", default)]
    pub write_stall_ms: i64,
    #[serde(alias = "num_of_bytes_read", default)]
    pub bytes_read: i64,
    #[serde(alias = "num_of_bytes_written", default)]
    pub bytes_written: i64,
}

impl SnapshotRow {
    pub fn identity(&self) -> (i32, i32) {
        (self.database_id, self.file_id)
    }
}

/// All rows read in one sampling tick. Never mutated after capture.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: DateTime<Local>,
    pub rows: Vec<SnapshotRow>,
}

impl Snapshot {
    pub fn new(timestamp: DateTime<Local>, rows: Vec<SnapshotRow>) -> Self {
        Self { timestamp, rows }
    }
}
