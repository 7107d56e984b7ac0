// Per-interval normalized metrics derived from two consecutive snapshots.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::delta::saturating_total;

/// Rates and raw deltas for one file over one interval. All values are >= 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRow {
    pub database_name: String,
    pub file_id: i32,
    pub drive: String,
    pub path: String,
    pub type_desc: String,
    #[serde(rename = "readLatency")]
    pub read_latency_ms: f64,
    #[serde(rename = "writeLatency")]
    pub write_latency_ms: f64,
    pub read_iops: f64,
    pub write_iops: f64,
    pub read_mbps: f64,
    pub write_mbps: f64,
    pub delta_reads: i64,
    pub delta_read_stall: i64,
    pub delta_writes: i64,
    pub delta_write_stall: i64,
}

impl DeltaRow {
    pub fn has_io(&self) -> bool {
        self.delta_reads != 0 || self.delta_writes != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaCapture {
    #[serde(with = "super::timestamp")]
    pub timestamp: DateTime<Local>,
    pub elapsed_seconds: f64,
    #[serde(default)]
    pub rows: Vec<DeltaRow>,
}

/// Status-line figures for one capture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureSummary {
    pub active_files: usize,
    pub total_files: usize,
    pub delta_reads: i64,
    pub delta_writes: i64,
}

impl From<&DeltaCapture> for CaptureSummary {
    fn from(capture: &DeltaCapture) -> Self {
        Self {
            active_files: capture.rows.iter().filter(|r| r.has_io()).count(),
            total_files: capture.rows.len(),
            delta_reads: saturating_total(capture.rows.iter().map(|r| r.delta_reads)),
            delta_writes: saturating_total(capture.rows.iter().map(|r| r.delta_writes)),
        }
    }
}
