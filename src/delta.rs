// Delta engine: turns two consecutive snapshots into per-file rates.
// Counter resets, zero elapsed time and unmatched rows are absorbed here, never raised.

use std::collections::HashMap;

use chrono::{DateTime, Local};

use crate::models::{DeltaCapture, DeltaRow, Snapshot, SnapshotRow};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Computes the interval between `previous` and `current`.
///
/// Rows in `current` with no `(database_id, file_id)` match in `previous` are
/// dropped: a rate needs two observations. Each counter delta is clamped at zero.
pub fn compute_delta(previous: &Snapshot, current: &Snapshot) -> DeltaCapture {
    let elapsed = elapsed_seconds(previous, current);
    let lookup: HashMap<(i32, i32), &SnapshotRow> =
        previous.rows.iter().map(|r| (r.identity(), r)).collect();

    let rows = current
        .rows
        .iter()
        .filter_map(|c| lookup.get(&c.identity()).map(|p| delta_row(p, c, elapsed)))
        .collect();

    DeltaCapture {
        timestamp: current.timestamp,
        elapsed_seconds: elapsed,
        rows,
    }
}

/// Seconds between the snapshots; 1 when the clock did not move forward.
pub fn elapsed_seconds(previous: &Snapshot, current: &Snapshot) -> f64 {
    let secs = seconds_between(previous.timestamp, current.timestamp);
    if secs <= 0.0 { 1.0 } else { secs }
}

/// Signed seconds from `from` to `to`, microsecond resolution.
pub(crate) fn seconds_between(from: DateTime<Local>, to: DateTime<Local>) -> f64 {
    let diff = to - from;
    diff.num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or_else(|| diff.num_milliseconds() as f64 / 1000.0)
}

fn delta_row(p: &SnapshotRow, c: &SnapshotRow, elapsed: f64) -> DeltaRow {
    let reads = counter_delta(c.reads, p.reads);
    let read_stall = counter_delta(c.read_stall_ms, p.read_stall_ms);
    let writes = counter_delta(c.writes, p.writes);
    let write_stall = counter_delta(c.write_stall_ms, p.write_stall_ms);
    let bytes_read = counter_delta(c.bytes_read, p.bytes_read);
    let bytes_written = counter_delta(c.bytes_written, p.bytes_written);

    DeltaRow {
        database_name: c.database_name.clone(),
        file_id: c.file_id,
        drive: c.drive.clone(),
        path: c.path.clone(),
        type_desc: c.type_desc.clone(),
        read_latency_ms: round_to(latency(read_stall, reads), 2),
        write_latency_ms: round_to(latency(write_stall, writes), 2),
        read_iops: round_to(reads as f64 / elapsed, 1),
        write_iops: round_to(writes as f64 / elapsed, 1),
        read_mbps: round_to(bytes_read as f64 / BYTES_PER_MB / elapsed, 2),
        write_mbps: round_to(bytes_written as f64 / BYTES_PER_MB / elapsed, 2),
        delta_reads: reads,
        delta_read_stall: read_stall,
        delta_writes: writes,
        delta_write_stall: write_stall,
    }
}

fn counter_delta(current: i64, previous: i64) -> i64 {
    current.saturating_sub(previous).max(0)
}

/// Sum of clamped counter deltas; pins at `i64::MAX` instead of overflowing.
pub fn saturating_total(values: impl IntoIterator<Item = i64>) -> i64 {
    values.into_iter().fold(0, i64::saturating_add)
}

/// Stall milliseconds per operation; 0 when there were no operations.
pub(crate) fn latency(stall_ms: i64, ops: i64) -> f64 {
    if ops > 0 {
        stall_ms as f64 / ops as f64
    } else {
        0.0
    }
}

/// Display rounding only; callers must not feed the result back into rate math.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
