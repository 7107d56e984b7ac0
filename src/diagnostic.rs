// Two-snapshot dump: raw per-file counter deltas, used to check whether the server
// is doing any physical I/O at all before blaming the charts.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::time::{Duration, sleep, timeout};

use crate::delta::seconds_between;
use crate::models::{Snapshot, SnapshotRow};
use crate::source::{CounterSource, TransportError};

/// Gap between the two snapshots; just over a second so counters get a chance to move.
pub const DIAGNOSTIC_GAP: Duration = Duration::from_millis(1100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticRow {
    pub database_name: String,
    pub file_id: i32,
    pub drive: String,
    pub first_reads: i64,
    pub second_reads: i64,
    /// Not clamped: a negative value means the counters were reset.
    pub delta_reads: i64,
    pub first_writes: i64,
    pub second_writes: i64,
    pub delta_writes: i64,
}

impl DiagnosticRow {
    pub fn has_io(&self) -> bool {
        self.delta_reads != 0 || self.delta_writes != 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub server: String,
    pub taken_at: DateTime<Local>,
    pub first_at: DateTime<Local>,
    pub second_at: DateTime<Local>,
    pub elapsed_seconds: f64,
    pub first_rows: usize,
    pub second_rows: usize,
    pub rows: Vec<DiagnosticRow>,
    pub files_with_io: usize,
}

impl DiagnosticReport {
    /// Pipe-separated text dump, one line per matched file; files with I/O are starred.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "=== Diagnostic @ {} ===",
            self.taken_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out, "Server: {}", self.server);
        let _ = writeln!(
            out,
            "Snap1: {} Rows:{}  Snap2: {} Rows:{}",
            self.first_at.format("%H:%M:%S%.3f"),
            self.first_rows,
            self.second_at.format("%H:%M:%S%.3f"),
            self.second_rows
        );
        let _ = writeln!(out, "Elapsed: {:.3}s", self.elapsed_seconds);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Database|FileId|Drive|S1_Reads|S2_Reads|dR|S1_Writes|S2_Writes|dW"
        );
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{}|{}|{}|{}|{}|{}|{}|{}|{}{}",
                row.database_name,
                row.file_id,
                row.drive,
                row.first_reads,
                row.second_reads,
                row.delta_reads,
                row.first_writes,
                row.second_writes,
                row.delta_writes,
                if row.has_io() { " ***" } else { "" }
            );
        }
        let _ = writeln!(out);
        if self.files_with_io == 0 {
            let _ = writeln!(
                out,
                "Active: 0/{}. No physical IO; the data may be served from cache.",
                self.second_rows
            );
        } else {
            let _ = writeln!(
                out,
                "Active: {}/{}. {} files had IO",
                self.files_with_io, self.second_rows, self.files_with_io
            );
        }
        out
    }
}

/// Compares two snapshots file by file. Rows present in only one snapshot are skipped.
pub fn compare(server: impl Into<String>, first: &Snapshot, second: &Snapshot) -> DiagnosticReport {
    let lookup: HashMap<(i32, i32), &SnapshotRow> =
        first.rows.iter().map(|r| (r.identity(), r)).collect();
    let rows: Vec<DiagnosticRow> = second
        .rows
        .iter()
        .filter_map(|c| {
            lookup.get(&c.identity()).map(|p| DiagnosticRow {
                database_name: c.database_name.clone(),
                file_id: c.file_id,
                drive: c.drive.clone(),
                first_reads: p.reads,
                second_reads: c.reads,
                delta_reads: c.reads.wrapping_sub(p.reads),
                first_writes: p.writes,
                second_writes: c.writes,
                delta_writes: c.writes.wrapping_sub(p.writes),
            })
        })
        .collect();
    let files_with_io = rows.iter().filter(|r| r.has_io()).count();

    DiagnosticReport {
        server: server.into(),
        taken_at: Local::now(),
        first_at: first.timestamp,
        second_at: second.timestamp,
        elapsed_seconds: seconds_between(first.timestamp, second.timestamp),
        first_rows: first.rows.len(),
        second_rows: second.rows.len(),
        rows,
        files_with_io,
    }
}

async fn fetch<S: CounterSource>(
    source: &S,
    fetch_timeout: Duration,
) -> Result<Snapshot, TransportError> {
    let rows = timeout(fetch_timeout, source.fetch_rows())
        .await
        .map_err(|_| TransportError::Timeout(fetch_timeout.as_secs()))??;
    Ok(Snapshot::new(Local::now(), rows))
}

/// Takes two snapshots [`DIAGNOSTIC_GAP`] apart and compares them.
/// Independent of the sampler: neither snapshot touches the retained history.
pub async fn run<S: CounterSource>(
    server: impl Into<String>,
    source: &S,
    fetch_timeout: Duration,
) -> Result<DiagnosticReport, TransportError> {
    let first = fetch(source, fetch_timeout).await?;
    sleep(DIAGNOSTIC_GAP).await;
    let second = fetch(source, fetch_timeout).await?;
    let report = compare(server, &first, &second);
    tracing::info!(
        operation = "diagnostic",
        rows = report.rows.len(),
        files_with_io = report.files_with_io,
        "diagnostic taken"
    );
    Ok(report)
}

/// `DiskMonitorDiag_yyyyMMdd_HHmmss.txt`
pub fn default_diagnostic_file_name(now: DateTime<Local>) -> String {
    format!("DiskMonitorDiag_{}.txt", now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(database_id: i32, file_id: i32, reads: i64, writes: i64) -> SnapshotRow {
        SnapshotRow {
            database_id,
            database_name: format!("db{database_id}"),
            file_id,
            drive: "C".into(),
            reads,
            writes,
            ..SnapshotRow::default()
        }
    }

    fn at(ms: i64) -> DateTime<Local> {
        Local.timestamp_millis_opt(1_767_268_800_000 + ms).unwrap()
    }

    #[test]
    fn compare_keeps_raw_deltas() {
        let first = Snapshot::new(
            at(0),
            vec![row(1, 1, 100, 50), row(2, 1, 10, 10), row(3, 1, 0, 0)],
        );
        let second = Snapshot::new(at(1_100), vec![row(1, 1, 40, 50), row(2, 1, 10, 12)]);
        let report = compare("srv", &first, &second);
        assert_eq!(report.first_rows, 3);
        assert_eq!(report.second_rows, 2);
        assert_eq!(report.elapsed_seconds, 1.1);
        assert_eq!(report.rows.len(), 2);
        // reset counters show up negative here
        assert_eq!(report.rows[0].delta_reads, -60);
        assert_eq!(report.rows[1].delta_writes, 2);
        assert_eq!(report.files_with_io, 2);
    }

    #[test]
    fn text_dump_marks_active_files() {
        let first = Snapshot::new(at(0), vec![row(1, 1, 5, 5), row(2, 2, 5, 5)]);
        let second = Snapshot::new(at(1_100), vec![row(1, 1, 6, 5), row(2, 2, 5, 5)]);
        let text = compare("SQLPROD01", &first, &second).to_text();
        assert!(text.contains("Server: SQLPROD01"));
        assert!(text.contains("Elapsed: 1.100s"));
        assert!(text.contains("db1|1|C|5|6|1|5|5|0 ***"));
        assert!(text.contains("db2|2|C|5|5|0|5|5|0\n"));
        assert!(text.contains("Active: 1/2"));
    }

    #[test]
    fn quiet_server_hint() {
        let snap = Snapshot::new(at(0), vec![row(1, 1, 5, 5)]);
        let text = compare("srv", &snap, &snap).to_text();
        assert!(text.contains("No physical IO"));
    }
}
