// Shared test helpers
#![allow(dead_code)]

use chrono::{DateTime, Duration, Local, TimeZone};
use diskmon::models::*;
use diskmon::source::{CounterSource, TransportError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Fixed origin so timestamps are reproducible (2026-01-01T12:00:00Z).
pub fn base_time() -> DateTime<Local> {
    Local.timestamp_opt(1_767_268_800, 0).unwrap()
}

pub fn at(secs: i64) -> DateTime<Local> {
    base_time() + Duration::seconds(secs)
}

pub fn file_row(database_id: i32, database: &str, file_id: i32, drive: &str) -> SnapshotRow {
    SnapshotRow {
        database_id,
        database_name: database.into(),
        file_id,
        drive: drive.into(),
        path: format!("{}:\\data\\{}_{}.mdf", drive, database, file_id),
        type_desc: if file_id == 2 { "LOG" } else { "ROWS" }.into(),
        ..SnapshotRow::default()
    }
}

/// Row with read/write counters set; stalls and bytes stay zero.
pub fn counters(mut row: SnapshotRow, reads: i64, writes: i64) -> SnapshotRow {
    row.reads = reads;
    row.writes = writes;
    row
}

pub fn snapshot(secs: i64, rows: Vec<SnapshotRow>) -> Snapshot {
    Snapshot::new(at(secs), rows)
}

pub fn delta_row(database: &str, file_id: i32, drive: &str) -> DeltaRow {
    DeltaRow {
        database_name: database.into(),
        file_id,
        drive: drive.into(),
        path: format!("{}:\\data\\{}_{}.mdf", drive, database, file_id),
        type_desc: "ROWS".into(),
        ..DeltaRow::default()
    }
}

pub fn capture(secs: i64, rows: Vec<DeltaRow>) -> DeltaCapture {
    DeltaCapture {
        timestamp: at(secs),
        elapsed_seconds: 60.0,
        rows,
    }
}

pub fn history(captures: Vec<DeltaCapture>) -> Vec<Arc<DeltaCapture>> {
    captures.into_iter().map(Arc::new).collect()
}

/// Replays queued fetch results in order; an exhausted script fails the fetch.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<SnapshotRow>, TransportError>>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<SnapshotRow>, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }

    pub fn push(&self, result: Result<Vec<SnapshotRow>, TransportError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().unwrap().len()
    }
}

impl CounterSource for ScriptedSource {
    async fn fetch_rows(&self) -> Result<Vec<SnapshotRow>, TransportError> {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Failed("script exhausted".into())))
    }
}
