// Tabular export: one line per file per capture.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::{DateTime, Local};
use csv::{QuoteStyle, WriterBuilder};

use super::SessionError;
use crate::models::DeltaCapture;

pub const CSV_HEADER: [&str; 12] = [
    "Timestamp",
    "Database",
    "FileId",
    "Drive",
    "Path",
    "Type",
    "ReadLat_ms",
    "WriteLat_ms",
    "ReadIOPS",
    "WriteIOPS",
    "ReadMBps",
    "WriteMBps",
];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn quoted(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Quotes only when the field would otherwise split or break the line.
fn bare(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(quoted(field))
    } else {
        Cow::Borrowed(field)
    }
}

/// Header line plain. In data lines the path is always quoted and the other fields
/// are bare; numbers use the shortest form (`1`, `0.25`).
pub fn export_csv(captures: &[Arc<DeltaCapture>]) -> Result<Vec<u8>, SessionError> {
    let mut w = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Never)
        .from_writer(Vec::new());
    w.write_record(CSV_HEADER)?;
    for capture in captures {
        let timestamp = capture.timestamp.format(TIMESTAMP_FORMAT).to_string();
        for r in &capture.rows {
            let fields = [
                Cow::Borrowed(timestamp.as_str()),
                bare(&r.database_name),
                Cow::Owned(r.file_id.to_string()),
                bare(&r.drive),
                Cow::Owned(quoted(&r.path)),
                bare(&r.type_desc),
                Cow::Owned(r.read_latency_ms.to_string()),
                Cow::Owned(r.write_latency_ms.to_string()),
                Cow::Owned(r.read_iops.to_string()),
                Cow::Owned(r.write_iops.to_string()),
                Cow::Owned(r.read_mbps.to_string()),
                Cow::Owned(r.write_mbps.to_string()),
            ];
            w.write_record(fields.iter().map(|f| f.as_bytes()))?;
        }
    }
    w.into_inner().map_err(|e| SessionError::Io(e.into_error()))
}

pub fn default_csv_file_name(now: DateTime<Local>) -> String {
    format!("DiskMonitorData_{}.csv", now.format("%Y%m%d_%H%M%S"))
}
