// Grouping dimensions, group identity and the six charted metrics.

use serde::{Deserialize, Serialize};

use super::DeltaRow;

/// Filter sentinel meaning "no filter on this dimension".
pub const ALL_FILTER: &str = "(All)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupBy {
    #[default]
    Database,
    Drive,
    File,
}

impl GroupBy {
    /// Group key for a row: database name, `drive:` or `database:fileId`.
    pub fn key(self, row: &DeltaRow) -> String {
        match self {
            GroupBy::Database => row.database_name.clone(),
            GroupBy::Drive => format!("{}:", row.drive),
            GroupBy::File => format!("{}:{}", row.database_name, row.file_id),
        }
    }

    /// Parse a UI label; unknown labels fall back to `Database`.
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "drive" => GroupBy::Drive,
            "file" => GroupBy::File,
            _ => GroupBy::Database,
        }
    }
}

/// Display attributes for a group, taken from the first row seen with its key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub database_name: String,
    pub type_desc: String,
    pub file_id: i32,
    pub drive: String,
    pub path: String,
}

impl From<&DeltaRow> for GroupInfo {
    fn from(row: &DeltaRow) -> Self {
        Self {
            database_name: row.database_name.clone(),
            type_desc: row.type_desc.clone(),
            file_id: row.file_id,
            drive: row.drive.clone(),
            path: row.path.clone(),
        }
    }
}

impl GroupInfo {
    /// Legend label for a file group: file name plus `[fileId]`.
    pub fn file_label(&self) -> String {
        let name = self
            .path
            .rsplit(['\\', '/'])
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.path);
        format!("{} [{}]", name, self.file_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    ReadLatency,
    WriteLatency,
    ReadIops,
    WriteIops,
    ReadMbps,
    WriteMbps,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::ReadLatency,
        Metric::WriteLatency,
        Metric::ReadIops,
        Metric::WriteIops,
        Metric::ReadMbps,
        Metric::WriteMbps,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn title(self) -> &'static str {
        match self {
            Metric::ReadLatency => "Avg Read Latency (ms)",
            Metric::WriteLatency => "Avg Write Latency (ms)",
            Metric::ReadIops => "Read IOPS",
            Metric::WriteIops => "Write IOPS",
            Metric::ReadMbps => "Read Throughput (MB/s)",
            Metric::WriteMbps => "Write Throughput (MB/s)",
        }
    }
}
