// Aggregation pipeline: filter and group retained captures into per-metric series.
// Pure over its inputs apart from first-time color registrations.

pub mod color;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::delta::{latency, round_to, saturating_total, seconds_between};
use crate::models::{ALL_FILTER, DeltaCapture, DeltaRow, GroupBy, GroupInfo, Metric};
use color::{ColorRegistry, Rgb, assign_colors};

/// Filter and group selection for one rebuild.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderQuery {
    pub group_by: GroupBy,
    pub drive: Option<String>,
    pub database: Option<String>,
    pub hidden: BTreeSet<String>,
}

impl RenderQuery {
    pub fn new(group_by: GroupBy) -> Self {
        Self {
            group_by,
            ..Self::default()
        }
    }

    /// Both filters apply together; `None`, empty or `(All)` disables one.
    pub fn matches(&self, row: &DeltaRow) -> bool {
        active_filter(&self.drive).is_none_or(|d| row.drive == d)
            && active_filter(&self.database).is_none_or(|db| row.database_name == db)
    }
}

fn active_filter(f: &Option<String>) -> Option<&str> {
    f.as_deref().filter(|s| !s.is_empty() && *s != ALL_FILTER)
}

/// The six metrics for one group at one capture (or per-metric maxima).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValues {
    pub read_latency: f64,
    pub write_latency: f64,
    pub read_iops: f64,
    pub write_iops: f64,
    pub read_mbps: f64,
    pub write_mbps: f64,
}

impl MetricValues {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::ReadLatency => self.read_latency,
            Metric::WriteLatency => self.write_latency,
            Metric::ReadIops => self.read_iops,
            Metric::WriteIops => self.write_iops,
            Metric::ReadMbps => self.read_mbps,
            Metric::WriteMbps => self.write_mbps,
        }
    }

    fn raise_to(&mut self, other: &MetricValues) {
        self.read_latency = self.read_latency.max(other.read_latency);
        self.write_latency = self.write_latency.max(other.write_latency);
        self.read_iops = self.read_iops.max(other.read_iops);
        self.write_iops = self.write_iops.max(other.write_iops);
        self.read_mbps = self.read_mbps.max(other.read_mbps);
        self.write_mbps = self.write_mbps.max(other.write_mbps);
    }
}

/// Combines a group's rows: rates are summed, latency is total stall over total
/// operations so busier files weigh more.
pub fn aggregate_group(rows: &[&DeltaRow]) -> MetricValues {
    let reads = saturating_total(rows.iter().map(|r| r.delta_reads));
    let read_stall = saturating_total(rows.iter().map(|r| r.delta_read_stall));
    let writes = saturating_total(rows.iter().map(|r| r.delta_writes));
    let write_stall = saturating_total(rows.iter().map(|r| r.delta_write_stall));
    MetricValues {
        read_latency: round_to(latency(read_stall, reads), 2),
        write_latency: round_to(latency(write_stall, writes), 2),
        read_iops: round_to(rows.iter().map(|r| r.read_iops).sum(), 1),
        write_iops: round_to(rows.iter().map(|r| r.write_iops).sum(), 1),
        read_mbps: round_to(rows.iter().map(|r| r.read_mbps).sum(), 2),
        write_mbps: round_to(rows.iter().map(|r| r.write_mbps).sum(), 2),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSeries {
    pub key: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSeries {
    pub metric: Metric,
    pub title: &'static str,
    /// Visible groups in key order.
    pub groups: Vec<GroupSeries>,
}

/// One legend entry. Hidden groups stay in the universe with `hidden = true`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEntry {
    pub key: String,
    pub label: String,
    pub info: GroupInfo,
    pub color: Rgb,
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisMaxima {
    pub y: MetricValues,
    /// Seconds from the first retained capture to the last.
    pub x_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub group_by: GroupBy,
    pub origin: Option<DateTime<Local>>,
    pub groups: Vec<GroupEntry>,
    /// File grouping only: database → its file keys in order.
    pub database_files: BTreeMap<String, Vec<String>>,
    pub series: Vec<MetricSeries>,
    pub axis: AxisMaxima,
}

impl RenderOutput {
    fn empty(group_by: GroupBy) -> Self {
        Self {
            group_by,
            origin: None,
            groups: Vec::new(),
            database_files: BTreeMap::new(),
            series: Metric::ALL
                .iter()
                .map(|&metric| MetricSeries {
                    metric,
                    title: metric.title(),
                    groups: Vec::new(),
                })
                .collect(),
            axis: AxisMaxima::default(),
        }
    }

    pub fn series_for(&self, metric: Metric) -> &MetricSeries {
        &self.series[metric.index()]
    }

    pub fn color_of(&self, key: &str) -> Option<Rgb> {
        self.groups.iter().find(|g| g.key == key).map(|g| g.color)
    }
}

/// Every group key seen in any capture after filtering, with its first-seen attributes.
pub fn group_universe(
    history: &[Arc<DeltaCapture>],
    query: &RenderQuery,
) -> BTreeMap<String, GroupInfo> {
    let mut universe = BTreeMap::new();
    for capture in history {
        for row in capture.rows.iter().filter(|r| query.matches(r)) {
            universe
                .entry(query.group_by.key(row))
                .or_insert_with(|| GroupInfo::from(row));
        }
    }
    universe
}

/// Builds the chart model for `history` under `query`.
pub fn render(
    history: &[Arc<DeltaCapture>],
    query: &RenderQuery,
    registry: &mut ColorRegistry,
) -> RenderOutput {
    let mut out = RenderOutput::empty(query.group_by);
    let Some(first) = history.first() else {
        return out;
    };
    let origin = first.timestamp;
    out.origin = Some(origin);

    let universe = group_universe(history, query);
    if universe.is_empty() {
        return out;
    }
    let colors = assign_colors(registry, query.group_by, &universe);

    let mut per_key: BTreeMap<&str, Vec<(f64, MetricValues)>> = BTreeMap::new();
    for capture in history {
        let x = seconds_between(origin, capture.timestamp);
        out.axis.x_max = out.axis.x_max.max(x);

        let mut groups: BTreeMap<String, Vec<&DeltaRow>> = BTreeMap::new();
        for row in capture.rows.iter().filter(|r| query.matches(r)) {
            groups.entry(query.group_by.key(row)).or_default().push(row);
        }
        for (key, rows) in groups {
            if query.hidden.contains(&key) {
                continue;
            }
            let values = aggregate_group(&rows);
            out.axis.y.raise_to(&values);
            if let Some((k, _)) = universe.get_key_value(&key) {
                per_key.entry(k.as_str()).or_default().push((x, values));
            }
        }
    }

    for (key, info) in &universe {
        let hidden = query.hidden.contains(key);
        let label = match query.group_by {
            GroupBy::File => info.file_label(),
            _ => key.clone(),
        };
        out.groups.push(GroupEntry {
            key: key.clone(),
            label,
            info: info.clone(),
            color: colors.get(key).copied().unwrap_or(Rgb::new(0x80, 0x80, 0x80)),
            hidden,
        });
        if query.group_by == GroupBy::File {
            out.database_files
                .entry(info.database_name.clone())
                .or_default()
                .push(key.clone());
        }
    }

    for series in &mut out.series {
        series.groups = per_key
            .iter()
            .map(|(key, points)| GroupSeries {
                key: key.to_string(),
                points: points
                    .iter()
                    .map(|(x, v)| Point {
                        x: *x,
                        y: v.get(series.metric),
                    })
                    .collect(),
            })
            .collect();
    }
    out
}

/// Distinct drives and databases present in the history, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub drives: Vec<String>,
    pub databases: Vec<String>,
}

pub fn available_filters(history: &[Arc<DeltaCapture>]) -> FilterOptions {
    let mut drives = BTreeSet::new();
    let mut databases = BTreeSet::new();
    for row in history.iter().flat_map(|c| c.rows.iter()) {
        drives.insert(row.drive.as_str());
        databases.insert(row.database_name.as_str());
    }
    FilterOptions {
        drives: drives.into_iter().map(str::to_string).collect(),
        databases: databases.into_iter().map(str::to_string).collect(),
    }
}
