// Local-time (de)serialization for capture timestamps.
// Writes RFC 3339 with offset; reads RFC 3339 or a naive local datetime.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone};
use serde::{Deserialize, Deserializer, Serializer, de};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn serialize<S: Serializer>(ts: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, false))
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Local>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_local(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {raw}")))
}

/// Parse an RFC 3339 timestamp, or a naive `yyyy-MM-dd[T ]HH:mm:ss[.f]` read as local time.
pub fn parse_local(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Local));
    }
    NAIVE_FORMATS.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(raw, fmt).ok()?;
        Local.from_local_datetime(&naive).earliest()
    })
}
