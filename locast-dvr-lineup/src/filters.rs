//! Small value formatters used when rendering lineups and guide data.
//!
//! All epoch based helpers take milliseconds and format in UTC unless a
//! time zone is passed explicitly.

use std::sync::OnceLock;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;

fn channel_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+\.\d+ (.+)").expect("static regex"))
}

/// Strip a leading `X.Y ` channel prefix from a call sign.
///
/// `"4.1 CBS"` becomes `"CBS"`, anything else is returned unchanged.
pub fn name_only(value: &str) -> &str {
    match channel_prefix().captures(value).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => value,
    }
}

/// Picture aspect derived from free-form video properties.
pub fn aspect(value: &str) -> &'static str {
    if value.contains("1080") || value.contains("720") || value.contains("HDTV") {
        "16:9"
    } else {
        "4:3"
    }
}

/// Picture quality derived from free-form video properties.
pub fn quality(value: &str) -> &'static str {
    if value.contains("HDTV") {
        "HDTV"
    } else {
        "SD"
    }
}

/// `epoch_ms` as a UTC timestamp, or `None` when chrono cannot represent it.
pub fn utc_from_millis(epoch_ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(epoch_ms).single()
}

// Out-of-range timestamps format as an empty string.
fn format_utc(epoch_ms: i64, fmt: &str) -> String {
    utc_from_millis(epoch_ms)
        .map(|t| t.format(fmt).to_string())
        .unwrap_or_default()
}

/// `YYYYMMDD`
pub fn format_date(epoch_ms: i64) -> String {
    format_utc(epoch_ms, "%Y%m%d")
}

/// `YYYY-MM-DD`
pub fn format_date_iso(epoch_ms: i64) -> String {
    format_utc(epoch_ms, "%Y-%m-%d")
}

/// `YYYYMMDDHHMMSS`
pub fn format_time(epoch_ms: i64) -> String {
    format_utc(epoch_ms, "%Y%m%d%H%M%S")
}

/// `YYYY-MM-DD HH:MM:SS` as wall-clock time in `tz`.
pub fn format_time_local_iso<Tz>(epoch_ms: i64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    utc_from_millis(epoch_ms)
        .map(|t| t.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}
