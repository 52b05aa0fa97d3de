// src/export.rs
//
// Buffer export in txt/csv/json with timestamp-range and text filtering.
// The filter string is tried as a case-insensitive regex and falls back to
// a plain case-sensitive substring match when it does not compile.

use chrono::{SecondsFormat, TimeZone, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MonitorError;
use crate::types::{Direction, LineEntry, SendMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Txt,
    Csv,
    Json,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    pub format: ExportFormat,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub filter: Option<String>,
}

/// ISO-8601 rendering of a millisecond timestamp.
fn iso_time(timestamp_ms: i64) -> String {
    match Utc.timestamp_millis_opt(timestamp_ms) {
        chrono::LocalResult::Single(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        _ => format!("invalid({})", timestamp_ms),
    }
}

fn make_matcher(filter: &str) -> Box<dyn Fn(&str) -> bool + '_> {
    match RegexBuilder::new(filter).case_insensitive(true).build() {
        Ok(re) => Box::new(move |data: &str| re.is_match(data)),
        Err(e) => {
            debug!("[export] filter is not a regex ({}), using substring match", e);
            Box::new(move |data: &str| data.contains(filter))
        }
    }
}

/// Apply the time range and text filter, then render in the requested
/// format.
pub fn export_entries(
    entries: &[LineEntry],
    options: &ExportOptions,
) -> Result<String, MonitorError> {
    let matcher = options.filter.as_deref().map(make_matcher);

    let selected: Vec<&LineEntry> = entries
        .iter()
        .filter(|entry| {
            if let Some(start) = options.start_time {
                if entry.timestamp < start {
                    return false;
                }
            }
            if let Some(end) = options.end_time {
                if entry.timestamp > end {
                    return false;
                }
            }
            matcher.as_ref().map_or(true, |m| m(&entry.data))
        })
        .collect();

    match options.format {
        ExportFormat::Txt => Ok(render_txt(&selected)),
        ExportFormat::Csv => Ok(render_csv(&selected)),
        ExportFormat::Json => render_json(&selected),
    }
}

fn render_txt(entries: &[&LineEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let (label, arrow) = match entry.direction {
            Direction::Rx => ("RX", '<'),
            Direction::Tx => ("TX", '>'),
        };
        out.push_str(&format!(
            "[{}] {} {} {}\n",
            iso_time(entry.timestamp),
            label,
            arrow,
            entry.data
        ));
    }
    out
}

fn render_csv(entries: &[&LineEntry]) -> String {
    let mut out = String::from("Timestamp,ISO_Time,Direction,Data,Mode\n");
    for entry in entries {
        let direction = match entry.direction {
            Direction::Rx => "rx",
            Direction::Tx => "tx",
        };
        let mode = match entry.mode.unwrap_or(SendMode::Ascii) {
            SendMode::Ascii => "ascii",
            SendMode::Hex => "hex",
            SendMode::Binary => "binary",
        };
        out.push_str(&format!(
            "{},{},{},\"{}\",{}\n",
            entry.timestamp,
            iso_time(entry.timestamp),
            direction,
            entry.data.replace('"', "\"\""),
            mode
        ));
    }
    out
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonRecord {
    timestamp: i64,
    iso_time: String,
    direction: Direction,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    mode: Option<SendMode>,
    index: u64,
}

fn render_json(entries: &[&LineEntry]) -> Result<String, MonitorError> {
    let records: Vec<JsonRecord> = entries
        .iter()
        .map(|entry| JsonRecord {
            timestamp: entry.timestamp,
            iso_time: iso_time(entry.timestamp),
            direction: entry.direction,
            data: entry.data.clone(),
            mode: entry.mode,
            index: entry.index,
        })
        .collect();
    serde_json::to_string_pretty(&records)
        .map_err(|e| MonitorError::store(format!("export serialize failed: {}", e)))
}

// ============================================================================
// Tests
// ============================================================================
