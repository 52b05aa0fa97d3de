// src/types.rs
//
// Core data model shared across the channel runtime and the HTTP surface.
// Wire names are camelCase to match the WebSocket/REST protocol.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

/// Reserved channel id used when callers omit one.
pub const DEFAULT_CHANNEL: &str = "default";

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

// ============================================================================
// Line entries
// ============================================================================

/// Direction of a buffered line entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Rx,
    Tx,
}

/// How a caller encoded an outbound payload into bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    Ascii,
    Hex,
    Binary,
}

impl Default for SendMode {
    fn default() -> Self {
        SendMode::Ascii
    }
}

/// One buffered record, rx or tx, with a monotonic per-channel index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEntry {
    /// Wall-clock ms at the moment the line was assembled or sent
    pub timestamp: i64,
    pub direction: Direction,
    /// ASCII-decoded payload for rx; caller-supplied text for tx
    pub data: String,
    /// Present on tx entries only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mode: Option<SendMode>,
    /// Never reused, never rewound on buffer eviction
    pub index: u64,
    pub channel_id: String,
}

// ============================================================================
// Statistics
// ============================================================================

/// Per-channel counters, monotonic except on explicit clear.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    pub lines_rx: u64,
    pub lines_tx: u64,
    pub errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<i64>,
}

// ============================================================================
// Port configuration
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowControl {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "rtscts")]
    RtsCts,
    #[serde(rename = "xonxoff")]
    XonXoff,
}

/// Stop bit setting. Serialized as the numeric value (1, 1.5 or 2) the
/// protocol uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    pub fn from_f64(value: f64) -> Option<Self> {
        if value == 1.0 {
            Some(StopBits::One)
        } else if value == 1.5 {
            Some(StopBits::OnePointFive)
        } else if value == 2.0 {
            Some(StopBits::Two)
        } else {
            None
        }
    }
}

impl Serialize for StopBits {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StopBits::OnePointFive => serializer.serialize_f64(1.5),
            StopBits::One => serializer.serialize_u8(1),
            StopBits::Two => serializer.serialize_u8(2),
        }
    }
}

impl<'de> Deserialize<'de> for StopBits {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        StopBits::from_f64(value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid stop bits: {}", value)))
    }
}

/// Fully populated serial port configuration, immutable once a channel opens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

/// Sparse wire-side configuration. Defaults (115200/8/N/1/none) are applied
/// when building the full `PortConfig`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortConfigRequest {
    pub path: String,
    pub baud_rate: Option<u32>,
    pub data_bits: Option<u8>,
    pub stop_bits: Option<f64>,
    pub parity: Option<Parity>,
    pub flow_control: Option<FlowControl>,
}

impl PortConfigRequest {
    /// Apply defaults and validate into a full `PortConfig`.
    pub fn build(self) -> Result<PortConfig, MonitorError> {
        if self.path.is_empty() {
            return Err(MonitorError::invalid_config("device path is empty"));
        }

        let baud_rate = self.baud_rate.unwrap_or(115_200);
        if baud_rate == 0 {
            return Err(MonitorError::invalid_config("baud rate must be positive"));
        }

        let data_bits = self.data_bits.unwrap_or(8);
        if !(5..=8).contains(&data_bits) {
            return Err(MonitorError::invalid_config(format!(
                "invalid data bits: {}",
                data_bits
            )));
        }

        let stop_bits = match self.stop_bits {
            None => StopBits::One,
            Some(value) => StopBits::from_f64(value).ok_or_else(|| {
                MonitorError::invalid_config(format!("invalid stop bits: {}", value))
            })?,
        };

        Ok(PortConfig {
            path: self.path,
            baud_rate,
            data_bits,
            stop_bits,
            parity: self.parity.unwrap_or(Parity::None),
            flow_control: self.flow_control.unwrap_or(FlowControl::None),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
