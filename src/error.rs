// src/error.rs
//
// Structured error types for the monitoring server.
// One taxonomy shared by the channel runtime, the stores and the HTTP surface.

use std::fmt;

/// Structured error with channel/device context.
///
/// These variants capture the failure modes of serial channel operation,
/// providing consistent messages and enabling pattern matching for specific
/// handling at the transport layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorError {
    /// Device path missing, permission denied, or open timed out
    DeviceUnavailable { device: String, details: String },

    /// Driver rejected baud/data/parity/stop/flow parameters
    InvalidConfig { details: String },

    /// Operation requires an open channel
    NotConnected { channel: String },

    /// Hex or binary send payload is malformed
    InvalidEncoding { details: String },

    /// Recoverable read/write hiccup; the reader keeps going
    TransientIo { channel: String, details: String },

    /// Device vanished or entered an unrecoverable state
    FatalIo { channel: String, details: String },

    /// Macro or profile id unknown
    NotFound { kind: &'static str, id: String },

    /// A send inside a macro failed
    MacroAborted { cause: Box<MonitorError> },

    /// Persistent store read/write failure
    Store { details: String },
}

impl MonitorError {
    pub fn device_unavailable(device: impl Into<String>, details: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
            details: details.into(),
        }
    }

    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }

    pub fn not_connected(channel: impl Into<String>) -> Self {
        Self::NotConnected {
            channel: channel.into(),
        }
    }

    pub fn invalid_encoding(details: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            details: details.into(),
        }
    }

    pub fn transient_io(channel: impl Into<String>, details: impl Into<String>) -> Self {
        Self::TransientIo {
            channel: channel.into(),
            details: details.into(),
        }
    }

    pub fn fatal_io(channel: impl Into<String>, details: impl Into<String>) -> Self {
        Self::FatalIo {
            channel: channel.into(),
            details: details.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn macro_aborted(cause: MonitorError) -> Self {
        Self::MacroAborted {
            cause: Box::new(cause),
        }
    }

    pub fn store(details: impl Into<String>) -> Self {
        Self::Store {
            details: details.into(),
        }
    }

    /// Map an open failure from the serial stack onto the taxonomy.
    pub fn from_serial_open(device: &str, err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => {
                Self::device_unavailable(device, err.to_string())
            }
            serialport::ErrorKind::InvalidInput => Self::invalid_config(err.to_string()),
            serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                Self::device_unavailable(device, "device not found")
            }
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                Self::device_unavailable(device, "permission denied")
            }
            _ => Self::device_unavailable(device, err.to_string()),
        }
    }
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceUnavailable { device, details } => {
                write!(f, "[{}] device unavailable: {}", device, details)
            }
            Self::InvalidConfig { details } => {
                write!(f, "invalid port configuration: {}", details)
            }
            Self::NotConnected { channel } => {
                write!(f, "[{}] channel is not connected", channel)
            }
            Self::InvalidEncoding { details } => {
                write!(f, "invalid payload encoding: {}", details)
            }
            Self::TransientIo { channel, details } => {
                write!(f, "[{}] io error: {}", channel, details)
            }
            Self::FatalIo { channel, details } => {
                write!(f, "[{}] fatal io error: {}", channel, details)
            }
            Self::NotFound { kind, id } => {
                write!(f, "{} '{}' not found", kind, id)
            }
            Self::MacroAborted { cause } => {
                write!(f, "macro aborted: {}", cause)
            }
            Self::Store { details } => {
                write!(f, "store error: {}", details)
            }
        }
    }
}

impl std::error::Error for MonitorError {}

/// Convert to String for transport layers that carry plain error text.
impl From<MonitorError> for String {
    fn from(err: MonitorError) -> String {
        err.to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_unavailable_display() {
        let err = MonitorError::device_unavailable("/dev/ttyUSB0", "open timed out");
        assert_eq!(
            err.to_string(),
            "[/dev/ttyUSB0] device unavailable: open timed out"
        );
    }

    #[test]
    fn test_not_connected_display() {
        let err = MonitorError::not_connected("a");
        assert_eq!(err.to_string(), "[a] channel is not connected");
    }

    #[test]
    fn test_not_found_display() {
        let err = MonitorError::not_found("macro", "abc-123");
        assert_eq!(err.to_string(), "macro 'abc-123' not found");
    }

    #[test]
    fn test_macro_aborted_carries_cause() {
        let err = MonitorError::macro_aborted(MonitorError::not_connected("a"));
        assert_eq!(
            err.to_string(),
            "macro aborted: [a] channel is not connected"
        );
        assert!(matches!(err, MonitorError::MacroAborted { .. }));
    }

    #[test]
    fn test_into_string_conversion() {
        let err = MonitorError::invalid_encoding("odd hex length");
        let s: String = err.into();
        assert_eq!(s, "invalid payload encoding: odd hex length");
    }
}
