// src/decode/mod.rs
//
// Protocol decoder registry. Decoders are built in and statically
// registered; a config list selects which are enabled. Each decoder is a
// pure function over a byte slice and never touches channel state.

mod modbus;
mod nmea;
mod slip;

pub use modbus::ModbusRtuDecoder;
pub use nmea::NmeaDecoder;
pub use slip::SlipDecoder;

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::warn;

/// One decoded protocol frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecodedFrame {
    /// Display name of the decoder that produced the frame, attached by the
    /// registry
    pub name: String,
    pub protocol: String,
    pub fields: BTreeMap<String, serde_json::Value>,
    pub display: String,
}

impl DecodedFrame {
    pub fn new(protocol: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            protocol: protocol.into(),
            fields: BTreeMap::new(),
            display: display.into(),
        }
    }

    pub fn field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// A protocol decoder. Required pure over its input: the same bytes always
/// produce a structurally equal result.
pub trait Decoder: Send + Sync {
    /// Stable key used by the enable-list config
    fn key(&self) -> &'static str;
    /// Display name
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str {
        ""
    }
    fn decode(&self, bytes: &[u8]) -> Option<DecodedFrame>;
}

/// Decoder metadata for the `plugins:list` surface.
#[derive(Clone, Debug, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub description: String,
}

fn builtin_decoders() -> Vec<Arc<dyn Decoder>> {
    vec![
        Arc::new(ModbusRtuDecoder),
        Arc::new(NmeaDecoder),
        Arc::new(SlipDecoder),
    ]
}

// ============================================================================
// Registry
// ============================================================================

/// Read-mostly decoder set. `reload` swaps the whole set atomically: a
/// concurrent `decode_all` uses either the old or the new set, never a mix.
pub struct DecoderRegistry {
    set: RwLock<Arc<Vec<Arc<dyn Decoder>>>>,
}

impl DecoderRegistry {
    /// Registry with every builtin decoder enabled.
    pub fn with_all() -> Self {
        Self {
            set: RwLock::new(Arc::new(builtin_decoders())),
        }
    }

    /// Registry with the named subset enabled, in registration order.
    /// Unknown keys are logged and skipped.
    pub fn with_enabled(keys: &[String]) -> Self {
        let registry = Self {
            set: RwLock::new(Arc::new(Vec::new())),
        };
        registry.reload(keys);
        registry
    }

    /// Replace the enabled set. Atomic from the caller's perspective.
    pub fn reload(&self, keys: &[String]) {
        let mut set: Vec<Arc<dyn Decoder>> = Vec::new();
        for decoder in builtin_decoders() {
            if keys.iter().any(|k| k.eq_ignore_ascii_case(decoder.key())) {
                set.push(decoder);
            }
        }
        for key in keys {
            if !set.iter().any(|d| d.key().eq_ignore_ascii_case(key)) {
                warn!("[decode] unknown decoder '{}' ignored", key);
            }
        }
        *self.set.write().expect("decoder registry lock poisoned") = Arc::new(set);
    }

    /// Invoke every enabled decoder with the same bytes and collect the
    /// non-null results in registration order. A panicking decoder yields
    /// nothing and does not affect the others.
    pub fn decode_all(&self, bytes: &[u8]) -> Vec<DecodedFrame> {
        let set = self
            .set
            .read()
            .expect("decoder registry lock poisoned")
            .clone();

        let mut results = Vec::new();
        for decoder in set.iter() {
            match catch_unwind(AssertUnwindSafe(|| decoder.decode(bytes))) {
                Ok(Some(mut frame)) => {
                    frame.name = decoder.name().to_string();
                    results.push(frame);
                }
                Ok(None) => {}
                Err(_) => {
                    warn!("[decode] decoder '{}' panicked, skipping", decoder.name());
                }
            }
        }
        results
    }

    pub fn list(&self) -> Vec<PluginInfo> {
        self.set
            .read()
            .expect("decoder registry lock poisoned")
            .iter()
            .map(|d| PluginInfo {
                name: d.name().to_string(),
                description: d.description().to_string(),
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_lists_builtins() {
        let registry = DecoderRegistry::with_all();
        let names: Vec<String> = registry.list().into_iter().map(|p| p.name).collect();
        assert!(names.iter().any(|n| n == "Modbus RTU"));
        assert!(names.iter().any(|n| n == "NMEA 0183"));
        assert!(names.iter().any(|n| n == "SLIP"));
    }

    #[test]
    fn test_enable_subset() {
        let registry = DecoderRegistry::with_enabled(&["modbus_rtu".to_string()]);
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.list()[0].name, "Modbus RTU");
    }

    #[test]
    fn test_unknown_key_is_skipped() {
        let registry =
            DecoderRegistry::with_enabled(&["modbus_rtu".to_string(), "bogus".to_string()]);
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_decode_all_attaches_decoder_name() {
        let registry = DecoderRegistry::with_all();
        // Read Holding Registers response, one register = 10
        let frame = [0x01, 0x03, 0x02, 0x00, 0x0A, 0x38, 0x43];
        let results = registry.decode_all(&frame);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Modbus RTU");
    }

    #[test]
    fn test_decode_all_is_pure() {
        let registry = DecoderRegistry::with_all();
        let frame = [0x01, 0x03, 0x02, 0x00, 0x0A, 0x38, 0x43];
        let first = registry.decode_all(&frame);
        let second = registry.decode_all(&frame);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reload_replaces_set() {
        let registry = DecoderRegistry::with_all();
        registry.reload(&["nmea_0183".to_string()]);
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.list()[0].name, "NMEA 0183");
    }
}
