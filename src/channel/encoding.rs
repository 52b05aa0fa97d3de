// src/channel/encoding.rs
//
// Outbound payload encoding. `ascii` appends the line terminator; `hex` and
// `binary` are sent exactly as parsed.

use crate::error::MonitorError;
use crate::types::SendMode;

/// Encode a caller-supplied payload into the bytes written to the device.
pub fn encode_payload(data: &str, mode: SendMode) -> Result<Vec<u8>, MonitorError> {
    match mode {
        SendMode::Ascii => {
            let mut bytes = data.as_bytes().to_vec();
            bytes.push(b'\n');
            Ok(bytes)
        }
        SendMode::Hex => parse_hex(data),
        SendMode::Binary => parse_bits(data),
    }
}

/// Parse whitespace-separated hex byte pairs (e.g. "0D 0A" or "0d0a").
fn parse_hex(data: &str) -> Result<Vec<u8>, MonitorError> {
    let stripped: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    if !stripped.is_ascii() {
        return Err(MonitorError::invalid_encoding("hex payload must be ASCII"));
    }
    if stripped.len() % 2 != 0 {
        return Err(MonitorError::invalid_encoding(
            "hex payload must have an even number of digits",
        ));
    }

    let mut bytes = Vec::with_capacity(stripped.len() / 2);
    for i in (0..stripped.len()).step_by(2) {
        let pair = &stripped[i..i + 2];
        let byte = u8::from_str_radix(pair, 16)
            .map_err(|_| MonitorError::invalid_encoding(format!("invalid hex byte: {}", pair)))?;
        bytes.push(byte);
    }
    Ok(bytes)
}

/// Parse a whitespace-separated bit string, packed MSB-first. Trailing bits
/// of a partial byte pad with zero.
fn parse_bits(data: &str) -> Result<Vec<u8>, MonitorError> {
    let mut bytes = Vec::new();
    let mut current: u8 = 0;
    let mut filled: u8 = 0;

    for c in data.chars() {
        if c.is_whitespace() {
            continue;
        }
        let bit = match c {
            '0' => 0,
            '1' => 1,
            _ => {
                return Err(MonitorError::invalid_encoding(format!(
                    "invalid binary digit: {}",
                    c
                )))
            }
        };
        current = (current << 1) | bit;
        filled += 1;
        if filled == 8 {
            bytes.push(current);
            current = 0;
            filled = 0;
        }
    }

    if filled > 0 {
        bytes.push(current << (8 - filled));
    }
    Ok(bytes)
}

// ============================================================================
// Tests
// ============================================================================
