// src/decode/nmea.rs
//
// NMEA 0183 sentence decoder: `$TTSSS,field,...*hh` with the XOR checksum
// computed between `$` and `*`.

use super::{DecodedFrame, Decoder};

pub struct NmeaDecoder;

impl Decoder for NmeaDecoder {
    fn key(&self) -> &'static str {
        "nmea_0183"
    }

    fn name(&self) -> &'static str {
        "NMEA 0183"
    }

    fn description(&self) -> &'static str {
        "NMEA 0183 sentences with checksum validation"
    }

    fn decode(&self, bytes: &[u8]) -> Option<DecodedFrame> {
        let text = std::str::from_utf8(bytes).ok()?;
        let text = text.trim_end_matches(['\r', '\n']);

        let body = text.strip_prefix('$')?;
        let (payload, checksum) = body.rsplit_once('*')?;
        if checksum.len() != 2 || payload.is_empty() {
            return None;
        }
        if !payload.bytes().all(|b| (0x20..0x7F).contains(&b)) {
            return None;
        }

        let expected = u8::from_str_radix(checksum, 16).ok()?;
        let actual = payload.bytes().fold(0u8, |acc, b| acc ^ b);
        let checksum_valid = expected == actual;

        let address = payload.split(',').next().unwrap_or("");
        if address.len() < 3 {
            return None;
        }
        let (talker, sentence) = if address.starts_with('P') {
            // Proprietary sentences carry a single-letter talker
            ("P".to_string(), address[1..].to_string())
        } else if address.len() == 5 {
            (address[..2].to_string(), address[2..].to_string())
        } else {
            return None;
        };

        let field_count = payload.split(',').count().saturating_sub(1);

        Some(
            DecodedFrame::new("NMEA 0183", text.to_string())
                .field("talker", talker)
                .field("sentence", sentence)
                .field("fieldCount", field_count as u64)
                .field("checksumValid", checksum_valid),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
