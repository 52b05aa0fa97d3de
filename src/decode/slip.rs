// src/decode/slip.rs
//
// SLIP (RFC 1055) frame decoder: END-delimited frames with ESC unstuffing.

use super::{DecodedFrame, Decoder};

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

pub struct SlipDecoder;

impl Decoder for SlipDecoder {
    fn key(&self) -> &'static str {
        "slip"
    }

    fn name(&self) -> &'static str {
        "SLIP"
    }

    fn description(&self) -> &'static str {
        "RFC 1055 SLIP frames"
    }

    fn decode(&self, bytes: &[u8]) -> Option<DecodedFrame> {
        if bytes.len() < 3 || bytes[0] != END || bytes[bytes.len() - 1] != END {
            return None;
        }

        let stuffed = &bytes[1..bytes.len() - 1];
        if stuffed.is_empty() || stuffed.contains(&END) {
            return None;
        }

        let mut payload = Vec::with_capacity(stuffed.len());
        let mut iter = stuffed.iter();
        while let Some(&byte) = iter.next() {
            if byte == ESC {
                match iter.next() {
                    Some(&ESC_END) => payload.push(END),
                    Some(&ESC_ESC) => payload.push(ESC),
                    _ => return None,
                }
            } else {
                payload.push(byte);
            }
        }

        Some(
            DecodedFrame::new("SLIP", format!("SLIP frame ({} bytes)", payload.len()))
                .field("length", payload.len() as u64)
                .field("payloadHex", hex::encode(&payload)),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
