// src/decode/modbus.rs
//
// Modbus RTU frame decoder. Recognizes the common function codes in both
// request and response shape and validates the trailing CRC-16/Modbus
// (poly 0xA001 reflected, init 0xFFFF, low byte first on the wire).

use super::{DecodedFrame, Decoder};

/// CRC-16/Modbus over a byte slice.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

fn function_name(code: u8) -> Option<&'static str> {
    match code {
        0x01 => Some("Read Coils"),
        0x02 => Some("Read Discrete Inputs"),
        0x03 => Some("Read Holding Registers"),
        0x04 => Some("Read Input Registers"),
        0x05 => Some("Write Single Coil"),
        0x06 => Some("Write Single Register"),
        0x0F => Some("Write Multiple Coils"),
        0x10 => Some("Write Multiple Registers"),
        _ => None,
    }
}

fn u16_be(bytes: &[u8]) -> u16 {
    ((bytes[0] as u16) << 8) | bytes[1] as u16
}

pub struct ModbusRtuDecoder;

impl ModbusRtuDecoder {
    fn base_frame(slave: u8, function: u8, crc_valid: bool, detail: &str) -> DecodedFrame {
        let label = function_name(function & 0x7F).unwrap_or("Unknown");
        DecodedFrame::new(
            "Modbus RTU",
            format!("slave {} fn 0x{:02X} {}: {}", slave, function, label, detail),
        )
        .field("slaveAddress", slave)
        .field("functionCode", format!("0x{:02X}", function))
        .field("functionName", label)
        .field("crcValid", crc_valid)
    }
}

impl Decoder for ModbusRtuDecoder {
    fn key(&self) -> &'static str {
        "modbus_rtu"
    }

    fn name(&self) -> &'static str {
        "Modbus RTU"
    }

    fn description(&self) -> &'static str {
        "Modbus RTU frames with CRC-16 validation"
    }

    fn decode(&self, bytes: &[u8]) -> Option<DecodedFrame> {
        // Shortest valid frame is addr + fn + CRC; ADU is capped at 256.
        if bytes.len() < 4 || bytes.len() > 256 {
            return None;
        }

        let slave = bytes[0];
        if slave > 247 {
            return None;
        }

        let function = bytes[1];
        let body = &bytes[..bytes.len() - 2];
        let wire_crc = (bytes[bytes.len() - 1] as u16) << 8 | bytes[bytes.len() - 2] as u16;
        let crc_valid = crc16(body) == wire_crc;

        // Exception response: high bit set on the function code
        if function & 0x80 != 0 {
            if function_name(function & 0x7F).is_none() || bytes.len() != 5 {
                return None;
            }
            let code = bytes[2];
            return Some(
                Self::base_frame(slave, function, crc_valid, &format!("exception {}", code))
                    .field("exceptionCode", code),
            );
        }

        function_name(function)?;

        match function {
            0x01..=0x04 => {
                let byte_count = bytes[2] as usize;
                if byte_count + 5 == bytes.len() {
                    // Response: echoed byte count + payload
                    let payload = &bytes[3..3 + byte_count];
                    let mut frame = Self::base_frame(
                        slave,
                        function,
                        crc_valid,
                        &format!("{} data byte(s)", byte_count),
                    )
                    .field("byteCount", byte_count as u64);

                    if (function == 0x03 || function == 0x04) && byte_count % 2 == 0 {
                        let registers: Vec<u16> = payload.chunks(2).map(u16_be).collect();
                        frame.display = format!(
                            "slave {} fn 0x{:02X} {}: {} register(s)",
                            slave,
                            function,
                            function_name(function).unwrap_or("Unknown"),
                            registers.len()
                        );
                        frame = frame.field(
                            "registers",
                            registers.iter().map(|r| *r as u64).collect::<Vec<u64>>(),
                        );
                    } else {
                        frame = frame.field("dataHex", hex::encode(payload));
                    }
                    Some(frame)
                } else if bytes.len() == 8 {
                    // Request: start address + quantity
                    let start = u16_be(&bytes[2..4]);
                    let quantity = u16_be(&bytes[4..6]);
                    Some(
                        Self::base_frame(
                            slave,
                            function,
                            crc_valid,
                            &format!("read {} from 0x{:04X}", quantity, start),
                        )
                        .field("startAddress", start)
                        .field("quantity", quantity),
                    )
                } else if crc_valid {
                    Some(Self::base_frame(slave, function, true, "unrecognized layout")
                        .field("dataHex", hex::encode(&bytes[2..bytes.len() - 2])))
                } else {
                    None
                }
            }
            0x05 | 0x06 => {
                if bytes.len() != 8 {
                    return None;
                }
                let address = u16_be(&bytes[2..4]);
                let value = u16_be(&bytes[4..6]);
                Some(
                    Self::base_frame(
                        slave,
                        function,
                        crc_valid,
                        &format!("0x{:04X} = {}", address, value),
                    )
                    .field("address", address)
                    .field("value", value),
                )
            }
            0x0F | 0x10 => {
                let (start, quantity) = if bytes.len() >= 6 {
                    (u16_be(&bytes[2..4]), u16_be(&bytes[4..6]))
                } else {
                    return None;
                };
                let is_request = bytes.len() >= 9 && bytes[6] as usize + 9 == bytes.len();
                if !is_request && bytes.len() != 8 {
                    return None;
                }
                let mut frame = Self::base_frame(
                    slave,
                    function,
                    crc_valid,
                    &format!("{} item(s) from 0x{:04X}", quantity, start),
                )
                .field("startAddress", start)
                .field("quantity", quantity);
                if is_request {
                    frame = frame.field("byteCount", bytes[6] as u64);
                }
                Some(frame)
            }
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
