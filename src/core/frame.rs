//! Codec for the BTR2 ASCII wire frame.
//!
//! A frame is an STX byte (0x02), `;`-separated ASCII fields, an 8-digit
//! uppercase hex CRC-32 and an ETX byte (0x03). The CRC covers every byte
//! between the STX marker (exclusive) and the CRC field (exclusive). Parsing
//! and building are independent of the transport; the chunked transfer layer
//! hands this module fully assembled buffers.

use chrono::{DateTime, Local};

use crate::core::crc;
use crate::error::Btr2Error;

/// Start-of-frame marker.
pub const STX: u8 = 0x02;
/// End-of-frame marker.
pub const ETX: u8 = 0x03;

/// Number of hex digits in the embedded CRC field.
const CRC_FIELD_LEN: usize = 8;

/// Field index carrying the byte-reversed chip identifier.
const CHIP_NUMBER_FIELD: usize = 7;
/// Field index carrying the sender's MAC address.
const SENDER_MAC_FIELD: usize = 2;
/// Field index carrying the packet index echoed by the acknowledgment.
const PACKET_INDEX_FIELD: usize = 3;

/// A parsed inbound frame.
///
/// `payload` holds the raw bytes between the STX marker and the CRC field;
/// `fields` holds the sanitized `;`-split view of the same bytes.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    payload: Vec<u8>,
    crc_field: String,
    fields: Vec<String>,
}

impl InboundFrame {
    /// Parses a raw buffer into a frame.
    ///
    /// The first STX and the first ETX at or after it delimit the frame; the
    /// 8 bytes immediately preceding ETX are the CRC field. Bytes outside
    /// `[A-Za-z0-9:;\],-]` are masked with `X` before field splitting so that
    /// transport noise cannot corrupt the frame structure.
    pub fn parse(raw: &[u8]) -> Result<Self, Btr2Error> {
        let start = raw
            .iter()
            .position(|&b| b == STX)
            .ok_or(Btr2Error::Framing)?;
        let end = raw[start + 1..]
            .iter()
            .position(|&b| b == ETX)
            .map(|i| i + start + 1)
            .ok_or(Btr2Error::Framing)?;

        let body = &raw[start + 1..end];
        if body.len() < CRC_FIELD_LEN {
            return Err(Btr2Error::Framing);
        }
        let (payload, crc_bytes) = body.split_at(body.len() - CRC_FIELD_LEN);
        let crc_field: String = crc_bytes.iter().map(|&b| b as char).collect();

        let fields: Vec<String> = sanitize(payload)
            .split(';')
            .map(str::to_owned)
            .collect();
        if fields.len() <= CHIP_NUMBER_FIELD {
            return Err(Btr2Error::Schema {
                index: CHIP_NUMBER_FIELD,
            });
        }

        Ok(Self {
            payload: payload.to_vec(),
            crc_field,
            fields,
        })
    }

    /// The payload region with framing and CRC stripped.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The sanitized `;`-split fields.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// MAC address of the sending device.
    pub fn sender_mac(&self) -> &str {
        &self.fields[SENDER_MAC_FIELD]
    }

    /// Packet index, echoed back in the acknowledgment.
    pub fn packet_index(&self) -> &str {
        &self.fields[PACKET_INDEX_FIELD]
    }

    /// Extracts the chip identifier.
    ///
    /// The device sends it as hex with the byte order reversed: the 2-digit
    /// byte pairs are put back in order and the two digits of each pair are
    /// swapped, e.g. `FB2D770100004000` becomes `000400001077D2BF`.
    pub fn chip_number(&self) -> Result<String, Btr2Error> {
        let field = &self.fields[CHIP_NUMBER_FIELD];
        if field.is_empty()
            || field.len() % 2 != 0
            || !field.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(Btr2Error::Encoding {
                field: field.clone(),
            });
        }

        let bytes = field.as_bytes();
        let mut chip = String::with_capacity(field.len());
        for pair in bytes.chunks(2).rev() {
            chip.push(pair[1] as char);
            chip.push(pair[0] as char);
        }
        Ok(chip)
    }

    /// Recomputes the CRC-32 over the payload region and compares it to the
    /// embedded CRC field, case-insensitively.
    pub fn verify_checksum(&self) -> Result<(), Btr2Error> {
        let computed = crc::checksum_hex(&self.payload);
        if computed.eq_ignore_ascii_case(&self.crc_field) {
            Ok(())
        } else {
            Err(Btr2Error::Checksum {
                expected: self.crc_field.clone(),
                computed,
            })
        }
    }
}

/// Masks every byte outside the frame's ASCII alphabet with `X`.
fn sanitize(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|&b| {
            let c = b as char;
            if c.is_ascii_alphanumeric() || matches!(c, ':' | ';' | ']' | ',' | '-') {
                c
            } else {
                'X'
            }
        })
        .collect()
}

/// Builds the acknowledgment frame for a received packet.
///
/// Layout: STX, version `1`, kind `R`, `local_mac`, the echoed packet index,
/// the current date/time, four empty transponder fields, three empty barcode
/// fields, the echoed sender MAC, the echoed packet index again, three empty
/// trailing fields, the CRC over everything after STX, ETX. The date/time
/// uses no zero padding on month, day, hour, minute or second; the device
/// rejects padded forms.
///
/// Output length varies with the MAC and index strings and is what the
/// transfer layer chunks on.
pub fn build_ack(frame: &InboundFrame, local_mac: &str, now: DateTime<Local>) -> Vec<u8> {
    let timestamp = now.format("%Y-%-m-%-d;%-H:%-M:%-S");
    let index = frame.packet_index();
    let sender_mac = frame.sender_mac();

    let mut ack = Vec::with_capacity(64);
    ack.push(STX);
    ack.extend_from_slice(
        format!("1;R;{local_mac};{index};{timestamp};;;;;;;;{sender_mac};{index};;;").as_bytes(),
    );
    let crc_hex = crc::checksum_hex(&ack[1..]);
    ack.extend_from_slice(crc_hex.as_bytes());
    ack.push(ETX);
    ack
}
