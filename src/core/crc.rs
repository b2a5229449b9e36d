//! CRC-32 checksum primitive for the BTR2 wire protocol.
//!
//! The device uses the standard reflected CRC-32 (polynomial 0xEDB88320,
//! initial value and final XOR 0xFFFFFFFF), i.e. the IEEE 802.3 variant.

/// Computes the CRC-32 of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Computes the CRC-32 of `data` in the on-wire form: uppercase hex,
/// zero-padded to exactly 8 digits.
pub fn checksum_hex(data: &[u8]) -> String {
    format!("{:08X}", checksum(data))
}
