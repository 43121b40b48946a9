//! # CRC-16 Implementation
//!
//! Checksum used by Directolor remotes, recovered from captured traffic.
//!
//! **Polynomial**: 0x755B
//! **Initial Value**: 0xFFFF
//! **Reflection**: none, **Final XOR**: none

/// Directolor CRC-16 polynomial
const CRC16_POLY: u16 = 0x755B;

/// Directolor CRC-16 initial value
const CRC16_INIT: u16 = 0xFFFF;

/// Precomputed CRC16 lookup table for fast calculation
const CRC16_TABLE: [u16; 256] = generate_crc16_table();

/// Generate CRC16 lookup table at compile time
const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate the frame checksum using the lookup table
///
/// # Arguments
///
/// * `data` - Frame content, starting at the first identity byte
///
/// # Returns
///
/// * `u16` - Calculated checksum, transmitted high byte first
///
/// # Examples
///
/// ```
/// use directolor::protocol::crc::checksum;
///
/// let content = [0x12, 0xF0, 0xC0, 0x11, 0x00, 0x05];
/// assert_eq!(checksum(&content), checksum(&content));
/// ```
pub fn checksum(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        let index = ((crc >> 8) as u8 ^ byte) as usize;
        crc = (crc << 8) ^ CRC16_TABLE[index];
    }

    crc
}

/// Calculate the checksum bit by bit (slow, for verification)
///
/// Used primarily for testing the lookup table implementation.
#[allow(dead_code)]
fn checksum_slow(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= (byte as u16) << 8;

        for _ in 0..8 {
            if (crc & 0x8000) != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
