//! # Wire Frame
//!
//! Fixed-size, right-aligned radio frame with its checksum.

use std::fmt;

use super::crc::checksum;
use super::types::{hex_string, CHECKSUM_SIZE, FRAME_SIZE, PREAMBLE_BYTE};
use crate::error::{DirectolorError, Result};

/// Largest content that still fits a frame once the checksum is appended
pub const MAX_CONTENT_SIZE: usize = FRAME_SIZE - CHECKSUM_SIZE;

/// A finalized 32-byte frame
///
/// The content and its checksum occupy the trailing bytes; every leading
/// byte is [`PREAMBLE_BYTE`], which the receivers use to train on the burst.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_SIZE],
    /// Content plus checksum
    payload_len: usize,
}

impl Frame {
    /// Append the checksum to `content` and right-align it into a frame
    ///
    /// # Arguments
    ///
    /// * `content` - Frame content, starting at the first identity byte
    ///
    /// # Errors
    ///
    /// Returns error if the content plus checksum would not fit in
    /// [`FRAME_SIZE`] bytes. The encoder never produces such content.
    pub fn finalize(content: &[u8]) -> Result<Self> {
        if content.len() > MAX_CONTENT_SIZE {
            return Err(DirectolorError::Protocol(format!(
                "Content size {} exceeds maximum {}",
                content.len(),
                MAX_CONTENT_SIZE
            )));
        }

        let payload_len = content.len() + CHECKSUM_SIZE;
        let start = FRAME_SIZE - payload_len;
        let mut bytes = [PREAMBLE_BYTE; FRAME_SIZE];
        bytes[start..start + content.len()].copy_from_slice(content);
        bytes[FRAME_SIZE - CHECKSUM_SIZE..].copy_from_slice(&checksum(content).to_be_bytes());

        Ok(Self { bytes, payload_len })
    }

    /// All 32 bytes as pushed to the radio
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.bytes
    }

    /// Number of leading preamble bytes
    pub fn preamble_len(&self) -> usize {
        FRAME_SIZE - self.payload_len
    }

    /// Content and checksum (everything after the preamble)
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.preamble_len()..]
    }

    /// Content without the checksum
    pub fn content(&self) -> &[u8] {
        &self.bytes[self.preamble_len()..FRAME_SIZE - CHECKSUM_SIZE]
    }

    /// Checksum carried in the last two bytes
    pub fn checksum(&self) -> u16 {
        u16::from_be_bytes([self.bytes[FRAME_SIZE - 2], self.bytes[FRAME_SIZE - 1]])
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("preamble", &self.preamble_len())
            .field("payload", &hex_string(self.payload()))
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex_string(self.payload()))
    }
}
