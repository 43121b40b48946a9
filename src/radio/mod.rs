//! # Radio Link Module
//!
//! Abstraction over the nRF24L01+ transceiver used to talk to the blinds.
//!
//! This module handles:
//! - The capability set consumed from the transceiver driver ([`RadioLink`])
//! - Radio start-up with retries and link-layer ack/CRC disabled
//! - Switching between transmit, search and capture modes
//! - Brute-force repetition of frames (the protocol has no acknowledgement)

use serde::Deserialize;

pub mod dry_run;
pub mod transceiver;

#[cfg(test)]
pub mod mocks;

pub use transceiver::{RadioMode, RadioSettings, Transceiver};

/// RF channel the remotes transmit on (2453 MHz)
pub const RF_CHANNEL: u8 = 53;

/// Writing pipe address used when transmitting
pub const TX_ADDRESS: u64 = 0x06_04_06;

/// Address matching the preamble, used to sniff unknown remotes
pub const SEARCH_ADDRESS: u64 = 0x55_55_55_55_55;

/// Reading pipe address for frames addressed to every remote (duplicates)
pub const BROADCAST_CAPTURE_ADDRESS: u64 = 0xFF_FF_C0;

/// Address width while transmitting and capturing
pub const SHORT_ADDRESS_WIDTH: u8 = 3;

/// Address width while searching
pub const SEARCH_ADDRESS_WIDTH: u8 = 5;

/// Number of reading pipes on the transceiver
pub const READING_PIPES: u8 = 6;

/// Transmit power amplifier level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaLevel {
    Min,
    Low,
    High,
    Max,
}

/// Link-layer CRC length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcLength {
    Disabled,
    Crc8,
    Crc16,
}

/// Capability set of an nRF24L01+ style transceiver driver
///
/// Implementations are expected to be thin wrappers over the hardware;
/// all protocol knowledge lives in [`Transceiver`].
#[cfg_attr(test, mockall::automock)]
pub trait RadioLink: Send {
    /// Initialize the hardware, returns `false` if the chip does not respond
    fn begin(&mut self) -> bool;

    /// Enable or disable link-layer auto acknowledgement
    fn set_auto_ack(&mut self, enabled: bool);

    /// Set the link-layer CRC length
    fn set_crc_length(&mut self, length: CrcLength);

    /// Select the RF channel (2400 MHz + channel)
    fn set_channel(&mut self, channel: u8);

    /// Set the address width in bytes (3..=5)
    fn set_address_width(&mut self, width: u8);

    /// Set the static payload size
    fn set_payload_size(&mut self, size: u8);

    /// Open a reading pipe on `address`
    fn open_reading_pipe(&mut self, pipe: u8, address: u64);

    /// Close a reading pipe
    fn close_reading_pipe(&mut self, pipe: u8);

    /// Set the transmit address
    fn open_writing_pipe(&mut self, address: u64);

    /// Enter receive mode
    fn start_listening(&mut self);

    /// Leave receive mode
    fn stop_listening(&mut self);

    /// Pipe of the next received payload, if any
    fn available(&mut self) -> Option<u8>;

    /// Read the next received payload into `buffer`
    fn read(&mut self, buffer: &mut [u8]);

    /// Queue a payload without waiting for an acknowledgement
    fn write_fast(&mut self, buffer: &[u8], multicast: bool) -> bool;

    /// Set the power amplifier level
    fn set_pa_level(&mut self, level: PaLevel);

    /// Allow per-payload no-ack transmissions
    fn enable_dynamic_ack(&mut self);

    /// Leave power-down mode
    fn power_up(&mut self);

    /// Enter power-down mode
    fn power_down(&mut self);
}

/// Reading pipe address for frames of the remote whose identity starts
/// with `prefix`
///
/// # Examples
///
/// ```
/// use directolor::radio::capture_address;
///
/// assert_eq!(capture_address([0xAB, 0xCD]), 0xAB_CD_C0);
/// ```
pub fn capture_address(prefix: [u8; 2]) -> u64 {
    u64::from_be_bytes([0, 0, 0, 0, 0, prefix[0], prefix[1], crate::protocol::types::ADDRESS_MARKER])
}
