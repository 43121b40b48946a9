//! Radio that only logs what it would do
//!
//! Used by the bridge binary when no transceiver driver is wired in, so the
//! scheduling and encoding paths can be exercised end to end.

use tracing::{debug, info, trace};

use super::{CrcLength, PaLevel, RadioLink};
use crate::protocol::types::hex_string;

/// A [`RadioLink`] without hardware
#[derive(Debug, Default)]
pub struct DryRunRadio {
    frames_written: u64,
    last_frame: Option<Vec<u8>>,
}

impl DryRunRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of `write_fast` calls
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl RadioLink for DryRunRadio {
    fn begin(&mut self) -> bool {
        info!("Dry-run radio started (no hardware attached)");
        true
    }

    fn set_auto_ack(&mut self, enabled: bool) {
        trace!("auto ack: {}", enabled);
    }

    fn set_crc_length(&mut self, length: CrcLength) {
        trace!("crc length: {:?}", length);
    }

    fn set_channel(&mut self, channel: u8) {
        debug!("RF channel {} ({} MHz)", channel, 2400 + channel as u32);
    }

    fn set_address_width(&mut self, width: u8) {
        trace!("address width: {}", width);
    }

    fn set_payload_size(&mut self, size: u8) {
        trace!("payload size: {}", size);
    }

    fn open_reading_pipe(&mut self, pipe: u8, address: u64) {
        debug!("Reading pipe {} on {:#X}", pipe, address);
    }

    fn close_reading_pipe(&mut self, pipe: u8) {
        trace!("close reading pipe {}", pipe);
    }

    fn open_writing_pipe(&mut self, address: u64) {
        debug!("Writing pipe on {:#X}", address);
    }

    fn start_listening(&mut self) {
        trace!("start listening");
    }

    fn stop_listening(&mut self) {
        trace!("stop listening");
    }

    fn available(&mut self) -> Option<u8> {
        None
    }

    fn read(&mut self, buffer: &mut [u8]) {
        buffer.fill(0);
    }

    fn write_fast(&mut self, buffer: &[u8], _multicast: bool) -> bool {
        self.frames_written += 1;
        if self.last_frame.as_deref() != Some(buffer) {
            debug!("Transmitting {}", hex_string(buffer));
            self.last_frame = Some(buffer.to_vec());
        }
        true
    }

    fn set_pa_level(&mut self, level: PaLevel) {
        trace!("PA level: {:?}", level);
    }

    fn enable_dynamic_ack(&mut self) {
        trace!("dynamic ack enabled");
    }

    fn power_up(&mut self) {
        trace!("power up");
    }

    fn power_down(&mut self) {
        trace!("power down");
    }
}
