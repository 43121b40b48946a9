//! Mode tracking wrapper around a [`RadioLink`]

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{
    capture_address, CrcLength, PaLevel, RadioLink, BROADCAST_CAPTURE_ADDRESS, READING_PIPES,
    RF_CHANNEL, SEARCH_ADDRESS, SEARCH_ADDRESS_WIDTH, SHORT_ADDRESS_WIDTH, TX_ADDRESS,
};
use crate::protocol::frame::Frame;
use crate::protocol::types::FRAME_SIZE;

/// Reading pipe used for the remote's own address
const REMOTE_PIPE: u8 = 1;

/// Reading pipe used for broadcast (duplicate) frames
const BROADCAST_PIPE: u8 = 0;

/// Current configuration of the transceiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Not started yet
    Off,
    /// Started, no mode selected
    Idle,
    /// Configured for transmitting frames
    Transmit,
    /// Listening on the preamble address for unknown remotes
    Search,
    /// Listening for one remote's frames
    Capture([u8; 2]),
    /// Powered down while nothing is pending
    PoweredDown,
}

/// Hardware parameters applied by the [`Transceiver`]
#[derive(Debug, Clone, Copy)]
pub struct RadioSettings {
    /// RF channel
    pub channel: u8,

    /// Transmit power
    pub pa_level: PaLevel,

    /// Delay between two start attempts
    pub retry_interval: Duration,

    /// Settle time after entering transmit mode
    pub warmup: Duration,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            channel: RF_CHANNEL,
            pa_level: PaLevel::Max,
            retry_interval: Duration::from_secs(1),
            warmup: Duration::from_millis(20),
        }
    }
}

/// Owns the radio and applies mode transitions only when they change something
pub struct Transceiver<R> {
    radio: R,
    settings: RadioSettings,
    mode: RadioMode,
    next_start_attempt: Option<Instant>,
    transmit_ready_at: Option<Instant>,
}

impl<R: RadioLink> Transceiver<R> {
    pub fn new(radio: R, settings: RadioSettings) -> Self {
        Self {
            radio,
            settings,
            mode: RadioMode::Off,
            next_start_attempt: None,
            transmit_ready_at: None,
        }
    }

    /// Current mode
    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    /// Whether the radio has been started successfully
    pub fn is_started(&self) -> bool {
        self.mode != RadioMode::Off
    }

    /// Start the radio if needed
    ///
    /// A failed start is retried at most once per retry interval.
    ///
    /// # Returns
    ///
    /// `true` once the radio is started.
    pub fn ensure_started(&mut self, now: Instant) -> bool {
        if self.is_started() {
            return true;
        }
        if let Some(next) = self.next_start_attempt {
            if now < next {
                return false;
            }
        }

        if !self.radio.begin() {
            warn!(
                "Radio did not respond, retrying in {:?}",
                self.settings.retry_interval
            );
            self.next_start_attempt = Some(now + self.settings.retry_interval);
            return false;
        }

        // The protocol has no link-layer ack and its own checksum
        self.radio.set_auto_ack(false);
        self.radio.set_crc_length(CrcLength::Disabled);
        self.radio.set_channel(self.settings.channel);
        for pipe in 0..READING_PIPES {
            self.radio.close_reading_pipe(pipe);
        }

        self.next_start_attempt = None;
        self.mode = RadioMode::Idle;
        info!("Radio started on channel {}", self.settings.channel);
        true
    }

    /// Configure the radio for transmitting
    ///
    /// Starts the warm-up period when the mode actually changes.
    pub fn enter_transmit(&mut self, now: Instant) {
        if self.mode == RadioMode::Transmit || !self.is_started() {
            return;
        }

        self.radio.power_up();
        self.radio.stop_listening();
        self.radio.set_pa_level(self.settings.pa_level);
        self.radio.set_address_width(SHORT_ADDRESS_WIDTH);
        self.radio.enable_dynamic_ack();
        self.radio.open_writing_pipe(TX_ADDRESS);
        self.radio.set_payload_size(FRAME_SIZE as u8);

        self.mode = RadioMode::Transmit;
        self.transmit_ready_at = Some(now + self.settings.warmup);
        debug!("Radio entered transmit mode");
    }

    /// Whether the warm-up after entering transmit mode has elapsed
    pub fn transmit_ready(&self, now: Instant) -> bool {
        self.mode == RadioMode::Transmit && self.transmit_ready_at.map_or(true, |at| now >= at)
    }

    /// Listen on the preamble address for any remote
    pub fn enter_search(&mut self) {
        if self.mode == RadioMode::Search || !self.is_started() {
            return;
        }

        self.radio.power_up();
        self.radio.stop_listening();
        self.radio.set_address_width(SEARCH_ADDRESS_WIDTH);
        self.radio.open_reading_pipe(REMOTE_PIPE, SEARCH_ADDRESS);
        self.radio.start_listening();
        self.radio.set_payload_size(FRAME_SIZE as u8);

        self.mode = RadioMode::Search;
        info!("Radio searching for remotes");
    }

    /// Listen for the frames of the remote starting with `prefix` and for
    /// broadcast frames
    pub fn enter_capture(&mut self, prefix: [u8; 2]) {
        if self.mode == RadioMode::Capture(prefix) || !self.is_started() {
            return;
        }

        self.radio.power_up();
        self.radio.stop_listening();
        self.radio.set_address_width(SHORT_ADDRESS_WIDTH);
        self.radio.open_reading_pipe(REMOTE_PIPE, capture_address(prefix));
        self.radio.open_reading_pipe(BROADCAST_PIPE, BROADCAST_CAPTURE_ADDRESS);
        self.radio.start_listening();
        self.radio.set_payload_size(FRAME_SIZE as u8);

        self.mode = RadioMode::Capture(prefix);
        info!("Radio capturing frames for {:02X} {:02X}", prefix[0], prefix[1]);
    }

    /// Power the radio down
    pub fn power_down(&mut self) {
        if matches!(self.mode, RadioMode::PoweredDown | RadioMode::Off) {
            return;
        }
        self.radio.power_down();
        self.mode = RadioMode::PoweredDown;
        debug!("Radio powered down");
    }

    /// Push `frame` `repeats` times without waiting for acknowledgements
    ///
    /// The caller must have entered transmit mode.
    pub fn transmit(&mut self, frame: &Frame, repeats: u16) {
        let bytes = frame.as_bytes();
        for _ in 0..repeats {
            self.radio.write_fast(bytes, true);
        }
    }

    /// Next received payload and the pipe it arrived on
    pub fn receive(&mut self) -> Option<(u8, [u8; FRAME_SIZE])> {
        if !matches!(self.mode, RadioMode::Search | RadioMode::Capture(_)) {
            return None;
        }
        let pipe = self.radio.available()?;
        let mut payload = [0u8; FRAME_SIZE];
        self.radio.read(&mut payload);
        Some((pipe, payload))
    }

    /// Access the underlying radio
    pub fn radio(&self) -> &R {
        &self.radio
    }
}
