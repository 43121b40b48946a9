//! Recording radio for scheduler and learner tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{CrcLength, PaLevel, RadioLink};

/// Configuration call made on the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioOp {
    Begin,
    SetAutoAck(bool),
    SetCrcLength(CrcLength),
    SetChannel(u8),
    SetAddressWidth(u8),
    SetPayloadSize(u8),
    OpenReadingPipe(u8, u64),
    CloseReadingPipe(u8),
    OpenWritingPipe(u64),
    StartListening,
    StopListening,
    SetPaLevel(PaLevel),
    EnableDynamicAck,
    PowerUp,
    PowerDown,
}

#[derive(Debug)]
struct RecordingState {
    ops: Vec<RadioOp>,
    writes: Vec<Vec<u8>>,
    rx: VecDeque<(u8, Vec<u8>)>,
    begin_ok: bool,
    listening: bool,
}

/// Radio that records every call and replays queued received payloads
///
/// Clones share state, so a test keeps one handle while the worker owns
/// the other.
#[derive(Clone)]
pub struct RecordingRadio {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingRadio {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState {
                ops: Vec::new(),
                writes: Vec::new(),
                rx: VecDeque::new(),
                begin_ok: true,
                listening: false,
            })),
        }
    }

    /// Make subsequent `begin` calls fail or succeed
    pub fn set_begin_ok(&self, ok: bool) {
        self.state.lock().unwrap().begin_ok = ok;
    }

    /// Queue a payload to be received on `pipe` once listening
    pub fn push_received(&self, pipe: u8, payload: &[u8]) {
        self.state.lock().unwrap().rx.push_back((pipe, payload.to_vec()));
    }

    /// Every buffer passed to `write_fast`
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Distinct frames in transmission order, collapsing burst repeats
    pub fn bursts(&self) -> Vec<Vec<u8>> {
        let mut bursts: Vec<Vec<u8>> = Vec::new();
        for write in self.writes() {
            if bursts.last() != Some(&write) {
                bursts.push(write);
            }
        }
        bursts
    }

    /// Every configuration call
    pub fn ops(&self) -> Vec<RadioOp> {
        self.state.lock().unwrap().ops.clone()
    }

    /// Forget recorded calls and writes
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.ops.clear();
        state.writes.clear();
    }

    fn record(&self, op: RadioOp) {
        self.state.lock().unwrap().ops.push(op);
    }
}

impl RadioLink for RecordingRadio {
    fn begin(&mut self) -> bool {
        self.record(RadioOp::Begin);
        self.state.lock().unwrap().begin_ok
    }

    fn set_auto_ack(&mut self, enabled: bool) {
        self.record(RadioOp::SetAutoAck(enabled));
    }

    fn set_crc_length(&mut self, length: CrcLength) {
        self.record(RadioOp::SetCrcLength(length));
    }

    fn set_channel(&mut self, channel: u8) {
        self.record(RadioOp::SetChannel(channel));
    }

    fn set_address_width(&mut self, width: u8) {
        self.record(RadioOp::SetAddressWidth(width));
    }

    fn set_payload_size(&mut self, size: u8) {
        self.record(RadioOp::SetPayloadSize(size));
    }

    fn open_reading_pipe(&mut self, pipe: u8, address: u64) {
        self.record(RadioOp::OpenReadingPipe(pipe, address));
    }

    fn close_reading_pipe(&mut self, pipe: u8) {
        self.record(RadioOp::CloseReadingPipe(pipe));
    }

    fn open_writing_pipe(&mut self, address: u64) {
        self.record(RadioOp::OpenWritingPipe(address));
    }

    fn start_listening(&mut self) {
        self.record(RadioOp::StartListening);
        self.state.lock().unwrap().listening = true;
    }

    fn stop_listening(&mut self) {
        self.record(RadioOp::StopListening);
        self.state.lock().unwrap().listening = false;
    }

    fn available(&mut self) -> Option<u8> {
        let state = self.state.lock().unwrap();
        if !state.listening {
            return None;
        }
        state.rx.front().map(|(pipe, _)| *pipe)
    }

    fn read(&mut self, buffer: &mut [u8]) {
        buffer.fill(0);
        if let Some((_, payload)) = self.state.lock().unwrap().rx.pop_front() {
            let len = payload.len().min(buffer.len());
            buffer[..len].copy_from_slice(&payload[..len]);
        }
    }

    fn write_fast(&mut self, buffer: &[u8], _multicast: bool) -> bool {
        self.state.lock().unwrap().writes.push(buffer.to_vec());
        true
    }

    fn set_pa_level(&mut self, level: PaLevel) {
        self.record(RadioOp::SetPaLevel(level));
    }

    fn enable_dynamic_ack(&mut self) {
        self.record(RadioOp::EnableDynamicAck);
    }

    fn power_up(&mut self) {
        self.record(RadioOp::PowerUp);
    }

    fn power_down(&mut self) {
        self.record(RadioOp::PowerDown);
        self.state.lock().unwrap().listening = false;
    }
}
