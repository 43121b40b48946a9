//! # Remote Learner Module
//!
//! Discovers the identity of a physical remote by listening to it.
//!
//! Learning happens in two phases:
//! - **Searching**: the radio listens on the preamble address and every
//!   payload is scanned for the sync pattern that follows the identity
//!   prefix in single-channel commands.
//! - **Capturing**: the radio narrows to the discovered prefix. Command
//!   frames reveal the remaining identity bytes and every recognized frame
//!   is kept as a variant for the code dump.
//!
//! The learner never touches the radio itself; the scheduler worker feeds it
//! received payloads and applies the radio mode it asks for.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::protocol::decoder::{decode_received, ObservedFrame, DUPLICATE_PREFIX};
use crate::protocol::types::{
    hex_string, BlindAction, PacketKind, RadioIdentity, FRAME_SIZE, LENGTH_ADJUST, SYNC_PATTERN,
};

/// Variants kept per (kind, channel, action)
pub const MAX_VARIANTS: usize = 8;

/// Pipe on which broadcast (duplicate) frames arrive in capture mode
const BROADCAST_PIPE: u8 = 0;

/// Learning phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "prefix")]
pub enum LearnerState {
    /// Not learning
    #[default]
    Idle,
    /// Looking for any remote
    Searching,
    /// Listening to the remote with this identity prefix
    Capturing([u8; 2]),
}

/// Outcome of feeding one payload to the learner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnEvent {
    /// Payload ignored
    Nothing,
    /// Sync pattern found, the learner switched to capturing this prefix
    Discovered([u8; 2]),
    /// A recognized frame was recorded
    Captured(ObservedFrame),
}

/// Grouping of captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct CaptureKey {
    pub kind: PacketKind,
    pub channel: Option<u8>,
    pub action: BlindAction,
}

/// Dynamic bytes of one captured frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedVariant {
    pub dynamic: Vec<u8>,
    pub checksum_ok: bool,
}

/// Captured frames of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureRecord {
    pub key: CaptureKey,
    pub variants: Vec<CapturedVariant>,
}

/// Snapshot of what the learner knows, rendered as a pasteable code dump
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LearnerReport {
    pub state: LearnerState,

    /// Identity bytes 0 and 1
    pub prefix: Option<[u8; 2]>,

    /// Identity bytes 2 and 3
    pub suffix: Option<[u8; 2]>,

    pub captures: Vec<CaptureRecord>,
}

impl LearnerReport {
    /// Complete identity once both halves are known
    pub fn identity(&self) -> Option<RadioIdentity> {
        match (self.prefix, self.suffix) {
            (Some(p), Some(s)) => Some(RadioIdentity::new([p[0], p[1], s[0], s[1]])),
            _ => None,
        }
    }
}

impl fmt::Display for LearnerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.prefix {
            Some(prefix) => prefix,
            None => return writeln!(f, "# No remote learned yet"),
        };

        match self.identity() {
            Some(identity) => {
                writeln!(f, "# Radio: {}", identity)?;
                writeln!(f, "[[remotes]]")?;
                writeln!(f, "name = \"remote-{:02x}{:02x}\"", prefix[0], prefix[1])?;
                let bytes = identity.bytes();
                writeln!(
                    f,
                    "identity = [0x{:02X}, 0x{:02X}, 0x{:02X}, 0x{:02X}]",
                    bytes[0], bytes[1], bytes[2], bytes[3]
                )?;
            }
            None => {
                writeln!(f, "# Radio: {:02X} {:02X} ?? ??", prefix[0], prefix[1])?;
                writeln!(
                    f,
                    "# Press open, close or stop on the remote to capture the remaining identity bytes"
                )?;
            }
        }

        for record in &self.captures {
            let label = match record.key.channel {
                Some(channel) => format!("channel {} {}", channel, record.key.action),
                None => record.key.action.to_string(),
            };
            for variant in &record.variants {
                writeln!(
                    f,
                    "# {} ({}): {}{}",
                    label,
                    record.key.kind.name(),
                    hex_string(&variant.dynamic),
                    if variant.checksum_ok { "" } else { " [checksum mismatch]" }
                )?;
            }
        }
        Ok(())
    }
}

/// Scan a payload for the sync pattern
///
/// A mismatching byte resets the match without being re-tested against the
/// start of the pattern.
///
/// # Returns
///
/// The two bytes preceding the pattern, which are identity bytes 0 and 1.
///
/// # Examples
///
/// ```
/// use directolor::learner::scan_for_prefix;
///
/// let payload = [0x55, 0xAB, 0xCD, 0xC0, 0x11, 0x00, 0x05, 0x2B];
/// assert_eq!(scan_for_prefix(&payload), Some([0xAB, 0xCD]));
/// ```
pub fn scan_for_prefix(payload: &[u8]) -> Option<[u8; 2]> {
    let mut matched = 0usize;
    for (i, &byte) in payload.iter().enumerate() {
        if SYNC_PATTERN.get(matched) == Some(&byte) {
            matched += 1;
        } else {
            matched = 0;
        }

        if matched == SYNC_PATTERN.len() {
            if i > 4 {
                return Some([payload[i - 5], payload[i - 4]]);
            }
            matched = 0;
        }
    }
    None
}

/// Learning state machine
#[derive(Debug)]
pub struct RemoteLearner {
    state: LearnerState,
    prefix: Option<[u8; 2]>,
    suffix: Option<[u8; 2]>,
    captures: BTreeMap<CaptureKey, Vec<CapturedVariant>>,
    capture_first: bool,
    debounce: Duration,
    last_frame_at: Option<Instant>,
}

impl RemoteLearner {
    /// Create an idle learner
    ///
    /// # Arguments
    ///
    /// * `capture_first` - Drop frames arriving within `debounce` of the
    ///   previous one, so one button press yields one record
    /// * `debounce` - Quiet time separating two button presses
    pub fn new(capture_first: bool, debounce: Duration) -> Self {
        Self {
            state: LearnerState::Idle,
            prefix: None,
            suffix: None,
            captures: BTreeMap::new(),
            capture_first,
            debounce,
            last_frame_at: None,
        }
    }

    pub fn state(&self) -> LearnerState {
        self.state
    }

    /// Forget everything and start looking for a remote
    pub fn begin_search(&mut self) {
        self.prefix = None;
        self.suffix = None;
        self.captures.clear();
        self.last_frame_at = None;
        self.state = LearnerState::Searching;
        info!("Learning started, press a button on a single channel of the remote");
    }

    /// Stop learning; what was captured stays available for the dump
    pub fn cancel(&mut self) {
        if self.state != LearnerState::Idle {
            info!("Learning stopped");
        }
        self.state = LearnerState::Idle;
    }

    /// Feed one received payload
    ///
    /// # Arguments
    ///
    /// * `pipe` - Reading pipe the payload arrived on
    /// * `payload` - Raw received bytes
    /// * `now` - Reception time, used for the capture-first debounce
    pub fn ingest(&mut self, pipe: u8, payload: &[u8], now: Instant) -> LearnEvent {
        match self.state {
            LearnerState::Idle => LearnEvent::Nothing,
            LearnerState::Searching => match scan_for_prefix(payload) {
                Some(prefix) => {
                    info!("Found remote with address {:02X} {:02X}", prefix[0], prefix[1]);
                    self.prefix = Some(prefix);
                    self.state = LearnerState::Capturing(prefix);
                    LearnEvent::Discovered(prefix)
                }
                None => LearnEvent::Nothing,
            },
            LearnerState::Capturing(prefix) => self.capture(prefix, pipe, payload, now),
        }
    }

    fn capture(&mut self, prefix: [u8; 2], pipe: u8, payload: &[u8], now: Instant) -> LearnEvent {
        let declared = match payload.first() {
            Some(&declared) => declared as usize,
            None => return LearnEvent::Nothing,
        };
        if declared + LENGTH_ADJUST > FRAME_SIZE {
            return LearnEvent::Nothing;
        }

        if self.capture_first {
            let skip = self
                .last_frame_at
                .map_or(false, |last| now.saturating_duration_since(last) < self.debounce);
            self.last_frame_at = Some(now);
            if skip {
                return LearnEvent::Nothing;
            }
        }

        let address = if pipe == BROADCAST_PIPE { DUPLICATE_PREFIX } else { prefix };
        let observed = match decode_received(address, payload) {
            Some(observed) => observed,
            None => return LearnEvent::Nothing,
        };

        if observed.kind == PacketKind::Command {
            if let Some(suffix) = observed.identity_suffix {
                if self.suffix != Some(suffix) {
                    info!(
                        "Remote identity is {:02X} {:02X} {:02X} {:02X}",
                        prefix[0], prefix[1], suffix[0], suffix[1]
                    );
                }
                self.suffix = Some(suffix);
            }
        }

        debug!(
            "Captured {} {} on channel {:?}: {}",
            observed.kind.name(),
            observed.action,
            observed.channel,
            hex_string(&observed.raw)
        );
        self.record(&observed);
        LearnEvent::Captured(observed)
    }

    fn record(&mut self, observed: &ObservedFrame) {
        let key = CaptureKey {
            kind: observed.kind,
            channel: observed.channel,
            action: observed.action,
        };
        let variant = CapturedVariant {
            dynamic: observed.dynamic.clone(),
            checksum_ok: observed.checksum_ok,
        };

        let variants = self.captures.entry(key).or_default();
        if variants.contains(&variant) {
            return;
        }
        if variants.len() == MAX_VARIANTS {
            variants.remove(0);
        }
        variants.push(variant);
    }

    /// Snapshot for callers
    pub fn report(&self) -> LearnerReport {
        LearnerReport {
            state: self.state,
            prefix: self.prefix,
            suffix: self.suffix,
            captures: self
                .captures
                .iter()
                .map(|(key, variants)| CaptureRecord {
                    key: *key,
                    variants: variants.clone(),
                })
                .collect(),
        }
    }
}

impl Default for RemoteLearner {
    fn default() -> Self {
        Self::new(true, Duration::from_millis(50))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encoder::FrameEncoder;
    use crate::protocol::frame::Frame;
    use crate::protocol::types::{ChannelMask, RECEIVED_ADDRESS_BYTES};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const IDENTITY: RadioIdentity = RadioIdentity::new([0xAB, 0xCD, 0x12, 0x34]);

    fn encode(mask: u8, action: BlindAction, seed: u64) -> Frame {
        FrameEncoder::default()
            .encode(
                &IDENTITY,
                ChannelMask::new(mask).unwrap(),
                action,
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap()
    }

    fn on_air(frame: &Frame) -> Vec<u8> {
        let mut payload = frame.payload()[RECEIVED_ADDRESS_BYTES..].to_vec();
        payload.resize(FRAME_SIZE, 0x00);
        payload
    }

    fn capturing_learner(capture_first: bool) -> RemoteLearner {
        let mut learner = RemoteLearner::new(capture_first, Duration::from_millis(50));
        learner.begin_search();
        let mut payload = vec![0xAB, 0xCD, 0xC0, 0x11, 0x00, 0x05];
        payload.resize(FRAME_SIZE, 0x00);
        assert_eq!(
            learner.ingest(1, &payload, Instant::now()),
            LearnEvent::Discovered([0xAB, 0xCD])
        );
        learner
    }

    #[test]
    fn test_scan_for_prefix() {
        assert_eq!(
            scan_for_prefix(&[0xAB, 0xCD, 0xC0, 0x11, 0x00, 0x05, 0x00]),
            Some([0xAB, 0xCD])
        );
        assert_eq!(
            scan_for_prefix(&[0x55, 0x55, 0x12, 0xF0, 0xC0, 0x11, 0x00, 0x05]),
            Some([0x12, 0xF0])
        );
        assert_eq!(scan_for_prefix(&[0x55; 32]), None);
        assert_eq!(scan_for_prefix(&[]), None);
    }

    #[test]
    fn test_scan_mismatch_is_not_retested() {
        // The second C0 breaks the match and is not taken as a new start
        assert_eq!(
            scan_for_prefix(&[0xAB, 0xCD, 0xC0, 0xC0, 0x11, 0x00, 0x05, 0x00]),
            None
        );
    }

    #[test]
    fn test_scan_pattern_too_early() {
        // Pattern at the very start has no identity bytes before it
        assert_eq!(scan_for_prefix(&[0xC0, 0x11, 0x00, 0x05, 0x55, 0x55]), None);
    }

    #[test]
    fn test_learning_scenario() {
        let mut learner = RemoteLearner::default();
        assert_eq!(learner.state(), LearnerState::Idle);

        // Idle learner ignores traffic
        let payload = [0xAB, 0xCD, 0xC0, 0x11, 0x00, 0x05, 0x2B, 0x12];
        assert_eq!(learner.ingest(1, &payload, Instant::now()), LearnEvent::Nothing);

        learner.begin_search();
        assert_eq!(learner.state(), LearnerState::Searching);

        let event = learner.ingest(1, &payload, Instant::now());

        assert_eq!(event, LearnEvent::Discovered([0xAB, 0xCD]));
        assert_eq!(learner.state(), LearnerState::Capturing([0xAB, 0xCD]));
        assert_eq!(learner.report().prefix, Some([0xAB, 0xCD]));
        assert_eq!(learner.report().suffix, None);
    }

    #[test]
    fn test_capture_command_reveals_suffix() {
        let mut learner = capturing_learner(false);
        let frame = encode(0b000010, BlindAction::Open, 1);

        let event = learner.ingest(1, &on_air(&frame), Instant::now());
        let observed = match event {
            LearnEvent::Captured(observed) => observed,
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(observed.channel, Some(2));
        assert_eq!(observed.action, BlindAction::Open);
        assert!(observed.checksum_ok);

        let report = learner.report();
        assert_eq!(report.identity(), Some(IDENTITY));
        assert_eq!(report.captures.len(), 1);
        assert_eq!(report.captures[0].variants.len(), 1);
    }

    #[test]
    fn test_capture_duplicate_on_broadcast_pipe() {
        let mut learner = capturing_learner(false);
        let frame = encode(0b000001, BlindAction::Duplicate, 1);

        match learner.ingest(0, &on_air(&frame), Instant::now()) {
            LearnEvent::Captured(observed) => {
                assert_eq!(observed.kind, PacketKind::Duplicate);
                assert!(observed.checksum_ok);
            }
            other => panic!("unexpected event {:?}", other),
        }
        // Duplicates do not reveal identity bytes 2 and 3 to the learner
        assert_eq!(learner.report().suffix, None);
    }

    #[test]
    fn test_capture_first_debounce() {
        let mut learner = capturing_learner(true);
        let start = Instant::now();
        let first = on_air(&encode(0b000001, BlindAction::Close, 1));
        let second = on_air(&encode(0b000001, BlindAction::Close, 2));

        assert!(matches!(learner.ingest(1, &first, start), LearnEvent::Captured(_)));
        // Rest of the same burst
        assert_eq!(
            learner.ingest(1, &first, start + Duration::from_millis(10)),
            LearnEvent::Nothing
        );
        assert_eq!(
            learner.ingest(1, &first, start + Duration::from_millis(40)),
            LearnEvent::Nothing
        );
        // Quiet period elapsed since the last frame: next press
        assert!(matches!(
            learner.ingest(1, &second, start + Duration::from_millis(200)),
            LearnEvent::Captured(_)
        ));

        let report = learner.report();
        assert_eq!(report.captures.len(), 1);
        assert_eq!(report.captures[0].variants.len(), 2);
    }

    #[test]
    fn test_variants_are_deduplicated_and_capped() {
        let mut learner = capturing_learner(false);
        let now = Instant::now();
        let frame = on_air(&encode(0b000001, BlindAction::Stop, 1));
        learner.ingest(1, &frame, now);
        learner.ingest(1, &frame, now);
        assert_eq!(learner.report().captures[0].variants.len(), 1);

        for seed in 2..20 {
            learner.ingest(1, &on_air(&encode(0b000001, BlindAction::Stop, seed)), now);
        }
        assert_eq!(learner.report().captures[0].variants.len(), MAX_VARIANTS);
    }

    #[test]
    fn test_capture_ignores_unknown_frames() {
        let mut learner = capturing_learner(false);
        let now = Instant::now();
        assert_eq!(learner.ingest(1, &[0x20; 32], now), LearnEvent::Nothing);
        assert_eq!(learner.ingest(1, &[0xFF; 32], now), LearnEvent::Nothing);
        assert_eq!(learner.ingest(1, &[], now), LearnEvent::Nothing);
        assert!(learner.report().captures.is_empty());
    }

    #[test]
    fn test_begin_search_clears_previous_remote() {
        let mut learner = capturing_learner(false);
        learner.ingest(1, &on_air(&encode(0b000001, BlindAction::Open, 1)), Instant::now());
        assert!(learner.report().identity().is_some());

        learner.begin_search();
        let report = learner.report();
        assert_eq!(report.state, LearnerState::Searching);
        assert_eq!(report.prefix, None);
        assert!(report.captures.is_empty());
    }

    #[test]
    fn test_cancel_keeps_captures() {
        let mut learner = capturing_learner(false);
        learner.ingest(1, &on_air(&encode(0b000001, BlindAction::Open, 1)), Instant::now());
        learner.cancel();

        let report = learner.report();
        assert_eq!(report.state, LearnerState::Idle);
        assert_eq!(report.identity(), Some(IDENTITY));
        assert_eq!(report.captures.len(), 1);
    }

    #[test]
    fn test_dump_renders_remote_snippet() {
        let mut learner = capturing_learner(false);
        learner.ingest(1, &on_air(&encode(0b000100, BlindAction::Open, 1)), Instant::now());

        let dump = learner.report().to_string();
        assert!(dump.contains("[[remotes]]"));
        assert!(dump.contains("identity = [0xAB, 0xCD, 0x12, 0x34]"));
        assert!(dump.contains("# channel 3 open (command): "));
        assert!(!dump.contains("checksum mismatch"));
    }

    #[test]
    fn test_dump_without_remote() {
        assert_eq!(LearnerReport::default().to_string(), "# No remote learned yet\n");

        let partial = LearnerReport {
            state: LearnerState::Capturing([0xAB, 0xCD]),
            prefix: Some([0xAB, 0xCD]),
            ..LearnerReport::default()
        };
        let dump = partial.to_string();
        assert!(dump.starts_with("# Radio: AB CD ?? ??"));
        assert!(!dump.contains("[[remotes]]"));
    }
}
