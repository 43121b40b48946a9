//! # Directolor Packet Decoder
//!
//! Interprets frames seen on air (capture mode, passive listening) and
//! frames produced by the encoder.

use super::crc::checksum;
use super::encoder::{CHANNEL_COUNT_OFFSET, CHANNEL_LIST_OFFSET, COMMAND_MARKER};
use super::frame::Frame;
use super::types::{
    BlindAction, PacketKind, RadioIdentity, ADDRESS_MARKER, CHECKSUM_SIZE, LENGTH_ADJUST,
    LENGTH_OFFSET, RECEIVED_ADDRESS_BYTES, REMOTE_CHANNELS,
};

/// Received offsets of the per-send bytes of a command (nonce, random, checksum)
const COMMAND_DYNAMIC: [usize; 4] = [3, 10, 18, 19];

/// Received offsets of the per-send bytes of a group frame (nonce, checksum)
const GROUP_DYNAMIC: [usize; 3] = [3, 11, 12];

/// Received offsets of the per-send bytes of a store-favorite frame
const STORE_FAVORITE_DYNAMIC: [usize; 4] = [3, 10, 16, 17];

/// Received offsets of the per-send and token bytes of a duplicate frame
const DUPLICATE_DYNAMIC: [usize; 11] = [3, 6, 7, 8, 9, 10, 11, 12, 13, 19, 20];

/// Received offset of the command marker
const RECEIVED_MARKER_OFFSET: usize = 8;

/// Identity prefix of duplicate frames, which are addressed to everyone
pub const DUPLICATE_PREFIX: [u8; 2] = [0xFF, 0xFF];

/// A frame received by the radio, address bytes already stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedFrame {
    /// Frame family
    pub kind: PacketKind,

    /// 1-based channel, for kinds that carry one
    pub channel: Option<u8>,

    /// Decoded action
    pub action: BlindAction,

    /// Identity bytes 2 and 3 where the frame carries them
    pub identity_suffix: Option<[u8; 2]>,

    /// Bytes that change from send to send (nonce, random, checksum, token)
    pub dynamic: Vec<u8>,

    /// Whether the trailing checksum matches the reconstructed content
    pub checksum_ok: bool,

    /// Received bytes, from the declared length through the checksum
    pub raw: Vec<u8>,
}

/// Number of meaningful received bytes for a declared length
pub fn received_length(declared: u8) -> usize {
    declared as usize + LENGTH_ADJUST - RECEIVED_ADDRESS_BYTES + CHECKSUM_SIZE
}

/// Decode a received payload
///
/// # Arguments
///
/// * `prefix` - Identity prefix of the pipe the payload arrived on, used to
///   rebuild the checksummed content
/// * `payload` - Raw bytes as read from the radio
///
/// # Returns
///
/// `None` for frames that are not interesting: unknown lengths, truncated
/// payloads, unknown action codes or channels out of range.
pub fn decode_received(prefix: [u8; 2], payload: &[u8]) -> Option<ObservedFrame> {
    let declared = *payload.first()?;
    let kind = PacketKind::from_declared_length(declared)?;
    let len = received_length(declared);
    if payload.len() < len {
        return None;
    }
    let p = &payload[..len];

    let (channel, action, identity_suffix, dynamic) = match kind {
        PacketKind::Command => {
            let action = BlindAction::from_code(p[16])?;
            if action.packet_kind() != PacketKind::Command {
                return None;
            }
            (Some(p[11]), action, Some([p[6], p[7]]), &COMMAND_DYNAMIC[..])
        }
        PacketKind::Group => {
            let action = BlindAction::from_code(p[10])?;
            if !action.requires_duplicate() {
                return None;
            }
            (Some(p[9]), action, Some([p[6], p[7]]), &GROUP_DYNAMIC[..])
        }
        PacketKind::StoreFavorite => (
            Some(p[9]),
            BlindAction::SetFavorite,
            Some([p[6], p[7]]),
            &STORE_FAVORITE_DYNAMIC[..],
        ),
        PacketKind::Duplicate => {
            // Two-channel commands share this declared length
            if p[RECEIVED_MARKER_OFFSET] == COMMAND_MARKER {
                return None;
            }
            (
                None,
                BlindAction::Duplicate,
                Some([p[16], p[17]]),
                &DUPLICATE_DYNAMIC[..],
            )
        }
    };

    if let Some(channel) = channel {
        if channel == 0 || channel > REMOTE_CHANNELS {
            return None;
        }
    }

    Some(ObservedFrame {
        kind,
        channel,
        action,
        identity_suffix,
        dynamic: dynamic.iter().map(|&offset| p[offset]).collect(),
        checksum_ok: verify_received_checksum(prefix, p),
        raw: p.to_vec(),
    })
}

/// Check the trailing checksum of a received payload of exact length
fn verify_received_checksum(prefix: [u8; 2], payload: &[u8]) -> bool {
    let split = payload.len() - CHECKSUM_SIZE;
    let mut content = Vec::with_capacity(split + RECEIVED_ADDRESS_BYTES);
    content.extend_from_slice(&prefix);
    content.push(ADDRESS_MARKER);
    content.extend_from_slice(&payload[..split]);

    let carried = u16::from_be_bytes([payload[split], payload[split + 1]]);
    checksum(&content) == carried
}

/// Decoded fields of a complete frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    /// Frame family
    pub kind: PacketKind,

    /// Identity the frame claims to come from
    pub identity: RadioIdentity,

    /// Addressed channels in wire order (empty for duplicate frames)
    pub channels: Vec<u8>,

    /// Decoded action
    pub action: BlindAction,
}

/// Parse a finalized frame, including multi-channel commands
///
/// Returns `None` when the content does not match any known layout.
pub fn parse_frame(frame: &Frame) -> Option<ParsedFrame> {
    let c = frame.content();
    let declared = *c.get(LENGTH_OFFSET)? as usize;
    if c.len() != declared + LENGTH_ADJUST {
        return None;
    }

    let identity =
        |a: usize, b: usize, x: usize, y: usize| RadioIdentity::new([c[a], c[b], c[x], c[y]]);

    if declared == PacketKind::Group.declared_length() as usize {
        return Some(ParsedFrame {
            kind: PacketKind::Group,
            identity: identity(0, 1, 9, 10),
            channels: vec![c[12]],
            action: BlindAction::from_code(c[13])?,
        });
    }

    if declared == PacketKind::StoreFavorite.declared_length() as usize {
        return Some(ParsedFrame {
            kind: PacketKind::StoreFavorite,
            identity: identity(0, 1, 9, 10),
            channels: vec![c[12]],
            action: BlindAction::SetFavorite,
        });
    }

    let base = PacketKind::Command.declared_length() as usize - 1;
    let count = c[CHANNEL_COUNT_OFFSET] as usize;
    if c[11] == COMMAND_MARKER
        && (1..=REMOTE_CHANNELS as usize).contains(&count)
        && declared == base + count
    {
        return Some(ParsedFrame {
            kind: PacketKind::Command,
            identity: identity(0, 1, 9, 10),
            channels: c[CHANNEL_LIST_OFFSET..CHANNEL_LIST_OFFSET + count].to_vec(),
            action: BlindAction::from_code(c[18 + count])?,
        });
    }

    if declared == PacketKind::Duplicate.declared_length() as usize {
        return Some(ParsedFrame {
            kind: PacketKind::Duplicate,
            identity: identity(18, 17, 19, 20),
            channels: Vec::new(),
            action: BlindAction::Duplicate,
        });
    }

    None
}
