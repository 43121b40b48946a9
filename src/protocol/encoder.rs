//! # Directolor Packet Encoder
//!
//! Renders blind commands into wire frames.
//!
//! Every packet kind starts from a constant template. A per-kind override
//! table lists the offsets that are replaced by identity bytes, per-send
//! random bytes, the channel and the action code; everything else is sent
//! exactly as captured from a physical remote.
//!
//! ## Content Layout (single-channel command)
//!
//! ```text
//! offset  0  1  2  3  4  5  6  7  8  9 10 11 12 13 14 15 16 17 18 19 20
//!        i0 i1 C0 11 00 05 NN FF FF i2 i3 86 CC RR ch 00 i2 i3 63 AA 00
//! ```
//!
//! `iN` identity, `NN` nonce, `CC` channel count, `RR` random, `ch` channel
//! list (one byte per channel), `AA` action. The checksum follows.

use bytes::{BufMut, BytesMut};
use rand::Rng;

use super::frame::{Frame, MAX_CONTENT_SIZE};
use super::types::{BlindAction, ChannelMask, PacketKind, RadioIdentity, LENGTH_OFFSET};
use crate::error::Result;

/// Size of the fixed token carried by duplicate frames
pub const DUPLICATE_TOKEN_SIZE: usize = 8;

/// Token sent in every duplicate frame
///
/// Measured constant; it does not depend on the remote, the channel or the
/// action. Override through `protocol.duplicate_token` when a different
/// installation token is captured.
pub const DEFAULT_DUPLICATE_TOKEN: [u8; DUPLICATE_TOKEN_SIZE] =
    [0x86, 0x08, 0x00, 0x01, 0x6A, 0x33, 0x02, 0x90];

/// Offset where the command channel list is inserted
pub const CHANNEL_LIST_OFFSET: usize = 14;

/// Offset of the command channel count byte
pub const CHANNEL_COUNT_OFFSET: usize = 12;

/// Marker byte found at offset 11 of command, group and store frames
pub const COMMAND_MARKER: u8 = 0x86;

/// Source of an overridden template byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    /// Identity byte 0..4
    Identity(usize),
    /// Fresh random nonce
    Nonce,
    /// Second fresh random byte
    Random,
    /// On-air action code
    Action,
    /// Highest channel of the mask
    HighestChannel,
    /// Duplicate token byte 0..8
    Token(usize),
}

/// One template offset and where its byte comes from
#[derive(Debug, Clone, Copy)]
struct Override {
    offset: usize,
    field: Field,
}

const fn at(offset: usize, field: Field) -> Override {
    Override { offset, field }
}

/// Template and override table of one packet kind
struct PacketLayout {
    template: &'static [u8],
    overrides: &'static [Override],
}

/// Command template without any channel (the list is inserted at
/// [`CHANNEL_LIST_OFFSET`], offsets below are pre-insertion)
const COMMAND_TEMPLATE: [u8; 20] = [
    0x00, 0x00, 0xC0, 0x10, 0x00, 0x05, 0x00, 0xFF, 0xFF, 0x00, //
    0x00, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x63, 0x00, 0x00,
];

const COMMAND_OVERRIDES: [Override; 9] = [
    at(0, Field::Identity(0)),
    at(1, Field::Identity(1)),
    at(6, Field::Nonce),
    at(9, Field::Identity(2)),
    at(10, Field::Identity(3)),
    at(13, Field::Random),
    at(15, Field::Identity(2)),
    at(16, Field::Identity(3)),
    at(18, Field::Action),
];

const GROUP_TEMPLATE: [u8; 14] = [
    0x00, 0x00, 0xC0, 0x0A, 0x00, 0x05, 0x00, 0xFF, 0xFF, 0x00, //
    0x00, 0x86, 0x00, 0x00,
];

const GROUP_OVERRIDES: [Override; 7] = [
    at(0, Field::Identity(0)),
    at(1, Field::Identity(1)),
    at(6, Field::Nonce),
    at(9, Field::Identity(2)),
    at(10, Field::Identity(3)),
    at(12, Field::HighestChannel),
    at(13, Field::Action),
];

const DUPLICATE_TEMPLATE: [u8; 22] = [
    0xFF, 0xFF, 0xC0, 0x12, 0x00, 0x05, 0x00, 0xFF, 0xFF, 0x00, //
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
    0x00, 0x00,
];

const DUPLICATE_OVERRIDES: [Override; 13] = [
    at(6, Field::Nonce),
    at(9, Field::Token(0)),
    at(10, Field::Token(1)),
    at(11, Field::Token(2)),
    at(12, Field::Token(3)),
    at(13, Field::Token(4)),
    at(14, Field::Token(5)),
    at(15, Field::Token(6)),
    at(16, Field::Token(7)),
    at(17, Field::Identity(1)),
    at(18, Field::Identity(0)),
    at(19, Field::Identity(2)),
    at(20, Field::Identity(3)),
];

const STORE_FAVORITE_TEMPLATE: [u8; 19] = [
    0x11, 0x11, 0xC0, 0x0F, 0x00, 0x05, 0x2B, 0xFF, 0xFF, 0xBB, //
    0x0D, 0x86, 0x04, 0x20, 0xBB, 0x0D, 0x63, 0x49, 0x00,
];

const STORE_FAVORITE_OVERRIDES: [Override; 9] = [
    at(0, Field::Identity(0)),
    at(1, Field::Identity(1)),
    at(6, Field::Nonce),
    at(9, Field::Identity(2)),
    at(10, Field::Identity(3)),
    at(12, Field::HighestChannel),
    at(13, Field::Random),
    at(14, Field::Identity(2)),
    at(15, Field::Identity(3)),
];

fn layout(kind: PacketKind) -> PacketLayout {
    match kind {
        PacketKind::Command => PacketLayout {
            template: &COMMAND_TEMPLATE,
            overrides: &COMMAND_OVERRIDES,
        },
        PacketKind::Group => PacketLayout {
            template: &GROUP_TEMPLATE,
            overrides: &GROUP_OVERRIDES,
        },
        PacketKind::Duplicate => PacketLayout {
            template: &DUPLICATE_TEMPLATE,
            overrides: &DUPLICATE_OVERRIDES,
        },
        PacketKind::StoreFavorite => PacketLayout {
            template: &STORE_FAVORITE_TEMPLATE,
            overrides: &STORE_FAVORITE_OVERRIDES,
        },
    }
}

/// Builds wire frames for a remote identity
///
/// # Examples
///
/// ```
/// use directolor::protocol::encoder::FrameEncoder;
/// use directolor::protocol::types::{BlindAction, ChannelMask, RadioIdentity};
///
/// let encoder = FrameEncoder::default();
/// let identity = RadioIdentity::new([0x12, 0xF0, 0x78, 0x09]);
/// let mask = ChannelMask::from_channel(1).unwrap();
/// let frame = encoder
///     .encode(&identity, mask, BlindAction::Open, &mut rand::thread_rng())
///     .unwrap();
/// assert_eq!(frame.as_bytes().len(), 32);
/// ```
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    duplicate_token: [u8; DUPLICATE_TOKEN_SIZE],
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_DUPLICATE_TOKEN)
    }
}

impl FrameEncoder {
    /// Create an encoder using `duplicate_token` for duplicate frames
    pub fn new(duplicate_token: [u8; DUPLICATE_TOKEN_SIZE]) -> Self {
        Self { duplicate_token }
    }

    /// Encode and finalize a frame
    ///
    /// Draws fresh random bytes from `rng` on every call, so repeated sends
    /// of the same command are distinct frames on air.
    ///
    /// # Errors
    ///
    /// Returns error only if the rendered content does not fit a frame,
    /// which a valid [`ChannelMask`] rules out.
    pub fn encode<R: Rng + ?Sized>(
        &self,
        identity: &RadioIdentity,
        mask: ChannelMask,
        action: BlindAction,
        rng: &mut R,
    ) -> Result<Frame> {
        let content = self.render(identity, mask, action, rng);
        Frame::finalize(&content)
    }

    /// Render the frame content (before checksum and preamble)
    pub fn render<R: Rng + ?Sized>(
        &self,
        identity: &RadioIdentity,
        mask: ChannelMask,
        action: BlindAction,
        rng: &mut R,
    ) -> BytesMut {
        let kind = action.packet_kind();
        let layout = layout(kind);
        let nonce: u8 = rng.gen();
        let random: u8 = rng.gen();

        let mut body = layout.template.to_vec();
        for o in layout.overrides {
            let value = match o.field {
                Field::Identity(index) => identity.byte(index),
                Field::Nonce => nonce,
                Field::Random => random,
                Field::Action => action.code(),
                Field::HighestChannel => mask.highest(),
                Field::Token(index) => self.duplicate_token[index],
            };
            body[o.offset] = value;
        }

        let mut content = BytesMut::with_capacity(MAX_CONTENT_SIZE);
        if kind == PacketKind::Command {
            let count = mask.count() as u8;
            content.extend_from_slice(&body[..CHANNEL_LIST_OFFSET]);
            for channel in mask.channels() {
                content.put_u8(channel);
            }
            content.extend_from_slice(&body[CHANNEL_LIST_OFFSET..]);
            content[LENGTH_OFFSET] += count;
            content[CHANNEL_COUNT_OFFSET] += count;
        } else {
            content.extend_from_slice(&body);
        }

        content
    }
}
