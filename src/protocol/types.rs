//! # Directolor Protocol Constants and Types
//!
//! Core protocol definitions shared by the encoder, the decoder and the learner.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DirectolorError, Result};

/// Size of every frame pushed to the radio (nRF24L01+ maximum payload)
pub const FRAME_SIZE: usize = 32;

/// Filler value for the unused leading bytes of a frame
pub const PREAMBLE_BYTE: u8 = 0x55;

/// Number of checksum bytes appended after the content
pub const CHECKSUM_SIZE: usize = 2;

/// Number of channels a single remote can address
pub const REMOTE_CHANNELS: u8 = 6;

/// Maximum number of remotes the bridge can impersonate
pub const MAX_REMOTES: usize = 7;

/// Marker byte that follows the identity prefix on air
pub const ADDRESS_MARKER: u8 = 0xC0;

/// Pattern that follows the identity prefix in every single-channel command
pub const SYNC_PATTERN: [u8; 4] = [ADDRESS_MARKER, 0x11, 0x00, 0x05];

/// Offset of the declared length byte within the content
pub const LENGTH_OFFSET: usize = 3;

/// Difference between the content length and its declared length
pub const LENGTH_ADJUST: usize = 4;

/// Bytes consumed by the receiver's 3-byte address (id0, id1, marker)
pub const RECEIVED_ADDRESS_BYTES: usize = 3;

/// Mask of the channel bits a remote can address
const CHANNEL_BITS: u8 = 0b0011_1111;

/// Wire frame families, distinguished on air by their declared length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketKind {
    /// Open/close/tilt/stop/favorite, one or more channels
    Command,
    /// Join or remove a blind
    Group,
    /// Mandatory precursor of a group frame
    Duplicate,
    /// Store the current position as favorite
    StoreFavorite,
}

impl PacketKind {
    /// Declared length of the frame as a physical remote sends it
    /// (single channel for commands)
    pub fn declared_length(self) -> u8 {
        match self {
            PacketKind::Command => 0x11,
            PacketKind::Group => 0x0A,
            PacketKind::Duplicate => 0x12,
            PacketKind::StoreFavorite => 0x0F,
        }
    }

    /// Classify a captured frame by its declared length
    pub fn from_declared_length(length: u8) -> Option<Self> {
        [
            PacketKind::Command,
            PacketKind::Group,
            PacketKind::Duplicate,
            PacketKind::StoreFavorite,
        ]
        .into_iter()
        .find(|kind| kind.declared_length() == length)
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            PacketKind::Command => "command",
            PacketKind::Group => "group",
            PacketKind::Duplicate => "duplicate",
            PacketKind::StoreFavorite => "store favorite",
        }
    }
}

/// Actions a remote can send; discriminants are the on-air action codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BlindAction {
    Open = 0x55,
    Close = 0x44,
    TiltOpen = 0x52,
    TiltClose = 0x4C,
    Stop = 0x53,
    ToFavorite = 0x48,
    SetFavorite = 0x06,
    Join = 0x01,
    Remove = 0x00,
    Duplicate = 0x04,
}

impl BlindAction {
    /// All actions, in remote button order
    pub const ALL: [BlindAction; 10] = [
        BlindAction::Open,
        BlindAction::Close,
        BlindAction::TiltOpen,
        BlindAction::TiltClose,
        BlindAction::Stop,
        BlindAction::ToFavorite,
        BlindAction::SetFavorite,
        BlindAction::Join,
        BlindAction::Remove,
        BlindAction::Duplicate,
    ];

    /// On-air action code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up an action by its on-air code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.code() == code)
    }

    /// Frame family used to carry this action
    pub fn packet_kind(self) -> PacketKind {
        match self {
            BlindAction::Join | BlindAction::Remove => PacketKind::Group,
            BlindAction::Duplicate => PacketKind::Duplicate,
            BlindAction::SetFavorite => PacketKind::StoreFavorite,
            _ => PacketKind::Command,
        }
    }

    /// Join and remove must be preceded by a duplicate frame
    pub fn requires_duplicate(self) -> bool {
        matches!(self, BlindAction::Join | BlindAction::Remove)
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            BlindAction::Open => "open",
            BlindAction::Close => "close",
            BlindAction::TiltOpen => "tilt-open",
            BlindAction::TiltClose => "tilt-close",
            BlindAction::Stop => "stop",
            BlindAction::ToFavorite => "favorite",
            BlindAction::SetFavorite => "set-favorite",
            BlindAction::Join => "join",
            BlindAction::Remove => "remove",
            BlindAction::Duplicate => "duplicate",
        }
    }
}

impl fmt::Display for BlindAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlindAction {
    type Err = DirectolorError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|action| action.name() == wanted)
            .ok_or_else(|| DirectolorError::Protocol(format!("unknown action '{}'", s)))
    }
}

/// The four bytes identifying a paired remote on the air
///
/// Bytes 0 and 1 double as the receive address prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RadioIdentity(pub [u8; 4]);

impl RadioIdentity {
    /// Create an identity from its raw bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Raw identity bytes
    pub fn bytes(&self) -> [u8; 4] {
        self.0
    }

    /// Byte at `index` (0..4)
    pub fn byte(&self, index: usize) -> u8 {
        self.0[index]
    }

    /// Address prefix used to filter traffic for this remote
    pub fn prefix(&self) -> [u8; 2] {
        [self.0[0], self.0[1]]
    }
}

impl fmt::Display for RadioIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X} {:02X} {:02X}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// Set of channels addressed by a command, bit `i` is channel `i + 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelMask(u8);

impl ChannelMask {
    /// Validate a raw mask
    ///
    /// # Errors
    ///
    /// Returns [`DirectolorError::InvalidChannelMask`] if bit 6 or 7 is set
    /// or if no channel is selected.
    pub fn new(bits: u8) -> Result<Self> {
        if bits & !CHANNEL_BITS != 0 || bits == 0 {
            return Err(DirectolorError::InvalidChannelMask(bits));
        }
        Ok(Self(bits))
    }

    /// Mask selecting a single 1-based channel
    ///
    /// # Errors
    ///
    /// Returns [`DirectolorError::InvalidChannel`] outside 1..=6.
    pub fn from_channel(channel: u8) -> Result<Self> {
        if channel == 0 || channel > REMOTE_CHANNELS {
            return Err(DirectolorError::InvalidChannel(channel));
        }
        Ok(Self(1 << (channel - 1)))
    }

    /// Raw bits
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Union of two masks
    pub fn merge(self, other: ChannelMask) -> ChannelMask {
        Self(self.0 | other.0)
    }

    /// Selected 1-based channel numbers, ascending
    pub fn channels(self) -> impl Iterator<Item = u8> {
        (0..REMOTE_CHANNELS).filter(move |bit| self.0 & (1 << bit) != 0).map(|bit| bit + 1)
    }

    /// Number of selected channels
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Highest selected 1-based channel
    pub fn highest(self) -> u8 {
        (8 - self.0.leading_zeros()) as u8
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels: Vec<String> = self.channels().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", channels.join(","))
    }
}

/// Format bytes as space separated upper-case hex
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
