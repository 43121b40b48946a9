//! Traffic log record types

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::protocol::decoder::ObservedFrame;
use crate::protocol::frame::Frame;
use crate::protocol::types::{hex_string, BlindAction, ChannelMask, PacketKind, RadioIdentity};

/// Whether the bridge sent the frame or heard it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Sent,
    Observed,
}

/// One line of the traffic log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficRecord {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub kind: PacketKind,
    pub action: BlindAction,

    /// 1-based remote index, for sent frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    pub channels: Vec<u8>,

    /// Transmissions left after this one, for sent frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u8>,

    /// Checksum verification result, for observed frames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum_ok: Option<bool>,

    /// Frame bytes as hex
    pub frame: String,
}

impl TrafficRecord {
    /// Record for a frame the bridge transmitted
    pub fn sent(
        remote: usize,
        identity: &RadioIdentity,
        mask: ChannelMask,
        action: BlindAction,
        attempts_remaining: u8,
        frame: &Frame,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            direction: Direction::Sent,
            kind: action.packet_kind(),
            action,
            remote: Some(remote),
            identity: Some(identity.to_string()),
            channels: mask.channels().collect(),
            attempts_remaining: Some(attempts_remaining),
            checksum_ok: None,
            frame: frame.to_string(),
        }
    }

    /// Record for a frame captured from a physical remote
    pub fn observed(prefix: [u8; 2], frame: &ObservedFrame) -> Self {
        let identity = match frame.identity_suffix {
            Some(suffix) => {
                RadioIdentity::new([prefix[0], prefix[1], suffix[0], suffix[1]]).to_string()
            }
            None => format!("{:02X} {:02X}", prefix[0], prefix[1]),
        };
        Self {
            timestamp: Utc::now(),
            direction: Direction::Observed,
            kind: frame.kind,
            action: frame.action,
            remote: None,
            identity: Some(identity),
            channels: frame.channel.into_iter().collect(),
            attempts_remaining: None,
            checksum_ok: Some(frame.checksum_ok),
            frame: hex_string(&frame.raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sent_record_json() {
        let frame = Frame::finalize(&[0x01, 0x02]).unwrap();
        let record = TrafficRecord::sent(
            2,
            &RadioIdentity::new([0x11, 0x11, 0xB9, 0x7B]),
            ChannelMask::new(0b101).unwrap(),
            BlindAction::Close,
            2,
            &frame,
        );

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["direction"], "sent");
        assert_eq!(json["kind"], "command");
        assert_eq!(json["action"], "close");
        assert_eq!(json["remote"], 2);
        assert_eq!(json["identity"], "11 11 B9 7B");
        assert_eq!(json["channels"], serde_json::json!([1, 3]));
        assert_eq!(json["attempts_remaining"], 2);
        assert!(json.get("checksum_ok").is_none());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_observed_record_json() {
        let observed = ObservedFrame {
            kind: PacketKind::Group,
            channel: Some(4),
            action: BlindAction::Join,
            identity_suffix: Some([0x12, 0x34]),
            dynamic: vec![0xAA],
            checksum_ok: false,
            raw: vec![0x0A, 0x00],
        };
        let record = TrafficRecord::observed([0xAB, 0xCD], &observed);

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["direction"], "observed");
        assert_eq!(json["kind"], "group");
        assert_eq!(json["identity"], "AB CD 12 34");
        assert_eq!(json["channels"], serde_json::json!([4]));
        assert_eq!(json["checksum_ok"], false);
        assert_eq!(json["frame"], "0A 00");
        assert!(json.get("remote").is_none());
    }
}
