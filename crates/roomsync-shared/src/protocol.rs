use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{PeerId, RoomId, TransferId};

/// All wire messages exchanged between peers.
///
/// Encoded as a JSON record with a string `type` discriminator and a
/// numeric millisecond `timestamp`, matching what remote ends expect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Envelope {
    /// Room membership handshake (join/leave)
    #[serde(rename_all = "camelCase")]
    System {
        action: SystemAction,
        room_id: RoomId,
        peer_id: PeerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        timestamp: i64,
    },

    /// Whole-file transfer
    #[serde(rename_all = "camelCase")]
    File {
        id: TransferId,
        name: String,
        size: u64,
        mime_type: String,
        data: Vec<u8>,
        /// Advisory flag mirroring the sender's encryption setting.
        /// No transform is applied to the payload.
        encrypted: bool,
        timestamp: i64,
    },

    /// Chat line
    #[serde(rename_all = "camelCase")]
    Chat {
        sender: String,
        message: String,
        timestamp: i64,
    },

    /// Whiteboard drawing operation
    #[serde(rename_all = "camelCase")]
    Whiteboard {
        action: WhiteboardAction,
        data: StrokeData,
        timestamp: i64,
    },

    /// Whole-document collaborative text overwrite
    #[serde(rename_all = "camelCase")]
    TextEditor { content: String, timestamp: i64 },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SystemAction {
    Join,
    Leave,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WhiteboardAction {
    Start,
    Draw,
    Stop,
    Clear,
}

/// Point/tool/color payload for a whiteboard operation.
///
/// `start` carries coordinates only, `draw` carries coordinates plus tool
/// and color, `stop` and `clear` carry nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StrokeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl StrokeData {
    pub fn point(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn stroke(x: f64, y: f64, tool: &str, color: &str) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            tool: Some(tool.to_string()),
            color: Some(color.to_string()),
        }
    }
}

impl Envelope {
    /// Serialize to wire bytes (JSON).
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from wire bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            Envelope::System { timestamp, .. }
            | Envelope::File { timestamp, .. }
            | Envelope::Chat { timestamp, .. }
            | Envelope::Whiteboard { timestamp, .. }
            | Envelope::TextEditor { timestamp, .. } => *timestamp,
        }
    }
}

/// Current wall-clock time in Unix milliseconds, the wire timestamp unit.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let msg = Envelope::File {
            id: TransferId::generate(),
            name: "photo.png".to_string(),
            size: 5,
            mime_type: "image/png".to_string(),
            data: vec![1, 2, 3, 4, 5],
            encrypted: true,
            timestamp: now_millis(),
        };

        let bytes = msg.to_bytes().unwrap();
        let restored = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(msg, restored);
    }

    #[test]
    fn test_type_discriminators() {
        let msg = Envelope::TextEditor {
            content: "hello".to_string(),
            timestamp: 0,
        };
        let value: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(value["type"], "textEditor");

        let msg = Envelope::System {
            action: SystemAction::Join,
            room_id: RoomId("r1".into()),
            peer_id: PeerId("p1".into()),
            username: Some("alice".into()),
            timestamp: 0,
        };
        let value: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(value["type"], "system");
        assert_eq!(value["action"], "join");
        assert_eq!(value["roomId"], "r1");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = br#"{"type":"telemetry","payload":1,"timestamp":0}"#;
        assert!(Envelope::from_bytes(raw).is_err());
    }

    #[test]
    fn test_stroke_data_omits_empty_fields() {
        let msg = Envelope::Whiteboard {
            action: WhiteboardAction::Stop,
            data: StrokeData::default(),
            timestamp: 0,
        };
        let value: serde_json::Value = serde_json::from_slice(&msg.to_bytes().unwrap()).unwrap();
        assert_eq!(value["data"], serde_json::json!({}));
    }
}
