//! Inbound message classification.
//!
//! Wire bytes come off a channel, get decoded into an [`Envelope`], and
//! are classified to exactly one owning handler. Malformed payloads and
//! unknown types are logged and dropped so the receive loop never dies
//! on bad input.

use tracing::debug;

use roomsync_shared::protocol::Envelope;
use roomsync_shared::types::PeerId;

/// The feature handler that owns a message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    System,
    FileTransfer,
    Chat,
    Whiteboard,
    TextEditor,
}

/// Decode wire bytes from `peer`. Undecodable input yields `None`.
pub fn decode(peer: &PeerId, bytes: &[u8]) -> Option<Envelope> {
    match Envelope::from_bytes(bytes) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            debug!(peer = %peer, len = bytes.len(), error = %e, "Dropping unrecognized message");
            None
        }
    }
}

/// Pure lookup from envelope to owning handler. No payload transformation.
pub fn classify(envelope: &Envelope) -> Route {
    match envelope {
        Envelope::System { .. } => Route::System,
        Envelope::File { .. } => Route::FileTransfer,
        Envelope::Chat { .. } => Route::Chat,
        Envelope::Whiteboard { .. } => Route::Whiteboard,
        Envelope::TextEditor { .. } => Route::TextEditor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_shared::protocol::{now_millis, StrokeData, SystemAction, WhiteboardAction};
    use roomsync_shared::types::{RoomId, TransferId};

    #[test]
    fn test_classify_all_types() {
        let cases = [
            (
                Envelope::System {
                    action: SystemAction::Join,
                    room_id: RoomId::generate(),
                    peer_id: PeerId::generate(),
                    username: None,
                    timestamp: now_millis(),
                },
                Route::System,
            ),
            (
                Envelope::File {
                    id: TransferId::generate(),
                    name: "a.bin".into(),
                    size: 0,
                    mime_type: "application/octet-stream".into(),
                    data: vec![],
                    encrypted: false,
                    timestamp: now_millis(),
                },
                Route::FileTransfer,
            ),
            (
                Envelope::Chat {
                    sender: "alice".into(),
                    message: "hi".into(),
                    timestamp: now_millis(),
                },
                Route::Chat,
            ),
            (
                Envelope::Whiteboard {
                    action: WhiteboardAction::Clear,
                    data: StrokeData::default(),
                    timestamp: now_millis(),
                },
                Route::Whiteboard,
            ),
            (
                Envelope::TextEditor {
                    content: String::new(),
                    timestamp: now_millis(),
                },
                Route::TextEditor,
            ),
        ];

        for (envelope, expected) in cases {
            assert_eq!(classify(&envelope), expected);
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let peer = PeerId::generate();
        assert!(decode(&peer, b"not json at all").is_none());
        assert!(decode(&peer, b"").is_none());
        assert!(decode(&peer, br#"{"type":"mystery","timestamp":0}"#).is_none());
        assert!(decode(&peer, br#"[1,2,3]"#).is_none());
    }

    #[test]
    fn test_decode_accepts_valid_envelope() {
        let peer = PeerId::generate();
        let raw = br#"{"type":"chat","sender":"bob","message":"hello","timestamp":42}"#;
        let envelope = decode(&peer, raw).unwrap();
        assert_eq!(classify(&envelope), Route::Chat);
    }
}
