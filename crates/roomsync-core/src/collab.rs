//! Collaboration message builders.
//!
//! Whiteboard, text editor, and chat all share one shape: a local action
//! becomes a typed envelope broadcast to every open connection, and a
//! received envelope of the matching type is applied locally. These
//! builders stamp the wire timestamp; the session owns the broadcasting.

use roomsync_shared::protocol::{now_millis, Envelope, StrokeData, WhiteboardAction};

/// A chat line carrying the sender's display name.
pub fn chat_message(sender: &str, message: &str) -> Envelope {
    Envelope::Chat {
        sender: sender.to_string(),
        message: message.to_string(),
        timestamp: now_millis(),
    }
}

/// A whiteboard drawing operation. Receivers replay the same operation,
/// so the shared canvas is append-only with no conflict resolution.
pub fn whiteboard_event(action: WhiteboardAction, data: StrokeData) -> Envelope {
    Envelope::Whiteboard {
        action,
        data,
        timestamp: now_millis(),
    }
}

/// A whole-document overwrite of the collaborative text. The last
/// received write wins; concurrent edits can clobber each other.
pub fn text_update(content: &str) -> Envelope {
    Envelope::TextEditor {
        content: content.to_string(),
        timestamp: now_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_shape() {
        match chat_message("alice", "hello") {
            Envelope::Chat {
                sender,
                message,
                timestamp,
            } => {
                assert_eq!(sender, "alice");
                assert_eq!(message, "hello");
                assert!(timestamp > 0);
            }
            other => panic!("expected chat envelope, got {other:?}"),
        }
    }

    #[test]
    fn test_whiteboard_event_carries_stroke() {
        let data = StrokeData::stroke(1.0, 2.0, "pen", "#ff0000");
        match whiteboard_event(WhiteboardAction::Draw, data.clone()) {
            Envelope::Whiteboard {
                action,
                data: sent,
                ..
            } => {
                assert_eq!(action, WhiteboardAction::Draw);
                assert_eq!(sent, data);
            }
            other => panic!("expected whiteboard envelope, got {other:?}"),
        }
    }

    #[test]
    fn test_text_update_carries_full_document() {
        match text_update("the whole document") {
            Envelope::TextEditor { content, .. } => {
                assert_eq!(content, "the whole document");
            }
            other => panic!("expected text envelope, got {other:?}"),
        }
    }
}
