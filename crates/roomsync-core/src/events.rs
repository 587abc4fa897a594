//! Events the session surfaces to its UI consumer.

use serde::Serialize;

use roomsync_shared::protocol::{StrokeData, WhiteboardAction};
use roomsync_shared::types::{PeerId, RoomId, TransferId};

use crate::transfer::{Direction, TransferState};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Info,
    Success,
    Warning,
    Error,
}

/// A room member as shown in the roster.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MemberInfo {
    pub peer_id: PeerId,
    pub username: Option<String>,
    pub is_self: bool,
}

/// Snapshot of a transfer for UI display; the payload itself is fetched
/// separately on demand.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransferSnapshot {
    pub id: TransferId,
    pub direction: Direction,
    pub peer: PeerId,
    pub file_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub state: TransferState,
    pub progress: u8,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum UiEvent {
    /// A notification to show the user.
    Toast {
        kind: ToastKind,
        title: String,
        message: String,
    },

    /// A transfer was created or changed state/progress.
    Transfer(TransferSnapshot),

    /// The current room or member list changed.
    RoomRefresh {
        room: Option<RoomId>,
        members: Vec<MemberInfo>,
    },

    /// A chat line arrived from a remote peer.
    Chat {
        peer: PeerId,
        sender: String,
        message: String,
        timestamp: i64,
    },

    /// A whiteboard operation to replay on the local canvas.
    Whiteboard {
        peer: PeerId,
        action: WhiteboardAction,
        data: StrokeData,
    },

    /// The shared document was overwritten by a remote edit.
    Text { peer: PeerId, content: String },
}
