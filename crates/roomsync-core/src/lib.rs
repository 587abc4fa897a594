// Peer/room coordination core: connection management, message routing,
// file transfer queueing, and collaboration broadcasting over an
// abstract peer-to-peer transport.

pub mod collab;
pub mod config;
pub mod events;
pub mod loopback;
pub mod rooms;
pub mod router;
pub mod session;
pub mod transfer;
pub mod transport;

mod error;

pub use config::SessionConfig;
pub use error::SessionError;
pub use events::{MemberInfo, ToastKind, TransferSnapshot, UiEvent};
pub use loopback::LoopbackHub;
pub use session::{spawn_session, FileSource, OutgoingFile, SessionHandle};
pub use transfer::{preview_kind, Direction, PreviewKind, TransferState};
pub use transport::{
    ChannelEvent, ChannelSender, HandshakeMetadata, Transport, TransportChannel, TransportError,
};
