//! # roomsync-shared
//!
//! Identifiers, the wire protocol envelope, and error types shared by the
//! room coordination core and the registry crate.

pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use protocol::{now_millis, Envelope, StrokeData, SystemAction, WhiteboardAction};
pub use types::{format_size, PeerId, RoomId, TransferId};
