//! # roomsync-directory
//!
//! The shared room registry: a small key-value directory mapping room ids
//! to member lists, used by peers to discover each other.
//!
//! All edits to a room's member list go through compare-and-swap so that
//! two peers joining the same room concurrently cannot lose each other's
//! update. Two implementations are provided: an in-memory directory for
//! tests and single-process use, and a JSON-file-backed directory that
//! persists the registry between runs. A real deployment implements
//! [`Directory`] against a shared coordination service instead.

pub mod directory;
pub mod file;
pub mod memory;
pub mod record;

mod error;

pub use directory::{create_room, join_membership, leave_membership, Directory, JoinOutcome};
pub use error::{DirectoryError, Result};
pub use file::JsonFileDirectory;
pub use memory::MemoryDirectory;
pub use record::{RoomRecord, Versioned};
