//! The [`Directory`] trait and compare-and-swap membership helpers.

use tracing::debug;

use roomsync_shared::types::{PeerId, RoomId};

use crate::error::{DirectoryError, Result};
use crate::record::{RoomRecord, Versioned};

/// How many CAS attempts a membership edit makes before giving up.
const CAS_ATTEMPTS: usize = 16;

/// A shared key-value directory of rooms.
///
/// `compare_and_swap` is the only way membership edits are applied;
/// `put` is reserved for creating fresh entries and for tests.
pub trait Directory: Send + Sync {
    /// Fetch a room entry, if present.
    fn get(&self, room: &RoomId) -> Result<Option<Versioned<RoomRecord>>>;

    /// Unconditionally store a room entry. Returns the assigned version.
    fn put(&self, room: &RoomId, record: RoomRecord) -> Result<u64>;

    /// Replace (or delete, when `record` is `None`) the entry for `room`,
    /// but only if its current version matches `expected` (`None` meaning
    /// "the entry must not exist"). Returns `false` when the version
    /// check failed and nothing was changed.
    fn compare_and_swap(
        &self,
        room: &RoomId,
        expected: Option<u64>,
        record: Option<RoomRecord>,
    ) -> Result<bool>;

    /// Remove a room entry unconditionally. Missing entries are fine.
    fn remove(&self, room: &RoomId) -> Result<()>;

    /// All room ids currently registered.
    fn list(&self) -> Result<Vec<RoomId>>;
}

/// Register a brand-new room with `host` as its sole member.
///
/// Retries under a colliding id by failing the CAS and surfacing
/// contention; callers generate random ids so collisions are not
/// expected in practice.
pub fn create_room(dir: &dyn Directory, room: &RoomId, host: &PeerId) -> Result<RoomRecord> {
    let record = RoomRecord::new(host.clone());
    if dir.compare_and_swap(room, None, Some(record.clone()))? {
        debug!(room = %room, host = %host, "Registered new room");
        return Ok(record);
    }
    Err(DirectoryError::Contention(1))
}

/// Outcome of [`join_membership`].
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// The room existed; these were its members before we were added.
    Joined(Vec<PeerId>),
    /// The room was absent and has been created with us as host.
    Created,
}

/// Add `peer` to a room's member list with CAS retries.
///
/// When the room is absent it is created under the requested id with
/// `peer` as host (the documented join fallback).
pub fn join_membership(dir: &dyn Directory, room: &RoomId, peer: &PeerId) -> Result<JoinOutcome> {
    for attempt in 1..=CAS_ATTEMPTS {
        match dir.get(room)? {
            None => {
                let record = RoomRecord::new(peer.clone());
                if dir.compare_and_swap(room, None, Some(record))? {
                    debug!(room = %room, peer = %peer, "Room absent, created in its place");
                    return Ok(JoinOutcome::Created);
                }
            }
            Some(existing) => {
                let others = existing.value.members.clone();
                if existing.value.contains(peer) {
                    return Ok(JoinOutcome::Joined(others));
                }
                let mut updated = existing.value;
                updated.add_member(peer.clone());
                if dir.compare_and_swap(room, Some(existing.version), Some(updated))? {
                    debug!(room = %room, peer = %peer, attempt, "Joined room membership");
                    return Ok(JoinOutcome::Joined(others));
                }
            }
        }
    }
    Err(DirectoryError::Contention(CAS_ATTEMPTS))
}

/// Remove `peer` from a room's member list with CAS retries, deleting
/// the entry once the member list empties. Absent rooms are a no-op.
pub fn leave_membership(dir: &dyn Directory, room: &RoomId, peer: &PeerId) -> Result<()> {
    for attempt in 1..=CAS_ATTEMPTS {
        let Some(existing) = dir.get(room)? else {
            return Ok(());
        };
        if !existing.value.contains(peer) {
            return Ok(());
        }

        let mut updated = existing.value;
        let emptied = updated.remove_member(peer);
        let replacement = if emptied { None } else { Some(updated) };

        if dir.compare_and_swap(room, Some(existing.version), replacement)? {
            debug!(room = %room, peer = %peer, attempt, emptied, "Left room membership");
            return Ok(());
        }
    }
    Err(DirectoryError::Contention(CAS_ATTEMPTS))
}
