use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use roomsync_shared::types::PeerId;

/// A room's registry entry: who hosts it and who is currently a member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomRecord {
    /// Peer that created the room.
    pub host: PeerId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Current member list, host included.
    pub members: Vec<PeerId>,
}

impl RoomRecord {
    /// A new room with `host` as its sole member.
    pub fn new(host: PeerId) -> Self {
        Self {
            host: host.clone(),
            created_at: Utc::now(),
            members: vec![host],
        }
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.members.contains(peer)
    }

    /// Add a member, keeping the list free of duplicates.
    pub fn add_member(&mut self, peer: PeerId) {
        if !self.contains(&peer) {
            self.members.push(peer);
        }
    }

    /// Remove a member. Returns `true` if the list is now empty.
    pub fn remove_member(&mut self, peer: &PeerId) -> bool {
        self.members.retain(|p| p != peer);
        self.members.is_empty()
    }
}

/// A registry value together with the version the store assigned to it.
/// The version is the compare-and-swap token for subsequent edits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_room_has_host_as_member() {
        let host = PeerId::generate();
        let room = RoomRecord::new(host.clone());
        assert_eq!(room.members, vec![host.clone()]);
        assert_eq!(room.host, host);
    }

    #[test]
    fn test_add_member_deduplicates() {
        let host = PeerId::generate();
        let peer = PeerId::generate();
        let mut room = RoomRecord::new(host);

        room.add_member(peer.clone());
        room.add_member(peer.clone());
        assert_eq!(room.members.len(), 2);
    }

    #[test]
    fn test_remove_last_member_reports_empty() {
        let host = PeerId::generate();
        let mut room = RoomRecord::new(host.clone());
        assert!(room.remove_member(&host));
    }
}
