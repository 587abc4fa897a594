//! Connection tracking for the current room.
//!
//! Maintains an in-memory map of open connections keyed by peer id,
//! at most one connection per peer.

use std::collections::HashMap;

use tracing::debug;

use roomsync_shared::protocol::{now_millis, Envelope, SystemAction};
use roomsync_shared::types::{PeerId, RoomId};

use crate::transport::ChannelSender;

/// One established connection to a room member.
#[derive(Debug, Clone)]
pub struct ConnEntry {
    /// The remote peer's id, fixed at handshake time.
    pub peer_id: PeerId,
    /// Which underlying channel this connection came from.
    pub chan_id: u64,
    /// Remote display name, learned from handshake metadata or the
    /// peer's join message.
    pub username: Option<String>,
    /// Outbound half of the channel.
    pub sender: ChannelSender,
}

/// All currently open connections. Insertions for an already-connected
/// peer are refused, which is what suppresses duplicate channels when
/// two peers dial each other simultaneously.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    conns: HashMap<PeerId, ConnEntry>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns `false` (and drops nothing) when a
    /// connection for this peer already exists.
    pub fn insert(&mut self, entry: ConnEntry) -> bool {
        if self.conns.contains_key(&entry.peer_id) {
            debug!(peer = %entry.peer_id, "Duplicate connection suppressed");
            return false;
        }
        debug!(peer = %entry.peer_id, chan = entry.chan_id, "Tracking connection");
        self.conns.insert(entry.peer_id.clone(), entry);
        true
    }

    /// Remove the connection for `peer`, but only if it belongs to the
    /// channel identified by `chan_id`. A close event from a suppressed
    /// duplicate channel must not tear down the surviving connection.
    pub fn remove_channel(&mut self, peer: &PeerId, chan_id: u64) -> Option<ConnEntry> {
        match self.conns.get(peer) {
            Some(entry) if entry.chan_id == chan_id => {
                debug!(peer = %peer, chan = chan_id, "Removed connection");
                self.conns.remove(peer)
            }
            _ => None,
        }
    }

    pub fn get(&self, peer: &PeerId) -> Option<&ConnEntry> {
        self.conns.get(peer)
    }

    pub fn contains(&self, peer: &PeerId) -> bool {
        self.conns.contains_key(peer)
    }

    pub fn set_username(&mut self, peer: &PeerId, username: &str) {
        if let Some(entry) = self.conns.get_mut(peer) {
            entry.username = Some(username.to_string());
        }
    }

    /// Snapshot of the outbound halves, for broadcasting.
    pub fn senders(&self) -> Vec<(PeerId, ChannelSender)> {
        self.conns
            .values()
            .map(|e| (e.peer_id.clone(), e.sender.clone()))
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ConnEntry> {
        self.conns.values()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Drop every connection, returning the entries for teardown.
    pub fn drain(&mut self) -> Vec<ConnEntry> {
        self.conns.drain().map(|(_, e)| e).collect()
    }
}

/// The `join` system message announced on a freshly opened connection.
pub fn join_notice(room: &RoomId, peer: &PeerId, username: &str) -> Envelope {
    Envelope::System {
        action: SystemAction::Join,
        room_id: room.clone(),
        peer_id: peer.clone(),
        username: Some(username.to_string()),
        timestamp: now_millis(),
    }
}

/// The `leave` system message sent on every connection during teardown.
pub fn leave_notice(room: &RoomId, peer: &PeerId) -> Envelope {
    Envelope::System {
        action: SystemAction::Leave,
        room_id: room.clone(),
        peer_id: peer.clone(),
        username: None,
        timestamp: now_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn dummy_entry(peer: PeerId, chan_id: u64) -> ConnEntry {
        let (tx, _rx) = mpsc::channel(4);
        ConnEntry {
            peer_id: peer,
            chan_id,
            username: None,
            sender: ChannelSender::new(tx),
        }
    }

    #[test]
    fn test_insert_and_duplicate_suppression() {
        let mut table = ConnectionTable::new();
        let peer = PeerId::generate();

        assert!(table.insert(dummy_entry(peer.clone(), 1)));
        assert!(!table.insert(dummy_entry(peer.clone(), 2)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&peer).unwrap().chan_id, 1);
    }

    #[test]
    fn test_remove_requires_matching_channel() {
        let mut table = ConnectionTable::new();
        let peer = PeerId::generate();
        table.insert(dummy_entry(peer.clone(), 1));

        // A stale close from a suppressed duplicate channel is ignored.
        assert!(table.remove_channel(&peer, 2).is_none());
        assert!(table.contains(&peer));

        assert!(table.remove_channel(&peer, 1).is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn test_set_username() {
        let mut table = ConnectionTable::new();
        let peer = PeerId::generate();
        table.insert(dummy_entry(peer.clone(), 1));

        table.set_username(&peer, "bob");
        assert_eq!(table.get(&peer).unwrap().username.as_deref(), Some("bob"));
    }

    #[test]
    fn test_join_notice_shape() {
        let room = RoomId::generate();
        let peer = PeerId::generate();
        let msg = join_notice(&room, &peer, "alice");

        match msg {
            Envelope::System {
                action,
                room_id,
                peer_id,
                username,
                ..
            } => {
                assert_eq!(action, SystemAction::Join);
                assert_eq!(room_id, room);
                assert_eq!(peer_id, peer);
                assert_eq!(username.as_deref(), Some("alice"));
            }
            other => panic!("expected system message, got {other:?}"),
        }
    }
}
