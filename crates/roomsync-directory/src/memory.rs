//! In-memory [`Directory`] for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Mutex;

use roomsync_shared::types::RoomId;

use crate::directory::Directory;
use crate::error::Result;
use crate::record::{RoomRecord, Versioned};

#[derive(Default)]
struct Inner {
    rooms: HashMap<RoomId, Versioned<RoomRecord>>,
    next_version: u64,
}

impl Inner {
    fn assign_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

pub struct MemoryDirectory {
    inner: Mutex<Inner>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory for MemoryDirectory {
    fn get(&self, room: &RoomId) -> Result<Option<Versioned<RoomRecord>>> {
        Ok(self.lock().rooms.get(room).cloned())
    }

    fn put(&self, room: &RoomId, record: RoomRecord) -> Result<u64> {
        let mut inner = self.lock();
        let version = inner.assign_version();
        inner.rooms.insert(
            room.clone(),
            Versioned {
                version,
                value: record,
            },
        );
        Ok(version)
    }

    fn compare_and_swap(
        &self,
        room: &RoomId,
        expected: Option<u64>,
        record: Option<RoomRecord>,
    ) -> Result<bool> {
        let mut inner = self.lock();

        if inner.rooms.get(room).map(|v| v.version) != expected {
            return Ok(false);
        }

        match record {
            Some(value) => {
                let version = inner.assign_version();
                inner.rooms.insert(room.clone(), Versioned { version, value });
            }
            None => {
                inner.rooms.remove(room);
            }
        }
        Ok(true)
    }

    fn remove(&self, room: &RoomId) -> Result<()> {
        self.lock().rooms.remove(room);
        Ok(())
    }

    fn list(&self) -> Result<Vec<RoomId>> {
        Ok(self.lock().rooms.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_shared::types::PeerId;

    #[test]
    fn test_put_get_remove() {
        let dir = MemoryDirectory::new();
        let room = RoomId::generate();
        let record = RoomRecord::new(PeerId::generate());

        assert!(dir.get(&room).unwrap().is_none());

        let version = dir.put(&room, record.clone()).unwrap();
        let entry = dir.get(&room).unwrap().unwrap();
        assert_eq!(entry.version, version);
        assert_eq!(entry.value, record);

        dir.remove(&room).unwrap();
        assert!(dir.get(&room).unwrap().is_none());
    }

    #[test]
    fn test_cas_rejects_stale_version() {
        let dir = MemoryDirectory::new();
        let room = RoomId::generate();
        let record = RoomRecord::new(PeerId::generate());

        let version = dir.put(&room, record.clone()).unwrap();

        assert!(!dir
            .compare_and_swap(&room, Some(version + 99), Some(record.clone()))
            .unwrap());
        assert!(dir
            .compare_and_swap(&room, Some(version), Some(record))
            .unwrap());
    }

    #[test]
    fn test_cas_create_requires_absence() {
        let dir = MemoryDirectory::new();
        let room = RoomId::generate();
        let record = RoomRecord::new(PeerId::generate());

        assert!(dir
            .compare_and_swap(&room, None, Some(record.clone()))
            .unwrap());
        assert!(!dir.compare_and_swap(&room, None, Some(record)).unwrap());
    }

    #[test]
    fn test_cas_delete() {
        let dir = MemoryDirectory::new();
        let room = RoomId::generate();
        let version = dir.put(&room, RoomRecord::new(PeerId::generate())).unwrap();

        assert!(dir.compare_and_swap(&room, Some(version), None).unwrap());
        assert!(dir.get(&room).unwrap().is_none());
    }

    #[test]
    fn test_list() {
        let dir = MemoryDirectory::new();
        let r1 = RoomId::generate();
        let r2 = RoomId::generate();
        dir.put(&r1, RoomRecord::new(PeerId::generate())).unwrap();
        dir.put(&r2, RoomRecord::new(PeerId::generate())).unwrap();

        let mut listed = dir.list().unwrap();
        listed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        let mut expected = vec![r1, r2];
        expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(listed, expected);
    }
}
