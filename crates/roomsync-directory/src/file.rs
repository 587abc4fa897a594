//! JSON-file-backed [`Directory`].
//!
//! Persists the whole registry map to a single JSON file, reloading it on
//! every operation so that separate runs on the same machine see each
//! other's rooms. Versioning and CAS are mediated by an in-process lock;
//! this mediates discovery between sessions on one host only. Pointing
//! multiple independent hosts at a real shared store requires a
//! [`Directory`] implementation against that store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use roomsync_shared::types::RoomId;

use crate::directory::Directory;
use crate::error::{DirectoryError, Result};
use crate::record::{RoomRecord, Versioned};

pub struct JsonFileDirectory {
    path: PathBuf,
    lock: Mutex<()>,
}

type RegistryMap = HashMap<String, Versioned<RoomRecord>>;

impl JsonFileDirectory {
    /// Open (or create on first write) the registry file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Platform data directory default, e.g.
    /// `~/.local/share/roomsync/rooms.json` on Linux.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "roomsync")
            .ok_or(DirectoryError::NoDataDir)?;
        Ok(dirs.data_dir().join("rooms.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<RegistryMap> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RegistryMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, map: &RegistryMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(map)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }

    fn next_version(map: &RegistryMap) -> u64 {
        map.values().map(|v| v.version).max().unwrap_or(0) + 1
    }
}

impl Directory for JsonFileDirectory {
    fn get(&self, room: &RoomId) -> Result<Option<Versioned<RoomRecord>>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.get(room.as_str()).cloned())
    }

    fn put(&self, room: &RoomId, record: RoomRecord) -> Result<u64> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load()?;
        let version = Self::next_version(&map);
        map.insert(
            room.as_str().to_string(),
            Versioned {
                version,
                value: record,
            },
        );
        self.store(&map)?;
        debug!(room = %room, version, path = %self.path.display(), "Stored room entry");
        Ok(version)
    }

    fn compare_and_swap(
        &self,
        room: &RoomId,
        expected: Option<u64>,
        record: Option<RoomRecord>,
    ) -> Result<bool> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load()?;

        if map.get(room.as_str()).map(|v| v.version) != expected {
            return Ok(false);
        }

        match record {
            Some(value) => {
                let version = Self::next_version(&map);
                map.insert(room.as_str().to_string(), Versioned { version, value });
            }
            None => {
                map.remove(room.as_str());
            }
        }
        self.store(&map)?;
        Ok(true)
    }

    fn remove(&self, room: &RoomId) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load()?;
        if map.remove(room.as_str()).is_some() {
            self.store(&map)?;
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<RoomId>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.keys().map(|k| RoomId(k.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomsync_shared::types::PeerId;

    fn temp_registry() -> (tempfile::TempDir, JsonFileDirectory) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = JsonFileDirectory::open(tmp.path().join("rooms.json"));
        (tmp, dir)
    }

    #[test]
    fn test_missing_file_reads_as_empty() {
        let (_tmp, dir) = temp_registry();
        assert!(dir.get(&RoomId::generate()).unwrap().is_none());
        assert!(dir.list().unwrap().is_empty());
    }

    #[test]
    fn test_entries_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rooms.json");
        let room = RoomId::generate();
        let record = RoomRecord::new(PeerId::generate());

        {
            let dir = JsonFileDirectory::open(&path);
            dir.put(&room, record.clone()).unwrap();
        }

        let dir = JsonFileDirectory::open(&path);
        let entry = dir.get(&room).unwrap().unwrap();
        assert_eq!(entry.value, record);
    }

    #[test]
    fn test_cas_on_file_backing() {
        let (_tmp, dir) = temp_registry();
        let room = RoomId::generate();
        let record = RoomRecord::new(PeerId::generate());

        let version = dir.put(&room, record.clone()).unwrap();
        assert!(!dir
            .compare_and_swap(&room, Some(version + 1), Some(record.clone()))
            .unwrap());
        assert!(dir
            .compare_and_swap(&room, Some(version), None)
            .unwrap());
        assert!(dir.get(&room).unwrap().is_none());
    }
}
