//! Transfer records and the outbound queue.
//!
//! Outbound sends are queued per (file, connection) pair into a single
//! global FIFO, drained strictly one at a time. Records are kept for the
//! lifetime of the application unless the user removes them; completed
//! downloads retain their payload for preview and saving.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use roomsync_shared::types::{PeerId, TransferId};

use crate::events::TransferSnapshot;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

/// Transfer lifecycle. State only ever moves forward:
/// queued → uploading/downloading → completed | error.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    Queued,
    Uploading,
    Downloading,
    Completed,
    Error,
}

impl TransferState {
    fn rank(self) -> u8 {
        match self {
            TransferState::Queued => 0,
            TransferState::Uploading | TransferState::Downloading => 1,
            TransferState::Completed | TransferState::Error => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }
}

#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub id: TransferId,
    pub direction: Direction,
    /// The connection this transfer targets (upload) or came from (download).
    pub peer: PeerId,
    pub file_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub state: TransferState,
    pub progress: u8,
    /// Present once a download completes (or an upload has been read).
    pub payload: Option<Bytes>,
    pub error: Option<String>,
}

impl TransferRecord {
    pub fn queued_upload(
        id: TransferId,
        peer: PeerId,
        file_name: String,
        size_bytes: u64,
        mime_type: String,
    ) -> Self {
        Self {
            id,
            direction: Direction::Upload,
            peer,
            file_name,
            size_bytes,
            mime_type,
            state: TransferState::Queued,
            progress: 0,
            payload: None,
            error: None,
        }
    }

    /// Advance the state machine. Regressions are refused and logged;
    /// the record keeps its current state.
    pub fn advance(&mut self, next: TransferState) -> bool {
        if self.state == next {
            return true;
        }
        if self.state.is_terminal() || next.rank() < self.state.rank() {
            debug!(
                id = %self.id,
                from = ?self.state,
                to = ?next,
                "Refusing transfer state regression"
            );
            return false;
        }
        self.state = next;
        true
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            id: self.id.clone(),
            direction: self.direction,
            peer: self.peer.clone(),
            file_name: self.file_name.clone(),
            size_bytes: self.size_bytes,
            mime_type: self.mime_type.clone(),
            state: self.state,
            progress: self.progress,
            error: self.error.clone(),
        }
    }
}

/// All transfer records plus the global FIFO of pending uploads.
#[derive(Debug, Default)]
pub struct TransferLedger {
    records: HashMap<TransferId, TransferRecord>,
    queue: VecDeque<TransferId>,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new queued upload at the back of the FIFO.
    pub fn enqueue(&mut self, record: TransferRecord) {
        self.queue.push_back(record.id.clone());
        self.records.insert(record.id.clone(), record);
    }

    /// Pop the next pending upload id, skipping ids whose records were
    /// removed while still queued.
    pub fn pop_next(&mut self) -> Option<TransferId> {
        while let Some(id) = self.queue.pop_front() {
            if self.records.contains_key(&id) {
                return Some(id);
            }
        }
        None
    }

    /// Track a received file as a download record holding its payload.
    pub fn insert_download(
        &mut self,
        id: TransferId,
        peer: PeerId,
        file_name: String,
        mime_type: String,
        payload: Bytes,
    ) -> TransferSnapshot {
        let record = TransferRecord {
            id: id.clone(),
            direction: Direction::Download,
            peer,
            file_name,
            size_bytes: payload.len() as u64,
            mime_type,
            state: TransferState::Downloading,
            progress: 100,
            payload: Some(payload),
            error: None,
        };
        let snapshot = record.snapshot();
        self.records.insert(id, record);
        snapshot
    }

    pub fn get(&self, id: &TransferId) -> Option<&TransferRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &TransferId) -> Option<&mut TransferRecord> {
        self.records.get_mut(id)
    }

    /// Delete a record and purge any still-queued entry. Idempotent.
    pub fn remove(&mut self, id: &TransferId) {
        self.records.remove(id);
        self.queue.retain(|queued| queued != id);
    }

    /// Stored payload and mime type, for preview/download.
    pub fn payload(&self, id: &TransferId) -> Option<(Bytes, String)> {
        let record = self.records.get(id)?;
        let payload = record.payload.clone()?;
        Some((payload, record.mime_type.clone()))
    }

    pub fn snapshots(&self) -> Vec<TransferSnapshot> {
        self.records.values().map(|r| r.snapshot()).collect()
    }

    pub fn with_state(&self, state: TransferState) -> Vec<TransferSnapshot> {
        self.records
            .values()
            .filter(|r| r.state == state)
            .map(|r| r.snapshot())
            .collect()
    }
}

/// How a stored payload can be presented, by mime-type family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    Image,
    Video,
    Audio,
    Text,
    Unsupported,
}

/// Classify a mime type for preview purposes.
pub fn preview_kind(mime_type: &str) -> PreviewKind {
    if mime_type.starts_with("image/") {
        PreviewKind::Image
    } else if mime_type.starts_with("video/") {
        PreviewKind::Video
    } else if mime_type.starts_with("audio/") {
        PreviewKind::Audio
    } else if mime_type.starts_with("text/")
        || mime_type.contains("json")
        || mime_type.contains("javascript")
    {
        PreviewKind::Text
    } else {
        PreviewKind::Unsupported
    }
}

/// Text rendering of a payload, for text-family previews.
pub fn preview_text(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(peer: &PeerId) -> TransferRecord {
        TransferRecord::queued_upload(
            TransferId::generate(),
            peer.clone(),
            "report.pdf".to_string(),
            1024,
            "application/pdf".to_string(),
        )
    }

    #[test]
    fn test_state_is_monotonic() {
        let peer = PeerId::generate();
        let mut record = queued(&peer);

        assert!(record.advance(TransferState::Uploading));
        assert!(record.advance(TransferState::Completed));

        // Terminal states never regress.
        assert!(!record.advance(TransferState::Uploading));
        assert!(!record.advance(TransferState::Queued));
        assert!(!record.advance(TransferState::Error));
        assert_eq!(record.state, TransferState::Completed);
    }

    #[test]
    fn test_queued_can_fail_directly() {
        let peer = PeerId::generate();
        let mut record = queued(&peer);
        assert!(record.advance(TransferState::Error));
        assert_eq!(record.state, TransferState::Error);
    }

    #[test]
    fn test_fifo_order() {
        let peer = PeerId::generate();
        let mut ledger = TransferLedger::new();

        let records: Vec<TransferRecord> = (0..3).map(|_| queued(&peer)).collect();
        let ids: Vec<TransferId> = records.iter().map(|r| r.id.clone()).collect();
        for record in records {
            ledger.enqueue(record);
        }

        for id in &ids {
            assert_eq!(ledger.pop_next().as_ref(), Some(id));
        }
        assert!(ledger.pop_next().is_none());
    }

    #[test]
    fn test_remove_purges_queue() {
        let peer = PeerId::generate();
        let mut ledger = TransferLedger::new();

        let first = queued(&peer);
        let second = queued(&peer);
        let first_id = first.id.clone();
        let second_id = second.id.clone();
        ledger.enqueue(first);
        ledger.enqueue(second);

        ledger.remove(&first_id);
        ledger.remove(&first_id); // idempotent

        assert_eq!(ledger.pop_next(), Some(second_id));
        assert!(ledger.pop_next().is_none());
    }

    #[test]
    fn test_download_record_holds_payload() {
        let peer = PeerId::generate();
        let mut ledger = TransferLedger::new();
        let id = TransferId::generate();

        ledger.insert_download(
            id.clone(),
            peer,
            "notes.txt".to_string(),
            "text/plain".to_string(),
            Bytes::from_static(b"hello"),
        );

        let (payload, mime) = ledger.payload(&id).unwrap();
        assert_eq!(&payload[..], b"hello");
        assert_eq!(mime, "text/plain");
        assert_eq!(ledger.get(&id).unwrap().size_bytes, 5);
    }

    #[test]
    fn test_with_state_filter() {
        let peer = PeerId::generate();
        let mut ledger = TransferLedger::new();

        let record = queued(&peer);
        let id = record.id.clone();
        ledger.enqueue(record);
        ledger.enqueue(queued(&peer));

        ledger.get_mut(&id).unwrap().advance(TransferState::Error);

        assert_eq!(ledger.with_state(TransferState::Error).len(), 1);
        assert_eq!(ledger.with_state(TransferState::Queued).len(), 1);
        assert_eq!(ledger.snapshots().len(), 2);
    }

    #[test]
    fn test_preview_kinds() {
        assert_eq!(preview_kind("image/png"), PreviewKind::Image);
        assert_eq!(preview_kind("video/mp4"), PreviewKind::Video);
        assert_eq!(preview_kind("audio/ogg"), PreviewKind::Audio);
        assert_eq!(preview_kind("text/plain"), PreviewKind::Text);
        assert_eq!(preview_kind("application/json"), PreviewKind::Text);
        assert_eq!(preview_kind("application/javascript"), PreviewKind::Text);
        assert_eq!(
            preview_kind("application/octet-stream"),
            PreviewKind::Unsupported
        );
    }

    #[test]
    fn test_preview_text_lossy() {
        assert_eq!(preview_text(b"plain"), "plain");
        assert!(preview_text(&[0xff, 0xfe]).contains('\u{fffd}'));
    }
}
