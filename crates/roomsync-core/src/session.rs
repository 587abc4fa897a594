//! The session task.
//!
//! One background task owns all mutable session state: the current room,
//! the connection table, the transfer ledger, and the shared text
//! document. Callers talk to it through [`SessionHandle`] and observe it
//! through the [`UiEvent`] stream returned by [`spawn_session`]. Channel
//! events from every open connection are funneled into the same task, so
//! handlers never race each other.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use roomsync_directory::{
    create_room as register_room, join_membership, leave_membership, Directory, DirectoryError,
    JoinOutcome,
};
use roomsync_shared::protocol::{now_millis, Envelope, StrokeData, SystemAction, WhiteboardAction};
use roomsync_shared::types::{PeerId, RoomId, TransferId};

use crate::collab;
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::{MemberInfo, ToastKind, TransferSnapshot, UiEvent};
use crate::rooms::{self, ConnEntry, ConnectionTable};
use crate::router::{self, Route};
use crate::transfer::{TransferLedger, TransferRecord, TransferState};
use crate::transport::{
    ChannelEvent, ChannelSender, HandshakeMetadata, Transport, TransportChannel,
};

const READ_CHUNK: usize = 64 * 1024;

/// Where an outgoing file's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A file the local user wants to share with the room.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub name: String,
    pub mime_type: String,
    pub source: FileSource,
}

impl OutgoingFile {
    pub fn from_path(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Self {
            name,
            mime_type: mime_type.into(),
            source: FileSource::Path(path),
        }
    }

    pub fn from_memory(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            source: FileSource::Memory(data.into()),
        }
    }

    /// Size used for the queued record. A path that cannot be inspected
    /// reports zero here; the read task surfaces the real error later.
    async fn resolve_size(&self) -> u64 {
        match &self.source {
            FileSource::Memory(bytes) => bytes.len() as u64,
            FileSource::Path(path) => tokio::fs::metadata(path)
                .await
                .map(|m| m.len())
                .unwrap_or(0),
        }
    }
}

/// Commands accepted by the session task.
pub enum SessionCommand {
    CreateRoom(oneshot::Sender<RoomId>),
    JoinRoom {
        room: RoomId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    LeaveRoom(oneshot::Sender<()>),
    SendFiles(Vec<OutgoingFile>),
    SendChat(String),
    SendWhiteboard {
        action: WhiteboardAction,
        data: StrokeData,
    },
    SendText(String),
    RemoveTransfer(TransferId),
    GetMembers(oneshot::Sender<Vec<MemberInfo>>),
    GetTransfers(oneshot::Sender<Vec<TransferSnapshot>>),
    GetPayload {
        id: TransferId,
        reply: oneshot::Sender<Option<(Bytes, String)>>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Events the session sends itself: funneled channel traffic, progress
/// from file-read tasks, and deferred download completion.
enum Internal {
    Channel {
        chan_id: u64,
        peer: PeerId,
        event: ChannelEvent,
    },
    ReadProgress {
        id: TransferId,
        percent: u8,
    },
    ReadDone {
        id: TransferId,
        data: Bytes,
    },
    ReadFailed {
        id: TransferId,
        error: String,
    },
    /// Completion marker for a received file, applied on a later loop
    /// turn so consumers observe the downloading state first.
    DownloadSettled {
        id: TransferId,
    },
}

/// A channel that has not emitted `Open` yet, keyed by channel id.
struct PendingChannel {
    username: Option<String>,
    sender: ChannelSender,
}

/// Cloneable handle onto a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    peer_id: PeerId,
    cmd_tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    async fn send_cmd(&self, cmd: SessionCommand) -> Result<(), SessionError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SessionError::SessionGone)
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send_cmd(make(tx)).await?;
        rx.await.map_err(|_| SessionError::SessionGone)
    }

    /// Create a fresh room and become its host. Leaves the current room
    /// first if there is one.
    pub async fn create_room(&self) -> Result<RoomId, SessionError> {
        self.request(SessionCommand::CreateRoom).await
    }

    /// Join an existing room by id. When the id is unknown a new room is
    /// created under it instead.
    pub async fn join_room(&self, room: RoomId) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::JoinRoom { room, reply })
            .await?
    }

    pub async fn leave_room(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::LeaveRoom).await
    }

    /// Queue files for sending to every currently connected peer.
    pub async fn send_files(&self, files: Vec<OutgoingFile>) -> Result<(), SessionError> {
        self.send_cmd(SessionCommand::SendFiles(files)).await
    }

    pub async fn send_chat(&self, message: impl Into<String>) -> Result<(), SessionError> {
        self.send_cmd(SessionCommand::SendChat(message.into())).await
    }

    pub async fn send_whiteboard(
        &self,
        action: WhiteboardAction,
        data: StrokeData,
    ) -> Result<(), SessionError> {
        self.send_cmd(SessionCommand::SendWhiteboard { action, data })
            .await
    }

    /// Overwrite the shared document and broadcast the new content.
    pub async fn send_text(&self, content: impl Into<String>) -> Result<(), SessionError> {
        self.send_cmd(SessionCommand::SendText(content.into())).await
    }

    pub async fn remove_transfer(&self, id: TransferId) -> Result<(), SessionError> {
        self.send_cmd(SessionCommand::RemoveTransfer(id)).await
    }

    pub async fn members(&self) -> Result<Vec<MemberInfo>, SessionError> {
        self.request(SessionCommand::GetMembers).await
    }

    pub async fn transfers(&self) -> Result<Vec<TransferSnapshot>, SessionError> {
        self.request(SessionCommand::GetTransfers).await
    }

    /// Stored payload of a completed transfer, for preview or saving.
    pub async fn transfer_payload(
        &self,
        id: TransferId,
    ) -> Result<Option<(Bytes, String)>, SessionError> {
        self.request(|reply| SessionCommand::GetPayload { id, reply })
            .await
    }

    /// Leave the room and stop the session task.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        self.request(SessionCommand::Shutdown).await
    }
}

/// Start a session task for `peer_id`. Returns the command handle and
/// the stream of UI events.
pub fn spawn_session(
    peer_id: PeerId,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    mut incoming: mpsc::Receiver<TransportChannel>,
    directory: Arc<dyn Directory>,
) -> (SessionHandle, mpsc::Receiver<UiEvent>) {
    let capacity = config.channel_capacity;
    let (cmd_tx, mut cmd_rx) = mpsc::channel(capacity);
    let (events_tx, events_rx) = mpsc::channel(capacity);
    let (internal_tx, mut internal_rx) = mpsc::channel(capacity);

    let handle = SessionHandle {
        peer_id: peer_id.clone(),
        cmd_tx,
    };

    let mut session = Session::new(peer_id, config, transport, directory, events_tx, internal_tx);

    tokio::spawn(async move {
        info!(peer = %session.peer_id, username = %session.config.username, "Session started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(SessionCommand::Shutdown(reply)) => {
                        session.leave_room().await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => session.handle_command(cmd).await,
                    // All handles dropped: tear down like a window close.
                    None => {
                        session.leave_room().await;
                        break;
                    }
                },
                Some(chan) = incoming.recv() => session.adopt_channel(chan),
                Some(event) = internal_rx.recv() => session.handle_internal(event).await,
            }
        }
        info!(peer = %session.peer_id, "Session stopped");
    });

    (handle, events_rx)
}

struct Session {
    peer_id: PeerId,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
    events_tx: mpsc::Sender<UiEvent>,
    internal_tx: mpsc::Sender<Internal>,
    connections: ConnectionTable,
    pending: HashMap<u64, PendingChannel>,
    next_chan_id: u64,
    current_room: Option<RoomId>,
    ledger: TransferLedger,
    sources: HashMap<TransferId, FileSource>,
    shared_text: String,
    upload_in_flight: Option<TransferId>,
}

impl Session {
    fn new(
        peer_id: PeerId,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
        events_tx: mpsc::Sender<UiEvent>,
        internal_tx: mpsc::Sender<Internal>,
    ) -> Self {
        Self {
            peer_id,
            config,
            transport,
            directory,
            events_tx,
            internal_tx,
            connections: ConnectionTable::new(),
            pending: HashMap::new(),
            next_chan_id: 0,
            current_room: None,
            ledger: TransferLedger::new(),
            sources: HashMap::new(),
            shared_text: String::new(),
            upload_in_flight: None,
        }
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::CreateRoom(reply) => {
                let room = self.create_room().await;
                let _ = reply.send(room);
            }
            SessionCommand::JoinRoom { room, reply } => {
                let _ = reply.send(self.join_room(room).await);
            }
            SessionCommand::LeaveRoom(reply) => {
                self.leave_room().await;
                let _ = reply.send(());
            }
            SessionCommand::SendFiles(files) => self.enqueue_files(files).await,
            SessionCommand::SendChat(message) => {
                let envelope = collab::chat_message(&self.config.username, &message);
                self.broadcast(envelope).await;
            }
            SessionCommand::SendWhiteboard { action, data } => {
                let envelope = collab::whiteboard_event(action, data);
                self.broadcast(envelope).await;
            }
            SessionCommand::SendText(content) => {
                self.shared_text = content.clone();
                let envelope = collab::text_update(&content);
                self.broadcast(envelope).await;
            }
            SessionCommand::RemoveTransfer(id) => {
                self.ledger.remove(&id);
                self.sources.remove(&id);
            }
            SessionCommand::GetMembers(reply) => {
                let _ = reply.send(self.members());
            }
            SessionCommand::GetTransfers(reply) => {
                let _ = reply.send(self.ledger.snapshots());
            }
            SessionCommand::GetPayload { id, reply } => {
                let _ = reply.send(self.ledger.payload(&id));
            }
            // Handled in the run loop so it can break out.
            SessionCommand::Shutdown(reply) => {
                let _ = reply.send(());
            }
        }
    }

    async fn create_room(&mut self) -> RoomId {
        if self.current_room.is_some() {
            self.leave_room().await;
        }

        let room = loop {
            let candidate = RoomId::generate();
            match register_room(self.directory.as_ref(), &candidate, &self.peer_id) {
                Ok(_) => break candidate,
                // Id collision, roll again.
                Err(DirectoryError::Contention(_)) => continue,
                Err(e) => {
                    warn!(error = %e, "Registry write failed during room creation");
                    self.toast(ToastKind::Error, "Registry Error", &e.to_string())
                        .await;
                    break candidate;
                }
            }
        };

        self.current_room = Some(room.clone());
        info!(room = %room, "Room created");
        self.toast(
            ToastKind::Success,
            "Room Created",
            &format!("Room {room} created. Share the id with others to let them join."),
        )
        .await;
        self.refresh_roster().await;
        room
    }

    async fn join_room(&mut self, room: RoomId) -> Result<(), SessionError> {
        if room.as_str().trim().is_empty() {
            self.toast(
                ToastKind::Error,
                "Invalid Room Id",
                "Please enter a room id",
            )
            .await;
            return Err(SessionError::InvalidInput("empty room id".to_string()));
        }
        if self.current_room.is_some() {
            self.leave_room().await;
        }

        match join_membership(self.directory.as_ref(), &room, &self.peer_id) {
            Ok(JoinOutcome::Created) => {
                self.current_room = Some(room.clone());
                info!(room = %room, "Room was absent, created it instead");
                self.toast(
                    ToastKind::Warning,
                    "Room Not Found",
                    "Creating a new room instead",
                )
                .await;
                self.refresh_roster().await;
                Ok(())
            }
            Ok(JoinOutcome::Joined(members)) => {
                self.current_room = Some(room.clone());
                info!(room = %room, members = members.len(), "Joined room");
                for peer in &members {
                    self.connect_to_peer(peer).await;
                }
                self.toast(
                    ToastKind::Info,
                    "Joining Room",
                    &format!("Connecting to room {room}"),
                )
                .await;
                self.refresh_roster().await;
                Ok(())
            }
            Err(e) => {
                warn!(room = %room, error = %e, "Failed to join room");
                self.toast(ToastKind::Error, "Join Failed", &e.to_string())
                    .await;
                Err(e.into())
            }
        }
    }

    /// Leave the current room: deregister, notify every connection, and
    /// close them all. Every step is best-effort.
    async fn leave_room(&mut self) {
        let Some(room) = self.current_room.take() else {
            return;
        };

        if let Err(e) = leave_membership(self.directory.as_ref(), &room, &self.peer_id) {
            warn!(room = %room, error = %e, "Registry update failed on leave");
        }

        let notice = rooms::leave_notice(&room, &self.peer_id)
            .to_bytes()
            .unwrap_or_default();
        for entry in self.connections.drain() {
            if !notice.is_empty() {
                if let Err(e) = entry.sender.send(notice.clone()).await {
                    debug!(peer = %entry.peer_id, error = %e, "Leave notice not delivered");
                }
            }
            entry.sender.close().await;
        }
        for (_, pending) in self.pending.drain() {
            pending.sender.close().await;
        }

        info!(room = %room, "Left room");
        self.refresh_roster().await;
        self.toast(ToastKind::Info, "Room Left", "You have left the room")
            .await;
    }

    async fn connect_to_peer(&mut self, peer: &PeerId) {
        if *peer == self.peer_id || self.connections.contains(peer) {
            return;
        }
        let metadata = HandshakeMetadata {
            username: self.config.username.clone(),
            room_id: self.current_room.clone(),
        };
        match self.transport.connect(peer, metadata) {
            Ok(chan) => self.adopt_channel(chan),
            Err(e) => {
                warn!(peer = %peer, error = %e, "Connection attempt failed");
                self.toast(
                    ToastKind::Error,
                    "Connection Failed",
                    &format!("Failed to connect to peer: {e}"),
                )
                .await;
            }
        }
    }

    /// Take ownership of a channel (dialed or inbound) and forward its
    /// events into the session loop.
    fn adopt_channel(&mut self, chan: TransportChannel) {
        self.next_chan_id += 1;
        let chan_id = self.next_chan_id;

        let TransportChannel {
            peer_id,
            metadata,
            sender,
            mut events,
        } = chan;

        debug!(peer = %peer_id, chan = chan_id, "Adopted channel");
        self.pending.insert(
            chan_id,
            PendingChannel {
                username: metadata.map(|m| m.username),
                sender,
            },
        );

        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let funneled = Internal::Channel {
                    chan_id,
                    peer: peer_id.clone(),
                    event,
                };
                if internal_tx.send(funneled).await.is_err() {
                    break;
                }
            }
        });
    }

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Channel {
                chan_id,
                peer,
                event,
            } => self.handle_channel_event(chan_id, peer, event).await,
            Internal::ReadProgress { id, percent } => {
                let snap = match self.ledger.get_mut(&id) {
                    Some(record) if record.state == TransferState::Uploading => {
                        record.progress = percent;
                        Some(record.snapshot())
                    }
                    _ => None,
                };
                if let Some(snap) = snap {
                    self.emit(UiEvent::Transfer(snap)).await;
                }
            }
            Internal::ReadDone { id, data } => self.finish_upload(id, data).await,
            Internal::ReadFailed { id, error } => {
                self.upload_in_flight = None;
                self.fail_transfer(&id, &error).await;
                self.drain_queue().await;
            }
            Internal::DownloadSettled { id } => self.settle_download(&id).await,
        }
    }

    async fn handle_channel_event(&mut self, chan_id: u64, peer: PeerId, event: ChannelEvent) {
        match event {
            ChannelEvent::Open => self.handle_open(chan_id, peer).await,
            ChannelEvent::Data(bytes) => {
                if let Some(envelope) = router::decode(&peer, &bytes) {
                    self.dispatch(peer, envelope).await;
                }
            }
            ChannelEvent::Closed => {
                self.pending.remove(&chan_id);
                if let Some(entry) = self.connections.remove_channel(&peer, chan_id) {
                    info!(peer = %peer, "Peer disconnected");
                    self.refresh_roster().await;
                    let name = entry.username.unwrap_or_else(|| "A peer".to_string());
                    self.toast(
                        ToastKind::Info,
                        "Peer Disconnected",
                        &format!("{name} has disconnected"),
                    )
                    .await;
                }
            }
            ChannelEvent::Error(message) => {
                warn!(peer = %peer, error = %message, "Channel error");
                self.pending.remove(&chan_id);
                if self.connections.remove_channel(&peer, chan_id).is_some() {
                    self.refresh_roster().await;
                }
                self.toast(ToastKind::Error, "Connection Error", &message)
                    .await;
            }
        }
    }

    async fn handle_open(&mut self, chan_id: u64, peer: PeerId) {
        let Some(pending) = self.pending.remove(&chan_id) else {
            return;
        };
        let entry = ConnEntry {
            peer_id: peer.clone(),
            chan_id,
            username: pending.username,
            sender: pending.sender,
        };
        let sender = entry.sender.clone();
        if !self.connections.insert(entry) {
            // A connection to this peer already exists; drop the duplicate.
            sender.close().await;
            return;
        }

        if let Some(room) = self.current_room.clone() {
            match rooms::join_notice(&room, &self.peer_id, &self.config.username).to_bytes() {
                Ok(bytes) => {
                    if let Err(e) = sender.send(bytes).await {
                        debug!(peer = %peer, error = %e, "Join notice not delivered");
                    }
                }
                Err(e) => error!(error = %e, "Failed to encode join notice"),
            }
        }

        info!(peer = %peer, "Peer connected");
        self.refresh_roster().await;
        let name = self
            .connections
            .get(&peer)
            .and_then(|e| e.username.clone())
            .unwrap_or_else(|| "a new peer".to_string());
        self.toast(
            ToastKind::Success,
            "Peer Connected",
            &format!("Connected to {name}"),
        )
        .await;
    }

    async fn dispatch(&mut self, peer: PeerId, envelope: Envelope) {
        match router::classify(&envelope) {
            Route::System => self.handle_system(peer, envelope).await,
            Route::FileTransfer => self.handle_file(peer, envelope).await,
            Route::Chat => {
                if let Envelope::Chat {
                    sender,
                    message,
                    timestamp,
                } = envelope
                {
                    // Prefer the identity learned on the connection over
                    // whatever the payload claims.
                    let sender = self
                        .connections
                        .get(&peer)
                        .and_then(|e| e.username.clone())
                        .unwrap_or(sender);
                    self.emit(UiEvent::Chat {
                        peer,
                        sender,
                        message,
                        timestamp,
                    })
                    .await;
                }
            }
            Route::Whiteboard => {
                if let Envelope::Whiteboard { action, data, .. } = envelope {
                    self.emit(UiEvent::Whiteboard { peer, action, data }).await;
                }
            }
            Route::TextEditor => {
                if let Envelope::TextEditor { content, .. } = envelope {
                    self.shared_text = content.clone();
                    self.emit(UiEvent::Text { peer, content }).await;
                }
            }
        }
    }

    async fn handle_system(&mut self, peer: PeerId, envelope: Envelope) {
        let Envelope::System {
            action,
            peer_id,
            username,
            ..
        } = envelope
        else {
            return;
        };

        match action {
            SystemAction::Join => {
                debug!(peer = %peer_id, "Join notice received");
                if let Some(room) = self.current_room.clone() {
                    if let Err(e) = join_membership(self.directory.as_ref(), &room, &peer_id) {
                        warn!(room = %room, peer = %peer_id, error = %e, "Registry update failed on peer join");
                    }
                }
                if let Some(name) = username {
                    self.connections.set_username(&peer, &name);
                }
                // Dial back any announced peer we have no connection to.
                if peer_id != self.peer_id && !self.connections.contains(&peer_id) {
                    self.connect_to_peer(&peer_id).await;
                }
                self.refresh_roster().await;
            }
            SystemAction::Leave => {
                debug!(peer = %peer_id, "Leave notice received");
                if let Some(room) = self.current_room.clone() {
                    if let Err(e) = leave_membership(self.directory.as_ref(), &room, &peer_id) {
                        warn!(room = %room, peer = %peer_id, error = %e, "Registry update failed on peer leave");
                    }
                }
                self.refresh_roster().await;
            }
        }
    }

    async fn handle_file(&mut self, peer: PeerId, envelope: Envelope) {
        let Envelope::File {
            id,
            name,
            mime_type,
            data,
            encrypted,
            ..
        } = envelope
        else {
            return;
        };

        debug!(id = %id, name = %name, size = data.len(), encrypted, "File received");
        let snap = self.ledger.insert_download(
            id.clone(),
            peer.clone(),
            name.clone(),
            mime_type,
            Bytes::from(data),
        );
        self.emit(UiEvent::Transfer(snap)).await;

        let sender_name = self
            .connections
            .get(&peer)
            .and_then(|e| e.username.clone())
            .unwrap_or_else(|| "a peer".to_string());
        self.toast(
            ToastKind::Success,
            "File Received",
            &format!("Received {name} from {sender_name}"),
        )
        .await;

        // Completion lands on a later loop turn.
        if self
            .internal_tx
            .try_send(Internal::DownloadSettled { id: id.clone() })
            .is_err()
        {
            self.settle_download(&id).await;
        }
    }

    async fn settle_download(&mut self, id: &TransferId) {
        let snap = match self.ledger.get_mut(id) {
            Some(record) => {
                if record.advance(TransferState::Completed) {
                    record.progress = 100;
                    Some(record.snapshot())
                } else {
                    None
                }
            }
            None => None,
        };
        if let Some(snap) = snap {
            self.emit(UiEvent::Transfer(snap)).await;
        }
    }

    async fn enqueue_files(&mut self, files: Vec<OutgoingFile>) {
        if self.current_room.is_none() || self.connections.is_empty() {
            warn!("File send requested with no connected peers");
            self.toast(
                ToastKind::Warning,
                "No Peers Connected",
                "Join a room with other peers to share files",
            )
            .await;
            return;
        }

        let peers: Vec<PeerId> = self
            .connections
            .entries()
            .map(|e| e.peer_id.clone())
            .collect();
        let count = files.len();

        for file in files {
            let size = file.resolve_size().await;
            for peer in &peers {
                let id = TransferId::generate();
                let record = TransferRecord::queued_upload(
                    id.clone(),
                    peer.clone(),
                    file.name.clone(),
                    size,
                    file.mime_type.clone(),
                );
                let snap = record.snapshot();
                self.ledger.enqueue(record);
                self.sources.insert(id, file.source.clone());
                self.emit(UiEvent::Transfer(snap)).await;
            }
        }

        self.toast(
            ToastKind::Info,
            "Files Added",
            &format!("{count} file(s) added to the upload queue"),
        )
        .await;
        self.drain_queue().await;
    }

    /// Start the next queued upload, unless one is already in flight.
    /// Queued records whose target connection has gone away are failed
    /// in place and the queue keeps draining.
    async fn drain_queue(&mut self) {
        if self.upload_in_flight.is_some() {
            return;
        }

        while let Some(id) = self.ledger.pop_next() {
            let Some((peer, state)) = self.ledger.get(&id).map(|r| (r.peer.clone(), r.state))
            else {
                continue;
            };
            if state != TransferState::Queued {
                continue;
            }

            if !self.connections.contains(&peer) {
                self.sources.remove(&id);
                self.fail_transfer(&id, "Peer disconnected").await;
                continue;
            }

            let Some(source) = self.sources.remove(&id) else {
                self.fail_transfer(&id, "File source missing").await;
                continue;
            };

            let snap = match self.ledger.get_mut(&id) {
                Some(record) => {
                    record.advance(TransferState::Uploading);
                    Some(record.snapshot())
                }
                None => None,
            };
            if let Some(snap) = snap {
                self.emit(UiEvent::Transfer(snap)).await;
            }

            debug!(id = %id, peer = %peer, "Starting upload");
            self.upload_in_flight = Some(id.clone());
            tokio::spawn(read_source(id, source, self.internal_tx.clone()));
            return;
        }
    }

    /// The file's bytes are in hand: wrap, send, and complete the record.
    async fn finish_upload(&mut self, id: TransferId, data: Bytes) {
        self.upload_in_flight = None;

        let Some((peer, name, mime)) = self
            .ledger
            .get(&id)
            .map(|r| (r.peer.clone(), r.file_name.clone(), r.mime_type.clone()))
        else {
            // Removed while the read was running.
            self.drain_queue().await;
            return;
        };

        match self.connections.get(&peer).map(|e| e.sender.clone()) {
            None => self.fail_transfer(&id, "Peer disconnected").await,
            Some(sender) => {
                let envelope = Envelope::File {
                    id: id.clone(),
                    name,
                    size: data.len() as u64,
                    mime_type: mime,
                    data: data.to_vec(),
                    encrypted: self.config.encryption_enabled,
                    timestamp: now_millis(),
                };
                let outcome = match envelope.to_bytes() {
                    Ok(bytes) => sender.send(bytes).await.map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                };
                match outcome {
                    Ok(()) => {
                        info!(id = %id, peer = %peer, size = data.len(), "Upload completed");
                        let snap = match self.ledger.get_mut(&id) {
                            Some(record) => {
                                record.advance(TransferState::Completed);
                                record.progress = 100;
                                record.payload = Some(data);
                                Some(record.snapshot())
                            }
                            None => None,
                        };
                        if let Some(snap) = snap {
                            self.emit(UiEvent::Transfer(snap)).await;
                        }
                    }
                    Err(e) => self.fail_transfer(&id, &format!("Send failed: {e}")).await,
                }
            }
        }

        self.drain_queue().await;
    }

    async fn fail_transfer(&mut self, id: &TransferId, message: &str) {
        warn!(id = %id, error = message, "Transfer failed");
        let snap = match self.ledger.get_mut(id) {
            Some(record) => {
                record.advance(TransferState::Error);
                record.error = Some(message.to_string());
                Some(record.snapshot())
            }
            None => None,
        };
        if let Some(snap) = snap {
            self.emit(UiEvent::Transfer(snap)).await;
        }
    }

    /// Roster as shown to the user: self first, then every open connection.
    fn members(&self) -> Vec<MemberInfo> {
        if self.current_room.is_none() {
            return Vec::new();
        }
        let mut members = vec![MemberInfo {
            peer_id: self.peer_id.clone(),
            username: Some(self.config.username.clone()),
            is_self: true,
        }];
        for entry in self.connections.entries() {
            members.push(MemberInfo {
                peer_id: entry.peer_id.clone(),
                username: entry.username.clone(),
                is_self: false,
            });
        }
        members
    }

    async fn broadcast(&self, envelope: Envelope) {
        if self.connections.is_empty() {
            return;
        }
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to encode broadcast");
                return;
            }
        };
        for (peer, sender) in self.connections.senders() {
            if let Err(e) = sender.send(bytes.clone()).await {
                debug!(peer = %peer, error = %e, "Broadcast send failed");
            }
        }
    }

    async fn emit(&self, event: UiEvent) {
        let _ = self.events_tx.send(event).await;
    }

    async fn refresh_roster(&self) {
        self.emit(UiEvent::RoomRefresh {
            room: self.current_room.clone(),
            members: self.members(),
        })
        .await;
    }

    async fn toast(&self, kind: ToastKind, title: &str, message: &str) {
        self.emit(UiEvent::Toast {
            kind,
            title: title.to_string(),
            message: message.to_string(),
        })
        .await;
    }
}

/// Read a queued file off the session task, reporting progress.
async fn read_source(id: TransferId, source: FileSource, internal_tx: mpsc::Sender<Internal>) {
    match source {
        FileSource::Memory(bytes) => {
            let _ = internal_tx
                .send(Internal::ReadProgress {
                    id: id.clone(),
                    percent: 100,
                })
                .await;
            let _ = internal_tx.send(Internal::ReadDone { id, data: bytes }).await;
        }
        FileSource::Path(path) => match read_with_progress(&id, &path, &internal_tx).await {
            Ok(data) => {
                let _ = internal_tx.send(Internal::ReadDone { id, data }).await;
            }
            Err(e) => {
                let _ = internal_tx
                    .send(Internal::ReadFailed {
                        id,
                        error: format!("Error reading file: {e}"),
                    })
                    .await;
            }
        },
    }
}

async fn read_with_progress(
    id: &TransferId,
    path: &PathBuf,
    internal_tx: &mpsc::Sender<Internal>,
) -> std::io::Result<Bytes> {
    let mut file = tokio::fs::File::open(path).await?;
    let total = file.metadata().await?.len();

    let mut buf = Vec::with_capacity(total as usize);
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut last_percent = 0u8;

    loop {
        let n = file.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if total > 0 {
            let percent = ((buf.len() as u64 * 100) / total).min(100) as u8;
            if percent > last_percent {
                last_percent = percent;
                let _ = internal_tx
                    .send(Internal::ReadProgress {
                        id: id.clone(),
                        percent,
                    })
                    .await;
            }
        }
    }
    Ok(Bytes::from(buf))
}
