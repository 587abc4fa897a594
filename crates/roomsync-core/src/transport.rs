//! The transport seam.
//!
//! Turning a peer identifier into a bidirectional ordered byte channel
//! (dialing, NAT traversal, reliable delivery) is a collaborator's job;
//! the coordination core only consumes this interface. Delivery order is
//! guaranteed per channel and nothing is ordered across channels.

use thiserror::Error;
use tokio::sync::mpsc;

use roomsync_shared::types::{PeerId, RoomId};

/// Metadata presented to the remote side when dialing.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeMetadata {
    pub username: String,
    pub room_id: Option<RoomId>,
}

/// Lifecycle and data events emitted by a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The channel is ready to carry data.
    Open,
    /// An inbound wire payload.
    Data(Vec<u8>),
    /// The remote side closed, or the channel tore down.
    Closed,
    /// A transport-level failure. The channel is unusable afterwards.
    Error(String),
}

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("peer {0} is unreachable")]
    Unreachable(PeerId),

    #[error("channel closed")]
    ChannelClosed,

    #[error("connect failed: {0}")]
    ConnectFailed(String),
}

/// Outbound half of a channel. Cheap to clone; sends are fire-and-forget
/// from the core's perspective.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<Outbound>,
}

#[derive(Debug)]
pub(crate) enum Outbound {
    Data(Vec<u8>),
    Close,
}

impl ChannelSender {
    pub(crate) fn new(tx: mpsc::Sender<Outbound>) -> Self {
        Self { tx }
    }

    /// Queue a payload for delivery. Fails only when the channel is gone.
    pub async fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.tx
            .send(Outbound::Data(bytes))
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    /// Ask the transport to tear the channel down. Best-effort.
    pub async fn close(&self) {
        let _ = self.tx.send(Outbound::Close).await;
    }
}

/// One established (or establishing) channel to a remote peer.
///
/// `metadata` carries the dialer's handshake metadata and is only
/// populated on the accepting side.
#[derive(Debug)]
pub struct TransportChannel {
    pub peer_id: PeerId,
    pub metadata: Option<HandshakeMetadata>,
    pub sender: ChannelSender,
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// A peer-to-peer transport. Inbound channels from remote dialers are
/// delivered on a process-wide receiver handed out at registration time.
pub trait Transport: Send + Sync + 'static {
    /// Start dialing `peer`. The returned channel emits [`ChannelEvent::Open`]
    /// once usable, or [`ChannelEvent::Error`] if establishment fails.
    fn connect(
        &self,
        peer: &PeerId,
        metadata: HandshakeMetadata,
    ) -> Result<TransportChannel, TransportError>;
}
