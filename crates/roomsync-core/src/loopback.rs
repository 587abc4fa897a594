//! In-process loopback transport.
//!
//! Wires registered peers to each other over paired tokio channels.
//! This is the transport used by the test suite and the demo example; a
//! real deployment plugs a NAT-traversing transport into the same
//! [`Transport`] seam.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use roomsync_shared::types::PeerId;

use crate::transport::{
    ChannelEvent, ChannelSender, HandshakeMetadata, Outbound, Transport, TransportChannel,
    TransportError,
};

const CHANNEL_CAPACITY: usize = 256;

type PeerMap = Arc<Mutex<HashMap<PeerId, mpsc::Sender<TransportChannel>>>>;

/// A switchboard connecting loopback endpoints by peer id.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    peers: PeerMap,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer with the hub. Returns the peer's transport handle
    /// and the receiver on which inbound channels are delivered.
    pub fn register(&self, peer: &PeerId) -> (LoopbackTransport, mpsc::Receiver<TransportChannel>) {
        let (incoming_tx, incoming_rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(peer.clone(), incoming_tx);

        debug!(peer = %peer, "Registered loopback endpoint");

        let transport = LoopbackTransport {
            local: peer.clone(),
            peers: self.peers.clone(),
        };
        (transport, incoming_rx)
    }
}

/// One peer's handle onto the hub.
pub struct LoopbackTransport {
    local: PeerId,
    peers: PeerMap,
}

impl Transport for LoopbackTransport {
    fn connect(
        &self,
        peer: &PeerId,
        metadata: HandshakeMetadata,
    ) -> Result<TransportChannel, TransportError> {
        let remote_incoming = {
            let peers = self.peers.lock().unwrap_or_else(|e| e.into_inner());
            peers
                .get(peer)
                .cloned()
                .ok_or_else(|| TransportError::Unreachable(peer.clone()))?
        };

        let (local_out_tx, local_out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (remote_out_tx, remote_out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (local_ev_tx, local_ev_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (remote_ev_tx, remote_ev_rx) = mpsc::channel(CHANNEL_CAPACITY);

        // Both sides observe Open before any data.
        let _ = local_ev_tx.try_send(ChannelEvent::Open);
        let _ = remote_ev_tx.try_send(ChannelEvent::Open);

        tokio::spawn(pump(local_out_rx, remote_ev_tx.clone(), local_ev_tx.clone()));
        tokio::spawn(pump(remote_out_rx, local_ev_tx, remote_ev_tx));

        let inbound = TransportChannel {
            peer_id: self.local.clone(),
            metadata: Some(metadata),
            sender: ChannelSender::new(remote_out_tx),
            events: remote_ev_rx,
        };
        remote_incoming
            .try_send(inbound)
            .map_err(|_| TransportError::Unreachable(peer.clone()))?;

        debug!(from = %self.local, to = %peer, "Loopback channel pair created");

        Ok(TransportChannel {
            peer_id: peer.clone(),
            metadata: None,
            sender: ChannelSender::new(local_out_tx),
            events: local_ev_rx,
        })
    }
}

/// Forward one direction of traffic until it closes, then tell both
/// sides the channel is down.
async fn pump(
    mut rx: mpsc::Receiver<Outbound>,
    dest: mpsc::Sender<ChannelEvent>,
    origin: mpsc::Sender<ChannelEvent>,
) {
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Data(bytes) => {
                if dest.send(ChannelEvent::Data(bytes)).await.is_err() {
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    let _ = dest.send(ChannelEvent::Closed).await;
    let _ = origin.send(ChannelEvent::Closed).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> HandshakeMetadata {
        HandshakeMetadata {
            username: "alice".to_string(),
            room_id: None,
        }
    }

    #[tokio::test]
    async fn test_connect_delivers_inbound_channel() {
        let hub = LoopbackHub::new();
        let a = PeerId::generate();
        let b = PeerId::generate();

        let (transport_a, _incoming_a) = hub.register(&a);
        let (_transport_b, mut incoming_b) = hub.register(&b);

        let mut chan_a = transport_a.connect(&b, metadata()).unwrap();
        let mut chan_b = incoming_b.recv().await.unwrap();

        assert_eq!(chan_a.peer_id, b);
        assert_eq!(chan_b.peer_id, a);
        assert_eq!(chan_b.metadata.as_ref().unwrap().username, "alice");

        assert_eq!(chan_a.events.recv().await, Some(ChannelEvent::Open));
        assert_eq!(chan_b.events.recv().await, Some(ChannelEvent::Open));
    }

    #[tokio::test]
    async fn test_data_flows_in_order() {
        let hub = LoopbackHub::new();
        let a = PeerId::generate();
        let b = PeerId::generate();

        let (transport_a, _incoming_a) = hub.register(&a);
        let (_transport_b, mut incoming_b) = hub.register(&b);

        let chan_a = transport_a.connect(&b, metadata()).unwrap();
        let mut chan_b = incoming_b.recv().await.unwrap();
        assert_eq!(chan_b.events.recv().await, Some(ChannelEvent::Open));

        chan_a.sender.send(vec![1]).await.unwrap();
        chan_a.sender.send(vec![2]).await.unwrap();
        chan_a.sender.send(vec![3]).await.unwrap();

        for expected in [vec![1], vec![2], vec![3]] {
            assert_eq!(chan_b.events.recv().await, Some(ChannelEvent::Data(expected)));
        }
    }

    #[tokio::test]
    async fn test_close_reaches_both_sides() {
        let hub = LoopbackHub::new();
        let a = PeerId::generate();
        let b = PeerId::generate();

        let (transport_a, _incoming_a) = hub.register(&a);
        let (_transport_b, mut incoming_b) = hub.register(&b);

        let mut chan_a = transport_a.connect(&b, metadata()).unwrap();
        let mut chan_b = incoming_b.recv().await.unwrap();

        assert_eq!(chan_a.events.recv().await, Some(ChannelEvent::Open));
        assert_eq!(chan_b.events.recv().await, Some(ChannelEvent::Open));

        chan_a.sender.close().await;

        assert_eq!(chan_b.events.recv().await, Some(ChannelEvent::Closed));
        assert_eq!(chan_a.events.recv().await, Some(ChannelEvent::Closed));
    }

    #[tokio::test]
    async fn test_unknown_peer_is_unreachable() {
        let hub = LoopbackHub::new();
        let a = PeerId::generate();
        let (transport_a, _incoming_a) = hub.register(&a);

        let result = transport_a.connect(&PeerId::generate(), metadata());
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
    }
}
