//! Two sessions sharing a room over the in-process loopback transport.
//!
//! Run with `cargo run --example two_peers` (set `RUST_LOG=debug` for
//! the full trace).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use roomsync_core::{
    spawn_session, LoopbackHub, OutgoingFile, SessionConfig, UiEvent,
};
use roomsync_directory::MemoryDirectory;
use roomsync_shared::protocol::{StrokeData, WhiteboardAction};
use roomsync_shared::types::{format_size, PeerId};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let hub = LoopbackHub::new();
    let directory = Arc::new(MemoryDirectory::new());

    let (alice, alice_events) = spawn_peer(&hub, &directory, "alice");
    let (bob, bob_events) = spawn_peer(&hub, &directory, "bob");
    watch_events("alice", alice_events);
    watch_events("bob", bob_events);

    let room = alice.create_room().await?;
    println!("alice opened room {room}");
    bob.join_room(room).await?;

    // Give the join notices a moment to settle before talking.
    tokio::time::sleep(Duration::from_millis(100)).await;

    alice.send_chat("hey bob!").await?;
    bob.send_chat("hey! send me the notes?").await?;

    alice
        .send_files(vec![OutgoingFile::from_memory(
            "notes.md",
            "text/markdown",
            &b"# Meeting notes\n\n- ship it\n"[..],
        )])
        .await?;

    bob.send_whiteboard(
        WhiteboardAction::Start,
        StrokeData::stroke(10.0, 10.0, "pen", "#336699"),
    )
    .await?;
    bob.send_whiteboard(
        WhiteboardAction::Stop,
        StrokeData::point(42.0, 17.0),
    )
    .await?;

    alice.send_text("Shared scratchpad: hello from alice").await?;

    tokio::time::sleep(Duration::from_millis(300)).await;

    for member in alice.members().await? {
        println!(
            "roster: {} ({}){}",
            member.username.as_deref().unwrap_or("?"),
            member.peer_id.short(),
            if member.is_self { " <- me" } else { "" }
        );
    }

    bob.shutdown().await?;
    alice.shutdown().await?;
    Ok(())
}

fn spawn_peer(
    hub: &LoopbackHub,
    directory: &Arc<MemoryDirectory>,
    username: &str,
) -> (
    roomsync_core::SessionHandle,
    tokio::sync::mpsc::Receiver<UiEvent>,
) {
    let peer = PeerId::generate();
    let (transport, incoming) = hub.register(&peer);
    let config = SessionConfig {
        username: username.to_string(),
        ..SessionConfig::default()
    };
    spawn_session(
        peer,
        config,
        Arc::new(transport),
        incoming,
        directory.clone(),
    )
}

fn watch_events(who: &'static str, mut events: tokio::sync::mpsc::Receiver<UiEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                UiEvent::Toast { kind, title, message } => {
                    println!("[{who}] {kind:?}: {title} - {message}");
                }
                UiEvent::Chat { sender, message, .. } => {
                    println!("[{who}] <{sender}> {message}");
                }
                UiEvent::Transfer(snap) => {
                    println!(
                        "[{who}] transfer {} {} ({}) {:?} {}%",
                        snap.id,
                        snap.file_name,
                        format_size(snap.size_bytes),
                        snap.state,
                        snap.progress
                    );
                }
                UiEvent::RoomRefresh { room, members } => {
                    println!(
                        "[{who}] room {:?}: {} member(s)",
                        room.map(|r| r.to_string()),
                        members.len()
                    );
                }
                UiEvent::Whiteboard { action, .. } => {
                    println!("[{who}] whiteboard {action:?}");
                }
                UiEvent::Text { content, .. } => {
                    println!("[{who}] shared text is now: {content:?}");
                }
            }
        }
    });
}
