//! Integration tests for the server transport

use matchline::config::{Config, MatchmakingConfig, ServerConfig};
use matchline::protocol::{
    deserialize, serialize, ChatPayload, ClientEvent, Role, ServerEvent, PROTOCOL_VERSION,
};
use matchline::server::ServerListener;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Helper to read a length-prefixed message
async fn read_message(stream: &mut UnixStream) -> Option<Vec<u8>> {
    let mut len_bytes = [0u8; 4];
    stream.read_exact(&mut len_bytes).await.ok()?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buffer = vec![0u8; len];
    stream.read_exact(&mut buffer).await.ok()?;
    Some(buffer)
}

/// Helper to write a length-prefixed message
async fn write_message(stream: &mut UnixStream, payload: &[u8]) {
    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes()).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.flush().await.unwrap();
}

async fn send_event(stream: &mut UnixStream, event: &ClientEvent) {
    let bytes = serialize(event).expect("serialize failed");
    write_message(stream, &bytes).await;
}

async fn recv_event(stream: &mut UnixStream) -> ServerEvent {
    let bytes = timeout(Duration::from_secs(2), read_message(stream))
        .await
        .expect("Should receive message")
        .expect("Message should not be empty");
    deserialize(&bytes).expect("Should deserialize")
}

/// Server config with a zero-width search window so matches resolve
/// within a test tick
fn instant_config() -> Config {
    Config {
        server: ServerConfig { runtime_dir: None },
        matchmaking: MatchmakingConfig {
            search_delay_min_ms: 0,
            search_delay_max_ms: 0,
            moderator_capacity: 100,
        },
    }
}

/// Connect and complete the role handshake
async fn handshake(socket_path: &Path, role: Role) -> UnixStream {
    let mut stream = UnixStream::connect(socket_path).await.unwrap();
    send_event(
        &mut stream,
        &ClientEvent::Hello {
            protocol_version: PROTOCOL_VERSION,
            role,
            external_user_id: None,
            gender_filter: None,
            slow_mode_secs: None,
        },
    )
    .await;

    match recv_event(&mut stream).await {
        ServerEvent::Welcome {
            protocol_version, ..
        } => assert_eq!(protocol_version, PROTOCOL_VERSION),
        other => panic!("Expected Welcome, got {:?}", other),
    }
    stream
}

#[tokio::test]
async fn test_server_accepts_handshake() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test.sock");

    let server = ServerListener::new(instant_config(), socket_path.clone());
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    // Start server in background
    let server_handle = tokio::spawn(async move { server.run(shutdown_rx).await });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stream = handshake(&socket_path, Role::User).await;

    // Clean up
    drop(stream);
    let _ = shutdown_tx.send(()).await;
    let _ = timeout(Duration::from_secs(2), server_handle).await;
}

#[tokio::test]
async fn test_server_rejects_event_before_handshake() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_reject.sock");

    let server = ServerListener::new(instant_config(), socket_path.clone());
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    let server_handle = tokio::spawn(async move { server.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut stream = UnixStream::connect(&socket_path).await.unwrap();

    // First frame is not a handshake; the server closes without replying
    send_event(&mut stream, &ClientEvent::Search).await;

    let response = timeout(Duration::from_secs(2), read_message(&mut stream))
        .await
        .expect("Read should complete");
    assert!(response.is_none(), "Connection should be closed");

    let _ = shutdown_tx.send(()).await;
    let _ = timeout(Duration::from_secs(2), server_handle).await;
}

#[tokio::test]
async fn test_match_and_message_flow() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_match.sock");

    let server = ServerListener::new(instant_config(), socket_path.clone());
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    let server_handle = tokio::spawn(async move { server.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut moderator = handshake(&socket_path, Role::Moderator).await;
    let mut user = handshake(&socket_path, Role::User).await;

    // Search resolves instantly with the zero-width window
    send_event(&mut user, &ClientEvent::Search).await;

    match recv_event(&mut user).await {
        ServerEvent::Searching { .. } => {}
        other => panic!("Expected Searching, got {:?}", other),
    }

    let room_id = match recv_event(&mut user).await {
        ServerEvent::ChatConnected { room_id, .. } => room_id,
        other => panic!("Expected ChatConnected, got {:?}", other),
    };

    match recv_event(&mut moderator).await {
        ServerEvent::NewChat {
            room_id: mod_room, ..
        } => assert_eq!(mod_room, room_id),
        other => panic!("Expected NewChat, got {:?}", other),
    }

    // A text message reaches both members, stamped with the sender role
    send_event(
        &mut user,
        &ClientEvent::Chat {
            room_id: room_id.clone(),
            payload: ChatPayload::Text {
                content: "hi".to_string(),
            },
        },
    )
    .await;

    for stream in [&mut user, &mut moderator] {
        match recv_event(stream).await {
            ServerEvent::ChatMessage(envelope) => {
                assert_eq!(envelope.sender, Role::User);
                assert_eq!(envelope.room_id, room_id);
                assert_eq!(
                    envelope.payload,
                    ChatPayload::Text {
                        content: "hi".to_string()
                    }
                );
            }
            other => panic!("Expected ChatMessage, got {:?}", other),
        }
    }

    // Skipping the chat ends it for both sides
    send_event(
        &mut user,
        &ClientEvent::EndChat {
            room_id: room_id.clone(),
        },
    )
    .await;

    for stream in [&mut user, &mut moderator] {
        match recv_event(stream).await {
            ServerEvent::ChatEnded { room_id: ended } => assert_eq!(ended, room_id),
            other => panic!("Expected ChatEnded, got {:?}", other),
        }
    }

    let _ = shutdown_tx.send(()).await;
    let _ = timeout(Duration::from_secs(2), server_handle).await;
}

#[tokio::test]
async fn test_disconnect_notifies_peer() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("test_disconnect.sock");

    let server = ServerListener::new(instant_config(), socket_path.clone());
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    let server_handle = tokio::spawn(async move { server.run(shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut moderator = handshake(&socket_path, Role::Moderator).await;
    let mut user = handshake(&socket_path, Role::User).await;

    send_event(&mut user, &ClientEvent::Search).await;
    match recv_event(&mut user).await {
        ServerEvent::Searching { .. } => {}
        other => panic!("Expected Searching, got {:?}", other),
    }
    let room_id = match recv_event(&mut user).await {
        ServerEvent::ChatConnected { room_id, .. } => room_id,
        other => panic!("Expected ChatConnected, got {:?}", other),
    };
    match recv_event(&mut moderator).await {
        ServerEvent::NewChat { .. } => {}
        other => panic!("Expected NewChat, got {:?}", other),
    }

    // The user vanishing mid-session ends it for the moderator
    drop(user);

    match recv_event(&mut moderator).await {
        ServerEvent::ChatEnded { room_id: ended } => assert_eq!(ended, room_id),
        other => panic!("Expected ChatEnded, got {:?}", other),
    }

    let _ = shutdown_tx.send(()).await;
    let _ = timeout(Duration::from_secs(2), server_handle).await;
}
