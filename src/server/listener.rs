//! Unix socket listener and server main loop

use super::connection::{client_writer_task, parse_client_event, read_message};
use crate::{
    broker::{Broker, BrokerEvent, ConnectionAttrs},
    config::Config,
    protocol::{check_version_compatibility, ClientEvent, ServerEvent},
};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unix socket server listener
pub struct ServerListener {
    socket_path: PathBuf,
    config: Config,
}

impl ServerListener {
    /// Create a new server listener
    pub fn new(config: Config, socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            config,
        }
    }

    /// Check if socket already exists (another server running)
    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Get the socket path
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Run the server
    pub async fn run(&self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Remove stale socket if it exists
        if self.socket_path.exists() {
            // Try to connect to check if it's alive
            match UnixStream::connect(&self.socket_path).await {
                Ok(_) => {
                    return Err(anyhow!(
                        "Server already running on {:?}",
                        self.socket_path
                    ));
                }
                Err(_) => {
                    // Stale socket, remove it
                    tracing::info!("Removing stale socket: {:?}", self.socket_path);
                    std::fs::remove_file(&self.socket_path)?;
                }
            }
        }

        // Create Unix socket listener
        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!("Server listening on {:?}", self.socket_path);

        // Spawn the broker task; it owns all matchmaking and relay state
        let (broker, events_tx, events_rx) = Broker::new(&self.config.matchmaking);
        tokio::spawn(broker.run(events_rx));

        // Main server loop
        loop {
            tokio::select! {
                // Handle shutdown signal
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }

                // Accept new connections
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _addr)) => {
                            let events_tx = events_tx.clone();
                            tokio::spawn(async move {
                                if let Err(e) = handle_client(stream, events_tx).await {
                                    tracing::error!("Client error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        // Cleanup
        self.cleanup().await;

        Ok(())
    }

    /// Clean up server resources
    async fn cleanup(&self) {
        tracing::info!("Cleaning up server resources");

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                tracing::error!("Failed to remove socket file: {}", e);
            }
        }
    }
}

/// Handle a single client connection: perform the role handshake, then
/// pump decoded events into the broker until the stream ends.
async fn handle_client(
    stream: UnixStream,
    events_tx: mpsc::UnboundedSender<BrokerEvent>,
) -> Result<()> {
    let (mut reader, writer) = stream.into_split();

    // The first frame must be a Hello carrying a valid role; anything
    // else rejects the connection with nothing but a log line
    let handshake = match read_message(&mut reader).await? {
        Some(bytes) => bytes,
        None => return Ok(()),
    };
    let (role, attrs) = match parse_client_event(&handshake) {
        Ok(ClientEvent::Hello {
            protocol_version,
            role,
            external_user_id,
            gender_filter,
            slow_mode_secs,
        }) => {
            if let Err(e) =
                check_version_compatibility(protocol_version, crate::protocol::PROTOCOL_VERSION)
            {
                tracing::warn!("Connection rejected: {}", e);
                return Ok(());
            }
            (
                role,
                ConnectionAttrs {
                    external_user_id,
                    gender_filter,
                    slow_mode_secs,
                },
            )
        }
        Ok(_) => {
            tracing::warn!("Connection rejected: first frame was not a handshake");
            return Ok(());
        }
        Err(e) => {
            // Covers missing or invalid roles: the closed Role enum makes
            // a bad role a decode failure
            tracing::warn!("Connection rejected: malformed handshake: {}", e);
            return Ok(());
        }
    };

    let conn_id = Uuid::new_v4();
    tracing::info!("Connection {} handshake complete, role {:?}", conn_id, role);

    // Outbound channel for this client, drained by the writer task
    let (tx, rx) = mpsc::unbounded_channel::<ServerEvent>();
    let writer_handle = tokio::spawn(client_writer_task(writer, rx));

    if events_tx
        .send(BrokerEvent::Connected {
            id: conn_id,
            role,
            attrs,
            sender: tx,
        })
        .is_err()
    {
        // Broker gone, the server is shutting down
        writer_handle.abort();
        return Ok(());
    }

    // Read and decode events until the client goes away
    loop {
        match read_message(&mut reader).await {
            Ok(Some(bytes)) => match parse_client_event(&bytes) {
                Ok(event) => {
                    if events_tx
                        .send(BrokerEvent::Inbound {
                            id: conn_id,
                            event,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    // Malformed events are dropped, never answered
                    tracing::warn!("Malformed event from {}: {}", conn_id, e);
                }
            },
            Ok(None) => {
                tracing::info!("Connection {} closed by client", conn_id);
                break;
            }
            Err(e) => {
                tracing::error!("Error reading from connection {}: {}", conn_id, e);
                break;
            }
        }
    }

    let _ = events_tx.send(BrokerEvent::Disconnected { id: conn_id });
    writer_handle.abort();

    tracing::info!("Client handler finished: {}", conn_id);

    Ok(())
}
