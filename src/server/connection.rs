//! Client connection handling

use crate::protocol::{deserialize, frame_message, serialize, ClientEvent, ServerEvent};
use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::mpsc;

/// Read a length-prefixed message from a stream
pub async fn read_message<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];

    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_bytes) as usize;

    // Sanity check on message size
    if len > crate::protocol::MAX_MESSAGE_SIZE as usize {
        anyhow::bail!("Message too large: {} bytes", len);
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;

    Ok(Some(buffer))
}

/// Write a length-prefixed message to a stream
pub async fn write_message<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let framed = frame_message(payload);
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}

/// Task to write outgoing events to the client
pub async fn client_writer_task(
    mut writer: OwnedWriteHalf,
    mut receiver: mpsc::UnboundedReceiver<ServerEvent>,
) {
    while let Some(event) = receiver.recv().await {
        match serialize(&event) {
            Ok(payload) => {
                if let Err(e) = write_message(&mut writer, &payload).await {
                    tracing::error!("Failed to write event to client: {}", e);
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Failed to serialize event: {}", e);
            }
        }
    }

    tracing::debug!("Client writer task finished");
}

/// Parse a client event from bytes
pub fn parse_client_event(bytes: &[u8]) -> Result<ClientEvent> {
    deserialize(bytes)
}
