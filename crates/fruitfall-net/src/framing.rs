//! Length-prefixed framing for TCP streams.
//!
//! ```text
//! +-------------------+----------------------+
//! | length (4 bytes)  |   JSON payload       |
//! | u32 little-endian |   (length bytes)     |
//! +-------------------+----------------------+
//! ```
//!
//! The length excludes the prefix itself. Payloads larger than
//! [`FrameConfig::max_payload_size`] are refused in both directions.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::messages::{MessageError, decode_message, encode_message};

/// Framing limits.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed payload size in bytes. Default: 1 MiB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 1_048_576,
        }
    }
}

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: u32, max: u32 },

    /// The peer closed the stream, possibly mid-frame.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Message(#[from] MessageError),
}

fn eof_as_closed(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

/// Read one frame and return its payload.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(eof_as_closed)?;

    let size = u32::from_le_bytes(len_buf);
    if size > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; size as usize];
    if size > 0 {
        reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;
    }
    Ok(payload)
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let size = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    if size > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: config.max_payload_size,
        });
    }

    writer.write_all(&size.to_le_bytes()).await?;
    if !payload.is_empty() {
        writer.write_all(payload).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Read one frame and decode it as JSON.
pub async fn read_message<T, R>(reader: &mut R, config: &FrameConfig) -> Result<T, FrameError>
where
    T: DeserializeOwned,
    R: AsyncReadExt + Unpin,
{
    let payload = read_frame(reader, config).await?;
    Ok(decode_message(&payload)?)
}

/// Encode `msg` as JSON and write it as one frame.
pub async fn write_message<T, W>(
    writer: &mut W,
    msg: &T,
    config: &FrameConfig,
) -> Result<(), FrameError>
where
    T: Serialize,
    W: AsyncWriteExt + Unpin,
{
    let payload = encode_message(msg)?;
    write_frame(writer, &payload, config).await
}
