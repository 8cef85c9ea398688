//! Length-prefixed JSON framing
//!
//! Every message is a 4-byte length followed by that many bytes of JSON. The
//! byte order of the length is configurable: current clients use big endian,
//! first-generation clients wrote the host's native (little endian) order.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DaemonError, Result};

/// Frames larger than this are rejected before allocating
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Byte order of the frame length prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameOrder {
    #[default]
    Big,
    Little,
}

impl FrameOrder {
    fn encode(self, len: u32) -> [u8; 4] {
        match self {
            FrameOrder::Big => len.to_be_bytes(),
            FrameOrder::Little => len.to_le_bytes(),
        }
    }

    fn decode(self, bytes: [u8; 4]) -> u32 {
        match self {
            FrameOrder::Big => u32::from_be_bytes(bytes),
            FrameOrder::Little => u32::from_le_bytes(bytes),
        }
    }
}

pub async fn write_frame<W>(writer: &mut W, order: FrameOrder, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if payload.len() > MAX_FRAME_LEN {
        return Err(DaemonError::Protocol(format!(
            "frame of {} bytes exceeds limit",
            payload.len()
        )));
    }
    writer.write_all(&order.encode(payload.len() as u32)).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame; `None` when the peer closed cleanly between frames
pub async fn read_frame<R>(reader: &mut R, order: FrameOrder) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(DaemonError::Protocol("connection closed inside frame header".to_string()));
        }
        filled += n;
    }

    let len = order.decode(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(DaemonError::Protocol(format!(
            "frame of {} bytes exceeds limit",
            len
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn send_message<W, T>(writer: &mut W, order: FrameOrder, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = serde_json::to_vec(message)?;
    write_frame(writer, order, &json).await
}

pub async fn recv_message<R, T>(reader: &mut R, order: FrameOrder) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    match read_frame(reader, order).await? {
        Some(frame) => Ok(Some(serde_json::from_slice(&frame)?)),
        None => Ok(None),
    }
}
