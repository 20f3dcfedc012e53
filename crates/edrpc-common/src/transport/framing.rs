//! Length-prefixed message framing.
//!
//! Wire format: `[4-byte length as u32 big-endian] + [data]`. Both
//! directions of the bridge connection use the same framing, so the
//! functions are generic over the stream halves and tests can run them over
//! in-memory duplex pipes.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{BridgeError, Result};

/// Maximum message size (16 MB), guarding against allocation of
/// excessively large buffers on malformed or hostile length prefixes.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Writes one framed message and flushes it.
///
/// # Errors
///
/// Returns an error if the payload exceeds [`MAX_MESSAGE_SIZE`] or writing
/// to the stream fails.
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(BridgeError::Protocol(format!(
            "message too large: {} bytes (max {} bytes)",
            data.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let len = data.len() as u32;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| BridgeError::Connection(format!("writing length prefix: {}", e)))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| BridgeError::Connection(format!("writing frame body: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| BridgeError::Connection(format!("flushing stream: {}", e)))?;

    Ok(())
}

/// Reads one framed message.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly at a
/// message boundary. EOF in the middle of a frame is an error.
///
/// # Errors
///
/// Returns an error if the length prefix exceeds [`MAX_MESSAGE_SIZE`] or
/// reading from the stream fails.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(BridgeError::Connection(format!("reading length prefix: {}", e))),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(BridgeError::Protocol(format!(
            "message too large: {} bytes (max {} bytes)",
            len, MAX_MESSAGE_SIZE
        )));
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| BridgeError::Connection(format!("reading frame body: {}", e)))?;

    Ok(Some(buf))
}
