//! Line codec for the MCP wire protocol.
//!
//! Frame format: one JSON-RPC message per line, UTF-8, terminated by `\n`
//! (a trailing `\r` is tolerated). Messages never contain raw newlines
//! because serde_json escapes them.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read one line frame.
///
/// Returns `None` on clean EOF. A final line without a terminator is still
/// returned. Lines longer than `max_frame_bytes` are rejected before they are
/// fully buffered.
pub async fn read_frame<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    let limit = max_frame_bytes as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max_frame_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Frame too large: more than {} bytes", max_frame_bytes),
        ));
    }

    Ok(Some(buf))
}

/// Write one line frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> std::io::Result<()> {
    writer.write_all(payload).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Encode a message as a single JSON line (without the terminator).
pub fn encode_message<T: Serialize>(message: &T) -> std::io::Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| {
        tracing::error!("JSON encoding failed: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })
}
