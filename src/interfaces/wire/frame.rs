//! Length-prefixed framing: a big-endian `u32` byte count followed by the
//! message body.

use crate::error::{BankError, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default upper bound on a single message body.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Reads one frame. A declared length of zero or above `max_len` is a
/// protocol error and nothing past the prefix is consumed.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    if len == 0 {
        return Err(BankError::ProtocolError("Empty request".to_string()));
    }
    if len > max_len {
        return Err(BankError::ProtocolError(format!(
            "Message of {len} bytes exceeds limit of {max_len} bytes"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(body.len()).map_err(|_| {
        BankError::ProtocolError(format!("Message of {} bytes is too large", body.len()))
    })?;
    writer.write_u32(len).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}
