//! Length-prefixed framing over a byte stream.
//!
//! Every envelope is a 4-byte big-endian length followed by exactly that many
//! payload bytes. The framing layer treats the payload as an opaque blob; the
//! [`Message`] helpers on top of it handle serialization.
//!
//! A peer that closes before a whole envelope arrives yields `Ok(None)`
//! rather than an error, so callers can treat "no message" and an orderly
//! goodbye the same way.

use crate::error::{ChatError, Result};
use crate::protocol::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const LENGTH_PREFIX_LEN: usize = 4;

/// Frames an opaque payload.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| ChatError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reads one envelope and returns its payload.
///
/// Returns `Ok(None)` if the stream ends before the prefix or the payload is
/// complete. A declared length above `max_len` is rejected before any payload
/// is read.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_LEN];
    if !read_full(reader, &mut prefix).await? {
        return Ok(None);
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(ChatError::FrameTooLarge { len, max: max_len });
    }

    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload).await? {
        return Ok(None);
    }

    Ok(Some(payload))
}

/// Fills `buf` completely, accumulating across short reads.
/// Returns false if the peer shut down first.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(true)
}

pub fn encode(message: &Message) -> Result<Vec<u8>> {
    encode_frame(&message.to_payload()?)
}

pub async fn decode<R>(reader: &mut R, max_len: usize) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    match read_frame(reader, max_len).await? {
        Some(payload) => Message::from_payload(&payload).map(Some),
        None => Ok(None),
    }
}

pub async fn write_message<W>(writer: &mut W, message: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
