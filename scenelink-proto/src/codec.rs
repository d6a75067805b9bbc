//! Length-prefixed JSON frame codec.
//!
//! Each frame is: `[u32 big-endian length][JSON payload]`. Blocking helpers
//! work over `Read`/`Write`; the async ones over tokio streams.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum allowed frame payload (16 MiB).
pub const MAX_FRAME: u32 = 16 * 1024 * 1024;

/// Serializes `msg` into a JSON payload.
pub fn to_payload(msg: &impl Serialize) -> io::Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Parses a JSON payload. Malformed input fails with `InvalidData`.
pub fn from_payload<T: DeserializeOwned>(payload: &[u8]) -> io::Result<T> {
    serde_json::from_slice(payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Builds the length header for `payload`, enforcing [`MAX_FRAME`].
fn header(payload: &[u8]) -> io::Result<[u8; 4]> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "frame exceeds 16 MiB limit"))?;
    Ok(len.to_be_bytes())
}

/// Parses a length header, enforcing [`MAX_FRAME`].
fn payload_len(header: [u8; 4]) -> io::Result<usize> {
    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds 16 MiB limit",
        ));
    }
    Ok(len as usize)
}

/// Writes one frame carrying `payload`.
pub fn write_frame<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    w.write_all(&header(payload)?)?;
    w.write_all(payload)?;
    w.flush()
}

/// Reads one frame and returns its payload.
///
/// A stream that ends before the frame is complete fails with
/// `UnexpectedEof`.
pub fn read_frame(r: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    let mut payload = vec![0u8; payload_len(buf)?];
    r.read_exact(&mut payload)?;
    Ok(payload)
}

/// Encodes `msg` as a frame and writes it to `w`.
pub fn encode<W: Write>(w: &mut W, msg: &impl Serialize) -> io::Result<()> {
    write_frame(w, &to_payload(msg)?)
}

/// Reads a frame from `r` and decodes it.
pub fn decode<T: DeserializeOwned>(r: &mut impl Read) -> io::Result<T> {
    from_payload(&read_frame(r)?)
}

/// Async counterpart of [`encode`]. Flushes `w`.
pub async fn send<W: AsyncWrite + Unpin>(w: &mut W, msg: &impl Serialize) -> io::Result<()> {
    let payload = to_payload(msg)?;
    w.write_all(&header(&payload)?).await?;
    w.write_all(&payload).await?;
    w.flush().await
}

/// Async counterpart of [`read_frame`].
pub async fn recv_frame<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Vec<u8>> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).await?;
    let mut payload = vec![0u8; payload_len(buf)?];
    r.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Async counterpart of [`decode`].
pub async fn recv<T: DeserializeOwned, R: AsyncRead + Unpin>(r: &mut R) -> io::Result<T> {
    from_payload(&recv_frame(r).await?)
}
