//! Module `framing`
//!
//! Length-prefixed frames on the data channel: a 4-byte little-endian
//! payload length followed by exactly that many bytes. No acknowledgement
//! follows a frame.

use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransferError;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

const HEADER_LEN: usize = 4;
// Upper bound on memory reserved ahead of the bytes actually arriving.
const MAX_RESERVE: usize = 1024 * 1024;

/// Writes one frame, sending the payload in `chunk_size` pieces.
pub async fn send_frame<W>(stream: &mut W, bytes: &[u8], chunk_size: usize) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(bytes.len()).map_err(|_| TransferError::FrameTooLarge(bytes.len()))?;
    stream.write_all(&len.to_le_bytes()).await?;

    for chunk in bytes.chunks(chunk_size.max(1)) {
        stream.write_all(chunk).await?;
    }

    stream.flush().await?;
    Ok(())
}

/// Reads one frame, looping over partial reads until the declared length is
/// satisfied.
pub async fn recv_frame<R>(stream: &mut R, chunk_size: usize) -> Result<Vec<u8>, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = stream.read(&mut header[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                TransferError::ConnectionClosed
            } else {
                TransferError::TruncatedFrame {
                    expected: HEADER_LEN,
                    received: filled,
                }
            });
        }
        filled += n;
    }

    let expected = u32::from_le_bytes(header) as usize;
    let mut payload = Vec::with_capacity(expected.min(MAX_RESERVE));
    let mut buffer = vec![0u8; chunk_size.max(1)];

    while payload.len() < expected {
        let want = (expected - payload.len()).min(buffer.len());
        let n = match stream.read(&mut buffer[..want]).await {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => 0,
            Err(e) => return Err(e.into()),
        };
        if n == 0 {
            return Err(TransferError::TruncatedFrame {
                expected,
                received: payload.len(),
            });
        }
        payload.extend_from_slice(&buffer[..n]);
    }

    Ok(payload)
}
