//! Sending and receiving one message over an async byte stream.
//!
//! These are the two places the engine touches the message contract:
//! `send` calls `encode` once and drains the segments, `receive` feeds read
//! chunks to `ingest` until the message is complete.

use crate::message::{segments, Message};
use crate::task::{TaskError, READ_BUFFER_SIZE};
use bytes::{Buf, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Encode `msg` and write every segment to `stream`.
///
/// Partial vectored writes resume at the first unwritten byte. Each written
/// span is reported through `on_drain`. Returns the bytes written.
pub async fn send<S, M>(stream: &mut S, msg: &M, max_segments: usize) -> Result<usize, TaskError>
where
    S: AsyncWrite + Unpin,
    M: Message,
{
    let segments = msg.encode(max_segments)?;
    let total = segments::total_len(&segments);
    let mut written = 0;

    while written < total {
        let slices = segments::io_slices(&segments, written);
        let n = stream.write_vectored(&slices).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0").into());
        }

        for span in segments::spans(&segments, written, n) {
            msg.on_drain(span);
        }
        written += n;
    }

    stream.flush().await?;
    trace!(bytes = total, segments = segments.len(), "Message sent");
    Ok(total)
}

/// Read from `stream` into `msg` until it reports complete.
///
/// `buf` carries bytes between calls: anything left after completion belongs
/// to the next message and is ingested first by the next call. A read is
/// only issued once the message has used every buffered byte, so a
/// whole-chunk message sees exactly one read per ingest.
pub async fn receive<S, M>(stream: &mut S, msg: &mut M, buf: &mut BytesMut) -> Result<(), TaskError>
where
    S: AsyncRead + Unpin,
    M: Message,
{
    let mut need_read = buf.is_empty();

    loop {
        if need_read {
            buf.reserve(READ_BUFFER_SIZE);
            let n = stream.read_buf(buf).await?;
            if n == 0 {
                return Err(TaskError::ConnectionClosed);
            }
            trace!(bytes = n, "Chunk received");
        }

        let ingested = msg.ingest(&buf[..])?;
        buf.advance(ingested.consumed);

        if ingested.is_complete() {
            trace!(leftover = buf.len(), "Message complete");
            return Ok(());
        }
        need_read = true;
    }
}
