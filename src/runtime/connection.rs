//! Connection state machine for the echo server.
//!
//! Each connection owns the inbound message being assembled and a queue of
//! completed messages waiting to be written back. The stream type is
//! generic so the state machine runs over any non-blocking `Read + Write`.

use crate::message::{segments, Message, MAX_SEGMENTS};
use slab::Slab;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::mem;

/// Which readiness a connection is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Nothing queued; waiting for request bytes.
    Reading,
    /// Responses queued; waiting for the socket to accept them.
    Writing,
}

/// A single client connection.
pub struct Connection<S, M> {
    pub stream: S,
    /// Inbound message in progress.
    request: M,
    /// Completed messages to echo back, oldest first.
    outbound: VecDeque<M>,
    /// Bytes of the head outbound message already written.
    written: usize,
    read_buf: Vec<u8>,
    /// Bytes held in `read_buf` that no message has consumed yet.
    filled: usize,
    size_limit: usize,
}

impl<S, M> Connection<S, M>
where
    S: Read + Write,
    M: Message + Default,
{
    /// Create a connection with a `buffer_size` read buffer. Every inbound
    /// message is limited to `size_limit` bytes.
    pub fn new(stream: S, buffer_size: usize, size_limit: usize) -> Self {
        let mut request = M::default();
        request.set_size_limit(size_limit);
        Self {
            stream,
            request,
            outbound: VecDeque::new(),
            written: 0,
            read_buf: vec![0; buffer_size],
            filled: 0,
            size_limit,
        }
    }

    pub fn state(&self) -> ConnState {
        if self.outbound.is_empty() {
            ConnState::Reading
        } else {
            ConnState::Writing
        }
    }

    /// Messages waiting to be written.
    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    /// Read until the socket would block, ingesting after every read.
    ///
    /// Returns `UnexpectedEof` when the peer closes and `InvalidData` when
    /// a message rejects its input.
    pub fn on_readable(&mut self) -> io::Result<()> {
        loop {
            if self.filled == self.read_buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "read buffer full without message progress",
                ));
            }

            match self.stream.read(&mut self.read_buf[self.filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "EOF"));
                }
                Ok(n) => {
                    self.filled += n;
                    self.ingest_buffered()?;
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Feed buffered bytes to the inbound message, queueing each one that
    /// completes. Unconsumed bytes move to the front of the buffer.
    fn ingest_buffered(&mut self) -> io::Result<()> {
        let mut offset = 0;

        while offset < self.filled {
            let ingested = self
                .request
                .ingest(&self.read_buf[offset..self.filled])
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            offset += ingested.consumed;

            if ingested.is_complete() {
                let done = mem::take(&mut self.request);
                self.request.set_size_limit(self.size_limit);
                self.outbound.push_back(done);
            }
            if !ingested.is_complete() || ingested.consumed == 0 {
                break;
            }
        }

        if offset > 0 {
            self.read_buf.copy_within(offset..self.filled, 0);
            self.filled -= offset;
        }
        Ok(())
    }

    /// Write queued messages until the queue is empty or the socket would
    /// block.
    pub fn on_writable(&mut self) -> io::Result<()> {
        while let Some(head) = self.outbound.front() {
            let segments = head
                .encode(MAX_SEGMENTS)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let total = segments::total_len(&segments);

            while self.written < total {
                let slices = segments::io_slices(&segments, self.written);
                match self.stream.write_vectored(&slices) {
                    Ok(0) => {
                        return Err(io::Error::new(io::ErrorKind::WriteZero, "write returned 0"));
                    }
                    Ok(n) => {
                        for span in segments::spans(&segments, self.written, n) {
                            head.on_drain(span);
                        }
                        self.written += n;
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            }

            self.written = 0;
            self.outbound.pop_front();
        }
        Ok(())
    }
}

/// Registry of active connections using slab allocation.
pub struct ConnectionRegistry<C> {
    connections: Slab<C>,
    max_connections: usize,
}

impl<C> ConnectionRegistry<C> {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Insert a connection, or return it back if the registry is full.
    pub fn insert(&mut self, conn: C) -> Result<usize, C> {
        if self.connections.len() >= self.max_connections {
            return Err(conn);
        }
        Ok(self.connections.insert(conn))
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut C> {
        self.connections.get_mut(id)
    }

    pub fn remove(&mut self, id: usize) -> Option<C> {
        self.connections.try_remove(id)
    }

    pub fn contains(&self, id: usize) -> bool {
        self.connections.contains(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
