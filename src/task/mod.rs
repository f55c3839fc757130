//! Client task engine.
//!
//! A task is one request/response exchange driven over TCP:
//!
//! 1. Take the idle keep-alive connection, or resolve and connect.
//! 2. Encode the request once and write its segments (`exchange::send`).
//! 3. Ingest response chunks until the response reports complete
//!    (`exchange::receive`).
//! 4. Park the connection for reuse if nothing is left over.
//!
//! Transport failures retry the whole task with a new connection and a new
//! response instance, up to `retry_max` times. Message errors never retry.

mod client;
pub mod exchange;

pub use client::Client;

use crate::config::Config;
use crate::message::{MessageError, MAX_SEGMENTS};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Read buffer size for response chunks.
pub const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Task-level settings.
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// `host:port` of the server.
    pub addr: String,
    /// Extra attempts after the first failure.
    pub retry_max: usize,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub receive_timeout: Duration,
    /// How long an idle connection may be reused (zero disables reuse).
    pub keep_alive: Duration,
    /// Size limit applied to every response instance.
    pub response_size_limit: usize,
    /// Segment slots offered to `encode`.
    pub max_segments: usize,
}

impl TaskConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            retry_max: 0,
            connect_timeout: Duration::from_secs(5),
            send_timeout: Duration::from_secs(10),
            receive_timeout: Duration::from_secs(10),
            keep_alive: Duration::from_secs(30),
            response_size_limit: 4 * 1024,
            max_segments: MAX_SEGMENTS,
        }
    }
}

impl From<&Config> for TaskConfig {
    fn from(config: &Config) -> Self {
        Self {
            addr: config.address(),
            retry_max: config.retry_max,
            connect_timeout: config.connect_timeout,
            send_timeout: config.send_timeout,
            receive_timeout: config.receive_timeout,
            keep_alive: config.keep_alive,
            response_size_limit: config.response_size_limit,
            max_segments: MAX_SEGMENTS,
        }
    }
}

/// Phase of a task that timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connect,
    Send,
    Receive,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Connect => write!(f, "connect"),
            Phase::Send => write!(f, "send"),
            Phase::Receive => write!(f, "receive"),
        }
    }
}

/// Why a task failed.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Name resolution failed or returned no addresses.
    #[error("DNS error: {0}")]
    Resolve(#[source] io::Error),

    /// Every resolved address refused or failed the connection.
    #[error("connect error: {0}")]
    Connect(#[source] io::Error),

    /// Read or write failure on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0} timed out")]
    Timeout(Phase),

    /// Peer closed the connection before the response was complete.
    #[error("connection closed before response was complete")]
    ConnectionClosed,

    /// The request could not be encoded or the response was rejected.
    #[error("message error: {0}")]
    Message(#[from] MessageError),
}

impl TaskError {
    /// Whether a fresh attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Connect(_)
                | TaskError::Io(_)
                | TaskError::Timeout(_)
                | TaskError::ConnectionClosed
        )
    }

    /// Whether the peer closed the connection under us.
    pub fn is_peer_closed(&self) -> bool {
        match self {
            TaskError::ConnectionClosed => true,
            TaskError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}
