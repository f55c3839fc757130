//! Message contract between wire formats and the network engine.
//!
//! The engine never interprets payloads. It needs exactly two things from a
//! message type:
//!
//! - **encode**: turn an outbound message into an ordered list of borrowed
//!   segments that can be written with one vectored write.
//! - **ingest**: feed each chunk read from the socket into the message and
//!   learn how many bytes were used and whether the message is complete.
//!
//! The same type serves as request and response; direction is decided by
//! how the engine uses an instance.
//!
//! ## Ingestion capabilities
//!
//! A wire format implements one of two ingestion forms and names it through
//! [`Message::ingestor`]:
//!
//! - [`PartialIngest`]: may consume a prefix of the chunk. Unconsumed bytes
//!   belong to the next message and are re-delivered by the engine. Works
//!   with streaming transports.
//! - [`WholeIngest`]: must consume the entire chunk or fail. Only correct
//!   when message boundaries never fall inside a chunk.
//!
//! The engine always calls [`Message::ingest`], which dispatches on the
//! declared capability.

pub mod body;
mod error;
pub mod segments;

pub use body::{Body, BodyState};
pub use error::{MessageError, Result};

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Size limit applied when none is configured.
pub const UNLIMITED: usize = usize::MAX;

/// Segment slots offered by the engines to `encode`.
pub const MAX_SEGMENTS: usize = 8;

/// Opaque caller context carried alongside a message.
///
/// The message stores and returns the handle without inspecting it. The
/// caller keeps its own clone, so the context outlives the message if the
/// caller wants it to.
pub type Attachment = Arc<dyn Any + Send + Sync>;

/// Assembly progress reported after ingesting a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More bytes are required.
    NeedData,
    /// The message is complete.
    Complete,
}

/// Outcome of a successful ingest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
    /// Bytes of the chunk used by this message.
    pub consumed: usize,
    /// Whether the message is complete.
    pub progress: Progress,
}

impl Ingested {
    /// Whether the message is complete.
    pub fn is_complete(&self) -> bool {
        self.progress == Progress::Complete
    }
}

/// Ingestion that may leave a suffix of the chunk unconsumed.
pub trait PartialIngest {
    /// Ingest a prefix of `chunk`, reporting how much was used.
    fn append(&mut self, chunk: &[u8]) -> Result<Ingested>;
}

/// Ingestion that uses every byte of every chunk or fails.
pub trait WholeIngest {
    /// Ingest all of `chunk`.
    fn append_all(&mut self, chunk: &[u8]) -> Result<Progress>;
}

/// The ingestion capability a message type implements.
pub enum Ingestor<'a> {
    Partial(&'a mut dyn PartialIngest),
    Whole(&'a mut dyn WholeIngest),
}

/// State shared by every message type: size limit, attachment and drain
/// accounting.
///
/// The drain counter is atomic only because `on_drain` takes `&self` while
/// encoded segments still borrow the message; a message is never shared
/// between threads.
pub struct MessageBase {
    size_limit: usize,
    attachment: Option<Attachment>,
    drained: AtomicU64,
}

impl MessageBase {
    /// Create a base with no limit and no attachment.
    pub fn new() -> Self {
        Self {
            size_limit: UNLIMITED,
            attachment: None,
            drained: AtomicU64::new(0),
        }
    }

    /// Record bytes written to the transport.
    ///
    /// Returns the number of bytes accounted, which is always `bytes.len()`.
    pub fn feedback(&self, bytes: &[u8]) -> usize {
        let total = self
            .drained
            .fetch_add(bytes.len() as u64, Ordering::Relaxed)
            + bytes.len() as u64;
        trace!(bytes = bytes.len(), total, "Message bytes drained");
        bytes.len()
    }

    /// Total bytes reported through [`feedback`](Self::feedback).
    pub fn drained(&self) -> u64 {
        self.drained.load(Ordering::Relaxed)
    }
}

impl Default for MessageBase {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBase")
            .field("size_limit", &self.size_limit)
            .field("attachment", &self.attachment.is_some())
            .field("drained", &self.drained())
            .finish()
    }
}

/// A bidirectional message driven by a network engine.
///
/// Implementors provide access to their [`MessageBase`], an `encode` if the
/// format can be sent, and an [`Ingestor`] if it can be received. The
/// remaining methods have working defaults.
pub trait Message: Send + Sync {
    fn base(&self) -> &MessageBase;

    fn base_mut(&mut self) -> &mut MessageBase;

    /// Serialize into at most `max_segments` borrowed segments.
    ///
    /// Called once per transmission attempt. The segments stay valid for as
    /// long as the message is borrowed.
    fn encode(&self, _max_segments: usize) -> Result<Vec<&[u8]>> {
        Err(MessageError::Unsupported("encode"))
    }

    /// The ingestion form this type implements, if any.
    fn ingestor(&mut self) -> Option<Ingestor<'_>> {
        None
    }

    /// Feed one received chunk into the message.
    fn ingest(&mut self, chunk: &[u8]) -> Result<Ingested> {
        match self.ingestor() {
            Some(Ingestor::Partial(partial)) => partial.append(chunk),
            Some(Ingestor::Whole(whole)) => {
                let progress = whole.append_all(chunk)?;
                Ok(Ingested {
                    consumed: chunk.len(),
                    progress,
                })
            }
            None => Err(MessageError::Unsupported("ingest")),
        }
    }

    /// Called by the engine with bytes just written to the transport.
    fn on_drain(&self, bytes: &[u8]) -> usize {
        self.base().feedback(bytes)
    }

    fn size_limit(&self) -> usize {
        self.base().size_limit
    }

    fn set_size_limit(&mut self, limit: usize) {
        self.base_mut().size_limit = limit;
    }

    fn attachment(&self) -> Option<&Attachment> {
        self.base().attachment.as_ref()
    }

    fn set_attachment(&mut self, attachment: Attachment) {
        self.base_mut().attachment = Some(attachment);
    }

    fn take_attachment(&mut self) -> Option<Attachment> {
        self.base_mut().attachment.take()
    }
}

/// Messages whose payload is a plain byte body.
pub trait Payload: Message + Default {
    /// Replace the body with a copy of `bytes`.
    fn set_body(&mut self, bytes: &[u8]) -> Result<()>;

    /// Zero-copy view of the current body.
    fn body(&self) -> &[u8];
}
