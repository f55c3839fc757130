//! Passthrough message: a bare payload with no length header on the wire.

use crate::message::{
    Body, BodyState, Ingestor, Message, MessageBase, MessageError, Payload, Progress, Result,
    WholeIngest,
};

/// Segments produced by `encode`: header then body.
const SEGMENTS: usize = 2;

/// Header bytes on the wire. The header segment is kept for positional
/// compatibility with headed formats but carries nothing.
pub const HEAD_SIZE: usize = 0;

const HEADER: [u8; HEAD_SIZE] = [];

/// A byte payload assembled from whole chunks.
///
/// The first chunk delivered to an empty message declares the body length.
/// Once complete, the instance accepts no more input; the next logical
/// message needs a fresh instance.
#[derive(Debug, Default)]
pub struct PassthroughMessage {
    base: MessageBase,
    body: Body,
}

impl PassthroughMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outbound body with a copy of `bytes`.
    ///
    /// Bypasses the size limit, which gates inbound acceptance only.
    pub fn set_body(&mut self, bytes: &[u8]) -> Result<()> {
        self.body.set(bytes)
    }

    /// Zero-copy view of the payload.
    pub fn body(&self) -> &[u8] {
        self.body.as_slice()
    }

    /// Declared payload length.
    pub fn body_size(&self) -> usize {
        self.body.size()
    }

    /// Payload bytes buffered so far.
    pub fn body_received(&self) -> usize {
        self.body.received()
    }

    /// Assembly state.
    pub fn state(&self) -> BodyState {
        self.body.state()
    }

    /// Whether a body buffer is allocated.
    pub fn has_buffer(&self) -> bool {
        self.body.is_allocated()
    }

    /// Take the payload, consuming the message.
    pub fn into_body(self) -> Vec<u8> {
        self.body.into_vec()
    }
}

impl WholeIngest for PassthroughMessage {
    fn append_all(&mut self, chunk: &[u8]) -> Result<Progress> {
        if self.body.state() == BodyState::Empty {
            let limit = self.size_limit();
            self.body.declare(chunk.len(), limit)?;
        }
        self.body.fill(chunk)
    }
}

impl Message for PassthroughMessage {
    fn base(&self) -> &MessageBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MessageBase {
        &mut self.base
    }

    fn encode(&self, max_segments: usize) -> Result<Vec<&[u8]>> {
        if max_segments < SEGMENTS {
            return Err(MessageError::SegmentLimit {
                needed: SEGMENTS,
                max: max_segments,
            });
        }
        Ok(vec![&HEADER[..], self.body.as_slice()])
    }

    fn ingestor(&mut self) -> Option<Ingestor<'_>> {
        Some(Ingestor::Whole(self))
    }
}

impl Payload for PassthroughMessage {
    fn set_body(&mut self, bytes: &[u8]) -> Result<()> {
        PassthroughMessage::set_body(self, bytes)
    }

    fn body(&self) -> &[u8] {
        PassthroughMessage::body(self)
    }
}
