//! Length-prefixed message: `u32` big-endian length, then the payload.

use crate::message::{
    Body, BodyState, Ingested, Ingestor, Message, MessageBase, MessageError, PartialIngest,
    Payload, Progress, Result,
};

/// Length header size in bytes.
pub const HEADER_SIZE: usize = 4;

/// Segments produced by `encode`: header then body.
const SEGMENTS: usize = 2;

/// A byte payload framed by an explicit length header.
///
/// Header and body may each arrive split across any number of chunks.
/// Bytes past the end of the body are left unconsumed for the next message.
#[derive(Debug, Default)]
pub struct LengthPrefixedMessage {
    base: MessageBase,
    header: [u8; HEADER_SIZE],
    header_received: usize,
    body: Body,
}

impl LengthPrefixedMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outbound body with a copy of `bytes`.
    pub fn set_body(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| MessageError::SizeExceeded {
            size: bytes.len(),
            limit: u32::MAX as usize,
        })?;

        self.body.set(bytes)?;
        self.header = len.to_be_bytes();
        self.header_received = HEADER_SIZE;
        Ok(())
    }

    /// Zero-copy view of the payload.
    pub fn body(&self) -> &[u8] {
        self.body.as_slice()
    }

    /// Declared payload length (zero until the header is complete).
    pub fn body_size(&self) -> usize {
        self.body.size()
    }

    /// Payload bytes buffered so far.
    pub fn body_received(&self) -> usize {
        self.body.received()
    }

    /// Assembly state of the body.
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

impl PartialIngest for LengthPrefixedMessage {
    fn append(&mut self, chunk: &[u8]) -> Result<Ingested> {
        if self.body.state() == BodyState::Complete {
            return Err(MessageError::Malformed("message already complete"));
        }

        let mut consumed = 0;

        if self.header_received < HEADER_SIZE {
            let n = (HEADER_SIZE - self.header_received).min(chunk.len());
            self.header[self.header_received..self.header_received + n]
                .copy_from_slice(&chunk[..n]);
            self.header_received += n;
            consumed += n;

            if self.header_received < HEADER_SIZE {
                return Ok(Ingested {
                    consumed,
                    progress: Progress::NeedData,
                });
            }

            let size = u32::from_be_bytes(self.header) as usize;
            let limit = self.size_limit();
            self.body.declare(size, limit)?;
        }

        let rest = &chunk[consumed..];
        let take = rest.len().min(self.body.remaining());
        let progress = self.body.fill(&rest[..take])?;
        consumed += take;

        Ok(Ingested { consumed, progress })
    }
}

impl Message for LengthPrefixedMessage {
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
        if self.body.state() != BodyState::Complete {
            return Err(MessageError::Malformed("body not set"));
        }
        Ok(vec![&self.header[..], self.body.as_slice()])
    }

    fn ingestor(&mut self) -> Option<Ingestor<'_>> {
        Some(Ingestor::Partial(self))
    }
}

impl Payload for LengthPrefixedMessage {
    fn set_body(&mut self, bytes: &[u8]) -> Result<()> {
        LengthPrefixedMessage::set_body(self, bytes)
    }

    fn body(&self) -> &[u8] {
        LengthPrefixedMessage::body(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MAX_SEGMENTS;

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = (payload.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_single_chunk() {
        let mut msg = LengthPrefixedMessage::new();
        let ingested = msg.ingest(&frame(b"hello")).unwrap();

        assert_eq!(ingested.consumed, 9);
        assert!(ingested.is_complete());
        assert_eq!(msg.body(), b"hello");
    }

    #[test]
    fn test_header_split_across_chunks() {
        let mut msg = LengthPrefixedMessage::new();
        let wire = frame(b"split");

        let first = msg.ingest(&wire[..2]).unwrap();
        assert_eq!(first.consumed, 2);
        assert_eq!(first.progress, Progress::NeedData);
        assert_eq!(msg.state(), BodyState::Empty);

        let second = msg.ingest(&wire[2..]).unwrap();
        assert_eq!(second.consumed, 7);
        assert!(second.is_complete());
        assert_eq!(msg.body(), b"split");
    }

    #[test]
    fn test_body_split_across_chunks() {
        let mut msg = LengthPrefixedMessage::new();
        let wire = frame(b"fragmented body");

        let mut progress = Progress::NeedData;
        for chunk in wire.chunks(3) {
            let ingested = msg.ingest(chunk).unwrap();
            assert_eq!(ingested.consumed, chunk.len());
            progress = ingested.progress;
        }

        assert_eq!(progress, Progress::Complete);
        assert_eq!(msg.body(), b"fragmented body");
    }

    #[test]
    fn test_surplus_bytes_left_for_next_message() {
        let mut wire = frame(b"one");
        wire.extend_from_slice(&frame(b"two"));

        let mut first = LengthPrefixedMessage::new();
        let ingested = first.ingest(&wire).unwrap();
        assert_eq!(ingested.consumed, 7);
        assert!(ingested.is_complete());

        let mut second = LengthPrefixedMessage::new();
        let ingested = second.ingest(&wire[7..]).unwrap();
        assert_eq!(ingested.consumed, 7);
        assert_eq!(second.body(), b"two");
    }

    #[test]
    fn test_declared_length_over_limit() {
        let mut msg = LengthPrefixedMessage::new();
        msg.set_size_limit(4);

        let err = msg.ingest(&frame(b"too long")).unwrap_err();
        assert_eq!(err, MessageError::SizeExceeded { size: 8, limit: 4 });
        assert!(!msg.has_buffer());
        assert_eq!(msg.body_received(), 0);
    }

    #[test]
    fn test_zero_length_body_completes_with_header() {
        let mut msg = LengthPrefixedMessage::new();
        let ingested = msg.ingest(&[0, 0, 0, 0, 9, 9]).unwrap();

        assert_eq!(ingested.consumed, 4);
        assert!(ingested.is_complete());
        assert!(msg.body().is_empty());
    }

    #[test]
    fn test_ingest_after_complete_is_rejected() {
        let mut msg = LengthPrefixedMessage::new();
        msg.ingest(&frame(b"done")).unwrap();

        assert_eq!(
            msg.ingest(b"more"),
            Err(MessageError::Malformed("message already complete"))
        );
    }

    #[test]
    fn test_encode_carries_header() {
        let mut msg = LengthPrefixedMessage::new();
        msg.set_body(b"hello").unwrap();

        let segments = msg.encode(MAX_SEGMENTS).unwrap();
        assert_eq!(segments[0], &[0, 0, 0, 5]);
        assert_eq!(segments.concat(), frame(b"hello"));
    }

    #[test]
    fn test_encode_without_body() {
        let msg = LengthPrefixedMessage::new();
        assert_eq!(
            msg.encode(MAX_SEGMENTS),
            Err(MessageError::Malformed("body not set"))
        );
    }

    #[test]
    fn test_inbound_message_reencodes_identically() {
        let wire = frame(b"echo me");
        let mut msg = LengthPrefixedMessage::new();
        msg.ingest(&wire).unwrap();

        let segments = msg.encode(MAX_SEGMENTS).unwrap();
        assert_eq!(segments.concat(), wire);
    }
}
