//! Owned payload buffer with its assembly state machine.
//!
//! A [`Body`] moves through three states:
//!
//! ```text
//! Empty --declare(n)--> Accumulating --fill(..n)--> Complete
//!   |                                                  ^
//!   +---------------------set(bytes)-------------------+
//! ```
//!
//! The buffer is a plain `Vec<u8>`: moving a `Body` moves the allocation,
//! and `std::mem::take` leaves the source `Empty` with no allocation.

use super::error::{MessageError, Result};
use super::Progress;

/// Assembly state of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyState {
    /// No length declared yet.
    #[default]
    Empty,
    /// Length known, fewer bytes buffered than declared.
    Accumulating,
    /// Every declared byte is buffered.
    Complete,
}

/// A payload buffer with declared and received sizes.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Body {
    data: Vec<u8>,
    size: usize,
    received: usize,
    state: BodyState,
}

impl Body {
    /// Create an empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the total length of an inbound body.
    ///
    /// Rejects `size > limit` before touching the buffer. An existing
    /// allocation is reused when it is large enough.
    pub fn declare(&mut self, size: usize, limit: usize) -> Result<()> {
        if self.state != BodyState::Empty {
            return Err(MessageError::Malformed("body length already declared"));
        }
        if size > limit {
            return Err(MessageError::SizeExceeded { size, limit });
        }

        self.data.clear();
        self.data
            .try_reserve_exact(size)
            .map_err(|_| MessageError::Alloc(size))?;

        self.size = size;
        self.received = 0;
        self.state = BodyState::Accumulating;
        Ok(())
    }

    /// Append a chunk of body bytes.
    ///
    /// The chunk must fit in the remaining declared length. Completes the
    /// body when the last byte arrives (immediately for a zero-length body).
    pub fn fill(&mut self, chunk: &[u8]) -> Result<Progress> {
        match self.state {
            BodyState::Empty => return Err(MessageError::Malformed("no body length declared")),
            BodyState::Complete => return Err(MessageError::Malformed("message already complete")),
            BodyState::Accumulating => {}
        }

        let remaining = self.remaining();
        if chunk.len() > remaining {
            return Err(MessageError::Malformed(
                "chunk exceeds declared body length",
            ));
        }

        self.data.extend_from_slice(chunk);
        self.received += chunk.len();
        debug_assert_eq!(self.data.len(), self.received);

        if self.received == self.size {
            self.state = BodyState::Complete;
            Ok(Progress::Complete)
        } else {
            Ok(Progress::NeedData)
        }
    }

    /// Replace the body with a copy of `bytes`.
    ///
    /// Allocates a fresh buffer and releases the previous one. No size limit
    /// applies: limits gate inbound acceptance only.
    pub fn set(&mut self, bytes: &[u8]) -> Result<()> {
        let mut data = Vec::new();
        data.try_reserve_exact(bytes.len())
            .map_err(|_| MessageError::Alloc(bytes.len()))?;
        data.extend_from_slice(bytes);

        self.data = data;
        self.size = bytes.len();
        self.received = bytes.len();
        self.state = BodyState::Complete;
        Ok(())
    }

    /// Zero-copy view of the buffered bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Declared body length.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Bytes buffered so far.
    pub fn received(&self) -> usize {
        self.received
    }

    /// Bytes still expected before the body is complete.
    pub fn remaining(&self) -> usize {
        self.size - self.received
    }

    /// Current assembly state.
    pub fn state(&self) -> BodyState {
        self.state
    }

    /// Whether an allocation is held.
    pub fn is_allocated(&self) -> bool {
        self.data.capacity() > 0
    }

    /// Take the buffered bytes, consuming the body.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}
