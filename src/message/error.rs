//! Error types for message encoding and ingestion.

use thiserror::Error;

/// Failure reported synchronously by a message operation.
///
/// Every variant is terminal for the instance that produced it: the engine
/// treats the receive (or send) as failed and discards the message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// The message type does not implement this contract operation.
    #[error("operation not supported by this message type: {0}")]
    Unsupported(&'static str),

    /// Declared or provided body length is beyond the configured limit.
    #[error("message size {size} exceeds limit {limit}")]
    SizeExceeded { size: usize, limit: usize },

    /// Chunk sizes are inconsistent with the declared body length.
    #[error("malformed message: {0}")]
    Malformed(&'static str),

    /// The body buffer could not be allocated.
    #[error("failed to allocate {0} bytes for message body")]
    Alloc(usize),

    /// The caller offered fewer output segments than the format needs.
    #[error("message needs {needed} output segments, only {max} available")]
    SegmentLimit { needed: usize, max: usize },
}

/// Result type alias using MessageError.
pub type Result<T> = std::result::Result<T, MessageError>;
