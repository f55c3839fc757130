//! Passthrough framing.
//!
//! The payload goes on the wire as-is, with no length prefix:
//!
//! ```text
//! Request:  hello
//! Response: hello
//! ```
//!
//! ## Message Boundaries
//!
//! The receiver takes the size of the first chunk read for a message as the
//! whole message length. This is only correct when the transport delivers
//! exactly one complete message per read. A payload split across reads is
//! reported complete after its first fragment, and two payloads coalesced
//! into one read are reported as a single message. Use the
//! `length_prefixed` framing when that assumption does not hold.
//!
//! ## Encoding
//!
//! `encode` yields two segments: a zero-length header followed by the body.

pub mod message;

pub use message::PassthroughMessage;

/// Outbound message type.
pub type PassthroughRequest = PassthroughMessage;

/// Inbound message type.
pub type PassthroughResponse = PassthroughMessage;
