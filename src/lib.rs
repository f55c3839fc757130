//! passthrough: user-defined message framing over TCP.
//!
//! A message type implements the [`message::Message`] contract: it encodes
//! itself into an ordered list of byte segments and assembles itself from
//! received chunks. Two framings are provided:
//!
//! - [`protocols::PassthroughMessage`]: the bare payload, one message per read
//! - [`protocols::LengthPrefixedMessage`]: a `u32` big-endian length header
//!   followed by the payload
//!
//! Both plug into the async client task engine ([`task`]) and the mio echo
//! server ([`runtime`]) without either engine knowing the wire format.

pub mod config;
pub mod console;
pub mod message;
pub mod protocols;
pub mod runtime;
pub mod task;
