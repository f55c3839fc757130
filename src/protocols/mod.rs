//! Wire formats implementing the message contract.
//!
//! - `passthrough`: bare payload, boundary inferred from read size
//!   (whole-chunk ingestion)
//! - `length_prefixed`: `u32` length header plus payload
//!   (partial-consumption ingestion)

pub mod length_prefixed;
pub mod passthrough;

pub use length_prefixed::LengthPrefixedMessage;
pub use passthrough::PassthroughMessage;
