//! Length-prefixed framing.
//!
//! Every message carries its own length, so boundaries survive any read
//! granularity:
//!
//! ```text
//! Request:  <u32 big-endian length><data of exactly length bytes>
//! Response: <u32 big-endian length><data of exactly length bytes>
//!
//! Example:
//! Request:  00 00 00 05 "hello"
//! Response: 00 00 00 05 "hello"
//! ```
//!
//! The receiver uses partial-consumption ingestion: header and body may be
//! split across reads, and several messages may share one read.

pub mod message;

pub use message::{LengthPrefixedMessage, HEADER_SIZE};
