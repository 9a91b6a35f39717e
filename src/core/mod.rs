//! # Core Wire Components
//!
//! Header field blocks, their tokio codec, and response envelopes.
//!
//! ## Components
//! - **Header**: flat `name=value` map exchanged during negotiation
//! - **HeaderCodec**: tokio codec for the length-prefixed header block
//! - **ResponseEnvelope**: success flag, length and payload of one response
//!
//! ## Wire Format
//! ```text
//! Header:   [BlockLength(4)] ([FieldLength(4)] [name=value])*
//! Request:  [Length(4)] [Payload(N)]
//! Response: [Ok(1)] [Length(4)] [Payload(N)]
//! ```
//!
//! All integers are little-endian.

pub mod codec;
pub mod envelope;
pub mod header;

/// Largest request body accepted before the stream is presumed desynchronized.
pub const MAX_REQUEST_LEN: u32 = 1_000_000_000;
