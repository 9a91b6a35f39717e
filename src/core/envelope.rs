//! Response envelope framing.
//!
//! ```text
//! [Ok(1)] [Length(4, LE)] [Payload(Length)]
//! ```
//!
//! A failure is always exactly `[0, 0, 0, 0, 0]`: the length field is
//! zero-filled and no payload follows.

use crate::error::{LinkError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Size of the flag byte plus length field
pub const ENVELOPE_HEADER_LEN: usize = 5;

/// Wire form of a failed response
pub const FAILURE_ENVELOPE: [u8; ENVELOPE_HEADER_LEN] = [0; ENVELOPE_HEADER_LEN];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseEnvelope {
    Success(Bytes),
    Failure,
}

impl ResponseEnvelope {
    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success(_))
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            ResponseEnvelope::Success(payload) => ENVELOPE_HEADER_LEN + payload.len(),
            ResponseEnvelope::Failure => ENVELOPE_HEADER_LEN,
        }
    }

    /// Serialize into a single buffer ready for one channel write.
    pub fn encode(&self) -> Bytes {
        match self {
            ResponseEnvelope::Success(payload) => {
                let mut buf = BytesMut::with_capacity(self.encoded_len());
                buf.put_u8(1);
                buf.put_u32_le(payload.len() as u32);
                buf.put_slice(payload);
                buf.freeze()
            }
            ResponseEnvelope::Failure => Bytes::from_static(&FAILURE_ENVELOPE),
        }
    }

    /// Parse a complete envelope, as a calling peer would.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < ENVELOPE_HEADER_LEN {
            return Err(LinkError::MalformedHeader(format!(
                "response envelope needs {ENVELOPE_HEADER_LEN} bytes, got {}",
                buf.len()
            )));
        }
        let len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        let payload = &buf[ENVELOPE_HEADER_LEN..];

        match buf[0] {
            0 if len == 0 && payload.is_empty() => Ok(ResponseEnvelope::Failure),
            1 if payload.len() == len => {
                Ok(ResponseEnvelope::Success(Bytes::copy_from_slice(payload)))
            }
            flag => Err(LinkError::MalformedHeader(format!(
                "inconsistent response envelope: flag {flag}, length {len}, {} payload bytes",
                payload.len()
            ))),
        }
    }
}
