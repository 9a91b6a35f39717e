//! Tokio codec for the length-prefixed header block.
//!
//! ```text
//! [BlockLength(4, LE)] [Field block(N)]
//! ```

use crate::core::header::Header;
use crate::error::{LinkError, Result};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Default ceiling for a single header block (1 MiB)
pub const DEFAULT_MAX_HEADER_LEN: usize = 1024 * 1024;

const PREFIX_LEN: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct HeaderCodec {
    max_len: usize,
}

impl Default for HeaderCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADER_LEN)
    }
}

impl HeaderCodec {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// Validate a block length read from the wire.
    pub fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_len {
            return Err(LinkError::HeaderTooLarge(len));
        }
        Ok(())
    }
}

impl Decoder for HeaderCodec {
    type Item = Header;
    type Error = LinkError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Header>> {
        if src.len() < PREFIX_LEN {
            return Ok(None);
        }

        let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        self.check_len(len)?;

        if src.len() < PREFIX_LEN + len {
            src.reserve(PREFIX_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(PREFIX_LEN);
        let block = src.split_to(len);
        Header::decode(&block).map(Some)
    }
}

impl<'a> Encoder<&'a Header> for HeaderCodec {
    type Error = LinkError;

    fn encode(&mut self, header: &'a Header, dst: &mut BytesMut) -> Result<()> {
        let len = header.encoded_len();
        self.check_len(len)?;
        dst.reserve(PREFIX_LEN + len);
        dst.put_u32_le(len as u32);
        header.encode_into(dst);
        Ok(())
    }
}
