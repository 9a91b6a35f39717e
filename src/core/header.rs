//! Handshake header field block.
//!
//! A header is a flat string map. On the wire each field is a 4-byte
//! little-endian length followed by `name=value`:
//!
//! ```text
//! [len(4)] [name=value] [len(4)] [name=value] ...
//! ```
//!
//! The block itself carries no field count; decoding walks the block and
//! rejects any field whose declared length overruns it.

use crate::error::{constants, LinkError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

/// Field names used during service negotiation.
pub mod fields {
    pub const MD5SUM: &str = "md5sum";
    pub const SERVICE: &str = "service";
    pub const CALLERID: &str = "callerid";
    pub const PROBE: &str = "probe";
    pub const ERROR: &str = "error";
    pub const REQUEST_TYPE: &str = "request_type";
    pub const RESPONSE_TYPE: &str = "response_type";
    pub const TYPE: &str = "type";
}

/// Wildcard checksum that disables type checking on either side.
pub const WILDCARD_MD5SUM: &str = "*";

const FIELD_LEN_SIZE: usize = 4;

/// Handshake header: field name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    fields: BTreeMap<String, String>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build the `error=<message>` header sent to a peer that is being refused.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new().with(fields::ERROR, message)
    }

    /// Parse a header field block.
    pub fn decode(block: &[u8]) -> Result<Self> {
        let mut header = Header::new();
        let mut rest = block;

        while !rest.is_empty() {
            if rest.len() < FIELD_LEN_SIZE {
                return Err(LinkError::MalformedHeader(
                    constants::ERR_TRUNCATED_FIELD.to_string(),
                ));
            }
            let (len_bytes, tail) = rest.split_at(FIELD_LEN_SIZE);
            let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
                as usize;
            if len > tail.len() {
                return Err(LinkError::MalformedHeader(format!(
                    "{}: field claims {len} bytes, {} remain",
                    constants::ERR_TRUNCATED_FIELD,
                    tail.len()
                )));
            }
            let (field, tail) = tail.split_at(len);
            rest = tail;

            let field = std::str::from_utf8(field).map_err(|_| {
                LinkError::MalformedHeader(constants::ERR_FIELD_NOT_UTF8.to_string())
            })?;
            let (name, value) = field.split_once('=').ok_or_else(|| {
                LinkError::MalformedHeader(constants::ERR_FIELD_WITHOUT_SEPARATOR.to_string())
            })?;
            if name.is_empty() {
                return Err(LinkError::MalformedHeader(
                    constants::ERR_EMPTY_FIELD_NAME.to_string(),
                ));
            }
            header.insert(name, value);
        }

        Ok(header)
    }

    /// Length of the encoded field block.
    pub fn encoded_len(&self) -> usize {
        self.fields
            .iter()
            .map(|(k, v)| FIELD_LEN_SIZE + k.len() + 1 + v.len())
            .sum()
    }

    /// Serialize into `dst`, fields in name order.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());
        for (name, value) in &self.fields {
            dst.put_u32_le((name.len() + 1 + value.len()) as u32);
            dst.put_slice(name.as_bytes());
            dst.put_u8(b'=');
            dst.put_slice(value.as_bytes());
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

impl<K, V> FromIterator<(K, V)> for Header
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut header = Header::new();
        for (k, v) in iter {
            header.insert(k, v);
        }
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(text: &str) -> Vec<u8> {
        let mut out = (text.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(text.as_bytes());
        out
    }

    #[test]
    fn test_decode_fields() {
        let mut block = field("md5sum=abc");
        block.extend(field("service=add_two_ints"));
        block.extend(field("callerid=/peer1"));

        let header = Header::decode(&block).expect("valid block");
        assert_eq!(header.len(), 3);
        assert_eq!(header.get(fields::MD5SUM), Some("abc"));
        assert_eq!(header.get(fields::SERVICE), Some("add_two_ints"));
        assert_eq!(header.get(fields::CALLERID), Some("/peer1"));
    }

    #[test]
    fn test_value_may_contain_separator() {
        let header = Header::decode(&field("error=a=b")).unwrap();
        assert_eq!(header.get("error"), Some("a=b"));
    }

    #[test]
    fn test_empty_value_allowed() {
        let header = Header::decode(&field("callerid=")).unwrap();
        assert_eq!(header.get("callerid"), Some(""));
    }

    #[test]
    fn test_empty_block_is_empty_header() {
        assert!(Header::decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_length_prefix() {
        let mut block = field("md5sum=abc");
        block.extend_from_slice(&[3, 0]);
        assert!(matches!(
            Header::decode(&block),
            Err(LinkError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_field_overruns_block() {
        let mut block = (50u32).to_le_bytes().to_vec();
        block.extend_from_slice(b"md5sum=abc");
        assert!(matches!(
            Header::decode(&block),
            Err(LinkError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_missing_separator() {
        assert!(matches!(
            Header::decode(&field("md5sum")),
            Err(LinkError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_empty_name() {
        assert!(matches!(
            Header::decode(&field("=abc")),
            Err(LinkError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut block = (4u32).to_le_bytes().to_vec();
        block.extend_from_slice(&[b'a', b'=', 0xFF, 0xFE]);
        assert!(matches!(
            Header::decode(&block),
            Err(LinkError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_encode_is_sorted_and_stable() {
        let a = Header::new().with("b", "2").with("a", "1");
        let b = Header::new().with("a", "1").with("b", "2");
        assert_eq!(a.encode(), b.encode());

        let mut expected = field("a=1");
        expected.extend(field("b=2"));
        assert_eq!(a.encode().as_ref(), expected.as_slice());
        assert_eq!(a.encoded_len(), expected.len());
    }

    #[test]
    fn test_error_header() {
        let header = Header::error("nope");
        assert_eq!(header.len(), 1);
        assert_eq!(header.get(fields::ERROR), Some("nope"));
    }
}
