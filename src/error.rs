//! # Error Types
//!
//! Error handling for service links.
//!
//! Every error here is terminal for the link that raised it and for that link
//! only. Nothing propagates to other links or to the service directory.
//!
//! ## Error Categories
//! - **Handshake Errors**: malformed headers, unknown or withdrawn services,
//!   checksum mismatches. The peer is told why before the link closes.
//! - **Framing Errors**: oversized request frames. The stream is presumed
//!   corrupted and the channel is dropped without a diagnostic.
//! - **Invariant Errors**: the service disappeared while a request was in
//!   flight. This is a programming error and is escalated.
//! - **I/O Errors**: transport failures and disconnects.
//!
//! ## Example Usage
//! ```rust
//! use service_link::error::{LinkError, Result};
//!
//! fn require(field: Option<&str>) -> Result<&str> {
//!     field.ok_or_else(|| LinkError::MalformedHeader("missing md5sum".into()))
//! }
//!
//! assert!(require(None).unwrap_err().is_peer_visible());
//! ```

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Error message constants shared by log lines and peer diagnostics.
pub mod constants {
    /// Handshake validation
    pub const ERR_MISSING_FIELDS: &str =
        "bogus tcpros header. did not have the required elements: md5sum, service, callerid";
    pub const ERR_TRUNCATED_FIELD: &str = "header field overruns the header block";
    pub const ERR_FIELD_WITHOUT_SEPARATOR: &str = "header field has no '=' separator";
    pub const ERR_EMPTY_FIELD_NAME: &str = "header field has an empty name";
    pub const ERR_FIELD_NOT_UTF8: &str = "header field is not valid UTF-8";

    /// Framing
    pub const ERR_FRAME_TOO_LARGE: &str =
        "request length exceeds the sanity ceiling, assuming protocol synchronization is lost";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_TIMEOUT: &str = "Operation timed out";

    /// Invariants
    pub const ERR_SERVICE_LOST: &str =
        "service reference lost while a request was in flight on a registered link";
}

// LinkError is the primary error type for all link operations
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    #[serde(skip_serializing, skip_deserializing)]
    Io(#[from] io::Error),

    #[error("{0}")]
    MalformedHeader(String),

    #[error("Header block too large: {0} bytes")]
    HeaderTooLarge(usize),

    #[error("received a tcpros connection for a nonexistent service [{0}].")]
    ServiceNotFound(String),

    #[error("client wants service {service} to have md5sum {requested}, but it has {actual}. Dropping connection.")]
    ChecksumMismatch {
        service: String,
        requested: String,
        actual: String,
    },

    #[error("received a tcpros connection for a nonexistent service [{0}].")]
    ServiceWithdrawn(String),

    #[error("Request frame too large: {0} bytes")]
    FrameTooLarge(u32),

    #[error("Internal consistency violation: {0}")]
    InternalConsistencyViolation(String),

    #[error("Service already advertised: {0}")]
    DuplicateService(String),

    #[error("{}", constants::ERR_CONNECTION_CLOSED)]
    ConnectionClosed,

    #[error("{}", constants::ERR_TIMEOUT)]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LinkError {
    /// Whether this error is reported to the peer as a header error before
    /// the link closes.
    pub fn is_peer_visible(&self) -> bool {
        matches!(
            self,
            LinkError::MalformedHeader(_)
                | LinkError::ServiceNotFound(_)
                | LinkError::ChecksumMismatch { .. }
                | LinkError::ServiceWithdrawn(_)
        )
    }
}

/// Type alias for Results using LinkError
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_errors_are_peer_visible() {
        assert!(LinkError::MalformedHeader("x".into()).is_peer_visible());
        assert!(LinkError::ServiceNotFound("add".into()).is_peer_visible());
        assert!(LinkError::ServiceWithdrawn("add".into()).is_peer_visible());
        assert!(LinkError::ChecksumMismatch {
            service: "add".into(),
            requested: "a".into(),
            actual: "b".into(),
        }
        .is_peer_visible());
    }

    #[test]
    fn test_corruption_errors_are_silent() {
        assert!(!LinkError::FrameTooLarge(1_000_000_001).is_peer_visible());
        assert!(!LinkError::ConnectionClosed.is_peer_visible());
        assert!(!LinkError::InternalConsistencyViolation("x".into()).is_peer_visible());
    }

    #[test]
    fn test_transport_messages() {
        assert_eq!(LinkError::ConnectionClosed.to_string(), "Connection closed");
        assert_eq!(LinkError::Timeout.to_string(), "Operation timed out");
    }

    #[test]
    fn test_diagnostic_messages() {
        let err = LinkError::ServiceNotFound("add_two_ints".into());
        assert_eq!(
            err.to_string(),
            "received a tcpros connection for a nonexistent service [add_two_ints]."
        );

        let err = LinkError::ChecksumMismatch {
            service: "add_two_ints".into(),
            requested: "abc".into(),
            actual: "def".into(),
        };
        assert_eq!(
            err.to_string(),
            "client wants service add_two_ints to have md5sum abc, but it has def. Dropping connection."
        );
    }
}
