//! Byte-stream abstraction a service link runs over.
//!
//! A channel serves exactly one link. The link never issues more than one
//! read and one write at a time, so implementations need no internal queueing.

use crate::core::header::Header;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Channel: Send {
    /// Wait for the peer's handshake header block and return it undecoded.
    async fn read_header(&mut self) -> Result<Bytes>;

    /// Read exactly `len` bytes.
    async fn read_exact(&mut self, len: usize) -> Result<Bytes>;

    /// Write the whole buffer.
    async fn write(&mut self, buf: Bytes) -> Result<()>;

    /// Write a handshake header.
    async fn write_header(&mut self, header: &Header) -> Result<()>;

    /// Tell the peer why it is being refused.
    async fn send_header_error(&mut self, message: &str) -> Result<()> {
        self.write_header(&Header::error(message)).await
    }

    /// Drop the connection immediately, without a diagnostic.
    fn force_close(&mut self);

    /// Token cancelled when the connection drops, from either side.
    fn disconnected(&self) -> CancellationToken;

    /// Printable peer address for logs.
    fn peer(&self) -> String;
}
