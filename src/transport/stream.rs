//! [`Channel`] over any async byte stream.
//!
//! Works the same for TCP, Unix sockets and `tokio::io::duplex` pipes. Any
//! I/O failure or EOF marks the channel disconnected.

use crate::core::codec::HeaderCodec;
use crate::core::header::Header;
use crate::error::{LinkError, Result};
use crate::transport::channel::Channel;
use crate::utils::timeout::{with_timeout_error, HEADER_TIMEOUT};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

pub struct StreamChannel<S> {
    stream: S,
    peer: String,
    codec: HeaderCodec,
    header_timeout: Duration,
    disconnected: CancellationToken,
}

impl<S> StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self {
            stream,
            peer: peer.into(),
            codec: HeaderCodec::default(),
            header_timeout: HEADER_TIMEOUT,
            disconnected: CancellationToken::new(),
        }
    }

    pub fn with_max_header_len(mut self, max_len: usize) -> Self {
        self.codec = HeaderCodec::new(max_len);
        self
    }

    pub fn with_header_timeout(mut self, timeout: Duration) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// Tie this channel to a parent token, e.g. a server-wide shutdown.
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.disconnected = parent.child_token();
        self
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disconnected.is_cancelled() {
            return Err(LinkError::ConnectionClosed);
        }
        Ok(())
    }

    fn dropped(&self, err: io::Error) -> LinkError {
        self.disconnected.cancel();
        match err.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => {
                debug!(peer = %self.peer, "Peer disconnected");
                LinkError::ConnectionClosed
            }
            _ => LinkError::Io(err),
        }
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(len);
        self.stream
            .read_exact(&mut buf)
            .await
            .map_err(|e| self.dropped(e))?;
        trace!(peer = %self.peer, len, "Read");
        Ok(buf.freeze())
    }

    async fn read_header_block(&mut self) -> Result<Bytes> {
        let mut prefix = [0u8; 4];
        self.stream
            .read_exact(&mut prefix)
            .await
            .map_err(|e| self.dropped(e))?;
        let len = u32::from_le_bytes(prefix) as usize;
        self.codec.check_len(len)?;
        self.read_bytes(len).await
    }
}

#[async_trait]
impl<S> Channel for StreamChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_header(&mut self) -> Result<Bytes> {
        self.ensure_open()?;
        let timeout = self.header_timeout;
        let result = with_timeout_error(self.read_header_block(), timeout).await;
        if result.is_err() {
            self.disconnected.cancel();
        }
        result
    }

    async fn read_exact(&mut self, len: usize) -> Result<Bytes> {
        self.ensure_open()?;
        self.read_bytes(len).await
    }

    async fn write(&mut self, buf: Bytes) -> Result<()> {
        self.ensure_open()?;
        self.stream
            .write_all(&buf)
            .await
            .map_err(|e| self.dropped(e))?;
        self.stream.flush().await.map_err(|e| self.dropped(e))?;
        trace!(peer = %self.peer, len = buf.len(), "Wrote");
        Ok(())
    }

    async fn write_header(&mut self, header: &Header) -> Result<()> {
        let mut buf = BytesMut::new();
        self.codec.encode(header, &mut buf)?;
        self.write(buf.freeze()).await
    }

    fn force_close(&mut self) {
        debug!(peer = %self.peer, "Forcing channel closed");
        self.disconnected.cancel();
    }

    fn disconnected(&self) -> CancellationToken {
        self.disconnected.clone()
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}
