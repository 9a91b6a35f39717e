//! # Service Link
//!
//! Server side of one service connection: validate the peer's handshake,
//! resolve the service it asks for, then serve requests one at a time until
//! either side goes away.
//!
//! ## Lifecycle
//! ```text
//! Uninitialized -> AwaitingHeader -> Negotiating -> AwaitingRequestLength
//!     ^                                                  |
//!     |     AwaitingWrite <- Processing <- AwaitingRequestBody
//!     |          |
//!     +----------+ (next request)          any state -> Closed
//! ```
//!
//! Every `.await` in [`ServiceLink::run`] races the channel's disconnect
//! token, so a drop at any suspension point ends the link without issuing
//! further I/O.
//!
//! ## Ownership
//! The link owns its channel and holds only a [`Weak`] reference to its
//! service. The service's link set holds a [`LinkHandle`], never the link.
//! Dropping a link runs [`ServiceLink::handle_disconnect`], so a task that
//! is aborted mid-request still leaves the link set.

mod negotiate;

pub use negotiate::{negotiate, Negotiated};

use crate::config::LinkServerConfig;
use crate::core::envelope::ResponseEnvelope;
use crate::core::header::Header;
use crate::core::MAX_REQUEST_LEN;
use crate::error::{constants, LinkError, Result};
use crate::service::handle::{LinkHandle, LinkId, Responder, ServiceHandle, ServiceLookup};
use crate::transport::channel::Channel;
use crate::utils::metrics::{Metrics, Timer};
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

const LENGTH_PREFIX_LEN: usize = 4;

/// Where a link is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Uninitialized,
    AwaitingHeader,
    Negotiating,
    AwaitingRequestLength,
    AwaitingRequestBody,
    Processing,
    AwaitingWrite,
    Closed,
}

/// Everything a link needs from its surroundings.
pub struct LinkContext {
    directory: Arc<dyn ServiceLookup>,
    node_name: String,
    max_request_len: u32,
    metrics: Arc<Metrics>,
}

impl LinkContext {
    pub fn new(directory: Arc<dyn ServiceLookup>, node_name: impl Into<String>) -> Self {
        Self {
            directory,
            node_name: node_name.into(),
            max_request_len: MAX_REQUEST_LEN,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn from_config(config: &LinkServerConfig, directory: Arc<dyn ServiceLookup>) -> Self {
        Self::new(directory, config.server.node_name.clone())
            .with_max_request_len(config.link.max_request_len)
    }

    pub fn with_max_request_len(mut self, max: u32) -> Self {
        self.max_request_len = max;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

pub struct ServiceLink<C: Channel> {
    id: LinkId,
    channel: C,
    ctx: Arc<LinkContext>,
    state: LinkState,
    shutdown: CancellationToken,
    service: Option<Weak<dyn ServiceHandle>>,
    registered: bool,
    callerid: Option<String>,
    requests_served: u64,
}

impl<C: Channel> ServiceLink<C> {
    pub fn new(channel: C, ctx: Arc<LinkContext>) -> Self {
        Self {
            id: LinkId::next(),
            channel,
            ctx,
            state: LinkState::Uninitialized,
            shutdown: CancellationToken::new(),
            service: None,
            registered: false,
            callerid: None,
            requests_served: 0,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served
    }

    /// Caller id the peer announced, once its header has been accepted.
    pub fn callerid(&self) -> Option<&str> {
        self.callerid.as_deref()
    }

    /// The negotiated service, if it still exists.
    pub fn service(&self) -> Option<Arc<dyn ServiceHandle>> {
        self.service.as_ref().and_then(Weak::upgrade)
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Drive the link until it closes.
    ///
    /// `Ok(())` means the connection ended normally: the peer hung up, the
    /// service was withdrawn, or a probe was answered. Every error has
    /// already been handled (peer notified or channel dropped) by the time
    /// it is returned.
    #[instrument(skip(self), fields(link_id = %self.id, peer = %self.channel.peer()))]
    pub async fn run(&mut self) -> Result<()> {
        if self.state == LinkState::Closed {
            return Err(LinkError::ConnectionClosed);
        }
        self.attach();
        let result = self.serve().await;
        match &result {
            Ok(()) => debug!(requests = self.requests_served, "Link finished"),
            Err(e) => debug!(error = %e, requests = self.requests_served, "Link terminated"),
        }
        self.handle_disconnect();
        result
    }

    /// Hook the link to its channel's disconnect notification.
    fn attach(&mut self) {
        if self.state != LinkState::Uninitialized {
            return;
        }
        self.shutdown = self.channel.disconnected().child_token();
        self.ctx.metrics.link_attached();
        self.transition(LinkState::AwaitingHeader);
    }

    /// Enter `Closed`: stop all I/O and leave the service's link set.
    ///
    /// Safe to call any number of times.
    pub fn handle_disconnect(&mut self) {
        if self.state == LinkState::Closed {
            return;
        }
        let was_attached = self.state != LinkState::Uninitialized;
        self.transition(LinkState::Closed);
        self.shutdown.cancel();

        if std::mem::take(&mut self.registered) {
            if let Some(service) = self.service() {
                service.remove_link(self.id);
                debug!(link_id = %self.id, service = %service.name(), "Link removed from service");
            }
        }
        self.service = None;

        if was_attached {
            self.ctx.metrics.link_closed();
        }
    }

    async fn serve(&mut self) -> Result<()> {
        let shutdown = self.shutdown.clone();

        let Some(block) = until_closed(&shutdown, self.channel.read_header()).await? else {
            return Ok(());
        };

        self.transition(LinkState::Negotiating);
        self.ctx.metrics.handshake_attempt();
        let negotiated = match Header::decode(&block)
            .and_then(|header| negotiate(&header, self.ctx.directory.as_ref(), &self.ctx.node_name))
        {
            Ok(negotiated) => negotiated,
            Err(e) => {
                error!(error = %e, "Refusing service connection");
                self.ctx.metrics.handshake_failed();
                let diagnostic = e.to_string();
                if let Err(write_err) =
                    until_closed(&shutdown, self.channel.send_header_error(&diagnostic)).await
                {
                    debug!(error = %write_err, "Could not deliver header error");
                }
                return Err(e);
            }
        };
        self.ctx.metrics.handshake_success();
        debug!(
            service = %negotiated.service.name(),
            callerid = %negotiated.callerid,
            probe = negotiated.probe,
            "Service connection accepted"
        );

        self.service = Some(Arc::downgrade(&negotiated.service));
        self.callerid = Some(negotiated.callerid.clone());
        if !negotiated.probe {
            negotiated.service.add_link(LinkHandle::new(
                self.id,
                negotiated.callerid.clone(),
                self.channel.peer(),
                self.shutdown.clone(),
            ));
            self.registered = true;
        }
        let probe = negotiated.probe;
        drop(negotiated.service);

        if until_closed(&shutdown, self.channel.write_header(&negotiated.reply))
            .await?
            .is_none()
        {
            return Ok(());
        }
        if probe {
            self.ctx.metrics.probe();
            return Ok(());
        }

        loop {
            self.transition(LinkState::AwaitingRequestLength);
            let Some(prefix) =
                until_closed(&shutdown, self.channel.read_exact(LENGTH_PREFIX_LEN)).await?
            else {
                return Ok(());
            };
            let len = length_prefix(&prefix)?;

            if len > self.ctx.max_request_len {
                error!(len, max = self.ctx.max_request_len, "{}", constants::ERR_FRAME_TOO_LARGE);
                self.ctx.metrics.frame_rejected();
                self.channel.force_close();
                return Err(LinkError::FrameTooLarge(len));
            }

            self.transition(LinkState::AwaitingRequestBody);
            let Some(request) = until_closed(&shutdown, self.channel.read_exact(len as usize)).await?
            else {
                return Ok(());
            };

            self.transition(LinkState::Processing);
            let rx = {
                let Some(service) = self.service() else {
                    if shutdown.is_cancelled() {
                        return Ok(());
                    }
                    return Err(self.service_lost());
                };
                self.ctx.metrics.request_received(request.len() as u64);
                trace!(len, service = %service.name(), "Dispatching request");
                let (responder, rx) = Responder::new(self.id);
                service.process_request(request, responder);
                rx
            };

            let response = {
                let _timer = Timer::start("service_request");
                let answer = until_closed(&shutdown, async move { Ok::<_, LinkError>(rx.await) }).await?;
                match answer {
                    None => return Ok(()),
                    Some(Ok(response)) => response,
                    Some(Err(_)) => {
                        warn!("Service dropped the request without answering");
                        ResponseEnvelope::Failure
                    }
                }
            };

            self.transition(LinkState::AwaitingWrite);
            let ok = response.is_success();
            let envelope = response.encode();
            let written = envelope.len() as u64;
            if until_closed(&shutdown, self.channel.write(envelope))
                .await?
                .is_none()
            {
                return Ok(());
            }
            self.ctx.metrics.response_sent(ok, written);
            self.requests_served += 1;
            debug!(len, ok, "Request served");
        }
    }

    /// The service vanished without withdrawing first, which would have
    /// closed this link. Links must never outlive that.
    fn service_lost(&self) -> LinkError {
        error!(link_id = %self.id, "{}", constants::ERR_SERVICE_LOST);
        if cfg!(debug_assertions) {
            panic!("{}", constants::ERR_SERVICE_LOST);
        }
        LinkError::InternalConsistencyViolation(constants::ERR_SERVICE_LOST.to_string())
    }

    fn transition(&mut self, next: LinkState) {
        trace!(link_id = %self.id, from = ?self.state, to = ?next, "Link state");
        self.state = next;
    }
}

impl<C: Channel> Drop for ServiceLink<C> {
    fn drop(&mut self) {
        self.handle_disconnect();
    }
}

fn length_prefix(prefix: &[u8]) -> Result<u32> {
    let bytes = <[u8; LENGTH_PREFIX_LEN]>::try_from(prefix).map_err(|_| {
        LinkError::InternalConsistencyViolation(format!(
            "channel returned {} bytes for a {LENGTH_PREFIX_LEN}-byte read",
            prefix.len()
        ))
    })?;
    Ok(u32::from_le_bytes(bytes))
}

/// Await `fut` unless the link is told to close first.
///
/// `Ok(None)` means the link is closing: either the close signal won and the
/// pending operation was dropped, or the peer hung up during it.
async fn until_closed<T, F>(shutdown: &CancellationToken, fut: F) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Ok(None),
        result = fut => match result {
            Ok(value) => Ok(Some(value)),
            Err(LinkError::ConnectionClosed) => Ok(None),
            Err(e) => Err(e),
        },
    }
}
