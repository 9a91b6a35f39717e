//! Seams between a link and the services it calls.
//!
//! A link only ever sees a service through [`ServiceHandle`], and finds one
//! through [`ServiceLookup`]. Both are object-safe so tests can substitute
//! stubs for the concrete [`Service`](super::Service) and
//! [`ServiceDirectory`](super::ServiceDirectory).

use crate::core::envelope::ResponseEnvelope;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

static NEXT_LINK_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one link, used as its key in a service's link set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    /// Allocate a process-unique id.
    pub fn next() -> Self {
        LinkId(NEXT_LINK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Entry a link leaves in its service's link set.
///
/// Holds no reference to the link itself; the service can only ask the link
/// to close through the embedded token.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    id: LinkId,
    callerid: String,
    peer: String,
    close: CancellationToken,
}

impl LinkHandle {
    pub fn new(
        id: LinkId,
        callerid: impl Into<String>,
        peer: impl Into<String>,
        close: CancellationToken,
    ) -> Self {
        Self {
            id,
            callerid: callerid.into(),
            peer: peer.into(),
            close,
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn callerid(&self) -> &str {
        &self.callerid
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Ask the link to close at its next suspension point.
    pub fn close(&self) {
        self.close.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }
}

/// One-shot response path from a service back to the requesting link.
///
/// Consuming `respond` makes a second answer impossible. Dropping the
/// responder unanswered makes the link reply with a failure envelope.
#[derive(Debug)]
pub struct Responder {
    link: LinkId,
    tx: oneshot::Sender<ResponseEnvelope>,
}

impl Responder {
    pub fn new(link: LinkId) -> (Self, oneshot::Receiver<ResponseEnvelope>) {
        let (tx, rx) = oneshot::channel();
        (Self { link, tx }, rx)
    }

    /// Link the response is routed to.
    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Deliver the response. Returns `false` if the link has already closed.
    pub fn respond(self, response: ResponseEnvelope) -> bool {
        self.tx.send(response).is_ok()
    }

    pub fn success(self, payload: impl Into<Bytes>) -> bool {
        self.respond(ResponseEnvelope::Success(payload.into()))
    }

    pub fn failure(self) -> bool {
        self.respond(ResponseEnvelope::Failure)
    }
}

/// A locally registered service as seen by its links.
pub trait ServiceHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Checksum of the request/response type contract, `"*"` for any.
    fn md5sum(&self) -> &str;

    fn request_type(&self) -> &str;

    fn response_type(&self) -> &str;

    fn is_withdrawn(&self) -> bool;

    fn add_link(&self, link: LinkHandle);

    /// Remove a link from the set. Returns `false` if it was not present.
    fn remove_link(&self, id: LinkId) -> bool;

    /// Start processing one request. The answer goes through `responder`,
    /// which knows the requesting link.
    fn process_request(&self, request: Bytes, responder: Responder);
}

/// Resolves service names for incoming handshakes.
pub trait ServiceLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ServiceHandle>>;
}
