//! Concrete service: type contract, request handler and link set.

use crate::core::envelope::ResponseEnvelope;
use crate::service::handle::{LinkHandle, LinkId, Responder, ServiceHandle};
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Future returned by a request handler. `None` is a processing failure.
pub type HandlerFuture = BoxFuture<'static, Option<Bytes>>;

type HandlerFn = dyn Fn(Bytes) -> HandlerFuture + Send + Sync + 'static;

/// Request/response type contract a service advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceType {
    pub md5sum: String,
    pub request_type: String,
    pub response_type: String,
}

impl ServiceType {
    pub fn new(
        md5sum: impl Into<String>,
        request_type: impl Into<String>,
        response_type: impl Into<String>,
    ) -> Self {
        Self {
            md5sum: md5sum.into(),
            request_type: request_type.into(),
            response_type: response_type.into(),
        }
    }
}

pub struct Service {
    name: String,
    service_type: ServiceType,
    handler: Box<HandlerFn>,
    withdrawn: AtomicBool,
    links: Mutex<HashMap<LinkId, LinkHandle>>,
}

impl Service {
    /// Service with an async handler.
    pub fn new<F, Fut>(name: impl Into<String>, service_type: ServiceType, handler: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<Bytes>> + Send + 'static,
    {
        Self {
            name: name.into(),
            service_type,
            handler: Box::new(move |request| handler(request).boxed()),
            withdrawn: AtomicBool::new(false),
            links: Mutex::new(HashMap::new()),
        }
    }

    /// Service with a synchronous handler.
    pub fn from_fn<F>(name: impl Into<String>, service_type: ServiceType, handler: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Bytes> + Send + Sync + 'static,
    {
        Self::new(name, service_type, move |request: Bytes| {
            let response = handler(&request);
            async move { response }
        })
    }

    pub fn service_type(&self) -> &ServiceType {
        &self.service_type
    }

    /// Snapshot of the currently attached links.
    pub fn links(&self) -> Vec<LinkHandle> {
        let mut links: Vec<_> = self.lock_links().values().cloned().collect();
        links.sort_by_key(LinkHandle::id);
        links
    }

    pub fn link_count(&self) -> usize {
        self.lock_links().len()
    }

    /// Mark withdrawn, empty the link set and ask every drained link to close.
    ///
    /// Returns the number of links that were attached.
    pub fn withdraw(&self) -> usize {
        let drained: Vec<LinkHandle> = {
            let mut links = self.lock_links();
            self.withdrawn.store(true, Ordering::SeqCst);
            links.drain().map(|(_, link)| link).collect()
        };
        for link in &drained {
            debug!(service = %self.name, link_id = %link.id(), "Closing link of withdrawn service");
            link.close();
        }
        drained.len()
    }

    // The set is only ever mutated by single insert/remove/drain calls,
    // so a poisoned guard still holds a consistent map.
    fn lock_links(&self) -> MutexGuard<'_, HashMap<LinkId, LinkHandle>> {
        self.links.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("service_type", &self.service_type)
            .field("withdrawn", &self.is_withdrawn())
            .field("links", &self.link_count())
            .finish()
    }
}

impl ServiceHandle for Service {
    fn name(&self) -> &str {
        &self.name
    }

    fn md5sum(&self) -> &str {
        &self.service_type.md5sum
    }

    fn request_type(&self) -> &str {
        &self.service_type.request_type
    }

    fn response_type(&self) -> &str {
        &self.service_type.response_type
    }

    fn is_withdrawn(&self) -> bool {
        self.withdrawn.load(Ordering::SeqCst)
    }

    fn add_link(&self, link: LinkHandle) {
        // The flag only flips while the set is locked, so checking it under
        // the same lock means withdraw() either drains this link or it is
        // never inserted.
        let mut links = self.lock_links();
        if self.is_withdrawn() {
            drop(links);
            link.close();
            return;
        }
        links.insert(link.id(), link);
    }

    fn remove_link(&self, id: LinkId) -> bool {
        self.lock_links().remove(&id).is_some()
    }

    fn process_request(&self, request: Bytes, responder: Responder) {
        let service = self.name.clone();
        let pending = (self.handler)(request);
        tokio::spawn(async move {
            let response = match pending.await {
                Some(payload) => ResponseEnvelope::Success(payload),
                None => ResponseEnvelope::Failure,
            };
            let link = responder.link();
            if !responder.respond(response) {
                warn!(%service, link_id = %link, "Link closed before its response was ready");
            }
        });
    }
}
