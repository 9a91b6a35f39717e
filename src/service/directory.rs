//! Registry of advertised services.
//!
//! Each server owns its own directory and hands it to links through
//! [`LinkContext`](crate::link::LinkContext); there is no process-wide one.

use crate::error::{LinkError, Result};
use crate::service::handle::{ServiceHandle, ServiceLookup};
use crate::service::server::Service;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

#[derive(Debug, Default)]
pub struct ServiceDirectory {
    services: RwLock<HashMap<String, Arc<Service>>>,
}

impl ServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a service reachable by name.
    pub fn advertise(&self, service: Service) -> Result<Arc<Service>> {
        let name = service.name().to_string();
        let mut services = self.write();
        if services.contains_key(&name) {
            return Err(LinkError::DuplicateService(name));
        }
        let service = Arc::new(service);
        services.insert(name.clone(), Arc::clone(&service));
        info!(service = %name, md5sum = %service.md5sum(), "Service advertised");
        Ok(service)
    }

    /// Remove a service and close every link attached to it.
    ///
    /// The links are drained while the directory is still write-locked, so a
    /// concurrent handshake either misses the service in `lookup` or sees it
    /// withdrawn.
    pub fn withdraw(&self, name: &str) -> bool {
        let mut services = self.write();
        match services.remove(name) {
            Some(service) => {
                let closed = service.withdraw();
                info!(service = %name, links_closed = closed, "Service withdrawn");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Service>> {
        self.read().get(name).cloned()
    }

    /// Advertised service names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Writers only insert or remove whole entries, so a poisoned lock still
    // guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<Service>>> {
        self.services.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<Service>>> {
        self.services.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ServiceLookup for ServiceDirectory {
    fn lookup(&self, name: &str) -> Option<Arc<dyn ServiceHandle>> {
        self.get(name).map(|service| service as Arc<dyn ServiceHandle>)
    }
}
