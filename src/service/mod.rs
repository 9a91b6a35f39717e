//! # Services
//!
//! What a link calls into: the collaborator traits, a concrete service with
//! its link set, and the directory that resolves service names.

pub mod directory;
pub mod handle;
pub mod server;

pub use directory::ServiceDirectory;
pub use handle::{LinkHandle, LinkId, Responder, ServiceHandle, ServiceLookup};
pub use server::{HandlerFuture, Service, ServiceType};
