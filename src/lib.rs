//! # service-link
//!
//! Server side of a TCPROS-style service connection.
//!
//! A peer connects, sends a header naming the service it wants and the
//! checksum it expects, and then issues length-prefixed requests one at a
//! time. Each request is handed to the locally advertised service and its
//! answer is written back in a response envelope before the next request is
//! read.
//!
//! ## Quick start
//! ```rust,no_run
//! use service_link::config::LinkServerConfig;
//! use service_link::service::{Service, ServiceDirectory, ServiceType};
//! use service_link::transport::tcp;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! # async fn run() -> service_link::Result<()> {
//! let directory = Arc::new(ServiceDirectory::new());
//! directory.advertise(Service::from_fn(
//!     "echo",
//!     ServiceType::new("*", "EchoRequest", "EchoResponse"),
//!     |request| Some(Bytes::copy_from_slice(request)),
//! ))?;
//!
//! tcp::start_server(LinkServerConfig::default(), directory).await
//! # }
//! ```
//!
//! ## Modules
//! - [`core`]: header blocks, their codec, response envelopes
//! - [`link`]: the per-connection state machine
//! - [`service`]: services, their link sets, and the directory
//! - [`transport`]: channels and the TCP accept loop
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging and metrics

pub mod config;
pub mod core;
pub mod error;
pub mod link;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::LinkServerConfig;
pub use error::{LinkError, Result};
pub use link::{LinkContext, LinkState, ServiceLink};
pub use service::{Service, ServiceDirectory, ServiceType};
