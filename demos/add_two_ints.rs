//! Example: Serving `add_two_ints`
//!
//! Advertises a service that sums two little-endian `i32` values and serves
//! it over TCP until CTRL+C. Configuration comes from `SERVICE_LINK_*`
//! environment variables, or from a TOML file given as the first argument.
//!
//! Run with: `cargo run --example add_two_ints -- [config.toml]`

use bytes::Bytes;
use service_link::config::LinkServerConfig;
use service_link::service::{Service, ServiceDirectory, ServiceType};
use service_link::transport::tcp;
use service_link::utils::logging::init_logging;
use std::sync::Arc;
use tracing::info;

fn add_two_ints(request: &[u8]) -> Option<Bytes> {
    let a = i32::from_le_bytes(request.get(0..4)?.try_into().ok()?);
    let b = i32::from_le_bytes(request.get(4..8)?.try_into().ok()?);
    if request.len() != 8 {
        return None;
    }
    Some(Bytes::copy_from_slice(&a.wrapping_add(b).to_le_bytes()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => LinkServerConfig::from_file(path)?,
        None => LinkServerConfig::from_env()?,
    };
    init_logging(&config.logging)?;

    let directory = Arc::new(ServiceDirectory::new());
    directory.advertise(Service::from_fn(
        "add_two_ints",
        ServiceType::new(
            "6a2e34150c00229791cc89ff309fff21",
            "rospy_tutorials/AddTwoIntsRequest",
            "rospy_tutorials/AddTwoIntsResponse",
        ),
        add_two_ints,
    ))?;
    info!(address = %config.server.address, services = ?directory.names(), "Serving");

    tcp::start_server(config, directory).await?;
    Ok(())
}
