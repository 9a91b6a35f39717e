//! TCP accept loop.
//!
//! Every accepted connection gets a [`StreamChannel`] and a [`ServiceLink`]
//! running in its own task. Shutdown stops accepting, waits for links to
//! drain, then drops whatever is left.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::LinkServerConfig;
use crate::error::Result;
use crate::link::{LinkContext, ServiceLink};
use crate::service::handle::ServiceLookup;
use crate::transport::stream::StreamChannel;
use crate::utils::timeout::DRAIN_POLL_INTERVAL;

/// Serve `directory` on the configured address until CTRL+C.
#[instrument(skip(config, directory), fields(address = %config.server.address))]
pub async fn start_server(
    config: LinkServerConfig,
    directory: Arc<dyn ServiceLookup>,
) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    start_server_with_shutdown(config, directory, shutdown_rx).await
}

/// Serve `directory` on the configured address until `shutdown_rx` fires.
pub async fn start_server_with_shutdown(
    config: LinkServerConfig,
    directory: Arc<dyn ServiceLookup>,
    shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    config.validate_strict()?;
    let listener = TcpListener::bind(&config.server.address).await?;
    let ctx = Arc::new(LinkContext::from_config(&config, directory));
    serve(listener, &config, ctx, shutdown_rx).await
}

/// Run the accept loop on an already bound listener.
#[instrument(skip_all, fields(address = ?listener.local_addr().ok()))]
pub async fn serve(
    listener: TcpListener,
    config: &LinkServerConfig,
    ctx: Arc<LinkContext>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    info!(node = %ctx.node_name(), "Accepting service connections");

    let active_connections = Arc::new(Mutex::new(0usize));
    // Parent of every connection's disconnect token
    let server_token = CancellationToken::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("Shutting down server. Waiting for links to close...");
                drain(&active_connections, config).await;
                server_token.cancel();
                ctx.metrics().log_metrics();
                return Ok(());
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, addr)) => {
                        let mut count = active_connections.lock().await;
                        if *count >= config.server.max_connections {
                            warn!(peer = %addr, limit = config.server.max_connections, "Connection limit reached, refusing");
                            ctx.metrics().connection_error();
                            continue;
                        }
                        *count += 1;
                        drop(count);

                        spawn_link(stream, addr, config, ctx.clone(), &server_token, active_connections.clone());
                    }
                    Err(e) => {
                        error!(error = %e, "Error accepting connection");
                        ctx.metrics().connection_error();
                    }
                }
            }
        }
    }
}

fn spawn_link(
    stream: TcpStream,
    addr: SocketAddr,
    config: &LinkServerConfig,
    ctx: Arc<LinkContext>,
    server_token: &CancellationToken,
    active_connections: Arc<Mutex<usize>>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(peer = %addr, error = %e, "Could not disable Nagle");
    }
    let channel = StreamChannel::new(stream, addr.to_string())
        .with_max_header_len(config.link.max_header_len)
        .with_header_timeout(config.link.header_timeout)
        .with_parent_token(server_token);

    tokio::spawn(async move {
        debug!(peer = %addr, "Connection established");
        let mut link = ServiceLink::new(channel, ctx);
        if let Err(e) = link.run().await {
            if e.is_peer_visible() {
                debug!(peer = %addr, error = %e, "Connection refused");
            } else {
                warn!(peer = %addr, error = %e, "Link failed");
            }
        }
        drop(link);

        let mut count = active_connections.lock().await;
        *count -= 1;
        debug!(peer = %addr, "Connection closed");
    });
}

async fn drain(active_connections: &Mutex<usize>, config: &LinkServerConfig) {
    let timeout = tokio::time::sleep(config.server.shutdown_timeout);
    tokio::pin!(timeout);

    loop {
        let connections = *active_connections.lock().await;
        if connections == 0 {
            info!("All links closed, shutting down");
            return;
        }
        tokio::select! {
            _ = &mut timeout => {
                warn!(connections, "Shutdown timeout reached, dropping remaining links");
                return;
            }
            _ = tokio::time::sleep(DRAIN_POLL_INTERVAL) => {
                info!(connections, "Waiting for links to close");
            }
        }
    }
}
