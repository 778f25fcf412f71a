//! TCP listener for controller-to-controller requests.
//!
//! Handles graceful shutdown on SIGINT: stops accepting new connections
//! and returns so `main` can save federation state. Open sibling
//! connections are persistent, so they are not drained.

use std::net::SocketAddr;
use std::sync::Arc;

use fedmgr_federation::{serve_connection, ControllerSecret, RequestHandler};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Binds to `addr` and answers controller requests until ctrl-c.
///
/// Limits concurrent connections to `max_connections`; excess peers are
/// dropped immediately and retry on their next health check.
pub async fn run(
    addr: SocketAddr,
    handler: Arc<dyn RequestHandler>,
    secret: Option<Arc<ControllerSecret>>,
    max_connections: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(addr).await?;
    let semaphore = Arc::new(Semaphore::new(max_connections));

    info!("listening on {addr} (max {max_connections} connections)");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }

            result = listener.accept() => {
                let (stream, peer) = result?;

                let permit = match Arc::clone(&semaphore).try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        warn!("connection limit reached, dropping connection from {peer}");
                        drop(stream);
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("failed to set TCP_NODELAY for {peer}: {e}");
                }

                let handler = Arc::clone(&handler);
                let secret = secret.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, handler, secret).await {
                        warn!("controller connection from {peer} failed: {e}");
                    }
                    drop(permit);
                });
            }
        }
    }

    Ok(())
}
