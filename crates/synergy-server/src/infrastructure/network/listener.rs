//! TCP accept loop for secondary screens.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use super::client_proxy::{serve_client, ClientLinks, ProxySettings};
use super::NetworkError;
use crate::application::route_input::RouterEvent;

/// Binds the listening socket.
///
/// # Errors
///
/// Returns [`NetworkError::BindFailed`] if the address is in use or not
/// permitted.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, NetworkError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| NetworkError::BindFailed { addr, source })?;
    info!("listening for screens on {}", listener.local_addr().unwrap_or(addr));
    Ok(listener)
}

/// Accepts connections until `shutdown` becomes `true`, running each one in
/// its own task.
pub async fn run_listener(
    listener: TcpListener,
    router: mpsc::Sender<RouterEvent>,
    links: ClientLinks,
    settings: ProxySettings,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("connection from {peer}");
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("set_nodelay on {peer} failed: {e}");
                    }
                    let router = router.clone();
                    let links = links.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) =
                            serve_client(stream, peer.to_string(), router, links, settings, shutdown).await
                        {
                            debug!("session from {peer} ended: {e}");
                        }
                    });
                }
                // Transient (e.g. too many open files); keep accepting.
                Err(e) => error!("accept error: {e}"),
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("listener stopped");
                    break;
                }
            }
        }
    }
}
