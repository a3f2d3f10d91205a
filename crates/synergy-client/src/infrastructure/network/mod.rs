//! Connecting to the server and reconnecting when a session ends.

pub mod session;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::application::secondary_screen::{ScreenEvent, SecondaryScreen};
use session::{shutdown_requested, ClientSession, SessionError, SessionSettings};

/// Port used when the server address names none.
pub const DEFAULT_PORT: u16 = 24800;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("invalid server address {0:?}")]
    Address(String),

    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone)]
pub struct ClientConnectionConfig {
    /// `HOST`, `HOST:PORT`, `IP` or `IP:PORT`.
    pub server: String,
    pub connect_timeout: Duration,
    pub reconnect_interval: Duration,
}

impl Default for ClientConnectionConfig {
    fn default() -> Self {
        Self {
            server: format!("127.0.0.1:{DEFAULT_PORT}"),
            connect_timeout: Duration::from_secs(10),
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

/// Normalises a server address to `host:port`, adding [`DEFAULT_PORT`]
/// when none is given.
///
/// # Errors
///
/// [`NetworkError::Address`] for an empty string or an unbracketed IPv6
/// address with a trailing port-like suffix that does not parse.
pub fn server_address(server: &str) -> Result<String, NetworkError> {
    let server = server.trim();
    if server.is_empty() {
        return Err(NetworkError::Address(server.to_string()));
    }
    if let Ok(addr) = server.parse::<SocketAddr>() {
        return Ok(addr.to_string());
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT).to_string());
    }
    match server.rsplit_once(':') {
        None => Ok(format!("{server}:{DEFAULT_PORT}")),
        Some((host, port))
            if !host.is_empty() && !host.contains(':') && port.parse::<u16>().is_ok() =>
        {
            Ok(server.to_string())
        }
        Some(_) => Err(NetworkError::Address(server.to_string())),
    }
}

/// Opens a TCP connection with Nagle disabled.
pub async fn connect(addr: &str, timeout: Duration) -> Result<TcpStream, NetworkError> {
    let stream = time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| NetworkError::ConnectTimeout {
            addr: addr.to_string(),
            timeout,
        })?
        .map_err(|source| NetworkError::ConnectFailed {
            addr: addr.to_string(),
            source,
        })?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not disable Nagle on {addr}: {e}");
    }
    Ok(stream)
}

/// Connects, runs a session, and repeats until shutdown.
///
/// A failed connection attempt or a session that ends for a transient
/// reason waits `reconnect_interval` and tries again.  A session that ends
/// for a reason retrying cannot fix (unknown screen name, name in use,
/// incompatible version) stops the loop.
///
/// # Errors
///
/// [`NetworkError::Address`] for an unusable address and
/// [`NetworkError::Session`] for a fatal session error.
pub async fn run_client(
    config: ClientConnectionConfig,
    screen: Arc<dyn SecondaryScreen>,
    mut upstream: mpsc::UnboundedReceiver<ScreenEvent>,
    settings: SessionSettings,
    shutdown: watch::Receiver<bool>,
) -> Result<(), NetworkError> {
    let addr = server_address(&config.server)?;
    loop {
        let attempt = tokio::select! {
            attempt = connect(&addr, config.connect_timeout) => attempt,
            _ = shutdown_requested(shutdown.clone()) => return Ok(()),
        };
        match attempt {
            Ok(stream) => {
                info!("connected to {addr}");
                let mut session = ClientSession::new(Arc::clone(&screen), settings.clone());
                match session.run(stream, &mut upstream, shutdown.clone()).await {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        error!("giving up on {addr}: {e}");
                        return Err(e.into());
                    }
                    Err(e) => warn!("session with {addr} ended: {e}"),
                }
            }
            Err(e) => warn!("{e}"),
        }

        if *shutdown.borrow() {
            return Ok(());
        }
        info!("reconnecting in {:?}", config.reconnect_interval);
        tokio::select! {
            _ = time::sleep(config.reconnect_interval) => {}
            _ = shutdown_requested(shutdown.clone()) => return Ok(()),
        }
    }
}
