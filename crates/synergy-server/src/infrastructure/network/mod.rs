//! Network infrastructure for the server.
//!
//! # Sub-modules
//!
//! - **`listener`** – Binds the TCP port and spawns one proxy per accepted
//!   connection until shutdown.
//!
//! - **`client_proxy`** – Runs one secondary's connection: the greeting and
//!   `QINF`/`DINF` exchange, a writer task fed by a bounded queue (with
//!   heartbeat), and the reader loop that forwards records to the router.
//!   [`ClientLinks`] is the router's view of every writer queue.

use std::net::SocketAddr;
use std::time::Duration;

use synergy_core::{FrameError, ProtocolError};
use thiserror::Error;

use crate::application::manage_clients::RegistryError;

pub mod client_proxy;
pub mod listener;

pub use client_proxy::{serve_client, ClientLinks, ProxySettings, HANDSHAKE_TIMEOUT};
pub use listener::{bind, run_listener};

/// Error type for server networking.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("client speaks protocol {major}.{minor}")]
    Incompatible { major: u16, minor: u16 },

    #[error("client rejected: {0}")]
    Rejected(#[from] RegistryError),

    #[error("expected {expected}, got {got}")]
    UnexpectedRecord { expected: &'static str, got: String },

    #[error("no record for {0:?}")]
    IdleTimeout(Duration),

    #[error("client reported a protocol violation")]
    PeerViolation,

    #[error("connection closed by client")]
    Closed,

    #[error("router is no longer running")]
    RouterGone,
}
