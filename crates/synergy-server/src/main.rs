//! Synergy server (`synergys`) entry point.
//!
//! Wires the primary screen, the router task, the client listener and the
//! optional admin page together, then waits for Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load synergys.toml, build the screen graph
//!  └─ start services
//!       ├─ primary screen       (headless, or X11 thread with `--features x11`)
//!       ├─ Router               (Tokio task, owns all routing state)
//!       ├─ client listener      (one proxy task pair per connection)
//!       └─ admin page           (when [http] enabled)
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 configuration error, 2 a port could not be
//! bound, 3 any other fatal error.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use synergy_server::application::route_input::{Router, RouterEvent, RouterSettings};
use synergy_server::application::update_layout::{build_screen_graph, UpdateLayoutError};
use synergy_server::infrastructure::network::{self, ClientLinks, NetworkError, ProxySettings};
use synergy_server::infrastructure::primary_screen::headless::HeadlessPrimary;
use synergy_server::infrastructure::primary_screen::{PrimaryEvent, PrimaryScreen};
use synergy_server::infrastructure::storage::config::{load_config, ConfigError, ServerConfig};
use synergy_server::infrastructure::http;

/// How long tasks get to wind down after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Parser)]
#[command(name = "synergys", version, about = "Share this machine's keyboard and mouse with other screens")]
struct Cli {
    /// Path to synergys.toml.
    #[arg(long, env = "SYNERGY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, `IP` or `IP:PORT`.
    #[arg(long, env = "SYNERGY_ADDRESS")]
    address: Option<String>,

    /// Name of this (the primary) screen.
    #[arg(long, env = "SYNERGY_NAME")]
    name: Option<String>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, env = "SYNERGY_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Debug, Error)]
enum StartupError {
    #[error("invalid listen address {0:?}")]
    Address(String),

    #[error("router stopped unexpectedly")]
    RouterStopped,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging needs the configured level, so the config is read first and
    // its error (if any) reported once the subscriber exists.
    let config = load_config(cli.config.as_deref());
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.server.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };
    match result {
        Ok(()) => {
            info!("synergys stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// Maps the root cause of a failure to the process exit code.
fn exit_code(error: &anyhow::Error) -> u8 {
    for cause in error.chain() {
        if cause.is::<ConfigError>() || cause.is::<UpdateLayoutError>() {
            return 1;
        }
        if matches!(cause.downcast_ref::<StartupError>(), Some(StartupError::Address(_))) {
            return 1;
        }
        if matches!(cause.downcast_ref::<NetworkError>(), Some(NetworkError::BindFailed { .. })) {
            return 2;
        }
    }
    3
}

async fn run(cli: Cli, mut config: ServerConfig) -> anyhow::Result<()> {
    if let Some(name) = &cli.name {
        config.set_primary_name(name);
    }
    let graph = build_screen_graph(&config.server.name, &config.screen_names(), &config.screen_links())?;
    let listen = listen_addr(
        cli.address.as_deref().unwrap_or(&config.network.bind_address),
        config.network.port,
    )?;
    info!(
        "synergys starting as {:?} with {} screen(s)",
        config.server.name,
        graph.screens().count()
    );

    let running = Arc::new(AtomicBool::new(true));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (router_tx, router_rx) = mpsc::channel::<RouterEvent>(1024);

    // ── Primary screen ────────────────────────────────────────────────────────
    let (primary, mut primary_events) = start_primary(&config, Arc::clone(&running));
    let forward_tx = router_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = primary_events.recv().await {
            if forward_tx.send(RouterEvent::Primary(event)).await.is_err() {
                break;
            }
        }
    });

    // ── Router ────────────────────────────────────────────────────────────────
    let links = ClientLinks::new();
    let settings = RouterSettings {
        switch_zone: config.server.switch_zone,
        options: config
            .screen_names()
            .into_iter()
            .map(|name| {
                let options = config.screen_options(&name);
                (name, options)
            })
            .collect::<HashMap<_, _>>(),
    };
    let router = Router::new(graph, settings, primary, Arc::new(links.clone()));
    let mut router_task = tokio::spawn(router.run(router_rx, shutdown_rx.clone()));

    // ── Listeners ─────────────────────────────────────────────────────────────
    let listener = network::bind(listen).await?;
    let proxy = ProxySettings {
        heartbeat: config.heartbeat(),
        ..ProxySettings::default()
    };
    let listener_task = tokio::spawn(network::run_listener(
        listener,
        router_tx.clone(),
        links,
        proxy,
        shutdown_rx.clone(),
    ));

    let http_task = if config.http.enabled {
        let addr = listen_addr(&config.http.bind_address, config.http.port)?;
        let listener = http::bind(addr).await?;
        Some(tokio::spawn(http::run_http(listener, router_tx.clone(), shutdown_rx.clone())))
    } else {
        None
    };
    drop(router_tx);

    info!("synergys ready.  Press Ctrl-C to exit.");

    // ── Wait for Ctrl-C or a dead router ──────────────────────────────────────
    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("cannot listen for Ctrl-C: {e}");
            }
            info!("shutdown signal received");
            Ok(())
        }
        _ = &mut router_task => Err(StartupError::RouterStopped),
    };

    running.store(false, Ordering::Relaxed);
    let _ = shutdown_tx.send(true);
    let wind_down = async {
        let _ = listener_task.await;
        if let Some(task) = http_task {
            let _ = task.await;
        }
        if !router_task.is_finished() {
            let _ = router_task.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, wind_down).await.is_err() {
        warn!("tasks did not stop within {SHUTDOWN_GRACE:?}");
    }

    outcome.map_err(Into::into)
}

/// Accepts `IP:PORT` or a bare `IP` that takes `default_port`.
fn listen_addr(address: &str, default_port: u16) -> Result<SocketAddr, StartupError> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    address
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, default_port))
        .map_err(|_| StartupError::Address(address.to_string()))
}

/// Starts the primary screen backend and returns its event stream.
fn start_primary(
    config: &ServerConfig,
    running: Arc<AtomicBool>,
) -> (Arc<dyn PrimaryScreen>, mpsc::Receiver<PrimaryEvent>) {
    #[cfg(all(feature = "x11", target_os = "linux"))]
    {
        use synergy_server::infrastructure::primary_screen::x11::X11Primary;

        let (tx, rx) = mpsc::channel(256);
        match X11Primary::spawn(tx, Arc::clone(&running)) {
            Ok((screen, _thread)) => {
                info!("using the X11 primary screen");
                return (Arc::new(screen), rx);
            }
            Err(e) => warn!("X11 primary unavailable ({e}); running headless"),
        }
    }

    let _ = running;
    let (screen, _inject, rx) = HeadlessPrimary::new(config.headless_shape());
    info!("using a headless primary screen of {:?}", config.headless_shape());
    (Arc::new(screen), rx)
}
