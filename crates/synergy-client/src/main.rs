//! Synergy client (`synergyc`) entry point.
//!
//! Opens the display, connects to the server and replays what it sends
//! until Ctrl-C.
//!
//! ```text
//! main()
//!  └─ load synergyc.toml
//!  └─ open the display     (XTest with `--features xtest`, else headless)
//!  └─ display-events thread (keyboard remaps, clipboard, hider)
//!  └─ run_client           (connect, session, reconnect)
//! ```
//!
//! Exit codes: 0 clean shutdown, 1 configuration error, 3 the server refused
//! this screen or any other fatal error.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use synergy_client::application::emulate_input::{DisplayBackend, SynthesizingScreen};
use synergy_client::application::secondary_screen::SecondaryScreen;
use synergy_client::infrastructure::display::mock::MockDisplay;
use synergy_client::infrastructure::network::session::SessionSettings;
use synergy_client::infrastructure::network::{self, ClientConnectionConfig, NetworkError};
use synergy_client::infrastructure::storage::config::{load_config, ClientConfig, ConfigError};

/// How long the client gets to say goodbye after Ctrl-C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Display event polling period.
const EVENT_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Parser)]
#[command(name = "synergyc", version, about = "Use another machine's keyboard and mouse on this screen")]
struct Cli {
    /// Server address, `HOST[:PORT]`.
    #[arg(env = "SYNERGY_SERVER")]
    server: Option<String>,

    /// Path to synergyc.toml.
    #[arg(long, env = "SYNERGY_CONFIG")]
    config: Option<PathBuf>,

    /// Screen name announced to the server.
    #[arg(long, env = "SYNERGY_NAME")]
    name: Option<String>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, env = "SYNERGY_LOG_LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref());
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.client.log_level.clone()))
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
            info!("synergyc stopped");
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
        if cause.is::<ConfigError>() {
            return 1;
        }
        if matches!(cause.downcast_ref::<NetworkError>(), Some(NetworkError::Address(_))) {
            return 1;
        }
    }
    3
}

async fn run(cli: Cli, mut config: ClientConfig) -> anyhow::Result<()> {
    if let Some(name) = cli.name {
        config.client.name = name;
    }
    if let Some(server) = cli.server {
        config.network.server = server;
    }
    let address = network::server_address(&config.network.server)?;
    info!("synergyc starting as {:?}, server {address}", config.client.name);

    let display = open_display(&config);
    let (screen, upstream) = SynthesizingScreen::new(display, config.half_duplex())?;
    let screen = Arc::new(screen);

    // ── Display events ────────────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let pump = {
        let screen = Arc::clone(&screen);
        let running = Arc::clone(&running);
        thread::Builder::new()
            .name("display-events".to_string())
            .spawn(move || {
                while running.load(Ordering::Relaxed) {
                    if screen.pump_events() == 0 {
                        thread::sleep(EVENT_POLL);
                    }
                }
            })?
    };

    // ── Connection ────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let connection = ClientConnectionConfig {
        server: address,
        connect_timeout: config.connect_timeout(),
        reconnect_interval: config.reconnect_interval(),
    };
    let settings = SessionSettings::new(config.client.name.clone());
    let mut client = tokio::spawn(network::run_client(
        connection,
        Arc::clone(&screen) as Arc<dyn SecondaryScreen>,
        upstream,
        settings,
        shutdown_rx,
    ));

    info!("synergyc ready.  Press Ctrl-C to exit.");

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("cannot listen for Ctrl-C: {e}");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut client).await {
                Ok(Ok(result)) => result.map_err(Into::into),
                Ok(Err(e)) => Err(anyhow::Error::from(e)),
                Err(_) => {
                    warn!("connection did not stop within {SHUTDOWN_GRACE:?}");
                    client.abort();
                    Ok(())
                }
            }
        }
        joined = &mut client => match joined {
            Ok(result) => result.map_err(Into::into),
            Err(e) => Err(anyhow::Error::from(e)),
        },
    };

    running.store(false, Ordering::Relaxed);
    if let Err(e) = screen.release_all() {
        warn!("could not release synthetic input: {e}");
    }
    if pump.join().is_err() {
        warn!("display-events thread panicked");
    }

    outcome
}

/// Opens the native display, falling back to a headless one.
fn open_display(config: &ClientConfig) -> Arc<dyn DisplayBackend> {
    #[cfg(all(feature = "xtest", target_os = "linux"))]
    {
        use synergy_client::infrastructure::display::xtest::XTestDisplay;

        match XTestDisplay::open() {
            Ok(display) => {
                info!("using the XTest display");
                return Arc::new(display);
            }
            Err(e) => warn!("XTest display unavailable ({e}); running headless"),
        }
    }

    let shape = config.headless_shape();
    info!("using a headless display of {shape:?}");
    Arc::new(MockDisplay::with_shape(shape))
}
