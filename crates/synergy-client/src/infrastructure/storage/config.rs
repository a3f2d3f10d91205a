//! TOML configuration for the client (`synergyc.toml`).
//!
//! Resolution order, highest first:
//!
//! 1. the `--config` flag,
//! 2. the `SYNERGY_CONFIG` environment variable,
//! 3. the platform default:
//!    - Windows:  `%APPDATA%\Synergy\synergyc.toml`
//!    - Linux:    `$XDG_CONFIG_HOME/synergy/synergyc.toml` (or `~/.config/...`)
//!    - macOS:    `~/Library/Application Support/Synergy/synergyc.toml`
//!
//! A missing file at the platform path yields [`ClientConfig::default`]; a
//! missing file that was named explicitly is an error.
//!
//! # Example
//!
//! ```toml
//! [client]
//! name = "laptop"
//!
//! [network]
//! server = "desk.local:24800"
//! reconnect_secs = 5
//!
//! [keyboard]
//! half_duplex_caps_lock = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use synergy_core::{ModifierMask, ScreenShape};
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "SYNERGY_CONFIG";

const CONFIG_FILE_NAME: &str = "synergyc.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub keyboard: KeyboardSection,
    #[serde(default)]
    pub screen: ScreenSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    /// Screen name announced to the server.  Must match a `[[screens]]`
    /// entry in the server's config.
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// `HOST`, `HOST:PORT`, `IP` or `IP:PORT`.  Port 24800 when omitted.
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Wait between connection attempts.
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
}

/// Locks that report only a press on this machine's keyboard.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct KeyboardSection {
    #[serde(default)]
    pub half_duplex_caps_lock: bool,
    #[serde(default)]
    pub half_duplex_num_lock: bool,
}

/// Size of the screen when running without a display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScreenSection {
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "secondary".to_string())
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_server() -> String {
    "127.0.0.1".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_reconnect_secs() -> u64 {
    5
}
fn default_width() -> i32 {
    1920
}
fn default_height() -> i32 {
    1080
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            server: default_server(),
            connect_timeout_secs: default_connect_timeout_secs(),
            reconnect_secs: default_reconnect_secs(),
        }
    }
}

impl Default for ScreenSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.network.connect_timeout_secs.max(1))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.network.reconnect_secs.max(1))
    }

    /// The configured half-duplex locks as modifier bits.
    pub fn half_duplex(&self) -> ModifierMask {
        let mut mask = ModifierMask::empty();
        mask.set(ModifierMask::CAPS_LOCK, self.keyboard.half_duplex_caps_lock);
        mask.set(ModifierMask::NUM_LOCK, self.keyboard.half_duplex_num_lock);
        mask
    }

    pub fn headless_shape(&self) -> ScreenShape {
        ScreenShape::new(0, 0, self.screen.width.max(1), self.screen.height.max(1))
    }
}

// ── File access ───────────────────────────────────────────────────────────────

/// Returns the platform config directory (including the `Synergy`
/// subdirectory).
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads the configuration following the resolution order in the module
/// docs.  `explicit` is the `--config` flag, if given.
pub fn load_config(explicit: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return load_config_from(Path::new(&path));
    }
    let path = config_file_path()?;
    match load_config_from(&path) {
        Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            Ok(ClientConfig::default())
        }
        other => other,
    }
}

pub fn load_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config_to(path: &Path, config: &ClientConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("Synergy"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("synergy"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("Synergy")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}
