//! TOML configuration for the server (`synergys.toml`).
//!
//! Resolution order, highest first:
//!
//! 1. the `--config` flag,
//! 2. the `SYNERGY_CONFIG` environment variable,
//! 3. the platform default:
//!    - Windows:  `%APPDATA%\Synergy\synergys.toml`
//!    - Linux:    `$XDG_CONFIG_HOME/synergy/synergys.toml` (or `~/.config/...`)
//!    - macOS:    `~/Library/Application Support/Synergy/synergys.toml`
//!
//! A missing file at the platform path yields [`ServerConfig::default`].  A
//! missing file that was named explicitly is an error, because the user
//! clearly meant a particular arrangement.
//!
//! # Example
//!
//! ```toml
//! [server]
//! name = "desk"
//! heartbeat_secs = 3
//!
//! [[screens]]
//! name = "desk"
//!
//! [[screens]]
//! name = "laptop"
//! half_duplex_caps_lock = true
//!
//! [[links]]
//! screen = "desk"
//! edge = "right"
//! neighbour = "laptop"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent, so partial files work and a file
//! written by an older build keeps loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use synergy_core::protocol::OptionId;
use synergy_core::{Edge, ScreenShape};
use thiserror::Error;

use crate::application::update_layout::{ScreenLink, ScreenOptions};

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "SYNERGY_CONFIG";

const CONFIG_FILE_NAME: &str = "synergys.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub screen: ScreenSection,
    #[serde(default)]
    pub screens: Vec<ScreenEntry>,
    #[serde(default)]
    pub links: Vec<LinkEntry>,
}

/// General server behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// Name of the primary screen (this machine).
    #[serde(default = "default_name")]
    pub name: String,
    /// Seconds of outbound silence before a keep-alive is sent.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    /// Pixels from a primary edge that count as "at the edge".
    #[serde(default = "default_switch_zone")]
    pub switch_zone: i32,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Listener settings for client connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// IP address to bind.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// HTTP admin surface settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Loopback by default: the admin surface has no authentication.
    #[serde(default = "default_http_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Size of the primary when it runs without a display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScreenSection {
    #[serde(default = "default_width")]
    pub width: i32,
    #[serde(default = "default_height")]
    pub height: i32,
}

/// One `[[screens]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenEntry {
    pub name: String,
    #[serde(default)]
    pub half_duplex_caps_lock: bool,
    #[serde(default)]
    pub half_duplex_num_lock: bool,
}

/// One `[[links]]` entry.  The reverse link is implied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkEntry {
    pub screen: String,
    pub edge: Edge,
    pub neighbour: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "primary".to_string())
}
fn default_heartbeat_secs() -> u64 {
    3
}
fn default_switch_zone() -> i32 {
    1
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    24800
}
fn default_true() -> bool {
    true
}
fn default_width() -> i32 {
    1920
}
fn default_height() -> i32 {
    1080
}
fn default_http_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    24801
}

impl Default for ServerConfig {
    fn default() -> Self {
        let server = ServerSection::default();
        let screens = vec![ScreenEntry {
            name: server.name.clone(),
            half_duplex_caps_lock: false,
            half_duplex_num_lock: false,
        }];
        Self {
            server,
            network: NetworkSection::default(),
            http: HttpSection::default(),
            screen: ScreenSection::default(),
            screens,
            links: Vec::new(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            heartbeat_secs: default_heartbeat_secs(),
            switch_zone: default_switch_zone(),
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind_address: default_http_bind_address(),
            port: default_http_port(),
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

// ── Conversions into application types ────────────────────────────────────────

impl ServerConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.server.heartbeat_secs.max(1))
    }

    /// Makes `name` the primary screen.
    ///
    /// When `name` is already a declared screen only `[server] name` changes.
    /// Otherwise the current primary is renamed, links included, so a file
    /// that never mentions the machine's name still describes one layout.
    pub fn set_primary_name(&mut self, name: &str) {
        let old = std::mem::replace(&mut self.server.name, name.to_string());
        if old == name || self.screens.iter().any(|s| s.name == name) {
            return;
        }
        for screen in self.screens.iter_mut().filter(|s| s.name == old) {
            screen.name = name.to_string();
        }
        for link in &mut self.links {
            if link.screen == old {
                link.screen = name.to_string();
            }
            if link.neighbour == old {
                link.neighbour = name.to_string();
            }
        }
    }

    /// Shape of the headless primary; never smaller than one pixel.
    pub fn headless_shape(&self) -> ScreenShape {
        ScreenShape::new(0, 0, self.screen.width.max(1), self.screen.height.max(1))
    }

    /// The `[[links]]` table as application-layer links.
    pub fn screen_links(&self) -> Vec<ScreenLink> {
        self.links
            .iter()
            .map(|l| ScreenLink {
                screen: l.screen.clone(),
                edge: l.edge,
                neighbour: l.neighbour.clone(),
            })
            .collect()
    }

    /// Screen names in declaration order, duplicates included so the layout
    /// builder can reject them.
    pub fn screen_names(&self) -> Vec<String> {
        self.screens.iter().map(|s| s.name.clone()).collect()
    }

    /// Options sent to a screen in `DSOP` after it connects.
    pub fn screen_options(&self, name: &str) -> ScreenOptions {
        let heartbeat_ms = i32::try_from(self.heartbeat().as_millis()).unwrap_or(i32::MAX);
        let mut options = ScreenOptions::new();
        options.push((OptionId::HEARTBEAT, heartbeat_ms));
        if let Some(entry) = self.screens.iter().find(|s| s.name == name) {
            options.push((
                OptionId::HALF_DUPLEX_CAPS_LOCK,
                i32::from(entry.half_duplex_caps_lock),
            ));
            options.push((
                OptionId::HALF_DUPLEX_NUM_LOCK,
                i32::from(entry.half_duplex_num_lock),
            ));
        }
        options
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the platform default path of `synergys.toml`.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads the configuration following the resolution order in the module
/// docs.  `explicit` is the `--config` flag, if given.
///
/// # Errors
///
/// [`ConfigError::Io`] when an explicitly named file cannot be read (including
/// "not found"), [`ConfigError::Parse`] for malformed TOML.
pub fn load_config(explicit: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config_from(path);
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return load_config_from(Path::new(&path));
    }
    let path = config_file_path()?;
    match load_config_from(&path) {
        Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            Ok(ServerConfig::default())
        }
        other => other,
    }
}

/// Reads and parses one config file.
pub fn load_config_from(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Writes `config` to `path`, creating parent directories as needed.
pub fn save_config_to(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
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
    })?;
    Ok(())
}

/// Resolves the platform config base directory including the `Synergy`
/// subdirectory.
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

// ── Tests ─────────────────────────────────────────────────────────────────────
