//! ManageClientsUseCase: registry of connected secondary screens.
//!
//! The `ScreenRegistry` is the server's in-memory table of every secondary
//! currently connected.  Each entry tracks:
//!
//! - The screen name and the UUID of the TCP connection that claimed it.
//! - The geometry reported in `DINF` and the options reported in `DSOP`.
//! - When the connection was accepted and when a record last arrived.
//!
//! # Connection lifecycle (for beginners)
//!
//! ```text
//! accept ──► Handshaking ──(DINF)──► Connected
//!                 │                      │
//!                 └──────── removed ◄────┘
//! ```
//!
//! - `Handshaking`: the client said hello with a valid name; its geometry is
//!   not known yet, so the cursor cannot be sent there.
//! - `Connected`: `DINF` arrived; the screen can own the cursor.
//!
//! # Why a connection id?
//!
//! A client that reconnects quickly may register its name again before the
//! server has noticed that the old socket died.  Removal is keyed on the
//! connection UUID as well as the name, so the old session's late
//! disconnect cannot evict the new one.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use synergy_core::{ScreenGraph, ScreenShape};
use thiserror::Error;
use uuid::Uuid;

use crate::application::update_layout::ScreenOptions;

/// Reasons a client name cannot be registered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The name is not a screen in the arrangement (answered with `EUNK`).
    #[error("screen {0:?} is not part of the configured layout")]
    UnknownScreen(String),

    /// The name is already connected, or is the primary (answered with `EBSY`).
    #[error("screen {0:?} is already connected")]
    AlreadyConnected(String),
}

/// Current state of a secondary's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Handshaking,
    Connected,
}

/// Runtime state for a connected secondary.
#[derive(Debug, Clone)]
pub struct ScreenEntry {
    pub name: String,
    pub connection_id: Uuid,
    pub state: ConnectionState,
    pub shape: Option<ScreenShape>,
    /// Options the client advertised in `DSOP`.
    pub options: ScreenOptions,
    pub connected_at: Instant,
    pub last_seen: Instant,
}

/// In-memory registry of connected secondaries, keyed by screen name.
#[derive(Debug, Default)]
pub struct ScreenRegistry {
    screens: HashMap<String, ScreenEntry>,
}

impl ScreenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `name` for the connection `connection_id`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownScreen`] if `name` is not in `graph`.
    /// - [`RegistryError::AlreadyConnected`] if `name` is the primary or
    ///   already claimed by another connection.
    pub fn register(
        &mut self,
        graph: &ScreenGraph,
        name: &str,
        connection_id: Uuid,
    ) -> Result<(), RegistryError> {
        if !graph.contains(name) {
            return Err(RegistryError::UnknownScreen(name.to_string()));
        }
        if name == graph.primary() || self.screens.contains_key(name) {
            return Err(RegistryError::AlreadyConnected(name.to_string()));
        }
        let now = Instant::now();
        self.screens.insert(
            name.to_string(),
            ScreenEntry {
                name: name.to_string(),
                connection_id,
                state: ConnectionState::Handshaking,
                shape: None,
                options: ScreenOptions::new(),
                connected_at: now,
                last_seen: now,
            },
        );
        Ok(())
    }

    /// Records the geometry from `DINF`.
    ///
    /// Returns `true` the first time, when the screen moves to
    /// [`ConnectionState::Connected`].
    pub fn set_shape(&mut self, name: &str, shape: ScreenShape) -> bool {
        let Some(entry) = self.screens.get_mut(name) else {
            return false;
        };
        entry.shape = Some(shape);
        let first = entry.state == ConnectionState::Handshaking;
        entry.state = ConnectionState::Connected;
        first
    }

    pub fn set_options(&mut self, name: &str, options: ScreenOptions) {
        if let Some(entry) = self.screens.get_mut(name) {
            entry.options = options;
        }
    }

    /// Marks that a record just arrived from `name`.
    pub fn touch(&mut self, name: &str) {
        if let Some(entry) = self.screens.get_mut(name) {
            entry.last_seen = Instant::now();
        }
    }

    /// Removes `name` if it is still held by `connection_id`.
    ///
    /// Returns `true` when an entry was removed.
    pub fn remove(&mut self, name: &str, connection_id: Uuid) -> bool {
        match self.screens.get(name) {
            Some(entry) if entry.connection_id == connection_id => {
                self.screens.remove(name);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&ScreenEntry> {
        self.screens.get(name)
    }

    /// Whether `connection_id` currently holds `name`.
    pub fn is_current(&self, name: &str, connection_id: Uuid) -> bool {
        self.screens
            .get(name)
            .is_some_and(|e| e.connection_id == connection_id)
    }

    /// The shape of a screen that finished its handshake.
    pub fn shape(&self, name: &str) -> Option<ScreenShape> {
        self.screens
            .get(name)
            .filter(|e| e.state == ConnectionState::Connected)
            .and_then(|e| e.shape)
    }

    /// Names of every fully connected screen, sorted.
    pub fn connected_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .screens
            .values()
            .filter(|e| e.state == ConnectionState::Connected)
            .map(|e| e.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Snapshot of all entries, sorted by name.
    pub fn all(&self) -> Vec<ScreenEntry> {
        let mut entries: Vec<ScreenEntry> = self.screens.values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }
}
