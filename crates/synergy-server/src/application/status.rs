//! Live status snapshot served by the admin surface.
//!
//! These are plain Data Transfer Objects: every field is a string, number or
//! collection so `serde_json` can render them without custom code.  The
//! router fills one in on request; nothing reads them back.

use std::collections::BTreeMap;

use serde::Serialize;
use synergy_core::ScreenShape;

/// Everything the admin page shows about the running server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub primary: String,
    /// Screen that currently owns the cursor.
    pub active: String,
    pub cursor: CursorStatus,
    /// Primary modifier state, e.g. `"shift+numlock"`.
    pub modifiers: String,
    pub screensaver: bool,
    pub screens: Vec<ScreenStatus>,
    pub clipboards: Vec<ClipboardStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CursorStatus {
    pub x: i32,
    pub y: i32,
}

/// One screen of the arrangement, connected or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenStatus {
    pub name: String,
    /// `"primary"`, `"handshaking"`, `"connected"` or `"disconnected"`.
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<ScreenShape>,
    /// Edge name to neighbour name.
    pub neighbours: BTreeMap<String, String>,
    /// Options the screen advertised, keyed by their four-letter id.
    pub options: BTreeMap<String, i32>,
    /// Milliseconds since the last record from this screen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClipboardStatus {
    pub id: String,
    pub owner: String,
    pub seq: u32,
}

impl StatusSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn screen(&self, name: &str) -> Option<&ScreenStatus> {
        self.screens.iter().find(|s| s.name == name)
    }
}
