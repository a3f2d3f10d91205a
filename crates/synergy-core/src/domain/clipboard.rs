//! Clipboard model shared by both peers.
//!
//! A screen can own two clipboards: the regular one and the X11-style
//! selection.  Each holds zero or more formats of the same content.  On the
//! wire (`DCLP`) the whole clipboard travels as one opaque string argument in
//! this layout:
//!
//! ```text
//! [count:u32] ( [format:u32][size:u32][bytes:size] ) * count
//! ```
//!
//! Formats this build does not know are skipped on unmarshal, so a newer peer
//! can add formats without breaking an older one.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Which clipboard a grab or transfer refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClipboardId(pub u8);

impl ClipboardId {
    pub const CLIPBOARD: ClipboardId = ClipboardId(0);
    pub const SELECTION: ClipboardId = ClipboardId(1);
    /// Number of clipboards a screen can own.
    pub const COUNT: usize = 2;

    pub fn all() -> [ClipboardId; Self::COUNT] {
        [Self::CLIPBOARD, Self::SELECTION]
    }

    pub fn is_valid(self) -> bool {
        (self.0 as usize) < Self::COUNT
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClipboardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::CLIPBOARD => f.write_str("clipboard"),
            Self::SELECTION => f.write_str("selection"),
            ClipboardId(n) => write!(f, "clipboard#{n}"),
        }
    }
}

/// Representations a clipboard can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipboardFormat {
    /// UTF-8 text with `\n` line endings.
    Text,
    Html,
    /// Device-independent bitmap bytes.
    Bitmap,
}

impl ClipboardFormat {
    pub fn wire_id(self) -> u32 {
        match self {
            ClipboardFormat::Text => 0,
            ClipboardFormat::Html => 1,
            ClipboardFormat::Bitmap => 2,
        }
    }

    pub fn from_wire_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(ClipboardFormat::Text),
            1 => Some(ClipboardFormat::Html),
            2 => Some(ClipboardFormat::Bitmap),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    #[error("clipboard data truncated at byte {0}")]
    Truncated(usize),

    #[error("{0} trailing bytes after clipboard data")]
    TrailingBytes(usize),
}

/// The content of one clipboard, possibly in several formats.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Clipboard {
    formats: BTreeMap<ClipboardFormat, Vec<u8>>,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for plain text.
    pub fn from_text(text: &str) -> Self {
        let mut clipboard = Self::new();
        clipboard.set(ClipboardFormat::Text, text.as_bytes().to_vec());
        clipboard
    }

    pub fn set(&mut self, format: ClipboardFormat, data: Vec<u8>) {
        self.formats.insert(format, data);
    }

    pub fn get(&self, format: ClipboardFormat) -> Option<&[u8]> {
        self.formats.get(&format).map(Vec::as_slice)
    }

    pub fn text(&self) -> Option<String> {
        self.get(ClipboardFormat::Text)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn formats(&self) -> impl Iterator<Item = ClipboardFormat> + '_ {
        self.formats.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    pub fn clear(&mut self) {
        self.formats.clear();
    }

    /// Serialises the clipboard into the `DCLP` data layout.
    pub fn marshall(&self) -> Vec<u8> {
        let size: usize = self.formats.values().map(|d| 8 + d.len()).sum();
        let mut out = Vec::with_capacity(4 + size);
        out.extend_from_slice(&(self.formats.len() as u32).to_be_bytes());
        for (format, data) in &self.formats {
            out.extend_from_slice(&format.wire_id().to_be_bytes());
            out.extend_from_slice(&(data.len() as u32).to_be_bytes());
            out.extend_from_slice(data);
        }
        out
    }

    /// Parses the `DCLP` data layout.  Unknown formats are skipped.
    pub fn unmarshall(bytes: &[u8]) -> Result<Self, ClipboardError> {
        let mut pos = 0usize;
        let read_u32 = |pos: &mut usize| -> Result<u32, ClipboardError> {
            let end = pos.checked_add(4).ok_or(ClipboardError::Truncated(*pos))?;
            let chunk = bytes.get(*pos..end).ok_or(ClipboardError::Truncated(*pos))?;
            *pos = end;
            Ok(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        };

        let count = read_u32(&mut pos)?;
        let mut clipboard = Self::new();
        for _ in 0..count {
            let format = read_u32(&mut pos)?;
            let size = read_u32(&mut pos)? as usize;
            let end = pos.checked_add(size).ok_or(ClipboardError::Truncated(pos))?;
            let data = bytes.get(pos..end).ok_or(ClipboardError::Truncated(pos))?;
            pos = end;
            if let Some(format) = ClipboardFormat::from_wire_id(format) {
                clipboard.set(format, data.to_vec());
            }
        }
        if pos != bytes.len() {
            return Err(ClipboardError::TrailingBytes(bytes.len() - pos));
        }
        Ok(clipboard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshall_layout_for_text() {
        // Arrange
        let clipboard = Clipboard::from_text("hi");

        // Act
        let bytes = clipboard.marshall();

        // Assert
        assert_eq!(bytes, b"\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x02hi");
    }

    #[test]
    fn test_unmarshall_restores_all_formats() {
        let mut clipboard = Clipboard::from_text("plain");
        clipboard.set(ClipboardFormat::Html, b"<b>plain</b>".to_vec());

        let restored = Clipboard::unmarshall(&clipboard.marshall()).unwrap();

        assert_eq!(restored, clipboard);
        assert_eq!(restored.text().as_deref(), Some("plain"));
    }

    #[test]
    fn test_unmarshall_skips_unknown_format() {
        let bytes = b"\x00\x00\x00\x01\x00\x00\x00\x09\x00\x00\x00\x01x";
        let clipboard = Clipboard::unmarshall(bytes).unwrap();
        assert!(clipboard.is_empty());
    }

    #[test]
    fn test_unmarshall_rejects_size_past_end() {
        let bytes = b"\x00\x00\x00\x01\x00\x00\x00\x00\x00\x00\x00\x09abc";
        assert!(matches!(
            Clipboard::unmarshall(bytes),
            Err(ClipboardError::Truncated(12))
        ));
    }

    #[test]
    fn test_unmarshall_rejects_trailing_bytes() {
        let mut bytes = Clipboard::new().marshall();
        bytes.push(0);
        assert_eq!(
            Clipboard::unmarshall(&bytes),
            Err(ClipboardError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_clipboard_id_validity_and_display() {
        assert!(ClipboardId::SELECTION.is_valid());
        assert!(!ClipboardId(2).is_valid());
        assert_eq!(ClipboardId::CLIPBOARD.to_string(), "clipboard");
    }
}
