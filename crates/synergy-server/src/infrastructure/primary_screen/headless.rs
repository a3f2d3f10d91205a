//! Primary screen with no display behind it.
//!
//! Useful on machines without a desktop session and in integration tests: the
//! shape is fixed, cursor visibility is tracked in memory, and clipboards are
//! plain values.  Input is whatever the caller injects through the event
//! channel returned by [`HeadlessPrimary::new`].

use std::sync::Mutex;

use synergy_core::{Clipboard, ClipboardId, ModifierMask, ScreenShape};
use tokio::sync::mpsc;
use tracing::debug;

use super::{PrimaryEvent, PrimaryScreen};

#[derive(Debug, Default)]
struct HeadlessState {
    /// `false` while a secondary owns the cursor.
    cursor_home: bool,
    cursor: (i32, i32),
    clipboards: [Option<Clipboard>; ClipboardId::COUNT],
}

#[derive(Debug)]
pub struct HeadlessPrimary {
    shape: ScreenShape,
    state: Mutex<HeadlessState>,
}

impl HeadlessPrimary {
    /// Creates the screen and the sender its input is injected through.
    ///
    /// The caller forwards the receiver's events to the router.
    pub fn new(shape: ScreenShape) -> (Self, mpsc::Sender<PrimaryEvent>, mpsc::Receiver<PrimaryEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let screen = Self {
            shape,
            state: Mutex::new(HeadlessState {
                cursor_home: true,
                cursor: shape.center(),
                clipboards: Default::default(),
            }),
        };
        (screen, tx, rx)
    }

    /// Whether the cursor is currently on this screen.
    pub fn cursor_home(&self) -> bool {
        self.lock().cursor_home
    }

    pub fn cursor(&self) -> (i32, i32) {
        self.lock().cursor
    }

    /// Installs local clipboard contents, as if the user copied something.
    pub fn copy(&self, id: ClipboardId, clipboard: Clipboard) {
        if let Some(slot) = self.lock().clipboards.get_mut(id.index()) {
            *slot = Some(clipboard);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PrimaryScreen for HeadlessPrimary {
    fn shape(&self) -> ScreenShape {
        self.shape
    }

    fn enter(&self, x: i32, y: i32) {
        let mut state = self.lock();
        state.cursor_home = true;
        state.cursor = self.shape.clamp(x, y);
        debug!(x, y, "cursor home");
    }

    fn leave(&self) {
        self.lock().cursor_home = false;
        debug!("cursor away");
    }

    fn grab_clipboard(&self, id: ClipboardId) {
        if let Some(slot) = self.lock().clipboards.get_mut(id.index()) {
            *slot = None;
        }
    }

    fn set_clipboard(&self, id: ClipboardId, clipboard: &Clipboard) {
        if let Some(slot) = self.lock().clipboards.get_mut(id.index()) {
            *slot = Some(clipboard.clone());
        }
    }

    fn clipboard(&self, id: ClipboardId) -> Option<Clipboard> {
        self.lock().clipboards.get(id.index()).cloned().flatten()
    }

    fn toggle_mask(&self) -> ModifierMask {
        ModifierMask::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn screen() -> HeadlessPrimary {
        HeadlessPrimary::new(ScreenShape::new(0, 0, 1920, 1080)).0
    }

    #[test]
    fn test_starts_home_at_centre() {
        let s = screen();
        assert!(s.cursor_home());
        assert_eq!(s.cursor(), (960, 540));
    }

    #[test]
    fn test_leave_then_enter_warps_cursor() {
        // Arrange
        let s = screen();

        // Act
        s.leave();
        let away = s.cursor_home();
        s.enter(5000, 10);

        // Assert
        assert!(!away);
        assert!(s.cursor_home());
        assert_eq!(s.cursor(), (1919, 10));
    }

    #[test]
    fn test_clipboard_grab_clears_local_contents() {
        // Arrange
        let s = screen();
        s.copy(ClipboardId::CLIPBOARD, Clipboard::from_text("x"));

        // Act
        let before = s.clipboard(ClipboardId::CLIPBOARD);
        s.grab_clipboard(ClipboardId::CLIPBOARD);

        // Assert
        assert_eq!(before, Some(Clipboard::from_text("x")));
        assert_eq!(s.clipboard(ClipboardId::CLIPBOARD), None);
    }

    #[test]
    fn test_set_clipboard_installs_remote_contents() {
        let s = screen();
        s.set_clipboard(ClipboardId::SELECTION, &Clipboard::from_text("remote"));
        assert_eq!(
            s.clipboard(ClipboardId::SELECTION).and_then(|c| c.text()),
            Some("remote".to_string())
        );
    }
}
