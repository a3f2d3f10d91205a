//! The secondary-screen capability set.
//!
//! A session needs exactly these operations from the screen it drives.  The
//! primary side has its own, smaller set on the server; the two share only
//! shape, enter, leave and clipboard grabs, so they are separate traits
//! rather than one trait with optional methods.
//!
//! Screens report things back (a local application took the clipboard, the
//! screensaver started) through a one-way [`ScreenEvent`] channel the
//! session reads.  The screen never holds a reference to the session.

use synergy_core::keymap::{ButtonId, KeyButton};
use synergy_core::protocol::OptionId;
use synergy_core::{Clipboard, ClipboardId, KeyId, ModifierMask, ScreenShape};

use super::emulate_input::EmulationError;

/// Something the local screen wants the server to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenEvent {
    /// A local application took ownership of a clipboard.
    ClipboardGrabbed(ClipboardId),
    /// The local screensaver started or stopped.
    Screensaver(bool),
}

/// Operations a session performs on the screen it replays input on.
///
/// Every method takes `&self`; implementations lock their own state for
/// the duration of one call.
#[cfg_attr(test, mockall::automock)]
pub trait SecondaryScreen: Send + Sync {
    fn shape(&self) -> ScreenShape;

    /// Current pointer position.
    fn cursor(&self) -> (i32, i32);

    /// The pointer arrived at `(x, y)`.  `mask` carries the primary's lock
    /// state.
    fn enter(&self, x: i32, y: i32, mask: ModifierMask) -> Result<(), EmulationError>;

    /// The pointer left.  Every synthetic key and button is released.
    fn leave(&self) -> Result<(), EmulationError>;

    fn key_down(&self, id: KeyId, mask: ModifierMask, button: KeyButton) -> Result<(), EmulationError>;

    fn key_repeat(
        &self,
        id: KeyId,
        mask: ModifierMask,
        count: u16,
        button: KeyButton,
    ) -> Result<(), EmulationError>;

    fn key_up(&self, id: KeyId, mask: ModifierMask, button: KeyButton) -> Result<(), EmulationError>;

    fn mouse_down(&self, button: ButtonId) -> Result<(), EmulationError>;

    fn mouse_up(&self, button: ButtonId) -> Result<(), EmulationError>;

    fn mouse_move(&self, x: i32, y: i32) -> Result<(), EmulationError>;

    /// `delta` is in 120ths of a notch; positive scrolls up.
    fn mouse_wheel(&self, delta: i16) -> Result<(), EmulationError>;

    /// Brings CapsLock, NumLock and ScrollLock to the state in `mask`.
    fn set_toggle_state(&self, mask: ModifierMask) -> Result<(), EmulationError>;

    /// Releases every synthetic key and mouse button still held.
    fn release_all(&self) -> Result<(), EmulationError>;

    /// Another screen owns clipboard `id` now; local applications should
    /// ask this screen for it.
    fn grab_clipboard(&self, id: ClipboardId) -> Result<(), EmulationError>;

    fn set_clipboard(&self, id: ClipboardId, clipboard: &Clipboard) -> Result<(), EmulationError>;

    fn clipboard(&self, id: ClipboardId) -> Option<Clipboard>;

    fn screensaver(&self, on: bool) -> Result<(), EmulationError>;

    fn set_options(&self, options: &[(OptionId, i32)]);

    /// Drops options set by the server and returns to the configured ones.
    fn reset_options(&self);
}
