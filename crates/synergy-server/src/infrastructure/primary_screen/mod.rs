//! Primary screen driver: the machine whose real keyboard and mouse are shared.
//!
//! The driver has two jobs:
//!
//! - **Report input** as [`PrimaryEvent`]s on a channel.  While the cursor is
//!   at home it reports absolute pointer positions so the router can spot an
//!   edge.  While a secondary owns the cursor it hides and pins the real
//!   pointer and reports relative deltas plus every key and button.
//! - **Obey the router** through the [`PrimaryScreen`] capability set: hide
//!   the cursor when it leaves, show and warp it when it comes home, and
//!   exchange clipboard contents.
//!
//! # Backends
//!
//! - [`headless::HeadlessPrimary`] – fixed shape, no input.  The default, so
//!   the daemon runs anywhere (containers, CI, a server with no display).
//! - `x11::X11Primary` – Xlib pointer polling and grabs, compiled with the
//!   `x11` cargo feature.
//!
//! Native keycodes are turned into portable key ids by
//! [`key_translator::KeyTranslator`], the inverse of the secondary's key
//! synthesizer.

use synergy_core::keymap::{ButtonId, KeyAction, KeyButton};
use synergy_core::{Clipboard, ClipboardId, KeyId, ModifierMask, ScreenShape};

pub mod headless;
pub mod key_translator;

#[cfg(all(feature = "x11", target_os = "linux"))]
pub mod x11;

/// A translated key event from the primary keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub id: KeyId,
    /// Modifier state the key was pressed under.
    pub mask: ModifierMask,
    /// The native keycode, echoed back by the secondary on release.
    pub button: KeyButton,
    /// Auto-repeat count; 1 for presses and releases.
    pub count: u16,
}

/// Input reported by the primary screen driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryEvent {
    /// Absolute pointer position while the cursor is at home.
    PointerMove { x: i32, y: i32 },
    /// Relative motion while the cursor is away.
    PointerDelta { dx: i32, dy: i32 },
    Button { button: ButtonId, down: bool },
    /// Wheel motion in 120-per-notch units.
    Wheel { delta: i16 },
    Key(KeyEvent),
    Screensaver { active: bool },
    /// The user copied something on the primary.
    ClipboardGrab { id: ClipboardId },
}

/// What the router may ask of the primary screen.
///
/// Methods are synchronous and cheap: implementations forward them to the
/// thread that owns the display connection.
#[cfg_attr(test, mockall::automock)]
pub trait PrimaryScreen: Send + Sync {
    /// The primary's rectangle in its own coordinates.
    fn shape(&self) -> ScreenShape;

    /// The cursor came home: show it and warp it to `(x, y)`.
    fn enter(&self, x: i32, y: i32);

    /// A secondary took the cursor: hide it and pin it in place.
    fn leave(&self);

    /// A secondary owns clipboard `id` now; drop local ownership.
    fn grab_clipboard(&self, id: ClipboardId);

    /// Installs clipboard contents fetched from a secondary.
    fn set_clipboard(&self, id: ClipboardId, clipboard: &Clipboard);

    /// Current local clipboard contents, if the primary owns any.
    fn clipboard(&self, id: ClipboardId) -> Option<Clipboard>;

    /// Current lock-key state of the physical keyboard.
    fn toggle_mask(&self) -> ModifierMask;
}
