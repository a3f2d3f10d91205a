//! SynthesizingScreen: replays server records on a local display.
//!
//! This use case sits at the application layer and delegates every OS call
//! to a [`DisplayBackend`] trait object.  The backends (a recording mock and
//! XTest) live in the infrastructure layer.
//!
//! # Key events
//!
//! Key records carry a portable [`KeyId`] and the modifier mask the server
//! wants.  The shared [`KeySynthesizer`] turns them into local keycode
//! presses, bracketing the key with whatever modifier presses and releases
//! make the local keyboard produce that key.  [`SynthesizingScreen`] plays
//! the plan:
//!
//! - strokes marked `repeat` form a run that is played `count` times,
//! - every other stroke is played once,
//! - the display is flushed once at the end.
//!
//! The server tags every key press with a `button` (its own keycode).  The
//! driver remembers which [`KeyId`] went down under each button and uses
//! that id for the matching repeat and release, so a key pressed as `'A'`
//! comes up on the keycode that went down even if Shift was let go first.
//!
//! # Locking
//!
//! All driver state sits behind one mutex, taken for the duration of a
//! single public method and never across an await.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use synergy_core::keymap::{
    buttons, ButtonId, KeyAction, KeyButton, KeyCode, KeySynthesizer, KeymapError, Keystroke,
    LocalKeyMap, Modifier, RawKeyboardMapping,
};
use synergy_core::protocol::OptionId;
use synergy_core::{Clipboard, ClipboardId, KeyId, ModifierMask, ScreenShape};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::secondary_screen::{ScreenEvent, SecondaryScreen};

/// One wheel notch in protocol units.
pub const WHEEL_NOTCH: i32 = 120;

/// Error type for input emulation operations.
#[derive(Debug, Error)]
pub enum EmulationError {
    #[error("platform error: {0}")]
    Platform(String),

    #[error("display unavailable: {0}")]
    DisplayUnavailable(String),

    #[error("invalid keyboard mapping: {0}")]
    Keymap(#[from] KeymapError),
}

/// Something the display reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    /// The keyboard layout changed.
    MappingChanged,
    /// The pointer left the cursor hider window.
    HiderLeave,
    /// A local application took ownership of a clipboard.
    ClipboardChanged(ClipboardId),
    ScreensaverChanged(bool),
    /// Any other native event, by its type number.
    Other(i32),
}

/// Platform-agnostic display access.
///
/// Each supported windowing system provides an implementation in the
/// infrastructure layer.
pub trait DisplayBackend: Send + Sync {
    fn shape(&self) -> ScreenShape;

    fn cursor_position(&self) -> (i32, i32);

    /// The current keysym table and modifier slots.
    fn keyboard_mapping(&self) -> Result<RawKeyboardMapping, EmulationError>;

    /// Lock bits (CapsLock, NumLock, ScrollLock) as the display sees them.
    fn toggle_state(&self) -> ModifierMask;

    fn fake_key(&self, keycode: KeyCode, press: bool) -> Result<(), EmulationError>;

    fn fake_button(&self, button: ButtonId, press: bool) -> Result<(), EmulationError>;

    /// Moves the pointer to an absolute position.
    fn fake_motion(&self, x: i32, y: i32) -> Result<(), EmulationError>;

    /// Scrolls by `delta` 120ths of a notch.  The default clicks button 4
    /// (up) or 5 (down) once per notch, at least once.
    fn fake_wheel(&self, delta: i16) -> Result<(), EmulationError> {
        if delta == 0 {
            return Ok(());
        }
        let button = if delta > 0 {
            buttons::WHEEL_UP
        } else {
            buttons::WHEEL_DOWN
        };
        let clicks = (i32::from(delta).abs() / WHEEL_NOTCH).max(1);
        for _ in 0..clicks {
            self.fake_button(button, true)?;
            self.fake_button(button, false)?;
        }
        Ok(())
    }

    /// Pushes queued synthetic input to the display.
    fn flush(&self) -> Result<(), EmulationError>;

    /// Shows the 1×1 hider window under `(x, y)` so the local cursor
    /// disappears.
    fn show_hider(&self, x: i32, y: i32);

    fn hide_hider(&self);

    /// Installs clipboard data and takes ownership of the clipboard.  This
    /// must not be reported back as [`DisplayEvent::ClipboardChanged`].
    fn set_clipboard(&self, id: ClipboardId, clipboard: &Clipboard) -> Result<(), EmulationError>;

    fn clipboard(&self, id: ClipboardId) -> Option<Clipboard>;

    fn set_screensaver(&self, _on: bool) -> Result<(), EmulationError> {
        Ok(())
    }

    /// The next pending display event, without blocking.
    fn poll_event(&self) -> Option<DisplayEvent>;
}

struct DriverState {
    synth: KeySynthesizer,
    /// KeyId pressed under each server button.
    held: HashMap<KeyButton, KeyId>,
    buttons_down: BTreeSet<ButtonId>,
    /// Half-duplex locks from the config; server options override them
    /// until the next reset.
    configured_half_duplex: ModifierMask,
    active: bool,
}

/// A [`SecondaryScreen`] that synthesizes input on a [`DisplayBackend`].
pub struct SynthesizingScreen {
    display: Arc<dyn DisplayBackend>,
    state: Mutex<DriverState>,
    events: mpsc::UnboundedSender<ScreenEvent>,
}

impl SynthesizingScreen {
    /// Reads the display's keyboard mapping and builds the driver.
    ///
    /// The receiver yields what the screen reports upstream (clipboard
    /// grabs, screensaver changes).
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError`] if the keyboard mapping cannot be read or
    /// is malformed.
    pub fn new(
        display: Arc<dyn DisplayBackend>,
        half_duplex: ModifierMask,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ScreenEvent>), EmulationError> {
        let keymap = LocalKeyMap::build(display.keyboard_mapping()?)?;
        let mut synth = KeySynthesizer::new(keymap);
        apply_half_duplex(&mut synth, half_duplex);
        synth.set_mask(display.toggle_state());

        let (events, rx) = mpsc::unbounded_channel();
        Ok((
            Self {
                display,
                state: Mutex::new(DriverState {
                    synth,
                    held: HashMap::new(),
                    buttons_down: BTreeSet::new(),
                    configured_half_duplex: half_duplex,
                    active: false,
                }),
                events,
            },
            rx,
        ))
    }

    fn lock(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the pointer is on this screen.
    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    /// Shadow modifier mask of the key synthesizer.
    pub fn mask(&self) -> ModifierMask {
        self.lock().synth.mask()
    }

    /// Keycodes the driver is holding down.
    pub fn keys_down(&self) -> Vec<KeyCode> {
        self.lock().synth.keys_down().iter().copied().collect()
    }

    /// Handles one display event.  Returns `false` for events the driver
    /// does not know.
    pub fn handle_display_event(&self, event: DisplayEvent) -> bool {
        match event {
            DisplayEvent::MappingChanged => {
                if let Err(e) = self.rebuild_keymap() {
                    warn!("keyboard mapping changed but could not be applied: {e}");
                }
                true
            }
            DisplayEvent::HiderLeave => {
                self.display.hide_hider();
                true
            }
            DisplayEvent::ClipboardChanged(id) => {
                debug!("local application took the {id}");
                let _ = self.events.send(ScreenEvent::ClipboardGrabbed(id));
                true
            }
            DisplayEvent::ScreensaverChanged(on) => {
                let _ = self.events.send(ScreenEvent::Screensaver(on));
                true
            }
            DisplayEvent::Other(kind) => {
                trace!(kind, "unhandled display event");
                false
            }
        }
    }

    /// Handles every pending display event; returns how many there were.
    pub fn pump_events(&self) -> usize {
        let mut count = 0;
        while let Some(event) = self.display.poll_event() {
            self.handle_display_event(event);
            count += 1;
        }
        count
    }

    /// Rebuilds the key map from the display.  Keys held under the old map
    /// are released first.
    fn rebuild_keymap(&self) -> Result<(), EmulationError> {
        let keymap = LocalKeyMap::build(self.display.keyboard_mapping()?)?;
        let mut state = self.lock();
        let released = state.synth.set_keymap(keymap);
        state.held.clear();
        debug!(released = released.len(), "keyboard mapping rebuilt");
        self.do_keystrokes(&released, 1)
    }

    /// Plays `plan`, replaying runs of repeat strokes `count` times, then
    /// flushes once.
    fn do_keystrokes(&self, plan: &[Keystroke], count: u16) -> Result<(), EmulationError> {
        if plan.is_empty() {
            return Ok(());
        }
        self.emit_keystrokes(plan, count)?;
        self.display.flush()
    }

    fn emit_keystrokes(&self, plan: &[Keystroke], count: u16) -> Result<(), EmulationError> {
        trace!(?plan, count, "keystrokes");
        let mut i = 0;
        while i < plan.len() {
            if plan[i].repeat {
                let end = plan[i..]
                    .iter()
                    .position(|k| !k.repeat)
                    .map_or(plan.len(), |n| i + n);
                for _ in 0..count {
                    for stroke in &plan[i..end] {
                        self.display.fake_key(stroke.keycode, stroke.press)?;
                    }
                }
                i = end;
            } else {
                self.display.fake_key(plan[i].keycode, plan[i].press)?;
                i += 1;
            }
        }
        Ok(())
    }

    /// Releases held keys and buttons without flushing.
    fn release_locked(&self, state: &mut DriverState) -> Result<(), EmulationError> {
        let plan = state.synth.release_all();
        state.held.clear();
        self.emit_keystrokes(&plan, 1)?;
        for button in std::mem::take(&mut state.buttons_down) {
            self.display.fake_button(button, false)?;
        }
        Ok(())
    }
}

fn apply_half_duplex(synth: &mut KeySynthesizer, mask: ModifierMask) {
    synth.set_half_duplex(Modifier::CapsLock, mask.contains(ModifierMask::CAPS_LOCK));
    synth.set_half_duplex(Modifier::NumLock, mask.contains(ModifierMask::NUM_LOCK));
}

impl SecondaryScreen for SynthesizingScreen {
    fn shape(&self) -> ScreenShape {
        self.display.shape()
    }

    fn cursor(&self) -> (i32, i32) {
        self.display.cursor_position()
    }

    fn enter(&self, x: i32, y: i32, mask: ModifierMask) -> Result<(), EmulationError> {
        let mut state = self.lock();
        state.synth.set_mask(self.display.toggle_state());
        let toggles = state.synth.toggle_strokes(mask.toggles());
        self.display.fake_motion(x, y)?;
        self.emit_keystrokes(&toggles, 1)?;
        self.display.hide_hider();
        state.active = true;
        debug!(x, y, %mask, "entered");
        self.display.flush()
    }

    fn leave(&self) -> Result<(), EmulationError> {
        let mut state = self.lock();
        self.release_locked(&mut state)?;
        let (x, y) = self.display.cursor_position();
        self.display.show_hider(x, y);
        state.active = false;
        debug!("left");
        self.display.flush()
    }

    fn key_down(&self, id: KeyId, mask: ModifierMask, button: KeyButton) -> Result<(), EmulationError> {
        let mut state = self.lock();
        let Some(mapped) = state.synth.map_key(id, mask, KeyAction::Press) else {
            debug!(?id, "key not available on this keyboard");
            return Ok(());
        };
        state.synth.commit(&mapped);
        if mapped.action == KeyAction::Press {
            state.held.insert(button, id);
        }
        self.do_keystrokes(&mapped.plan, 1)
    }

    fn key_repeat(
        &self,
        id: KeyId,
        mask: ModifierMask,
        count: u16,
        button: KeyButton,
    ) -> Result<(), EmulationError> {
        let mut state = self.lock();
        let id = state.held.get(&button).copied().unwrap_or(id);
        let Some(mapped) = state.synth.map_key(id, mask, KeyAction::Repeat) else {
            return Ok(());
        };
        state.synth.commit(&mapped);
        self.do_keystrokes(&mapped.plan, count)
    }

    fn key_up(&self, id: KeyId, mask: ModifierMask, button: KeyButton) -> Result<(), EmulationError> {
        let mut state = self.lock();
        let id = state.held.remove(&button).unwrap_or(id);
        let plan = state.synth.key_up(id, mask);
        self.do_keystrokes(&plan, 1)
    }

    fn mouse_down(&self, button: ButtonId) -> Result<(), EmulationError> {
        let mut state = self.lock();
        self.display.fake_button(button, true)?;
        state.buttons_down.insert(button);
        self.display.flush()
    }

    fn mouse_up(&self, button: ButtonId) -> Result<(), EmulationError> {
        let mut state = self.lock();
        self.display.fake_button(button, false)?;
        state.buttons_down.remove(&button);
        self.display.flush()
    }

    fn mouse_move(&self, x: i32, y: i32) -> Result<(), EmulationError> {
        let _state = self.lock();
        self.display.fake_motion(x, y)?;
        self.display.flush()
    }

    fn mouse_wheel(&self, delta: i16) -> Result<(), EmulationError> {
        let _state = self.lock();
        self.display.fake_wheel(delta)?;
        self.display.flush()
    }

    fn set_toggle_state(&self, mask: ModifierMask) -> Result<(), EmulationError> {
        let mut state = self.lock();
        let plan = state.synth.toggle_strokes(mask);
        self.do_keystrokes(&plan, 1)
    }

    fn release_all(&self) -> Result<(), EmulationError> {
        let mut state = self.lock();
        self.release_locked(&mut state)?;
        self.display.flush()
    }

    fn grab_clipboard(&self, id: ClipboardId) -> Result<(), EmulationError> {
        let _state = self.lock();
        self.display.set_clipboard(id, &Clipboard::new())
    }

    fn set_clipboard(&self, id: ClipboardId, clipboard: &Clipboard) -> Result<(), EmulationError> {
        let _state = self.lock();
        self.display.set_clipboard(id, clipboard)
    }

    fn clipboard(&self, id: ClipboardId) -> Option<Clipboard> {
        let _state = self.lock();
        self.display.clipboard(id)
    }

    fn screensaver(&self, on: bool) -> Result<(), EmulationError> {
        let _state = self.lock();
        self.display.set_screensaver(on)
    }

    fn set_options(&self, options: &[(OptionId, i32)]) {
        let mut state = self.lock();
        for &(option, value) in options {
            match option {
                OptionId::HALF_DUPLEX_CAPS_LOCK => {
                    state.synth.set_half_duplex(Modifier::CapsLock, value != 0);
                }
                OptionId::HALF_DUPLEX_NUM_LOCK => {
                    state.synth.set_half_duplex(Modifier::NumLock, value != 0);
                }
                OptionId::HEARTBEAT => {}
                other => debug!("ignoring option {other}"),
            }
        }
    }

    fn reset_options(&self) {
        let mut state = self.lock();
        let configured = state.configured_half_duplex;
        apply_half_duplex(&mut state.synth, configured);
    }
}
