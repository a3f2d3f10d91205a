//! Recording display backend.
//!
//! # Why a mock display?
//!
//! A real backend needs a running X server and actually presses keys on the
//! machine it runs on.  [`MockDisplay`] replaces every display call with an
//! in-memory record so tests can assert exactly what was injected and in
//! what order.  `synergyc` also uses it when no display is available, which
//! keeps the session usable for protocol testing on a headless box.
//!
//! It models just enough of a display to be believable:
//!
//! - the keyboard mapping is the built-in US pc105 layout,
//! - pressing the CapsLock or NumLock keycode flips the lock state,
//! - motion moves the reported cursor,
//! - clipboards are stored per id.
//!
//! # `should_fail` flag
//!
//! Set `should_fail = true` to make every injection call (`fake_*`,
//! `flush`) return [`EmulationError::Platform`].  Reads keep working so a
//! screen can still be constructed.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use synergy_core::keymap::layouts::{us_pc105, KEYCODE_CAPS_LOCK, KEYCODE_NUM_LOCK};
use synergy_core::keymap::{ButtonId, KeyCode, RawKeyboardMapping};
use synergy_core::{Clipboard, ClipboardId, ModifierMask, ScreenShape};

use crate::application::emulate_input::{DisplayBackend, DisplayEvent, EmulationError};

/// One recorded display call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayCall {
    Key { keycode: KeyCode, press: bool },
    Button { button: ButtonId, press: bool },
    Motion { x: i32, y: i32 },
    Flush,
    ShowHider { x: i32, y: i32 },
    HideHider,
    SetClipboard(ClipboardId),
    Screensaver(bool),
}

/// A display that records calls instead of touching the OS.
pub struct MockDisplay {
    pub shape: ScreenShape,
    /// Every injection call, in order.
    pub calls: Mutex<Vec<DisplayCall>>,
    pub mapping: Mutex<RawKeyboardMapping>,
    pub toggles: Mutex<ModifierMask>,
    pub cursor: Mutex<(i32, i32)>,
    pub clipboards: Mutex<[Option<Clipboard>; ClipboardId::COUNT]>,
    /// Events handed out by `poll_event`, oldest first.
    pub events: Mutex<VecDeque<DisplayEvent>>,
    pub should_fail: bool,
}

impl Default for MockDisplay {
    fn default() -> Self {
        Self::with_shape(ScreenShape::new(0, 0, 1920, 1080))
    }
}

impl MockDisplay {
    /// A 1920×1080 display with the cursor in the centre.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape(shape: ScreenShape) -> Self {
        Self {
            shape,
            calls: Mutex::new(Vec::new()),
            mapping: Mutex::new(us_pc105()),
            toggles: Mutex::new(ModifierMask::empty()),
            cursor: Mutex::new(shape.center()),
            clipboards: Mutex::new(Default::default()),
            events: Mutex::new(VecDeque::new()),
            should_fail: false,
        }
    }

    /// Queues an event for `poll_event`.
    pub fn push_event(&self, event: DisplayEvent) {
        lock(&self.events).push_back(event);
    }

    /// Replaces the keyboard mapping the next `keyboard_mapping` call returns.
    pub fn set_mapping(&self, mapping: RawKeyboardMapping) {
        *lock(&self.mapping) = mapping;
    }

    /// Returns and clears the recorded calls.
    pub fn take_calls(&self) -> Vec<DisplayCall> {
        std::mem::take(&mut *lock(&self.calls))
    }

    /// Key calls only, as `(keycode, press)`.
    pub fn keys(&self) -> Vec<(KeyCode, bool)> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match *call {
                DisplayCall::Key { keycode, press } => Some((keycode, press)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DisplayCall) -> Result<(), EmulationError> {
        if self.should_fail {
            return Err(EmulationError::Platform("injected failure".to_string()));
        }
        lock(&self.calls).push(call);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl DisplayBackend for MockDisplay {
    fn shape(&self) -> ScreenShape {
        self.shape
    }

    fn cursor_position(&self) -> (i32, i32) {
        *lock(&self.cursor)
    }

    fn keyboard_mapping(&self) -> Result<RawKeyboardMapping, EmulationError> {
        Ok(lock(&self.mapping).clone())
    }

    fn toggle_state(&self) -> ModifierMask {
        *lock(&self.toggles)
    }

    fn fake_key(&self, keycode: KeyCode, press: bool) -> Result<(), EmulationError> {
        self.record(DisplayCall::Key { keycode, press })?;
        if press {
            let mut toggles = lock(&self.toggles);
            match keycode {
                KEYCODE_CAPS_LOCK => toggles.toggle(ModifierMask::CAPS_LOCK),
                KEYCODE_NUM_LOCK => toggles.toggle(ModifierMask::NUM_LOCK),
                _ => {}
            }
        }
        Ok(())
    }

    fn fake_button(&self, button: ButtonId, press: bool) -> Result<(), EmulationError> {
        self.record(DisplayCall::Button { button, press })
    }

    fn fake_motion(&self, x: i32, y: i32) -> Result<(), EmulationError> {
        self.record(DisplayCall::Motion { x, y })?;
        *lock(&self.cursor) = self.shape.clamp(x, y);
        Ok(())
    }

    fn flush(&self) -> Result<(), EmulationError> {
        self.record(DisplayCall::Flush)
    }

    fn show_hider(&self, x: i32, y: i32) {
        lock(&self.calls).push(DisplayCall::ShowHider { x, y });
    }

    fn hide_hider(&self) {
        lock(&self.calls).push(DisplayCall::HideHider);
    }

    fn set_clipboard(&self, id: ClipboardId, clipboard: &Clipboard) -> Result<(), EmulationError> {
        if !id.is_valid() {
            return Err(EmulationError::Platform(format!("no {id}")));
        }
        self.record(DisplayCall::SetClipboard(id))?;
        lock(&self.clipboards)[id.index()] = Some(clipboard.clone());
        Ok(())
    }

    fn clipboard(&self, id: ClipboardId) -> Option<Clipboard> {
        lock(&self.clipboards).get(id.index()).cloned().flatten()
    }

    fn set_screensaver(&self, on: bool) -> Result<(), EmulationError> {
        self.record(DisplayCall::Screensaver(on))
    }

    fn poll_event(&self) -> Option<DisplayEvent> {
        lock(&self.events).pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synergy_core::keymap::buttons;

    #[test]
    fn test_new_mock_has_empty_records() {
        let display = MockDisplay::new();
        assert!(display.take_calls().is_empty());
        assert!(!display.should_fail);
        assert_eq!(display.cursor_position(), (960, 540));
    }

    #[test]
    fn test_caps_lock_press_flips_lock_state() {
        // Arrange
        let display = MockDisplay::new();

        // Act
        display.fake_key(KEYCODE_CAPS_LOCK, true).unwrap();
        display.fake_key(KEYCODE_CAPS_LOCK, false).unwrap();

        // Assert
        assert_eq!(display.toggle_state(), ModifierMask::CAPS_LOCK);
        assert_eq!(display.keys(), vec![(KEYCODE_CAPS_LOCK, true), (KEYCODE_CAPS_LOCK, false)]);
    }

    #[test]
    fn test_motion_is_clamped_to_the_screen() {
        let display = MockDisplay::new();
        display.fake_motion(5000, -3).unwrap();
        assert_eq!(display.cursor_position(), (1919, 0));
    }

    #[test]
    fn test_default_wheel_clicks_down_button() {
        // Arrange
        let display = MockDisplay::new();

        // Act
        display.fake_wheel(-120).unwrap();

        // Assert
        assert_eq!(
            display.take_calls(),
            vec![
                DisplayCall::Button {
                    button: buttons::WHEEL_DOWN,
                    press: true
                },
                DisplayCall::Button {
                    button: buttons::WHEEL_DOWN,
                    press: false
                },
            ]
        );
    }

    #[test]
    fn test_zero_wheel_does_nothing() {
        let display = MockDisplay::new();
        display.fake_wheel(0).unwrap();
        assert!(display.take_calls().is_empty());
    }

    #[test]
    fn test_should_fail_returns_platform_error() {
        // Arrange
        let display = MockDisplay {
            should_fail: true,
            ..MockDisplay::new()
        };

        // Act
        let result = display.fake_key(38, true);

        // Assert
        assert!(matches!(result, Err(EmulationError::Platform(_))));
        assert!(display.keyboard_mapping().is_ok());
    }

    #[test]
    fn test_invalid_clipboard_id_is_rejected() {
        let display = MockDisplay::new();
        let result = display.set_clipboard(ClipboardId(7), &Clipboard::from_text("x"));
        assert!(result.is_err());
        assert!(display.clipboard(ClipboardId(7)).is_none());
    }

    #[test]
    fn test_events_come_out_in_order() {
        let display = MockDisplay::new();
        display.push_event(DisplayEvent::MappingChanged);
        display.push_event(DisplayEvent::HiderLeave);
        assert_eq!(display.poll_event(), Some(DisplayEvent::MappingChanged));
        assert_eq!(display.poll_event(), Some(DisplayEvent::HiderLeave));
        assert_eq!(display.poll_event(), None);
    }
}
