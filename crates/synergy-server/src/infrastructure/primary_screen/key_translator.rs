//! Native keycode → portable key id translation for the primary keyboard.
//!
//! The secondary's synthesizer maps a key id to a keycode; this is the
//! reverse direction.  The translator keeps its own modifier state so it can
//! pick the right column of the keyboard mapping:
//!
//! - column 1 while Shift is held, column 0 otherwise;
//! - CapsLock flips the case of letters;
//! - on a keypad key whose shifted column is a digit, NumLock selects the
//!   digit and Shift inverts that choice.
//!
//! A press of a key that is already down is auto-repeat and is reported as
//! [`KeyAction::Repeat`].  A release reports the id the press did, even if
//! the modifiers changed in between, so the secondary always releases what it
//! pressed.

use std::collections::BTreeMap;

use synergy_core::keymap::keysym::{self, keysym_to_key_id, Keysym};
use synergy_core::keymap::{KeyAction, KeyCode, KeymapError, LocalKeyMap, RawKeyboardMapping};
use synergy_core::{KeyId, ModifierMask};
use tracing::{debug, trace};

use super::KeyEvent;

pub struct KeyTranslator {
    keymap: LocalKeyMap,
    mask: ModifierMask,
    /// Keys currently down and the id their press reported.
    held: BTreeMap<KeyCode, KeyId>,
}

impl KeyTranslator {
    pub fn new(raw: RawKeyboardMapping) -> Result<Self, KeymapError> {
        Ok(Self {
            keymap: LocalKeyMap::build(raw)?,
            mask: ModifierMask::empty(),
            held: BTreeMap::new(),
        })
    }

    /// Replaces the keyboard mapping after the display reported a change.
    ///
    /// Held keys keep the ids they were pressed with.
    pub fn set_mapping(&mut self, raw: RawKeyboardMapping) -> Result<(), KeymapError> {
        self.keymap = LocalKeyMap::build(raw)?;
        debug!("primary keyboard mapping reloaded");
        Ok(())
    }

    pub fn mask(&self) -> ModifierMask {
        self.mask
    }

    /// Seeds the lock-key state from the display.
    pub fn set_toggles(&mut self, toggles: ModifierMask) {
        self.mask = (self.mask - ModifierMask::TOGGLES) | toggles.toggles();
    }

    /// Translates a key press.  Returns `None` for keycodes with no keysym.
    pub fn press(&mut self, keycode: KeyCode) -> Option<KeyEvent> {
        if let Some(&id) = self.held.get(&keycode) {
            return Some(self.event(KeyAction::Repeat, id, keycode));
        }

        let Some(id) = self.resolve(keycode) else {
            trace!(keycode, "unmapped key press dropped");
            return None;
        };
        let event = self.event(KeyAction::Press, id, keycode);
        self.held.insert(keycode, id);

        if let Some(modifier) = self.keymap.modifier_of(keycode) {
            if modifier.is_toggle() {
                self.mask.toggle(modifier.mask());
            } else {
                self.mask.insert(modifier.mask());
            }
        }
        Some(event)
    }

    /// Translates a key release.  Returns `None` for keys that were never
    /// reported as pressed.
    pub fn release(&mut self, keycode: KeyCode) -> Option<KeyEvent> {
        let id = self.held.remove(&keycode)?;
        let event = self.event(KeyAction::Release, id, keycode);

        if let Some(modifier) = self.keymap.modifier_of(keycode) {
            let still_held = self
                .keymap
                .modifier_keys(modifier)
                .iter()
                .any(|k| self.held.contains_key(k));
            if !modifier.is_toggle() && !still_held {
                self.mask.remove(modifier.mask());
            }
        }
        Some(event)
    }

    /// Forgets every held key, e.g. after the keyboard grab was lost.
    pub fn reset(&mut self) {
        self.held.clear();
        self.mask = self.mask.toggles();
    }

    fn event(&self, action: KeyAction, id: KeyId, keycode: KeyCode) -> KeyEvent {
        KeyEvent {
            action,
            id,
            mask: self.mask,
            button: u16::from(keycode),
            count: 1,
        }
    }

    fn resolve(&self, keycode: KeyCode) -> Option<KeyId> {
        let raw = self.keymap.raw();
        let plain = raw.keysym(keycode, 0);
        let shifted = raw.keysym(keycode, 1);
        let shift = self.mask.contains(ModifierMask::SHIFT);

        let sym: Keysym = match (plain, shifted) {
            (Some(plain), Some(shifted)) if keysym::is_keypad_numeric(shifted) => {
                if self.mask.contains(ModifierMask::NUM_LOCK) != shift {
                    shifted
                } else {
                    plain
                }
            }
            (Some(plain), Some(shifted)) => {
                let sym = if shift { shifted } else { plain };
                if self.mask.contains(ModifierMask::CAPS_LOCK) && keysym::is_case_convertible(sym) {
                    let (lower, upper) = keysym::convert_case(sym);
                    if sym == lower {
                        upper
                    } else {
                        lower
                    }
                } else {
                    sym
                }
            }
            (Some(plain), None) => {
                if self.mask.contains(ModifierMask::CAPS_LOCK) != shift
                    && keysym::is_case_convertible(plain)
                {
                    keysym::convert_case(plain).1
                } else {
                    plain
                }
            }
            (None, Some(shifted)) => shifted,
            (None, None) => return None,
        };
        keysym_to_key_id(sym)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synergy_core::keymap::keys;
    use synergy_core::keymap::layouts::{
        us_pc105, KEYCODE_A, KEYCODE_CAPS_LOCK, KEYCODE_KP_HOME, KEYCODE_NUM_LOCK, KEYCODE_SHIFT_L,
        KEYCODE_SHIFT_R,
    };

    fn translator() -> KeyTranslator {
        KeyTranslator::new(us_pc105()).unwrap()
    }

    fn tap(t: &mut KeyTranslator, keycode: KeyCode) -> KeyEvent {
        let event = t.press(keycode).unwrap();
        t.release(keycode).unwrap();
        event
    }

    #[test]
    fn test_plain_press_reports_lower_case() {
        // Arrange
        let mut t = translator();

        // Act
        let event = t.press(KEYCODE_A).unwrap();

        // Assert
        assert_eq!(event.action, KeyAction::Press);
        assert_eq!(event.id, KeyId(0x61));
        assert_eq!(event.button, u16::from(KEYCODE_A));
        assert_eq!(event.mask, ModifierMask::empty());
    }

    #[test]
    fn test_shift_selects_second_column_and_sets_mask() {
        // Arrange
        let mut t = translator();
        let shift = t.press(KEYCODE_SHIFT_L).unwrap();

        // Act
        let event = t.press(KEYCODE_A).unwrap();

        // Assert
        assert_eq!(shift.id, keys::SHIFT_L);
        assert_eq!(event.id, KeyId(0x41));
        assert_eq!(event.mask, ModifierMask::SHIFT);
    }

    #[test]
    fn test_shift_stays_while_other_shift_is_held() {
        // Arrange
        let mut t = translator();
        t.press(KEYCODE_SHIFT_L).unwrap();
        t.press(KEYCODE_SHIFT_R).unwrap();

        // Act
        t.release(KEYCODE_SHIFT_L).unwrap();
        let still = t.mask();
        t.release(KEYCODE_SHIFT_R).unwrap();

        // Assert
        assert_eq!(still, ModifierMask::SHIFT);
        assert_eq!(t.mask(), ModifierMask::empty());
    }

    #[test]
    fn test_caps_lock_toggles_on_press_and_upper_cases_letters() {
        // Arrange
        let mut t = translator();

        // Act
        tap(&mut t, KEYCODE_CAPS_LOCK);
        let upper = tap(&mut t, KEYCODE_A);
        t.press(KEYCODE_SHIFT_L).unwrap();
        let lower = tap(&mut t, KEYCODE_A);
        t.release(KEYCODE_SHIFT_L).unwrap();
        tap(&mut t, KEYCODE_CAPS_LOCK);

        // Assert
        assert_eq!(upper.id, KeyId(0x41));
        assert_eq!(lower.id, KeyId(0x61));
        assert_eq!(t.mask(), ModifierMask::empty());
    }

    #[test]
    fn test_num_lock_selects_keypad_digit() {
        // Arrange
        let mut t = translator();
        let home = tap(&mut t, KEYCODE_KP_HOME);

        // Act
        tap(&mut t, KEYCODE_NUM_LOCK);
        let digit = tap(&mut t, KEYCODE_KP_HOME);

        // Assert
        assert_eq!(home.id, keys::KP_HOME);
        assert_eq!(digit.id, keys::KP_7);
        assert!(t.mask().contains(ModifierMask::NUM_LOCK));
    }

    #[test]
    fn test_second_press_without_release_is_repeat() {
        // Arrange
        let mut t = translator();
        t.press(KEYCODE_A).unwrap();

        // Act
        let repeat = t.press(KEYCODE_A).unwrap();

        // Assert
        assert_eq!(repeat.action, KeyAction::Repeat);
        assert_eq!(repeat.id, KeyId(0x61));
        assert_eq!(repeat.count, 1);
    }

    #[test]
    fn test_release_reports_id_of_press() {
        // Arrange: 'a' pressed, then Shift pressed while 'a' is still down
        let mut t = translator();
        t.press(KEYCODE_A).unwrap();
        t.press(KEYCODE_SHIFT_L).unwrap();

        // Act
        let release = t.release(KEYCODE_A).unwrap();

        // Assert
        assert_eq!(release.action, KeyAction::Release);
        assert_eq!(release.id, KeyId(0x61));
    }

    #[test]
    fn test_unknown_release_and_unmapped_press_are_dropped() {
        let mut t = translator();
        assert!(t.release(KEYCODE_A).is_none());
        assert!(t.press(255).is_none());
    }

    #[test]
    fn test_set_toggles_and_reset_keep_lock_state() {
        // Arrange
        let mut t = translator();
        t.set_toggles(ModifierMask::NUM_LOCK | ModifierMask::SHIFT);
        t.press(KEYCODE_SHIFT_L).unwrap();

        // Act
        t.reset();

        // Assert
        assert_eq!(t.mask(), ModifierMask::NUM_LOCK);
        assert!(t.release(KEYCODE_SHIFT_L).is_none());
    }
}
