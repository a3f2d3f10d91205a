//! Portable key identifiers.
//!
//! A [`KeyId`] names *what* a key means, independent of any platform's
//! keycodes.  The value space is split into namespaces by the upper bits:
//!
//! | Range             | Meaning                                        |
//! |-------------------|------------------------------------------------|
//! | `0x0020..=0x00FF` | Latin-1 characters, the value is the code point |
//! | `0xEE00..=0xEEFF` | ISO 9995 function keys (only left-tab is used)  |
//! | `0xEF00..=0xEFFF` | miscellany: editing, navigation, keypad, F-keys and modifiers |
//!
//! The miscellany block mirrors the X11 `0xFF00` keysym block one-for-one,
//! shifted down by `0x1000`, which is what makes the conversion in
//! [`crate::keymap::keysym`] a simple offset.

use std::fmt;

use serde::Serialize;

/// Portable, layout-independent key identifier sent on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct KeyId(pub u32);

impl KeyId {
    /// The identifier of a Latin-1 character, or `None` outside Latin-1.
    pub fn from_char(c: char) -> Option<KeyId> {
        let code = c as u32;
        (0x20..=0xFF).contains(&code).then_some(KeyId(code))
    }

    /// Upper 24 bits select the namespace.
    pub fn namespace(self) -> u32 {
        self.0 & 0xFFFF_FF00
    }

    pub fn is_latin1(self) -> bool {
        self.namespace() == 0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match char::from_u32(self.0) {
            Some(c) if self.is_latin1() && !c.is_control() => write!(f, "KeyId({c:?})"),
            _ => write!(f, "KeyId({:#06x})", self.0),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// The primary's native keycode for a key event, echoed back on release so
/// the secondary can match a release to its press.
pub type KeyButton = u16;

/// Mouse button number: 1 left, 2 middle, 3 right, 4/5 wheel.
pub type ButtonId = u8;

pub mod buttons {
    use super::ButtonId;

    pub const LEFT: ButtonId = 1;
    pub const MIDDLE: ButtonId = 2;
    pub const RIGHT: ButtonId = 3;
    pub const WHEEL_UP: ButtonId = 4;
    pub const WHEEL_DOWN: ButtonId = 5;
}

/// Named identifiers outside the Latin-1 range.
pub mod keys {
    use super::KeyId;

    pub const NONE: KeyId = KeyId(0);

    // ISO 9995
    pub const LEFT_TAB: KeyId = KeyId(0xEE20);

    // Editing
    pub const BACKSPACE: KeyId = KeyId(0xEF08);
    pub const TAB: KeyId = KeyId(0xEF09);
    pub const RETURN: KeyId = KeyId(0xEF0D);
    pub const PAUSE: KeyId = KeyId(0xEF13);
    pub const SCROLL_LOCK: KeyId = KeyId(0xEF14);
    pub const SYS_REQ: KeyId = KeyId(0xEF15);
    pub const ESCAPE: KeyId = KeyId(0xEF1B);
    pub const DELETE: KeyId = KeyId(0xEFFF);

    // Navigation
    pub const HOME: KeyId = KeyId(0xEF50);
    pub const LEFT: KeyId = KeyId(0xEF51);
    pub const UP: KeyId = KeyId(0xEF52);
    pub const RIGHT: KeyId = KeyId(0xEF53);
    pub const DOWN: KeyId = KeyId(0xEF54);
    pub const PAGE_UP: KeyId = KeyId(0xEF55);
    pub const PAGE_DOWN: KeyId = KeyId(0xEF56);
    pub const END: KeyId = KeyId(0xEF57);
    pub const PRINT: KeyId = KeyId(0xEF61);
    pub const INSERT: KeyId = KeyId(0xEF63);
    pub const MENU: KeyId = KeyId(0xEF67);
    pub const BREAK: KeyId = KeyId(0xEF6B);
    pub const NUM_LOCK: KeyId = KeyId(0xEF7F);

    // Keypad
    pub const KP_ENTER: KeyId = KeyId(0xEF8D);
    pub const KP_HOME: KeyId = KeyId(0xEF95);
    pub const KP_LEFT: KeyId = KeyId(0xEF96);
    pub const KP_UP: KeyId = KeyId(0xEF97);
    pub const KP_RIGHT: KeyId = KeyId(0xEF98);
    pub const KP_DOWN: KeyId = KeyId(0xEF99);
    pub const KP_PAGE_UP: KeyId = KeyId(0xEF9A);
    pub const KP_PAGE_DOWN: KeyId = KeyId(0xEF9B);
    pub const KP_END: KeyId = KeyId(0xEF9C);
    pub const KP_BEGIN: KeyId = KeyId(0xEF9D);
    pub const KP_INSERT: KeyId = KeyId(0xEF9E);
    pub const KP_DELETE: KeyId = KeyId(0xEF9F);
    pub const KP_MULTIPLY: KeyId = KeyId(0xEFAA);
    pub const KP_ADD: KeyId = KeyId(0xEFAB);
    pub const KP_SUBTRACT: KeyId = KeyId(0xEFAD);
    pub const KP_DECIMAL: KeyId = KeyId(0xEFAE);
    pub const KP_DIVIDE: KeyId = KeyId(0xEFAF);
    pub const KP_0: KeyId = KeyId(0xEFB0);
    pub const KP_7: KeyId = KeyId(0xEFB7);
    pub const KP_9: KeyId = KeyId(0xEFB9);

    // Function keys
    pub const F1: KeyId = KeyId(0xEFBE);
    pub const F12: KeyId = KeyId(0xEFC9);

    // Modifiers
    pub const SHIFT_L: KeyId = KeyId(0xEFE1);
    pub const SHIFT_R: KeyId = KeyId(0xEFE2);
    pub const CONTROL_L: KeyId = KeyId(0xEFE3);
    pub const CONTROL_R: KeyId = KeyId(0xEFE4);
    pub const CAPS_LOCK: KeyId = KeyId(0xEFE5);
    pub const META_L: KeyId = KeyId(0xEFE7);
    pub const META_R: KeyId = KeyId(0xEFE8);
    pub const ALT_L: KeyId = KeyId(0xEFE9);
    pub const ALT_R: KeyId = KeyId(0xEFEA);
    pub const SUPER_L: KeyId = KeyId(0xEFEB);
    pub const SUPER_R: KeyId = KeyId(0xEFEC);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_char_accepts_latin1_only() {
        assert_eq!(KeyId::from_char('a'), Some(KeyId(0x61)));
        assert_eq!(KeyId::from_char('é'), Some(KeyId(0xE9)));
        assert_eq!(KeyId::from_char('€'), None);
        assert_eq!(KeyId::from_char('\n'), None);
    }

    #[test]
    fn test_namespaces() {
        assert!(KeyId(0x41).is_latin1());
        assert_eq!(keys::LEFT_TAB.namespace(), 0xEE00);
        assert_eq!(keys::SHIFT_L.namespace(), 0xEF00);
    }

    #[test]
    fn test_debug_shows_printable_characters() {
        assert_eq!(format!("{:?}", KeyId(0x41)), "KeyId('A')");
        assert_eq!(format!("{:?}", keys::TAB), "KeyId(0xef09)");
    }
}
