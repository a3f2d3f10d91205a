//! X11-style keysym values and the KeyId ↔ keysym namespace rules.
//!
//! Keysyms are the platform vocabulary the local keymap is built from.
//! Values come from X11 `keysymdef.h`.
//!
//! # Namespace rules
//!
//! | KeyId            | Keysym                     |
//! |------------------|----------------------------|
//! | `0x00XX` Latin-1 | same value                 |
//! | `0xEE20`         | `ISO_Left_Tab` (`0xFE20`)  |
//! | `0xEFXX`         | `0xFFXX`                   |

use crate::keymap::key_id::{keys, KeyId};
use crate::keymap::modifier::{Modifier, ModifierMask};

/// Platform key symbol.
pub type Keysym = u32;

/// The "no symbol" marker in keyboard mapping tables.
pub const NO_SYMBOL: Keysym = 0;

/// Keysym values used by name in this crate.
#[allow(non_upper_case_globals)]
pub mod xk {
    use super::Keysym;

    pub const space: Keysym = 0x0020;
    pub const ISO_Left_Tab: Keysym = 0xFE20;
    pub const BackSpace: Keysym = 0xFF08;
    pub const Tab: Keysym = 0xFF09;
    pub const Return: Keysym = 0xFF0D;
    pub const Pause: Keysym = 0xFF13;
    pub const Scroll_Lock: Keysym = 0xFF14;
    pub const Sys_Req: Keysym = 0xFF15;
    pub const Escape: Keysym = 0xFF1B;
    pub const Home: Keysym = 0xFF50;
    pub const Left: Keysym = 0xFF51;
    pub const Up: Keysym = 0xFF52;
    pub const Right: Keysym = 0xFF53;
    pub const Down: Keysym = 0xFF54;
    pub const Prior: Keysym = 0xFF55;
    pub const Next: Keysym = 0xFF56;
    pub const End: Keysym = 0xFF57;
    pub const Print: Keysym = 0xFF61;
    pub const Insert: Keysym = 0xFF63;
    pub const Menu: Keysym = 0xFF67;
    pub const Break: Keysym = 0xFF6B;
    pub const Num_Lock: Keysym = 0xFF7F;
    pub const KP_Enter: Keysym = 0xFF8D;
    pub const KP_Home: Keysym = 0xFF95;
    pub const KP_Left: Keysym = 0xFF96;
    pub const KP_Up: Keysym = 0xFF97;
    pub const KP_Right: Keysym = 0xFF98;
    pub const KP_Down: Keysym = 0xFF99;
    pub const KP_Prior: Keysym = 0xFF9A;
    pub const KP_Next: Keysym = 0xFF9B;
    pub const KP_End: Keysym = 0xFF9C;
    pub const KP_Begin: Keysym = 0xFF9D;
    pub const KP_Insert: Keysym = 0xFF9E;
    pub const KP_Delete: Keysym = 0xFF9F;
    pub const KP_Multiply: Keysym = 0xFFAA;
    pub const KP_Add: Keysym = 0xFFAB;
    pub const KP_Separator: Keysym = 0xFFAC;
    pub const KP_Subtract: Keysym = 0xFFAD;
    pub const KP_Decimal: Keysym = 0xFFAE;
    pub const KP_Divide: Keysym = 0xFFAF;
    pub const KP_0: Keysym = 0xFFB0;
    pub const KP_9: Keysym = 0xFFB9;
    pub const KP_Equal: Keysym = 0xFFBD;
    pub const F1: Keysym = 0xFFBE;
    pub const F12: Keysym = 0xFFC9;
    pub const Shift_L: Keysym = 0xFFE1;
    pub const Shift_R: Keysym = 0xFFE2;
    pub const Control_L: Keysym = 0xFFE3;
    pub const Control_R: Keysym = 0xFFE4;
    pub const Caps_Lock: Keysym = 0xFFE5;
    pub const Shift_Lock: Keysym = 0xFFE6;
    pub const Meta_L: Keysym = 0xFFE7;
    pub const Meta_R: Keysym = 0xFFE8;
    pub const Alt_L: Keysym = 0xFFE9;
    pub const Alt_R: Keysym = 0xFFEA;
    pub const Super_L: Keysym = 0xFFEB;
    pub const Super_R: Keysym = 0xFFEC;
    pub const Delete: Keysym = 0xFFFF;
}

/// Step A of key synthesis: portable id to keysym.
///
/// Returns `None` for ids outside every known namespace.
pub fn key_id_to_keysym(id: KeyId) -> Option<Keysym> {
    match id.namespace() {
        0x0000 if id.0 != 0 => Some(id.0),
        0xEE00 if id == keys::LEFT_TAB => Some(xk::ISO_Left_Tab),
        0xEF00 => Some(id.0 - 0xEF00 + 0xFF00),
        _ => None,
    }
}

/// Inverse of [`key_id_to_keysym`], used on the primary.
pub fn keysym_to_key_id(keysym: Keysym) -> Option<KeyId> {
    match keysym {
        NO_SYMBOL => None,
        0x0001..=0x00FF => Some(KeyId(keysym)),
        xk::ISO_Left_Tab => Some(keys::LEFT_TAB),
        0xFF00..=0xFFFF => Some(KeyId(keysym - 0xFF00 + 0xEF00)),
        _ => None,
    }
}

/// Substitute for a keysym the local keymap does not carry.
///
/// Laptops often lack a separate keypad, so keypad navigation falls back to
/// the dedicated navigation keys.  `ISO_Left_Tab` falls back to `Tab` with
/// Shift added to the desired mask.
pub fn fallback(keysym: Keysym) -> Option<(Keysym, ModifierMask)> {
    let plain = |k| Some((k, ModifierMask::empty()));
    match keysym {
        xk::KP_Home => plain(xk::Home),
        xk::KP_Left => plain(xk::Left),
        xk::KP_Up => plain(xk::Up),
        xk::KP_Right => plain(xk::Right),
        xk::KP_Down => plain(xk::Down),
        xk::KP_Prior => plain(xk::Prior),
        xk::KP_Next => plain(xk::Next),
        xk::KP_End => plain(xk::End),
        xk::KP_Insert => plain(xk::Insert),
        xk::KP_Delete => plain(xk::Delete),
        xk::ISO_Left_Tab => Some((xk::Tab, ModifierMask::SHIFT)),
        _ => None,
    }
}

/// Keysyms whose meaning depends on NumLock, plus vendor-private keypad keys.
pub fn is_keypad(keysym: Keysym) -> bool {
    (0xFF80..=xk::KP_Equal).contains(&keysym) || (0x1100_0000..=0x1100_FFFF).contains(&keysym)
}

/// Keypad keysyms produced with NumLock on.
pub fn is_keypad_numeric(keysym: Keysym) -> bool {
    (xk::KP_0..=xk::KP_9).contains(&keysym)
        || keysym == xk::KP_Decimal
        || keysym == xk::KP_Separator
}

/// Lower and upper case forms of a Latin-1 keysym.
///
/// Keysyms without case come back unchanged in both positions.
pub fn convert_case(keysym: Keysym) -> (Keysym, Keysym) {
    match keysym {
        0x41..=0x5A => (keysym + 0x20, keysym),
        0x61..=0x7A => (keysym, keysym - 0x20),
        // À..Þ except ×
        0xC0..=0xDE if keysym != 0xD7 => (keysym + 0x20, keysym),
        // à..þ except ÷
        0xE0..=0xFE if keysym != 0xF7 => (keysym, keysym - 0x20),
        // ÿ upper-cases to Ÿ in the Latin-9 block
        0xFF => (keysym, 0x13BE),
        _ => (keysym, keysym),
    }
}

pub fn is_case_convertible(keysym: Keysym) -> bool {
    let (lower, upper) = convert_case(keysym);
    lower != upper
}

/// The modifier a modifier keysym drives, if any.
pub fn modifier_for_keysym(keysym: Keysym) -> Option<Modifier> {
    match keysym {
        xk::Shift_L | xk::Shift_R => Some(Modifier::Shift),
        xk::Control_L | xk::Control_R => Some(Modifier::Control),
        xk::Alt_L | xk::Alt_R | xk::Meta_L | xk::Meta_R => Some(Modifier::Alt),
        xk::Super_L | xk::Super_R => Some(Modifier::Meta),
        xk::Caps_Lock | xk::Shift_Lock => Some(Modifier::CapsLock),
        xk::Num_Lock => Some(Modifier::NumLock),
        xk::Scroll_Lock => Some(Modifier::ScrollLock),
        _ => None,
    }
}

/// The keysym conventionally used to operate a lock modifier.
pub fn toggle_keysym(modifier: Modifier) -> Option<Keysym> {
    match modifier {
        Modifier::CapsLock => Some(xk::Caps_Lock),
        Modifier::NumLock => Some(xk::Num_Lock),
        Modifier::ScrollLock => Some(xk::Scroll_Lock),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latin1_passes_through() {
        assert_eq!(key_id_to_keysym(KeyId(0x61)), Some(0x61));
        assert_eq!(key_id_to_keysym(KeyId(0xE9)), Some(0xE9));
        assert_eq!(key_id_to_keysym(keys::NONE), None);
    }

    #[test]
    fn test_misc_namespace_is_offset() {
        assert_eq!(key_id_to_keysym(keys::SHIFT_L), Some(xk::Shift_L));
        assert_eq!(key_id_to_keysym(keys::KP_HOME), Some(xk::KP_Home));
        assert_eq!(key_id_to_keysym(keys::F1), Some(xk::F1));
    }

    #[test]
    fn test_left_tab_is_the_only_iso_key() {
        assert_eq!(key_id_to_keysym(keys::LEFT_TAB), Some(xk::ISO_Left_Tab));
        assert_eq!(key_id_to_keysym(KeyId(0xEE21)), None);
        assert_eq!(key_id_to_keysym(KeyId(0x1234)), None);
    }

    #[test]
    fn test_keysym_to_key_id_inverts_the_namespaces() {
        for id in [KeyId(0x41), keys::LEFT_TAB, keys::CAPS_LOCK, keys::KP_9] {
            let keysym = key_id_to_keysym(id).unwrap();
            assert_eq!(keysym_to_key_id(keysym), Some(id));
        }
        assert_eq!(keysym_to_key_id(0x1000_0041), None);
    }

    #[test]
    fn test_fallback_table() {
        assert_eq!(fallback(xk::KP_Home), Some((xk::Home, ModifierMask::empty())));
        assert_eq!(fallback(xk::ISO_Left_Tab), Some((xk::Tab, ModifierMask::SHIFT)));
        assert_eq!(fallback(xk::KP_Begin), None);
    }

    #[test]
    fn test_keypad_classification() {
        assert!(is_keypad(xk::KP_Home));
        assert!(is_keypad(xk::KP_0));
        assert!(is_keypad(0x1100_0010));
        assert!(!is_keypad(xk::Home));
        assert!(is_keypad_numeric(xk::KP_Decimal));
        assert!(!is_keypad_numeric(xk::KP_Home));
        assert!(!is_keypad_numeric(xk::KP_Add));
    }

    #[test]
    fn test_convert_case() {
        assert_eq!(convert_case(0x61), (0x61, 0x41));
        assert_eq!(convert_case(0x41), (0x61, 0x41));
        assert_eq!(convert_case(0xC9), (0xE9, 0xC9));
        assert!(!is_case_convertible(0x31));
        assert!(!is_case_convertible(0xD7));
        assert!(is_case_convertible(0xFF));
    }

    #[test]
    fn test_modifier_for_keysym() {
        assert_eq!(modifier_for_keysym(xk::Shift_R), Some(Modifier::Shift));
        assert_eq!(modifier_for_keysym(xk::Meta_L), Some(Modifier::Alt));
        assert_eq!(modifier_for_keysym(xk::Super_L), Some(Modifier::Meta));
        assert_eq!(modifier_for_keysym(xk::Shift_Lock), Some(Modifier::CapsLock));
        assert_eq!(modifier_for_keysym(0x61), None);
    }
}
