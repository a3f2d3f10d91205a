//! Built-in keyboard mappings.
//!
//! [`us_pc105`] reproduces what an X server with the evdev rules reports for
//! a US pc105 keyboard (first two columns only).  The recording display and
//! the headless backends use it, and so do the synthesizer tests.

use crate::keymap::keysym::{xk, Keysym, NO_SYMBOL};
use crate::keymap::local_map::{KeyCode, RawKeyboardMapping, MODIFIER_SLOTS};

pub const KEYCODE_ESCAPE: KeyCode = 9;
pub const KEYCODE_TAB: KeyCode = 23;
pub const KEYCODE_RETURN: KeyCode = 36;
pub const KEYCODE_CONTROL_L: KeyCode = 37;
pub const KEYCODE_A: KeyCode = 38;
pub const KEYCODE_SHIFT_L: KeyCode = 50;
pub const KEYCODE_SHIFT_R: KeyCode = 62;
pub const KEYCODE_ALT_L: KeyCode = 64;
pub const KEYCODE_CAPS_LOCK: KeyCode = 66;
pub const KEYCODE_NUM_LOCK: KeyCode = 77;
pub const KEYCODE_SCROLL_LOCK: KeyCode = 78;
pub const KEYCODE_KP_HOME: KeyCode = 79;
pub const KEYCODE_CONTROL_R: KeyCode = 105;
pub const KEYCODE_ALT_R: KeyCode = 108;
pub const KEYCODE_HOME: KeyCode = 110;
pub const KEYCODE_SUPER_L: KeyCode = 133;
pub const KEYCODE_SUPER_R: KeyCode = 134;

const MIN_KEYCODE: KeyCode = 8;
const MAX_KEYCODE: KeyCode = 135;

const US_PC105: &[(KeyCode, Keysym, Keysym)] = &[
    (KEYCODE_ESCAPE, xk::Escape, NO_SYMBOL),
    (10, 0x31, 0x21), // 1 !
    (11, 0x32, 0x40), // 2 @
    (12, 0x33, 0x23), // 3 #
    (13, 0x34, 0x24), // 4 $
    (14, 0x35, 0x25), // 5 %
    (15, 0x36, 0x5E), // 6 ^
    (16, 0x37, 0x26), // 7 &
    (17, 0x38, 0x2A), // 8 *
    (18, 0x39, 0x28), // 9 (
    (19, 0x30, 0x29), // 0 )
    (20, 0x2D, 0x5F), // - _
    (21, 0x3D, 0x2B), // = +
    (22, xk::BackSpace, NO_SYMBOL),
    (KEYCODE_TAB, xk::Tab, xk::ISO_Left_Tab),
    (24, 0x71, 0x51), // q
    (25, 0x77, 0x57), // w
    (26, 0x65, 0x45), // e
    (27, 0x72, 0x52), // r
    (28, 0x74, 0x54), // t
    (29, 0x79, 0x59), // y
    (30, 0x75, 0x55), // u
    (31, 0x69, 0x49), // i
    (32, 0x6F, 0x4F), // o
    (33, 0x70, 0x50), // p
    (34, 0x5B, 0x7B), // [ {
    (35, 0x5D, 0x7D), // ] }
    (KEYCODE_RETURN, xk::Return, NO_SYMBOL),
    (KEYCODE_CONTROL_L, xk::Control_L, NO_SYMBOL),
    (KEYCODE_A, 0x61, 0x41),
    (39, 0x73, 0x53), // s
    (40, 0x64, 0x44), // d
    (41, 0x66, 0x46), // f
    (42, 0x67, 0x47), // g
    (43, 0x68, 0x48), // h
    (44, 0x6A, 0x4A), // j
    (45, 0x6B, 0x4B), // k
    (46, 0x6C, 0x4C), // l
    (47, 0x3B, 0x3A), // ; :
    (48, 0x27, 0x22), // ' "
    (49, 0x60, 0x7E), // ` ~
    (KEYCODE_SHIFT_L, xk::Shift_L, NO_SYMBOL),
    (51, 0x5C, 0x7C), // \ |
    (52, 0x7A, 0x5A), // z
    (53, 0x78, 0x58), // x
    (54, 0x63, 0x43), // c
    (55, 0x76, 0x56), // v
    (56, 0x62, 0x42), // b
    (57, 0x6E, 0x4E), // n
    (58, 0x6D, 0x4D), // m
    (59, 0x2C, 0x3C), // , <
    (60, 0x2E, 0x3E), // . >
    (61, 0x2F, 0x3F), // / ?
    (KEYCODE_SHIFT_R, xk::Shift_R, NO_SYMBOL),
    (63, xk::KP_Multiply, NO_SYMBOL),
    (KEYCODE_ALT_L, xk::Alt_L, xk::Meta_L),
    (65, xk::space, NO_SYMBOL),
    (KEYCODE_CAPS_LOCK, xk::Caps_Lock, NO_SYMBOL),
    (67, xk::F1, NO_SYMBOL),
    (68, xk::F1 + 1, NO_SYMBOL),
    (69, xk::F1 + 2, NO_SYMBOL),
    (70, xk::F1 + 3, NO_SYMBOL),
    (71, xk::F1 + 4, NO_SYMBOL),
    (72, xk::F1 + 5, NO_SYMBOL),
    (73, xk::F1 + 6, NO_SYMBOL),
    (74, xk::F1 + 7, NO_SYMBOL),
    (75, xk::F1 + 8, NO_SYMBOL),
    (76, xk::F1 + 9, NO_SYMBOL),
    (KEYCODE_NUM_LOCK, xk::Num_Lock, NO_SYMBOL),
    (KEYCODE_SCROLL_LOCK, xk::Scroll_Lock, NO_SYMBOL),
    (KEYCODE_KP_HOME, xk::KP_Home, xk::KP_0 + 7),
    (80, xk::KP_Up, xk::KP_0 + 8),
    (81, xk::KP_Prior, xk::KP_0 + 9),
    (82, xk::KP_Subtract, NO_SYMBOL),
    (83, xk::KP_Left, xk::KP_0 + 4),
    (84, xk::KP_Begin, xk::KP_0 + 5),
    (85, xk::KP_Right, xk::KP_0 + 6),
    (86, xk::KP_Add, NO_SYMBOL),
    (87, xk::KP_End, xk::KP_0 + 1),
    (88, xk::KP_Down, xk::KP_0 + 2),
    (89, xk::KP_Next, xk::KP_0 + 3),
    (90, xk::KP_Insert, xk::KP_0),
    (91, xk::KP_Delete, xk::KP_Decimal),
    (94, 0x3C, 0x3E), // < > (pc105 extra key)
    (95, xk::F1 + 10, NO_SYMBOL),
    (96, xk::F12, NO_SYMBOL),
    (104, xk::KP_Enter, NO_SYMBOL),
    (KEYCODE_CONTROL_R, xk::Control_R, NO_SYMBOL),
    (106, xk::KP_Divide, NO_SYMBOL),
    (107, xk::Print, xk::Sys_Req),
    (KEYCODE_ALT_R, xk::Alt_R, xk::Meta_R),
    (KEYCODE_HOME, xk::Home, NO_SYMBOL),
    (111, xk::Up, NO_SYMBOL),
    (112, xk::Prior, NO_SYMBOL),
    (113, xk::Left, NO_SYMBOL),
    (114, xk::Right, NO_SYMBOL),
    (115, xk::End, NO_SYMBOL),
    (116, xk::Down, NO_SYMBOL),
    (117, xk::Next, NO_SYMBOL),
    (118, xk::Insert, NO_SYMBOL),
    (119, xk::Delete, NO_SYMBOL),
    (127, xk::Pause, xk::Break),
    (KEYCODE_SUPER_L, xk::Super_L, NO_SYMBOL),
    (KEYCODE_SUPER_R, xk::Super_R, NO_SYMBOL),
    (135, xk::Menu, NO_SYMBOL),
];

/// US pc105 keyboard mapping with Scroll_Lock on Mod3 and Super on Mod4.
pub fn us_pc105() -> RawKeyboardMapping {
    let count = (MAX_KEYCODE - MIN_KEYCODE) as usize + 1;
    let mut keysyms = vec![NO_SYMBOL; count * 2];
    for &(keycode, plain, shifted) in US_PC105 {
        let row = (keycode - MIN_KEYCODE) as usize * 2;
        keysyms[row] = plain;
        keysyms[row + 1] = shifted;
    }

    let mut modifier_slots: [Vec<KeyCode>; MODIFIER_SLOTS] = Default::default();
    modifier_slots[0] = vec![KEYCODE_SHIFT_L, KEYCODE_SHIFT_R];
    modifier_slots[1] = vec![KEYCODE_CAPS_LOCK];
    modifier_slots[2] = vec![KEYCODE_CONTROL_L, KEYCODE_CONTROL_R];
    modifier_slots[3] = vec![KEYCODE_ALT_L, KEYCODE_ALT_R];
    modifier_slots[4] = vec![KEYCODE_NUM_LOCK];
    modifier_slots[5] = vec![KEYCODE_SCROLL_LOCK];
    modifier_slots[6] = vec![KEYCODE_SUPER_L, KEYCODE_SUPER_R];

    RawKeyboardMapping {
        min_keycode: MIN_KEYCODE,
        keysyms_per_keycode: 2,
        keysyms,
        modifier_slots,
    }
}
