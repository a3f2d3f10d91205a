//! The local keyboard map a secondary synthesizes against.
//!
//! A [`RawKeyboardMapping`] is what a display backend reports: a keysym
//! table indexed by keycode and column, plus the eight X-style modifier
//! slots (Shift, Lock, Control, Mod1..Mod5) listing the keycodes that drive
//! each slot.  [`LocalKeyMap::build`] turns it into the lookups the key
//! synthesizer needs:
//!
//! - keysym → [`KeyEntry`] (keycode plus the modifier bits that select the
//!   keysym and the bits that matter for that keycode),
//! - portable [`Modifier`] → keycodes,
//! - keycode → [`Modifier`].
//!
//! Only the first two columns are used: column 0 is the plain keysym and
//! column 1 the shifted one.  Deeper columns depend on group and level
//! modifiers that have no portable meaning.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::keymap::keysym::{self, Keysym, NO_SYMBOL};
use crate::keymap::modifier::{Modifier, ModifierMask};

/// Platform-local physical key number.
pub type KeyCode = u8;

/// Number of X-style modifier slots.
pub const MODIFIER_SLOTS: usize = 8;

/// Slot index → portable modifier, used when a slot's keycodes carry a keysym
/// that [`keysym::modifier_for_keysym`] does not recognise.
const SLOT_DEFAULTS: [Option<Modifier>; MODIFIER_SLOTS] = [
    Some(Modifier::Shift),
    Some(Modifier::CapsLock),
    Some(Modifier::Control),
    None,
    None,
    None,
    None,
    None,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeymapError {
    #[error("keyboard mapping reports zero keysyms per keycode")]
    ZeroWidth,

    #[error("{len} keysyms is not a multiple of {per_keycode} keysyms per keycode")]
    Ragged { len: usize, per_keycode: usize },

    #[error("keycodes {min}..{end} run past 255")]
    KeycodeOverflow { min: KeyCode, end: usize },
}

/// A keyboard mapping as reported by the display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawKeyboardMapping {
    pub min_keycode: KeyCode,
    pub keysyms_per_keycode: usize,
    /// Row-major: `keysyms[(keycode - min_keycode) * keysyms_per_keycode + column]`.
    pub keysyms: Vec<Keysym>,
    pub modifier_slots: [Vec<KeyCode>; MODIFIER_SLOTS],
}

impl RawKeyboardMapping {
    pub fn validate(&self) -> Result<(), KeymapError> {
        if self.keysyms_per_keycode == 0 {
            return Err(KeymapError::ZeroWidth);
        }
        if self.keysyms.len() % self.keysyms_per_keycode != 0 {
            return Err(KeymapError::Ragged {
                len: self.keysyms.len(),
                per_keycode: self.keysyms_per_keycode,
            });
        }
        let end = self.min_keycode as usize + self.keycode_count();
        if end > 256 {
            return Err(KeymapError::KeycodeOverflow {
                min: self.min_keycode,
                end,
            });
        }
        Ok(())
    }

    pub fn keycode_count(&self) -> usize {
        self.keysyms
            .len()
            .checked_div(self.keysyms_per_keycode)
            .unwrap_or(0)
    }

    /// Keysym at `column` of `keycode`, `None` for unmapped or `NoSymbol`.
    pub fn keysym(&self, keycode: KeyCode, column: usize) -> Option<Keysym> {
        if column >= self.keysyms_per_keycode || keycode < self.min_keycode {
            return None;
        }
        let row = (keycode - self.min_keycode) as usize;
        self.keysyms
            .get(row * self.keysyms_per_keycode + column)
            .copied()
            .filter(|&k| k != NO_SYMBOL)
    }

    /// Every keycode the table covers.
    pub fn keycodes(&self) -> impl Iterator<Item = KeyCode> + '_ {
        (0..self.keycode_count()).map(move |i| self.min_keycode.wrapping_add(i as u8))
    }
}

/// How to produce one keysym.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEntry {
    pub keycode: KeyCode,
    /// Modifier bits that must be asserted for `keycode` to produce the keysym.
    pub key_mask: ModifierMask,
    /// Modifier bits whose state affects what `keycode` produces.
    pub key_mask_mask: ModifierMask,
}

/// Lookup tables derived from a [`RawKeyboardMapping`].
#[derive(Debug, Clone)]
pub struct LocalKeyMap {
    raw: RawKeyboardMapping,
    by_keysym: HashMap<Keysym, KeyEntry>,
    modifier_keys: [Vec<KeyCode>; 7],
    keycode_modifier: HashMap<KeyCode, Modifier>,
}

impl LocalKeyMap {
    /// Builds the lookups.  When two keycodes produce the same keysym the
    /// lower keycode (or lower column) wins.
    pub fn build(raw: RawKeyboardMapping) -> Result<Self, KeymapError> {
        raw.validate()?;

        let mut by_keysym = HashMap::new();
        let columns = raw.keysyms_per_keycode.min(2);
        for keycode in raw.keycodes() {
            let syms: Vec<Keysym> = (0..columns)
                .map_while(|column| raw.keysym(keycode, column))
                .collect();
            if syms.is_empty() {
                continue;
            }

            let keypad_pair = syms.len() == 2 && keysym::is_keypad_numeric(syms[1]);
            let key_mask_mask = match syms.len() {
                1 => ModifierMask::empty(),
                _ if keypad_pair => ModifierMask::SHIFT | ModifierMask::NUM_LOCK,
                _ => ModifierMask::SHIFT | ModifierMask::CAPS_LOCK,
            };
            for (column, &sym) in syms.iter().enumerate() {
                let key_mask = match column {
                    0 => ModifierMask::empty(),
                    _ if keypad_pair => ModifierMask::NUM_LOCK,
                    _ => ModifierMask::SHIFT,
                };
                by_keysym.entry(sym).or_insert(KeyEntry {
                    keycode,
                    key_mask,
                    key_mask_mask,
                });
            }
        }

        let mut modifier_keys: [Vec<KeyCode>; 7] = Default::default();
        let mut keycode_modifier = HashMap::new();
        for (slot, keycodes) in raw.modifier_slots.iter().enumerate() {
            for &keycode in keycodes.iter().filter(|&&k| k != 0) {
                let modifier = raw
                    .keysym(keycode, 0)
                    .and_then(keysym::modifier_for_keysym)
                    .or(SLOT_DEFAULTS[slot]);
                let Some(modifier) = modifier else {
                    debug!(keycode, slot, "modifier slot keycode has no portable meaning");
                    continue;
                };
                let list = &mut modifier_keys[modifier.index()];
                if !list.contains(&keycode) {
                    list.push(keycode);
                }
                keycode_modifier.entry(keycode).or_insert(modifier);
            }
        }

        debug!(
            keysyms = by_keysym.len(),
            modifiers = %Self::supported_of(&modifier_keys),
            "local keymap built"
        );
        Ok(Self {
            raw,
            by_keysym,
            modifier_keys,
            keycode_modifier,
        })
    }

    pub fn lookup(&self, keysym: Keysym) -> Option<&KeyEntry> {
        self.by_keysym.get(&keysym)
    }

    /// Keycodes that drive `modifier`, in slot order.
    pub fn modifier_keys(&self, modifier: Modifier) -> &[KeyCode] {
        &self.modifier_keys[modifier.index()]
    }

    /// The modifier `keycode` drives, if it is a modifier key.
    pub fn modifier_of(&self, keycode: KeyCode) -> Option<Modifier> {
        self.keycode_modifier.get(&keycode).copied()
    }

    /// Modifiers with at least one keycode.
    pub fn supported_modifiers(&self) -> ModifierMask {
        Self::supported_of(&self.modifier_keys)
    }

    fn supported_of(modifier_keys: &[Vec<KeyCode>; 7]) -> ModifierMask {
        Modifier::ALL
            .into_iter()
            .filter(|m| !modifier_keys[m.index()].is_empty())
            .fold(ModifierMask::empty(), |acc, m| acc | m.mask())
    }

    pub fn raw(&self) -> &RawKeyboardMapping {
        &self.raw
    }
}
