//! Key-event synthesis: portable key events in, local keystroke plans out.
//!
//! The server sends `(KeyId, ModifierMask, action)`.  The secondary has to
//! press local keycodes so that its windowing system delivers that key with
//! the intended modifiers, and afterwards leave the modifier keys exactly as
//! the user left them.  [`KeySynthesizer`] does this in two phases:
//!
//! 1. [`KeySynthesizer::map_key`] is pure.  It resolves the key id to a
//!    keysym, works out which modifier bits the keycode needs, and builds a
//!    plan: modifier-bridging strokes, the key itself, then the bridging
//!    strokes undone in reverse order.
//! 2. [`KeySynthesizer::commit`] records the effect of the key on the
//!    shadow state (the set of synthetic keys held down and the shadow
//!    modifier mask).
//!
//! Keeping the phases apart lets the driver compute a plan under its lock,
//! release the lock and hand the plan to the display backend.
//!
//! ## Half-duplex locks
//!
//! Some keyboards (mostly laptops) report CapsLock or NumLock as a single
//! press that flips the lock.  For those keys a release or repeat from the
//! server is dropped, and a press while the lock is already on is played as
//! a release so the display sees the lock go off.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{debug, trace};

use crate::keymap::key_id::{keys, KeyId};
use crate::keymap::keysym::{self, xk};
use crate::keymap::local_map::{KeyCode, LocalKeyMap};
use crate::keymap::modifier::{Modifier, ModifierMask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Press,
    Release,
    Repeat,
}

/// One synthetic key event.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keystroke {
    pub keycode: KeyCode,
    pub press: bool,
    /// Part of the run the driver replays once per repeat count.
    pub repeat: bool,
}

impl Keystroke {
    pub const fn press(keycode: KeyCode) -> Self {
        Self {
            keycode,
            press: true,
            repeat: false,
        }
    }

    pub const fn release(keycode: KeyCode) -> Self {
        Self {
            keycode,
            press: false,
            repeat: false,
        }
    }

    const fn repeated(self) -> Self {
        Self {
            repeat: true,
            ..self
        }
    }
}

impl fmt::Debug for Keystroke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edge = if self.press { '↓' } else { '↑' };
        let repeat = if self.repeat { "r" } else { "" };
        write!(f, "{}{edge}{repeat}", self.keycode)
    }
}

/// Result of [`KeySynthesizer::map_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedKey {
    /// The keycode that produces the requested key.
    pub keycode: KeyCode,
    pub plan: Vec<Keystroke>,
    /// Shadow modifier mask once the plan has been played.
    pub mask: ModifierMask,
    /// The action after half-duplex rewriting.
    pub action: KeyAction,
}

/// Shadow keyboard state of a secondary plus the mapping algorithm.
#[derive(Debug, Clone)]
pub struct KeySynthesizer {
    keymap: LocalKeyMap,
    keys_down: BTreeSet<KeyCode>,
    mask: ModifierMask,
    half_duplex: ModifierMask,
}

impl KeySynthesizer {
    pub fn new(keymap: LocalKeyMap) -> Self {
        Self {
            keymap,
            keys_down: BTreeSet::new(),
            mask: ModifierMask::empty(),
            half_duplex: ModifierMask::empty(),
        }
    }

    pub fn keymap(&self) -> &LocalKeyMap {
        &self.keymap
    }

    /// Shadow modifier mask.
    pub fn mask(&self) -> ModifierMask {
        self.mask
    }

    /// Overwrites the shadow mask, e.g. with the toggle state the display
    /// reports on enter.
    pub fn set_mask(&mut self, mask: ModifierMask) {
        self.mask = mask;
    }

    /// Synthetic keys currently held down.
    pub fn keys_down(&self) -> &BTreeSet<KeyCode> {
        &self.keys_down
    }

    pub fn half_duplex(&self) -> ModifierMask {
        self.half_duplex
    }

    /// Marks CapsLock or NumLock as half-duplex.  Other modifiers are ignored.
    pub fn set_half_duplex(&mut self, modifier: Modifier, enabled: bool) {
        if matches!(modifier, Modifier::CapsLock | Modifier::NumLock) {
            self.half_duplex.set(modifier.mask(), enabled);
        }
    }

    /// Installs a rebuilt keymap.  Keys held under the old map are released
    /// first; the returned plan carries those releases.
    pub fn set_keymap(&mut self, keymap: LocalKeyMap) -> Vec<Keystroke> {
        let released = self.release_all();
        self.keymap = keymap;
        released
    }

    fn is_half_duplex_key(&self, id: KeyId) -> bool {
        (id == keys::CAPS_LOCK && self.half_duplex.contains(ModifierMask::CAPS_LOCK))
            || (id == keys::NUM_LOCK && self.half_duplex.contains(ModifierMask::NUM_LOCK))
    }

    /// Computes the keystroke plan for one key event without touching the
    /// shadow state.  `None` means the event cannot be produced locally and
    /// should be dropped.
    pub fn map_key(&self, id: KeyId, desired: ModifierMask, action: KeyAction) -> Option<MappedKey> {
        let half_duplex = self.is_half_duplex_key(id);
        if half_duplex && action != KeyAction::Press {
            return None;
        }

        // Keysym and the keycode producing it.  Bits this side has no
        // modifier for are ignored.
        let mut desired = desired & ModifierMask::all();
        let mut sym = keysym::key_id_to_keysym(id)?;
        if sym == xk::Tab && desired.contains(ModifierMask::SHIFT) {
            sym = xk::ISO_Left_Tab;
            desired.remove(ModifierMask::SHIFT);
        }
        let entry = match self.keymap.lookup(sym) {
            Some(entry) => *entry,
            None => {
                let (substitute, extra) = keysym::fallback(sym)?;
                desired |= extra;
                sym = substitute;
                *self.keymap.lookup(sym)?
            }
        };

        // Modifiers the keycode needs.
        let mut out = (desired - entry.key_mask_mask) | entry.key_mask;
        if keysym::is_keypad(sym) && !entry.key_mask_mask.is_empty() {
            out.set(ModifierMask::NUM_LOCK, keysym::is_keypad_numeric(sym));
            out.remove(ModifierMask::SHIFT);
        } else if entry.key_mask.contains(ModifierMask::SHIFT)
            && self.mask.contains(ModifierMask::CAPS_LOCK)
        {
            out.remove(ModifierMask::SHIFT);
            out.insert(ModifierMask::CAPS_LOCK);
            if !keysym::is_case_convertible(sym) {
                out.insert(ModifierMask::SHIFT);
            }
        }
        if !self.keymap.supported_modifiers().contains(out) {
            debug!(key = %id, needs = %out, "key needs a modifier the keymap lacks");
            return None;
        }

        let keycode = entry.keycode;
        let target_modifier = self.keymap.modifier_of(keycode);
        let mut plan = Vec::new();
        let mut undo = Vec::new();

        // Bridge the shadow mask to `out` around the key.
        if out != self.mask && target_modifier.is_none() {
            for modifier in Modifier::ALL {
                let bit = modifier.mask();
                let want = out.contains(bit);
                if want == self.mask.contains(bit) {
                    continue;
                }
                let &first = self.keymap.modifier_keys(modifier).first()?;
                if modifier.is_toggle() {
                    if self.half_duplex.contains(bit) {
                        if want {
                            plan.push(Keystroke::press(first));
                            undo.push(Keystroke::release(first));
                        } else {
                            plan.push(Keystroke::release(first));
                            undo.push(Keystroke::press(first));
                        }
                    } else {
                        plan.push(Keystroke::press(first));
                        plan.push(Keystroke::release(first));
                        undo.push(Keystroke::release(first));
                        undo.push(Keystroke::press(first));
                    }
                } else if want {
                    plan.push(Keystroke::press(first));
                    undo.push(Keystroke::release(first));
                } else {
                    for &held in self.keymap.modifier_keys(modifier) {
                        if self.keys_down.contains(&held) {
                            plan.push(Keystroke::release(held));
                            undo.push(Keystroke::press(held));
                        }
                    }
                }
            }
        }

        let action = match target_modifier {
            Some(modifier) if half_duplex && self.mask.contains(modifier.mask()) => {
                KeyAction::Release
            }
            _ => action,
        };

        match action {
            KeyAction::Press => plan.push(Keystroke::press(keycode)),
            KeyAction::Release => plan.push(Keystroke::release(keycode)),
            KeyAction::Repeat => {
                plan.push(Keystroke::release(keycode).repeated());
                plan.push(Keystroke::press(keycode).repeated());
            }
        }
        plan.extend(undo.into_iter().rev());

        let mask = match target_modifier {
            Some(modifier) if action != KeyAction::Repeat => {
                self.next_mask(modifier, keycode, action, half_duplex)
            }
            _ => self.mask,
        };

        trace!(key = ?id, keycode, ?action, ?plan, "mapped key");
        Some(MappedKey {
            keycode,
            plan,
            mask,
            action,
        })
    }

    fn next_mask(
        &self,
        modifier: Modifier,
        keycode: KeyCode,
        action: KeyAction,
        half_duplex: bool,
    ) -> ModifierMask {
        let bit = modifier.mask();
        let mut mask = self.mask;
        if modifier.is_toggle() {
            if half_duplex || action == KeyAction::Release {
                mask.toggle(bit);
            }
        } else if action == KeyAction::Press {
            mask.insert(bit);
        } else {
            let other_held = self
                .keymap
                .modifier_keys(modifier)
                .iter()
                .any(|&k| k != keycode && self.keys_down.contains(&k));
            if !other_held {
                mask.remove(bit);
            }
        }
        mask
    }

    /// Records the effect of a mapped key on the shadow state.
    pub fn commit(&mut self, mapped: &MappedKey) {
        match mapped.action {
            KeyAction::Press => {
                self.keys_down.insert(mapped.keycode);
            }
            KeyAction::Release => {
                self.keys_down.remove(&mapped.keycode);
            }
            KeyAction::Repeat => {}
        }
        self.mask = mapped.mask;
    }

    fn apply(&mut self, id: KeyId, desired: ModifierMask, action: KeyAction) -> Vec<Keystroke> {
        match self.map_key(id, desired, action) {
            Some(mapped) => {
                self.commit(&mapped);
                mapped.plan
            }
            None => Vec::new(),
        }
    }

    pub fn key_down(&mut self, id: KeyId, desired: ModifierMask) -> Vec<Keystroke> {
        self.apply(id, desired, KeyAction::Press)
    }

    pub fn key_up(&mut self, id: KeyId, desired: ModifierMask) -> Vec<Keystroke> {
        self.apply(id, desired, KeyAction::Release)
    }

    pub fn key_repeat(&mut self, id: KeyId, desired: ModifierMask) -> Vec<Keystroke> {
        self.apply(id, desired, KeyAction::Repeat)
    }

    /// Releases every synthetic key still held and clears the held-key
    /// modifier bits.  Lock bits are kept.
    pub fn release_all(&mut self) -> Vec<Keystroke> {
        let plan: Vec<Keystroke> = self
            .keys_down
            .iter()
            .map(|&keycode| Keystroke::release(keycode))
            .collect();
        if !plan.is_empty() {
            debug!(count = plan.len(), "releasing synthetic keys");
        }
        self.keys_down.clear();
        self.mask = self.mask.toggles();
        plan
    }

    /// Strokes that bring CapsLock, NumLock and ScrollLock to the state in
    /// `desired`.  Locks without a keycode are left alone.
    pub fn toggle_strokes(&mut self, desired: ModifierMask) -> Vec<Keystroke> {
        let mut plan = Vec::new();
        for modifier in Modifier::ALL.into_iter().filter(|m| m.is_toggle()) {
            let bit = modifier.mask();
            let want = desired.contains(bit);
            if want == self.mask.contains(bit) {
                continue;
            }
            let Some(&keycode) = self.keymap.modifier_keys(modifier).first() else {
                debug!(modifier = modifier.name(), "no keycode for lock");
                continue;
            };
            if self.half_duplex.contains(bit) {
                if want {
                    plan.push(Keystroke::press(keycode));
                    self.keys_down.insert(keycode);
                } else {
                    plan.push(Keystroke::release(keycode));
                    self.keys_down.remove(&keycode);
                }
            } else {
                plan.push(Keystroke::press(keycode));
                plan.push(Keystroke::release(keycode));
            }
            self.mask.toggle(bit);
        }
        plan
    }
}
