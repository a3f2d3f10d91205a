//! Portable modifier state.
//!
//! [`ModifierMask`] is the bitset carried in `CINN`, `DKDN`, `DKRP` and
//! `DKUP`.  Its bit values are part of the wire format.  [`Modifier`] names
//! the individual bits and fixes the order in which the key synthesizer
//! visits them.

use std::fmt;

use bitflags::bitflags;

bitflags! {
    /// Set of modifiers (held keys plus lock states).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct ModifierMask: u16 {
        const SHIFT       = 0x0001;
        const CONTROL     = 0x0002;
        const ALT         = 0x0004;
        const META        = 0x0008;
        const CAPS_LOCK   = 0x1000;
        const NUM_LOCK    = 0x2000;
        const SCROLL_LOCK = 0x4000;
    }
}

impl ModifierMask {
    /// The lock-state bits.
    pub const TOGGLES: ModifierMask = ModifierMask::CAPS_LOCK
        .union(ModifierMask::NUM_LOCK)
        .union(ModifierMask::SCROLL_LOCK);

    /// Only the lock-state bits of `self`.
    pub fn toggles(self) -> ModifierMask {
        self & Self::TOGGLES
    }
}

impl fmt::Display for ModifierMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for modifier in Modifier::ALL {
            if self.contains(modifier.mask()) {
                if !first {
                    f.write_str("+")?;
                }
                f.write_str(modifier.name())?;
                first = false;
            }
        }
        Ok(())
    }
}

/// One modifier bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Shift,
    Control,
    Alt,
    Meta,
    CapsLock,
    NumLock,
    ScrollLock,
}

impl Modifier {
    /// All modifiers in ascending bit order.
    pub const ALL: [Modifier; 7] = [
        Modifier::Shift,
        Modifier::Control,
        Modifier::Alt,
        Modifier::Meta,
        Modifier::CapsLock,
        Modifier::NumLock,
        Modifier::ScrollLock,
    ];

    pub fn mask(self) -> ModifierMask {
        match self {
            Modifier::Shift => ModifierMask::SHIFT,
            Modifier::Control => ModifierMask::CONTROL,
            Modifier::Alt => ModifierMask::ALT,
            Modifier::Meta => ModifierMask::META,
            Modifier::CapsLock => ModifierMask::CAPS_LOCK,
            Modifier::NumLock => ModifierMask::NUM_LOCK,
            Modifier::ScrollLock => ModifierMask::SCROLL_LOCK,
        }
    }

    /// Lock modifiers change state on a full press/release cycle instead of
    /// following the key while it is held.
    pub fn is_toggle(self) -> bool {
        matches!(
            self,
            Modifier::CapsLock | Modifier::NumLock | Modifier::ScrollLock
        )
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Modifier::Shift => "shift",
            Modifier::Control => "control",
            Modifier::Alt => "alt",
            Modifier::Meta => "meta",
            Modifier::CapsLock => "capslock",
            Modifier::NumLock => "numlock",
            Modifier::ScrollLock => "scrolllock",
        }
    }
}
