//! Keyboard vocabulary and key-event synthesis.
//!
//! - [`key_id`]: portable key identifiers sent on the wire.
//! - [`modifier`]: the portable modifier bitset.
//! - [`keysym`]: X11-style keysyms and the KeyId ↔ keysym namespace rules.
//! - [`local_map`]: lookups built from a display's keyboard mapping.
//! - [`layouts`]: built-in keyboard mappings.
//! - [`synth`]: turns `(KeyId, mask, action)` into local keystroke plans.

pub mod key_id;
pub mod keysym;
pub mod layouts;
pub mod local_map;
pub mod modifier;
pub mod synth;

pub use key_id::{buttons, keys, ButtonId, KeyButton, KeyId};
pub use local_map::{KeyCode, KeyEntry, KeymapError, LocalKeyMap, RawKeyboardMapping};
pub use modifier::{Modifier, ModifierMask};
pub use synth::{KeyAction, KeySynthesizer, Keystroke, MappedKey};
