//! # synergy-core
//!
//! Shared library for the synergy server (`synergys`) and client
//! (`synergyc`): the wire protocol, the screen arrangement and the key
//! synthesis algorithm.
//!
//! Nothing here talks to a display.  The only I/O is the framed reader and
//! writer in [`protocol::stream`], which work over any tokio
//! `AsyncRead`/`AsyncWrite`, so they run just as well over an in-memory
//! duplex pipe in tests as over a TCP socket.
//!
//! # Architecture overview (for beginners)
//!
//! One computer (the *primary*) owns the real keyboard and mouse.  When the
//! pointer leaves one of its edges, input goes to whichever *secondary*
//! screen sits beyond that edge until the pointer comes back.
//!
//! - **`protocol`** – How records travel over the network.  Every record is
//!   a big-endian length followed by a four-letter tag (`DKDN`, `CINN`, ...)
//!   and positional integer/string arguments.
//!
//! - **`domain`** – Pure logic with no OS dependencies: the screen graph
//!   (who is next to whom), rectangle geometry and the clipboard model.
//!
//! - **`keymap`** – Portable key ids and modifier masks, and the
//!   synthesizer that turns "type `A` with Shift" into the local keycode
//!   presses that produce it on the secondary's keyboard layout.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `synergy_core::ScreenGraph` instead of `synergy_core::domain::screen_graph::ScreenGraph`.
pub use domain::clipboard::{Clipboard, ClipboardFormat, ClipboardId};
pub use domain::screen_graph::{Edge, GraphError, ScreenGraph};
pub use domain::shape::ScreenShape;
pub use keymap::{KeyId, ModifierMask};
pub use protocol::{FrameError, Message, ProtocolError};
