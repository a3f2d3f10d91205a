//! Application layer use cases for the client.
//!
//! - **`secondary_screen`** – The capability set the session drives: key and
//!   mouse injection, enter/leave, clipboards, options.  Also the events a
//!   screen reports upstream.
//!
//! - **`emulate_input`** – [`SynthesizingScreen`](emulate_input::SynthesizingScreen),
//!   the secondary screen built on a [`DisplayBackend`](emulate_input::DisplayBackend)
//!   and the key synthesizer from `synergy_core`.
//!
//! Nothing here opens sockets or displays; those live in `infrastructure`.

pub mod emulate_input;
pub mod secondary_screen;
