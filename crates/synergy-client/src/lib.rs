//! synergy-client library entry point.
//!
//! # Architecture overview (for beginners)
//!
//! The client (`synergyc`) runs on a *secondary* screen.  It connects to the
//! server, introduces itself by screen name, and from then on replays the
//! keyboard and mouse records the server sends while the pointer is "on"
//! this screen.
//!
//! - **`application`** – What a secondary screen can do (the
//!   [`SecondaryScreen`](application::secondary_screen::SecondaryScreen)
//!   capability set) and the driver that turns portable key records into
//!   local keycode presses with the shared key synthesizer.
//!
//! - **`infrastructure`** – The OS-facing parts: display backends (a
//!   recording mock and XTest), the TCP session with the server, and the
//!   `synergyc.toml` config file.
//!
//! Integration tests in `tests/` and the `synergyc` binary in `main.rs`
//! share this module tree.

pub mod application;
pub mod infrastructure;
