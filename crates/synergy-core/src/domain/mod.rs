//! Domain entities shared by the server and the client.
//!
//! Nothing in here touches sockets, displays or the file system, so every
//! type can be unit-tested on any platform.
//!
//! - [`screen_graph`]: which screen lies beyond which edge of which other screen.
//! - [`shape`]: rectangle geometry, edge detection and entry points.
//! - [`clipboard`]: clipboard ids, formats and the transfer layout.

pub mod clipboard;
pub mod screen_graph;
pub mod shape;
