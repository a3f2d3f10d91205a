//! Display backends.
//!
//! The recording [`mock`] backend is always built; it backs the unit tests
//! and headless runs.  The XTest backend needs Xlib at link time and is
//! only compiled with `--features xtest` on Linux.

pub mod mock;

#[cfg(all(feature = "xtest", target_os = "linux"))]
pub mod xtest;
