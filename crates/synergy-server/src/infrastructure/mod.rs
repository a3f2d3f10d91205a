//! Infrastructure layer for the server.
//!
//! Contains OS-facing adapters: the primary screen driver, TCP sockets,
//! file-system storage and the HTTP admin surface.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `synergy_core`, but MUST NOT be imported by the `application` layer.

pub mod http;
pub mod network;
pub mod primary_screen;
pub mod storage;
