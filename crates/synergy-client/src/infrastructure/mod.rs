//! Infrastructure layer for the client.
//!
//! Contains OS-facing adapters: display backends, the TCP session with the
//! server and file-system storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `synergy_core`, but MUST NOT be imported by the `application` layer.

pub mod display;
pub mod network;
pub mod storage;
