//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads `synergys.toml`, resolves its location from
//! the command line, the environment or the platform config directory, and
//! converts the file's tables into the types the application layer consumes.

pub mod config;
