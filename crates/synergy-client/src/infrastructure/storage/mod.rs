//! Storage infrastructure: the `synergyc.toml` config file.

pub mod config;
