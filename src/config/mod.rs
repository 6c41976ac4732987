//! Configuration management for charade.
//!
//! Loads the TOML configuration with the microphone, meter and generation
//! service settings from the user's config directory.

pub mod file;

pub use file::{get_config_path, CharadeConfig, GenerationConfig};
