//! gcodeprep Settings Crate
//!
//! Handles the preprocessor configuration file: which processors run, in
//! which order, and with which options.

pub mod config;
pub mod error;

pub use config::{Config, PreprocessorSettings, CONFIG_FILE_NAME};
pub use error::{ConfigError, Result, SettingsError};
