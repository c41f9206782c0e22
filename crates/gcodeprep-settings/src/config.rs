//! Preprocessor configuration
//!
//! Provides configuration file handling and validation. Supports JSON and TOML
//! file formats, chosen by file extension:
//!
//! ```toml
//! [preprocessor]
//! enabled = true
//! processors = ["metadata_extractor", "idle_tool_shutdown"]
//!
//! [processors.idle_tool_shutdown]
//! idle_timeout_minutes = 5.0
//! exclude_tools = [3]
//! ```
//!
//! The order of `processors` is the execution order. Option tables are
//! passed to each processor untouched; the processor itself validates them.

use gcodeprep_core::ProcessorConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result, SettingsError};

/// Name of the configuration file inside the config directory
pub const CONFIG_FILE_NAME: &str = "preprocessor.toml";

/// Top-level pipeline switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessorSettings {
    /// Master switch for the whole pipeline
    pub enabled: bool,
    /// Processor names in execution order
    pub processors: Vec<String>,
}

impl Default for PreprocessorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            processors: vec![
                "metadata_extractor".to_string(),
                "idle_tool_shutdown".to_string(),
            ],
        }
    }
}

/// Complete preprocessor configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pipeline switches and order
    pub preprocessor: PreprocessorSettings,
    /// Per-processor option tables, keyed by processor name
    pub processors: BTreeMap<String, ProcessorConfig>,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> Result<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Format::Json),
        Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Format::Toml),
        _ => Err(ConfigError::UnsupportedFormat(format!(
            "{} (config file must be .json or .toml)",
            path.display()
        ))
        .into()),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Default location: `<config dir>/gcodeprep/preprocessor.toml`
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("gcodeprep").join(CONFIG_FILE_NAME))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if given, otherwise the default file if it exists,
    /// otherwise the built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match Self::default_path() {
            Ok(default) if default.is_file() => Self::load_from_file(&default),
            _ => {
                tracing::debug!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let format = format_of(path)?;

        let content = match format {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let mut seen = BTreeSet::new();
        for name in &self.preprocessor.processors {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyProcessorName);
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::DuplicateProcessor(name.clone()));
            }
        }
        Ok(())
    }

    /// Options for one processor; an enabled default if none are configured
    pub fn processor_config(&self, name: &str) -> ProcessorConfig {
        self.processors.get(name).cloned().unwrap_or_default()
    }
}
