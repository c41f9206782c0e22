//! Preprocessor contract and per-processor configuration

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::context::ProcessingContext;
use crate::error::PluginError;

/// Configuration options for a preprocessor
///
/// Options arrive from TOML or JSON and are kept as loosely typed values;
/// each processor reads them through the typed getters and decides its own
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessorConfig {
    /// Whether this processor is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Processor-specific options
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

impl ProcessorConfig {
    /// Create a new, enabled configuration with no options
    pub fn new() -> Self {
        Self {
            enabled: true,
            options: BTreeMap::new(),
        }
    }

    /// Create a disabled processor configuration
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            options: BTreeMap::new(),
        }
    }

    /// Set a configuration option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Get a raw configuration option
    pub fn get_option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Read a boolean; accepts `true`/`false`, 0/1 and the strings
    /// `true`, `1`, `yes`, `on` (and their negatives)
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, PluginError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) => Ok(n.as_f64().is_some_and(|v| v != 0.0)),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" | "" => Ok(false),
                other => Err(PluginError::invalid_option(
                    key,
                    format!("'{}' is not a boolean", other),
                )),
            },
            Some(other) => Err(PluginError::invalid_option(
                key,
                format!("expected a boolean, got {}", other),
            )),
        }
    }

    /// Read a floating point number; numeric strings are accepted
    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64, PluginError> {
        match self.options.get(key) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| PluginError::invalid_option(key, "number out of range")),
            Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
                PluginError::invalid_option(key, format!("'{}' is not a number", s))
            }),
            Some(other) => Err(PluginError::invalid_option(
                key,
                format!("expected a number, got {}", other),
            )),
        }
    }

    /// Read a string option
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Read a set of tool numbers from an array (`[1, 2]`) or a
    /// comma separated string (`"1, 2"`)
    pub fn get_tool_set(&self, key: &str) -> Result<BTreeSet<u32>, PluginError> {
        let parse = |s: &str| {
            s.trim().parse::<u32>().map_err(|_| {
                PluginError::invalid_option(key, format!("'{}' is not a tool number", s.trim()))
            })
        };

        match self.options.get(key) {
            None | Some(Value::Null) => Ok(BTreeSet::new()),
            Some(Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .map(|v| BTreeSet::from([v]))
                .ok_or_else(|| PluginError::invalid_option(key, "not a tool number")),
            Some(Value::String(s)) => s
                .split(',')
                .filter(|part| !part.trim().is_empty())
                .map(parse)
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Number(n) => n
                        .as_u64()
                        .and_then(|v| u32::try_from(v).ok())
                        .ok_or_else(|| PluginError::invalid_option(key, "not a tool number")),
                    Value::String(s) => parse(s),
                    other => Err(PluginError::invalid_option(
                        key,
                        format!("'{}' is not a tool number", other),
                    )),
                })
                .collect(),
            Some(other) => Err(PluginError::invalid_option(
                key,
                format!("expected a list of tools, got {}", other),
            )),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for G-code file preprocessors
///
/// A preprocessor takes part in all three passes of a run:
/// 1. `pre_process` sees the whole file through the context and may record
///    whatever it needs for the later passes.
/// 2. `process_line` is called for every line, in order, and returns the
///    lines that replace it: none to delete, one to keep or rewrite, several
///    to insert.
/// 3. `post_process` runs once after all lines were produced.
///
/// Implementations hold configuration only. Anything computed for a specific
/// file belongs in the [`ProcessingContext`], which keeps a single pipeline
/// usable for concurrent runs over different files.
///
/// `process_line` must depend only on the line and the context. It must not
/// assume it sees original source text: an earlier processor may have
/// rewritten or inserted the line it receives.
pub trait GcodePreprocessor: Send + Sync {
    /// Get the name/identifier of this processor
    fn name(&self) -> &str;

    /// Get a description of what this processor does
    fn description(&self) -> String;

    /// Pass 1: inspect the whole file and record results in the context
    fn pre_process(
        &self,
        _path: &Path,
        _context: &mut ProcessingContext,
    ) -> Result<(), PluginError> {
        Ok(())
    }

    /// Pass 2: transform a single line
    fn process_line(
        &self,
        line: &str,
        context: &ProcessingContext,
    ) -> Result<Vec<String>, PluginError>;

    /// Pass 3: finish up after every line was produced
    fn post_process(&self, _path: &Path, _context: &ProcessingContext) -> Result<(), PluginError> {
        Ok(())
    }

    /// Check if this processor is enabled
    fn is_enabled(&self) -> bool {
        true
    }

    /// Get the configuration for this processor
    fn config(&self) -> &ProcessorConfig {
        static DEFAULT_CONFIG: std::sync::OnceLock<ProcessorConfig> = std::sync::OnceLock::new();
        DEFAULT_CONFIG.get_or_init(ProcessorConfig::new)
    }
}

/// Arc-wrapped processor for thread-safe sharing
pub type PreprocessorHandle = Arc<dyn GcodePreprocessor>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bool_option_forms() {
        let config = ProcessorConfig::new()
            .with_option("a", true)
            .with_option("b", "yes")
            .with_option("c", 0)
            .with_option("d", "maybe");

        assert!(config.get_bool("a", false).unwrap());
        assert!(config.get_bool("b", false).unwrap());
        assert!(!config.get_bool("c", true).unwrap());
        assert!(config.get_bool("missing", true).unwrap());
        assert!(config.get_bool("d", false).is_err());
    }

    #[test]
    fn test_f64_option_forms() {
        let config = ProcessorConfig::new()
            .with_option("n", 5)
            .with_option("s", " 2.5 ")
            .with_option("bad", "fast");

        assert_eq!(config.get_f64("n", 0.0).unwrap(), 5.0);
        assert_eq!(config.get_f64("s", 0.0).unwrap(), 2.5);
        assert_eq!(config.get_f64("missing", 3000.0).unwrap(), 3000.0);
        assert!(config.get_f64("bad", 0.0).is_err());
    }

    #[test]
    fn test_tool_set_forms() {
        let config = ProcessorConfig::new()
            .with_option("list", json!([0, "3"]))
            .with_option("csv", "1, 2,")
            .with_option("single", 4)
            .with_option("bad", "x");

        assert_eq!(config.get_tool_set("list").unwrap(), BTreeSet::from([0, 3]));
        assert_eq!(config.get_tool_set("csv").unwrap(), BTreeSet::from([1, 2]));
        assert_eq!(config.get_tool_set("single").unwrap(), BTreeSet::from([4]));
        assert!(config.get_tool_set("missing").unwrap().is_empty());
        assert!(config.get_tool_set("bad").is_err());
    }

    #[test]
    fn test_config_deserializes_flat_options() {
        let config: ProcessorConfig =
            serde_json::from_value(json!({"idle_timeout_minutes": 5, "exclude_tools": [2]}))
                .unwrap();
        assert!(config.enabled);
        assert_eq!(config.get_f64("idle_timeout_minutes", 0.0).unwrap(), 5.0);
        assert!(!ProcessorConfig::disabled().enabled);
    }
}
