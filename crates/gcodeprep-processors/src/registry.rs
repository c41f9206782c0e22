//! Processor registry
//!
//! Maps configuration names to factories. The registry only exists at the
//! configuration boundary: once a [`Pipeline`] is built, its ordered processor
//! list is the sole runtime registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use gcodeprep_core::{Pipeline, PluginError, PreprocessorHandle, ProcessorConfig};
use thiserror::Error;

use crate::idle_shutdown::{self, IdleToolShutdown};
use crate::metadata::{self, MetadataExtractor};

/// Errors raised while building a pipeline from configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// A processor rejected its options
    #[error("processor '{name}' has an invalid configuration: {source}")]
    InvalidConfig {
        name: String,
        #[source]
        source: PluginError,
    },
}

type Factory =
    Arc<dyn Fn(ProcessorConfig) -> Result<PreprocessorHandle, PluginError> + Send + Sync>;

/// Name to factory lookup
pub struct ProcessorRegistry {
    factories: HashMap<String, Factory>,
}

impl ProcessorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in processor
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(metadata::NAME, |config| {
            Ok(Arc::new(MetadataExtractor::new(config)?) as PreprocessorHandle)
        });
        registry.register(idle_shutdown::NAME, |config| {
            Ok(Arc::new(IdleToolShutdown::new(config)?) as PreprocessorHandle)
        });
        registry
    }

    /// Register a processor factory
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(ProcessorConfig) -> Result<PreprocessorHandle, PluginError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Create a processor by name, `None` if the name is unknown
    pub fn create(
        &self,
        name: &str,
        config: ProcessorConfig,
    ) -> Option<Result<PreprocessorHandle, PluginError>> {
        self.factories.get(name).map(|factory| factory(config))
    }

    /// Build a pipeline in the given order
    ///
    /// Unknown names are logged and skipped. Names without an entry in
    /// `configs` get a default, enabled configuration.
    pub fn create_pipeline(
        &self,
        names: &[String],
        configs: &BTreeMap<String, ProcessorConfig>,
    ) -> Result<Pipeline, RegistryError> {
        let mut pipeline = Pipeline::new();

        for name in names {
            let config = configs.get(name).cloned().unwrap_or_default();
            match self.create(name, config) {
                Some(Ok(processor)) => {
                    tracing::debug!("Loaded processor: {}", name);
                    pipeline.register(processor);
                }
                Some(Err(source)) => {
                    return Err(RegistryError::InvalidConfig {
                        name: name.clone(),
                        source,
                    });
                }
                None => {
                    tracing::warn!("Unknown processor '{}', skipping", name);
                }
            }
        }

        Ok(pipeline)
    }

    /// List all registered processor names, sorted
    pub fn list_registered(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
