//! # gcodeprep
//!
//! A multi-pass G-code preprocessor for multi-tool printers. It rewrites a
//! sliced file in place to:
//! - expand `!placeholder!` tokens with metadata read from slicer comments
//! - power down tools as soon as they are no longer needed, or when they will
//!   idle longer than a configured threshold
//!
//! ## Architecture
//!
//! gcodeprep is organized as a workspace with multiple crates:
//!
//! 1. **gcodeprep-core** - Preprocessor contract, context, pattern catalog, pipeline
//! 2. **gcodeprep-processors** - Metadata extractor, idle tool shutdown, registry
//! 3. **gcodeprep-settings** - Configuration file loading and validation
//! 4. **gcodeprep** - This crate: the host entry points and the CLI binary
//!
//! A processed file starts with `; processed by gcodeprep v<version>`, which
//! makes every further run over it a no-op.

use anyhow::Context;
use std::path::Path;

pub use gcodeprep_core::{
    GcodePreprocessor, MetadataValue, PassStage, Pipeline, PipelineError, PluginError,
    PreprocessOutcome, ProcessReport, ProcessingContext, ProcessorConfig, ProcessorInfo,
};
pub use gcodeprep_processors::{IdleToolShutdown, MetadataExtractor, ProcessorRegistry};
pub use gcodeprep_settings::{Config, SettingsError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging on stderr
///
/// `RUST_LOG` takes precedence; otherwise `default_level` applies to every
/// target. Stdout is left free for the report output of the CLI.
pub fn init_logging(default_level: tracing::Level) -> anyhow::Result<()> {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(default_level).into())
    });

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Build the pipeline described by `config`
pub fn build_pipeline(config: &Config) -> anyhow::Result<Pipeline> {
    let registry = ProcessorRegistry::with_builtin();
    let mut pipeline = registry
        .create_pipeline(&config.preprocessor.processors, &config.processors)
        .context("Failed to build preprocessing pipeline")?;
    pipeline.set_enabled(config.preprocessor.enabled);
    Ok(pipeline)
}

/// Preprocess one file in place
///
/// Processor failures are reported through [`PreprocessOutcome::Failed`];
/// the error path covers configuration and file system problems. A failed
/// write can be recognized by downcasting to [`PipelineError`].
pub fn preprocess(path: &Path, config: &Config) -> anyhow::Result<PreprocessOutcome> {
    let pipeline = build_pipeline(config)?;
    let outcome = pipeline.run(path)?;
    Ok(outcome)
}

/// Configured processors in execution order
///
/// A processor counts as enabled only if both it and the pipeline are.
pub fn list_processors(config: &Config) -> anyhow::Result<Vec<ProcessorInfo>> {
    let pipeline = build_pipeline(config)?;
    Ok(pipeline
        .list_processors()
        .into_iter()
        .map(|mut info| {
            info.enabled &= pipeline.is_enabled();
            info
        })
        .collect())
}
