//! # gcodeprep Core
//!
//! Core types and the orchestrator for the gcodeprep preprocessor.
//! Provides the preprocessor contract, the per-run context, the pattern
//! catalog and the three-pass pipeline that rewrites a file in place.

pub mod context;
pub mod error;
pub mod gcode;
pub mod pipeline;
pub mod plugin;
pub mod sink;

pub use context::{MetadataValue, ProcessingContext, ToolEventType, ToolUsageEvent};
pub use error::{PipelineError, PluginError, Result};
pub use pipeline::{PassStage, Pipeline, PreprocessOutcome, ProcessReport, ProcessorInfo};
pub use plugin::{GcodePreprocessor, PreprocessorHandle, ProcessorConfig};
pub use sink::{AtomicFileSink, OutputSink};
