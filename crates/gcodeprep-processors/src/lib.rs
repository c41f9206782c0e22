//! # gcodeprep Processors
//!
//! Built-in preprocessors for gcodeprep:
//! - [`MetadataExtractor`]: slicer metadata extraction and `!placeholder!` substitution
//! - [`IdleToolShutdown`]: end-of-use and predictive tool power-off
//!
//! and the [`ProcessorRegistry`] that builds a pipeline from configured names.

pub mod dialect;
pub mod estimator;
pub mod idle_shutdown;
pub mod metadata;
pub mod registry;

pub use dialect::MetadataCategory;
pub use estimator::{MotionEstimator, MoveSegment};
pub use idle_shutdown::{
    IdleToolShutdown, ShutdownPlan, ShutdownPoint, ShutdownReason, ToolTimeline,
};
pub use metadata::{MetadataExtractor, PlaceholderTable, SlicerMetadata};
pub use registry::{ProcessorRegistry, RegistryError};
