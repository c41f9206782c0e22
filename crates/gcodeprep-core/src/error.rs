//! Error handling for gcodeprep
//!
//! Two layers of errors exist:
//! - [`PluginError`] is returned by a single processor when it declines to continue.
//! - [`PipelineError`] covers the file system boundary of a run (reading the
//!   input, committing the output).
//!
//! Plugin failures never surface as `PipelineError`; the orchestrator turns them
//! into a [`crate::PreprocessOutcome::Failed`] so callers can tell "this file was
//! rejected by a processor" apart from "the disk misbehaved".

use std::path::PathBuf;
use thiserror::Error;

/// Error returned by a preprocessor from any of its three passes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PluginError {
    /// The processor refuses to continue with this file
    #[error("{reason}")]
    Declined {
        /// Human readable reason
        reason: String,
    },

    /// A context entry another processor should have produced is absent
    #[error("missing context entry '{key}'")]
    MissingContext {
        /// The namespaced metadata key
        key: String,
    },

    /// A configuration option could not be interpreted
    #[error("invalid option '{key}': {reason}")]
    InvalidOption {
        /// Option name
        key: String,
        /// Why the value was rejected
        reason: String,
    },
}

impl PluginError {
    /// Create a `Declined` error from a message
    pub fn declined(reason: impl Into<String>) -> Self {
        PluginError::Declined {
            reason: reason.into(),
        }
    }

    /// Create an `InvalidOption` error
    pub fn invalid_option(key: impl Into<String>, reason: impl Into<String>) -> Self {
        PluginError::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised at the file system boundary of a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The input file could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// The input path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The processed output could not be committed; the original is intact
    #[error("Failed to write {path}: {source}")]
    Write {
        /// The target path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The input is not something the pipeline can handle
    #[error("Invalid input {path}: {reason}")]
    InvalidInput {
        /// The input path
        path: PathBuf,
        /// Why the input was rejected
        reason: String,
    },
}

impl PipelineError {
    /// Check if this error happened while committing output
    pub fn is_write_error(&self) -> bool {
        matches!(self, PipelineError::Write { .. })
    }
}

/// Result type using [`PipelineError`]
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_error_display() {
        assert_eq!(PluginError::declined("no tools").to_string(), "no tools");
        assert_eq!(
            PluginError::invalid_option("idle_timeout_minutes", "not a number").to_string(),
            "invalid option 'idle_timeout_minutes': not a number"
        );
    }

    #[test]
    fn test_write_error_classification() {
        let err = PipelineError::Write {
            path: PathBuf::from("/tmp/x.gcode"),
            source: std::io::Error::other("disk full"),
        };
        assert!(err.is_write_error());
        assert!(err.to_string().contains("disk full"));
    }
}
