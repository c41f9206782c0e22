//! Three-pass preprocessing pipeline
//!
//! A [`Pipeline`] owns an ordered list of preprocessors and applies them to one
//! file at a time:
//!
//! 1. The file is read once. If its first line is a fingerprint the run stops
//!    with [`PreprocessOutcome::AlreadyProcessed`].
//! 2. Pass 1 calls `pre_process` on every processor in order.
//! 3. Pass 2 feeds each source line through every processor in order; the
//!    lines one processor returns are the input of the next.
//! 4. Pass 3 calls `post_process` on every processor in order.
//! 5. The fingerprint and the produced lines are committed through the
//!    [`OutputSink`] in one step. A source line that comes out of pass 2
//!    unchanged is written with its original bytes.
//!
//! Any processor error or panic aborts the run before anything is written.

use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use crate::context::{MetadataValue, ProcessingContext};
use crate::error::{PipelineError, PluginError, Result};
use crate::gcode::line::{fingerprint_marker, is_fingerprint, read_source_lines};
use crate::plugin::PreprocessorHandle;
use crate::sink::{AtomicFileSink, OutputSink};

/// The pass a failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassStage {
    PreProcess,
    ProcessLine,
    PostProcess,
}

impl std::fmt::Display for PassStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PreProcess => write!(f, "pre-processing"),
            Self::ProcessLine => write!(f, "line processing"),
            Self::PostProcess => write!(f, "post-processing"),
        }
    }
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub path: PathBuf,
    /// Processors that took part, in execution order
    pub processors: Vec<String>,
    pub input_lines: usize,
    /// Lines written, including the fingerprint
    pub output_lines: usize,
    /// Final metadata of the run
    pub metadata: BTreeMap<String, MetadataValue>,
}

/// Result of preprocessing one file
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreprocessOutcome {
    /// The file already carries a fingerprint; nothing was done
    AlreadyProcessed,
    /// Nothing to do (pipeline disabled or no enabled processors); file untouched
    Skipped { reason: String },
    /// The file was rewritten
    Processed(ProcessReport),
    /// A processor declined or faulted; file untouched
    Failed {
        plugin: String,
        stage: PassStage,
        reason: String,
    },
}

impl PreprocessOutcome {
    /// Whether the outcome counts as success for the caller
    pub fn is_success(&self) -> bool {
        !matches!(self, PreprocessOutcome::Failed { .. })
    }
}

/// Name, description and enabled flag of a registered processor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessorInfo {
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

struct Failure {
    plugin: String,
    stage: PassStage,
    reason: String,
}

impl Failure {
    fn new(plugin: &str, stage: PassStage, reason: impl Into<String>) -> Self {
        Self {
            plugin: plugin.to_string(),
            stage,
            reason: reason.into(),
        }
    }
}

/// Ordered preprocessor pipeline
///
/// # Example
/// ```ignore
/// let mut pipeline = Pipeline::new();
/// pipeline.register(Arc::new(MetadataExtractor::new(ProcessorConfig::new())?));
/// pipeline.register(Arc::new(IdleToolShutdown::new(ProcessorConfig::new())?));
///
/// match pipeline.run(Path::new("part.gcode"))? {
///     PreprocessOutcome::Processed(report) => println!("{} lines", report.output_lines),
///     other => println!("{:?}", other),
/// }
/// ```
pub struct Pipeline {
    processors: Vec<PreprocessorHandle>,
    enabled: bool,
    sink: Box<dyn OutputSink>,
}

impl Pipeline {
    /// Create a new empty pipeline that commits through [`AtomicFileSink`]
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
            enabled: true,
            sink: Box::new(AtomicFileSink::new()),
        }
    }

    /// Register a processor; processors run in registration order
    pub fn register(&mut self, processor: PreprocessorHandle) -> &mut Self {
        self.processors.push(processor);
        self
    }

    /// Register multiple processors at once
    pub fn register_all(&mut self, processors: Vec<PreprocessorHandle>) -> &mut Self {
        self.processors.extend(processors);
        self
    }

    /// Replace the output sink
    pub fn with_sink(mut self, sink: Box<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Enable or disable the whole pipeline
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Get the number of registered processors
    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// List all registered processors in execution order
    pub fn list_processors(&self) -> Vec<ProcessorInfo> {
        self.processors
            .iter()
            .map(|p| ProcessorInfo {
                name: p.name().to_string(),
                description: p.description(),
                enabled: p.is_enabled(),
            })
            .collect()
    }

    fn active_processors(&self) -> Vec<&PreprocessorHandle> {
        self.processors.iter().filter(|p| p.is_enabled()).collect()
    }

    /// Preprocess one file in place
    ///
    /// Returns `Err` only for file system problems. Processor failures are
    /// reported as [`PreprocessOutcome::Failed`]; in every non-`Processed`
    /// case the file is left untouched.
    pub fn run(&self, path: &Path) -> Result<PreprocessOutcome> {
        if !self.enabled {
            return Ok(PreprocessOutcome::Skipped {
                reason: "preprocessor disabled".to_string(),
            });
        }

        let (lines, terminator) = read_source_lines(path)?;
        if lines.first().is_some_and(|line| is_fingerprint(&line.text)) {
            tracing::info!("{} already preprocessed, skipping", path.display());
            return Ok(PreprocessOutcome::AlreadyProcessed);
        }

        let active = self.active_processors();
        if active.is_empty() {
            return Ok(PreprocessOutcome::Skipped {
                reason: "no processors enabled".to_string(),
            });
        }

        let input_lines = lines.len();
        let mut context = ProcessingContext::new(path, lines, terminator);

        tracing::info!(
            "Processing '{}' ({} lines) with {} processors",
            context.filename(),
            input_lines,
            active.len()
        );

        let body = match Self::execute(&active, path, &mut context) {
            Ok(body) => body,
            Err(failure) => {
                tracing::error!(
                    "{} failed in {}: {}",
                    failure.plugin,
                    failure.stage,
                    failure.reason
                );
                return Ok(PreprocessOutcome::Failed {
                    plugin: failure.plugin,
                    stage: failure.stage,
                    reason: failure.reason,
                });
            }
        };

        let mut output = Vec::with_capacity(body.len() + 1);
        output.push(terminator.terminate(&fingerprint_marker()).into_bytes());
        output.extend(body);

        self.sink
            .commit(path, &output)
            .map_err(|source| PipelineError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        tracing::info!(
            "Successfully processed '{}': {} -> {} lines",
            context.filename(),
            input_lines,
            output.len()
        );

        Ok(PreprocessOutcome::Processed(ProcessReport {
            path: path.to_path_buf(),
            processors: active.iter().map(|p| p.name().to_string()).collect(),
            input_lines,
            output_lines: output.len(),
            metadata: context.metadata().clone(),
        }))
    }

    /// Run all three passes and return the produced lines
    fn execute(
        active: &[&PreprocessorHandle],
        path: &Path,
        context: &mut ProcessingContext,
    ) -> std::result::Result<Vec<Vec<u8>>, Failure> {
        // Pass 1
        for processor in active {
            let name = processor.name();
            tracing::debug!("Pass 1: {}", name);
            guarded(name, PassStage::PreProcess, || {
                processor.pre_process(path, &mut *context)
            })?;
        }

        // Pass 2
        let mut output = Vec::with_capacity(context.total_lines());
        for index in 0..context.total_lines() {
            context.set_current_line(index);
            let ctx: &ProcessingContext = context;
            let source = &ctx.lines()[index];
            let mut current = vec![source.text.clone()];

            for processor in active {
                let name = processor.name();
                let mut next = Vec::with_capacity(current.len());
                for line in &current {
                    let produced = guarded(name, PassStage::ProcessLine, || {
                        processor.process_line(line, ctx)
                    })
                    .map_err(|mut failure| {
                        failure.reason = format!("line {}: {}", index + 1, failure.reason);
                        failure
                    })?;
                    next.extend(produced);
                }
                current = next;
                if current.is_empty() {
                    break;
                }
            }
            if current.len() == 1 && current[0] == source.text {
                output.push(source.bytes().to_vec());
            } else {
                output.extend(current.into_iter().map(String::into_bytes));
            }
        }

        // Pass 3
        let ctx: &ProcessingContext = context;
        for processor in active {
            let name = processor.name();
            tracing::debug!("Pass 3: {}", name);
            guarded(name, PassStage::PostProcess, || {
                processor.post_process(path, ctx)
            })?;
        }

        Ok(output)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one processor call, converting both errors and panics into a `Failure`
fn guarded<T>(
    plugin: &str,
    stage: PassStage,
    call: impl FnOnce() -> std::result::Result<T, PluginError>,
) -> std::result::Result<T, Failure> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Failure::new(plugin, stage, err.to_string())),
        Err(payload) => Err(Failure::new(
            plugin,
            stage,
            format!("unexpected fault: {}", panic_message(payload.as_ref())),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
