//! Per-run processing context
//!
//! A [`ProcessingContext`] is created fresh for every file, owned by exactly one
//! pipeline run, and dropped when the run ends. Processors may mutate it during
//! `pre_process`; passes 2 and 3 only see a shared reference.
//!
//! Two channels exist for cross-processor data:
//! - the metadata map, keyed `"<processor_name>.<key>"` by convention, for values
//!   other processors (and the run report) consume;
//! - typed extensions, one value per Rust type, for a processor's own pass 1
//!   results that pass 2 looks up.
//!
//! Metadata keys in use:
//!
//! | Key | Producer | Value |
//! |-----|----------|-------|
//! | `metadata_extractor.slicer` | metadata extractor | `Text` |
//! | `metadata_extractor.tools_used` | metadata extractor | `IntegerList` |
//! | `metadata_extractor.tool_count` | metadata extractor | `Integer` |
//! | `metadata_extractor.total_toolchanges` | metadata extractor | `Integer` |
//! | `metadata_extractor.colors` etc. | metadata extractor | `ToolMap` |
//! | `metadata_extractor.purge_volumes` | metadata extractor | `TextList` |
//! | `idle_tool_shutdown.tools_used` | idle shutdown | `IntegerList` |
//! | `idle_tool_shutdown.tool_last_usage` | idle shutdown | `ToolMap` (1-based line) |
//! | `idle_tool_shutdown.estimated_minutes` | idle shutdown | `Float` |
//! | `idle_tool_shutdown.planned_shutdowns` | idle shutdown | `Integer` |

use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::gcode::line::{LineTerminator, SourceLine};
use crate::gcode::patterns;

/// A value stored in the context metadata map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    IntegerList(Vec<i64>),
    TextList(Vec<String>),
    /// Per-tool values keyed by tool number
    ToolMap(BTreeMap<u32, String>),
}

impl MetadataValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_tool_map(&self) -> Option<&BTreeMap<u32, String>> {
        match self {
            MetadataValue::ToolMap(map) => Some(map),
            _ => None,
        }
    }
}

/// Kind of tool usage event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventType {
    /// The tool became the active tool
    Select,
}

/// One tool activation found in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolUsageEvent {
    pub tool_id: u32,
    pub line_index: usize,
    pub event_type: ToolEventType,
}

/// Shared state of a single pipeline run
pub struct ProcessingContext {
    path: PathBuf,
    lines: Vec<SourceLine>,
    terminator: LineTerminator,
    current_line: usize,
    metadata: BTreeMap<String, MetadataValue>,
    tool_usage: Option<Vec<ToolUsageEvent>>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ProcessingContext {
    /// Create a context over the lines of one file
    pub fn new(
        path: impl Into<PathBuf>,
        lines: Vec<SourceLine>,
        terminator: LineTerminator,
    ) -> Self {
        Self {
            path: path.into(),
            lines,
            terminator,
            current_line: 0,
            metadata: BTreeMap::new(),
            tool_usage: None,
            extensions: HashMap::new(),
        }
    }

    /// Build a context directly from text, for tests and in-memory use
    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
        Self::new(
            path,
            crate::gcode::line::split_lines(text),
            LineTerminator::detect(text),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component of the path being processed
    pub fn filename(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The original source lines, in order
    pub fn lines(&self) -> &[SourceLine] {
        &self.lines
    }

    pub fn total_lines(&self) -> usize {
        self.lines.len()
    }

    /// Line terminator convention of the source file
    pub fn terminator(&self) -> LineTerminator {
        self.terminator
    }

    /// Index of the source line currently flowing through pass 2
    pub fn current_line(&self) -> usize {
        self.current_line
    }

    /// Set by the pipeline before each source line enters pass 2
    pub fn set_current_line(&mut self, index: usize) {
        self.current_line = index;
    }

    /// Store a metadata value, replacing any previous value
    pub fn set_metadata(&mut self, key: impl Into<String>, value: MetadataValue) {
        self.metadata.insert(key.into(), value);
    }

    pub fn get_metadata(&self, key: &str) -> Option<&MetadataValue> {
        self.metadata.get(key)
    }

    /// All metadata, ordered by key
    pub fn metadata(&self) -> &BTreeMap<String, MetadataValue> {
        &self.metadata
    }

    /// Tool activations in line order, scanning the source on first use
    pub fn ensure_tool_usage(&mut self) -> &[ToolUsageEvent] {
        let lines = &self.lines;
        self.tool_usage.get_or_insert_with(|| {
            lines
                .iter()
                .filter_map(|line| {
                    patterns::extract_tool_number(&line.text).map(|tool_id| ToolUsageEvent {
                        tool_id,
                        line_index: line.index,
                        event_type: ToolEventType::Select,
                    })
                })
                .collect()
        })
    }

    /// Tool activations, empty if no processor asked for them in pass 1
    pub fn tool_usage(&self) -> &[ToolUsageEvent] {
        self.tool_usage.as_deref().unwrap_or(&[])
    }

    /// Attach a typed value for later passes; replaces a previous value of the same type
    pub fn insert_extension<T: Any + Send + Sync>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn extension<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }
}

impl std::fmt::Debug for ProcessingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingContext")
            .field("path", &self.path)
            .field("lines", &self.lines.len())
            .field("current_line", &self.current_line)
            .field("metadata", &self.metadata)
            .field("extensions", &self.extensions.len())
            .finish()
    }
}
