//! Slicer metadata extraction and placeholder substitution
//!
//! Pass 1 scans the comment lines of the file, detects the slicer that produced
//! it and collects per-tool colors, materials, temperatures, filament names and
//! the purge volume matrix. The results are published to the context under
//! `metadata_extractor.*` and rendered into a placeholder table.
//!
//! Pass 2 replaces `!placeholder!` tokens in command lines. Comment lines are
//! never touched so the slicer's own metadata survives verbatim. A placeholder
//! whose value could not be determined is left in place.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use gcodeprep_core::gcode::{self, patterns, SlicerDialect};
use gcodeprep_core::{
    GcodePreprocessor, MetadataValue, PluginError, ProcessingContext, ProcessorConfig,
};

use crate::dialect::{self, MetadataCategory};

/// Registered name of the metadata extractor
pub const NAME: &str = "metadata_extractor";

/// Everything pass 1 learned about the file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlicerMetadata {
    pub slicer: Option<SlicerDialect>,
    /// Tools the metadata applies to, ascending
    pub tools: BTreeSet<u32>,
    pub total_toolchanges: usize,
    /// Per-tool values by category
    pub per_tool: BTreeMap<MetadataCategory, BTreeMap<u32, String>>,
    /// Flattened purge volume matrix
    pub purge_volumes: Vec<String>,
}

impl SlicerMetadata {
    /// Values of a per-tool category for the tools in use, ascending by tool
    ///
    /// Every tool keeps its position; a tool without a value gets an empty
    /// entry.
    fn tool_values(&self, category: MetadataCategory) -> Vec<&str> {
        let Some(map) = self.per_tool.get(&category) else {
            return Vec::new();
        };
        self.tools
            .iter()
            .map(|tool| map.get(tool).map_or("", String::as_str))
            .collect()
    }
}

/// Resolved placeholder values, attached to the context in pass 1
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceholderTable {
    values: BTreeMap<&'static str, String>,
}

impl PlaceholderTable {
    pub fn get(&self, placeholder: &str) -> Option<&str> {
        self.values.get(placeholder).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Insert the comma-joined values unless every one of them is empty
    fn insert_joined<'a>(
        &mut self,
        placeholder: &'static str,
        values: impl IntoIterator<Item = &'a str>,
    ) {
        let values: Vec<&str> = values.into_iter().collect();
        if values.iter().any(|value| !value.is_empty()) {
            self.values.insert(placeholder, values.join(","));
        }
    }

    /// Replace every resolved placeholder in `line`
    pub fn substitute(&self, line: &str) -> Option<String> {
        if !line.contains('!') {
            return None;
        }
        let mut result: Option<String> = None;
        for (placeholder, value) in &self.values {
            let current = result.as_deref().unwrap_or(line);
            if current.contains(placeholder) {
                result = Some(current.replace(placeholder, value));
            }
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExtractOptions {
    tools: bool,
    colors: bool,
    materials: bool,
    temperatures: bool,
    purge_volumes: bool,
    filament_names: bool,
    replace_placeholders: bool,
}

impl ExtractOptions {
    fn from_config(config: &ProcessorConfig) -> Result<Self, PluginError> {
        Ok(Self {
            tools: config.get_bool("extract_tools", true)?,
            colors: config.get_bool("extract_colors", true)?,
            materials: config.get_bool("extract_materials", true)?,
            temperatures: config.get_bool("extract_temperatures", true)?,
            purge_volumes: config.get_bool("extract_purge_volumes", false)?,
            filament_names: config.get_bool("extract_filament_names", false)?,
            replace_placeholders: config.get_bool("replace_placeholders", true)?,
        })
    }

    fn extracts(&self, category: MetadataCategory) -> bool {
        match category {
            MetadataCategory::Colors => self.colors,
            MetadataCategory::Materials => self.materials,
            MetadataCategory::Temperatures => self.temperatures,
            MetadataCategory::PurgeVolumes => self.purge_volumes,
            MetadataCategory::FilamentNames => self.filament_names,
        }
    }
}

/// Extracts slicer metadata and expands `!placeholder!` tokens
#[derive(Debug, Clone)]
pub struct MetadataExtractor {
    config: ProcessorConfig,
    options: ExtractOptions,
}

impl MetadataExtractor {
    /// Create an extractor from its configuration
    pub fn new(config: ProcessorConfig) -> Result<Self, PluginError> {
        let options = ExtractOptions::from_config(&config)?;
        Ok(Self { config, options })
    }

    /// Scan the source lines and collect metadata
    pub fn extract(&self, context: &mut ProcessingContext) -> SlicerMetadata {
        let mut slicer = None;
        let mut raw: HashMap<String, String> = HashMap::new();

        for line in context.lines() {
            if !patterns::is_comment(&line.text) {
                continue;
            }
            if slicer.is_none() {
                slicer = patterns::match_slicer_signature(&line.text);
            }
            if let Some(comment) = patterns::parse_metadata_comment(&line.text) {
                // The first occurrence of a key wins
                raw.entry(comment.key.to_string())
                    .or_insert_with(|| comment.value.to_string());
            }
        }

        let Some(found) = slicer else {
            tracing::info!("{}: no supported slicer detected", NAME);
            return SlicerMetadata::default();
        };
        tracing::info!("{}: detected slicer {}", NAME, found);

        let mut metadata = SlicerMetadata {
            slicer: Some(found),
            ..SlicerMetadata::default()
        };

        let mut declared_tools = 0usize;
        for category in MetadataCategory::ALL {
            let lists: Vec<Vec<String>> = dialect::keys_for(found, category)
                .iter()
                .filter_map(|key| raw.get(*key))
                .map(|value| dialect::split_values(category, value))
                .collect();
            let merged = dialect::merge_preferring_non_empty(&lists);

            if category.is_per_tool() {
                declared_tools = declared_tools.max(merged.len());
            }
            if !self.options.extracts(category) {
                continue;
            }
            if category.is_per_tool() {
                let by_tool = merged
                    .into_iter()
                    .enumerate()
                    .map(|(i, value)| (i as u32, value))
                    .collect();
                metadata.per_tool.insert(category, by_tool);
            } else {
                metadata.purge_volumes = merged;
            }
        }

        // Per-tool values are rendered for these tools even when the tool
        // aggregates themselves are not extracted
        let usage = context.ensure_tool_usage();
        metadata.total_toolchanges = usage.len();
        metadata.tools = usage.iter().map(|event| event.tool_id).collect();
        if metadata.tools.is_empty() {
            metadata.tools = (0..declared_tools as u32).collect();
        }

        metadata
    }

    /// Render the placeholder table for the extracted metadata
    pub fn placeholders(&self, metadata: &SlicerMetadata) -> PlaceholderTable {
        let mut table = PlaceholderTable::default();
        let Some(dialect) = metadata.slicer else {
            return table;
        };

        table.values.insert("!slicer!", dialect.name().to_string());

        if self.options.tools && !metadata.tools.is_empty() {
            let tools: Vec<String> = metadata.tools.iter().map(u32::to_string).collect();
            table
                .values
                .insert("!tool_count!", metadata.tools.len().to_string());
            table.values.insert("!tools!", tools.join(","));
            table.values.insert("!referenced_tools!", tools.join(","));
            table.values.insert(
                "!total_toolchanges!",
                metadata.total_toolchanges.to_string(),
            );
        }

        for (category, placeholder) in [
            (MetadataCategory::Colors, "!colors!"),
            (MetadataCategory::Materials, "!materials!"),
            (MetadataCategory::Temperatures, "!temperatures!"),
            (MetadataCategory::FilamentNames, "!filament_names!"),
        ] {
            if self.options.extracts(category) {
                table.insert_joined(placeholder, metadata.tool_values(category));
            }
        }

        if self.options.purge_volumes {
            table.insert_joined(
                "!purge_volumes!",
                metadata.purge_volumes.iter().map(String::as_str),
            );
        }

        table
    }

    fn publish(&self, metadata: &SlicerMetadata, context: &mut ProcessingContext) {
        let key = |name: &str| format!("{}.{}", NAME, name);

        if let Some(dialect) = metadata.slicer {
            context.set_metadata(key("slicer"), MetadataValue::Text(dialect.name().to_string()));
        }
        if self.options.tools {
            context.set_metadata(
                key("tools_used"),
                MetadataValue::IntegerList(metadata.tools.iter().map(|&t| i64::from(t)).collect()),
            );
            context.set_metadata(
                key("tool_count"),
                MetadataValue::Integer(metadata.tools.len() as i64),
            );
            context.set_metadata(
                key("total_toolchanges"),
                MetadataValue::Integer(metadata.total_toolchanges as i64),
            );
        }
        for (category, values) in &metadata.per_tool {
            context.set_metadata(key(category.key()), MetadataValue::ToolMap(values.clone()));
        }
        if self.options.purge_volumes {
            context.set_metadata(
                key(MetadataCategory::PurgeVolumes.key()),
                MetadataValue::TextList(metadata.purge_volumes.clone()),
            );
        }
    }
}

impl GcodePreprocessor for MetadataExtractor {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> String {
        "Extracts slicer metadata (colors, materials, temperatures) and replaces !placeholders!"
            .to_string()
    }

    fn pre_process(
        &self,
        _path: &Path,
        context: &mut ProcessingContext,
    ) -> Result<(), PluginError> {
        let metadata = self.extract(context);
        self.publish(&metadata, context);

        if self.options.replace_placeholders {
            let table = self.placeholders(&metadata);
            tracing::info!("{}: resolved {} placeholders", NAME, table.len());
            context.insert_extension(table);
        }
        Ok(())
    }

    fn process_line(
        &self,
        line: &str,
        context: &ProcessingContext,
    ) -> Result<Vec<String>, PluginError> {
        if !self.options.replace_placeholders || patterns::is_comment(line) {
            return Ok(vec![line.to_string()]);
        }
        let Some(table) = context.extension::<PlaceholderTable>() else {
            return Ok(vec![line.to_string()]);
        };

        match table.substitute(line) {
            Some(replaced) => {
                tracing::debug!(
                    "{}: replaced placeholders on line {}: {}",
                    NAME,
                    context.current_line() + 1,
                    gcode::line::strip_terminator(&replaced)
                );
                Ok(vec![replaced])
            }
            None => Ok(vec![line.to_string()]),
        }
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}
