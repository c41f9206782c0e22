//! Slicer dialect key table
//!
//! Each supported slicer writes its configuration as `; key = value` comments
//! at the end of the file, but the key names differ between the Prusa family
//! and the Bambu family. This module maps a [`SlicerDialect`] and a
//! [`MetadataCategory`] to the keys that carry it, and splits raw values into
//! per-tool entries.

use gcodeprep_core::gcode::SlicerDialect;

/// Kind of per-file metadata a slicer records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataCategory {
    Colors,
    Materials,
    Temperatures,
    PurgeVolumes,
    FilamentNames,
}

impl MetadataCategory {
    pub const ALL: [MetadataCategory; 5] = [
        MetadataCategory::Colors,
        MetadataCategory::Materials,
        MetadataCategory::Temperatures,
        MetadataCategory::PurgeVolumes,
        MetadataCategory::FilamentNames,
    ];

    /// Whether the values are indexed by tool number
    ///
    /// Purge volumes are a flattened tool-by-tool matrix, not one value per tool.
    pub fn is_per_tool(&self) -> bool {
        !matches!(self, MetadataCategory::PurgeVolumes)
    }

    /// Short name used for metadata keys and placeholders
    pub fn key(&self) -> &'static str {
        match self {
            MetadataCategory::Colors => "colors",
            MetadataCategory::Materials => "materials",
            MetadataCategory::Temperatures => "temperatures",
            MetadataCategory::PurgeVolumes => "purge_volumes",
            MetadataCategory::FilamentNames => "filament_names",
        }
    }

    fn separators(&self) -> &'static [char] {
        match self {
            MetadataCategory::Colors | MetadataCategory::Temperatures => &[';', ','],
            MetadataCategory::Materials | MetadataCategory::FilamentNames => &[';'],
            MetadataCategory::PurgeVolumes => &[','],
        }
    }
}

const PRUSA_COLORS: &[&str] = &["extruder_colour", "filament_colour"];
const PRUSA_MATERIALS: &[&str] = &["filament_type"];
const PRUSA_TEMPERATURES: &[&str] = &["temperature"];
const PRUSA_PURGE: &[&str] = &["wiping_volumes_matrix"];
const PRUSA_NAMES: &[&str] = &["filament_settings_id"];

const BAMBU_COLORS: &[&str] = &["filament_colour"];
const BAMBU_MATERIALS: &[&str] = &["filament_type"];
const BAMBU_TEMPERATURES: &[&str] = &["nozzle_temperature"];
const BAMBU_PURGE: &[&str] = &["flush_volumes_matrix"];
const BAMBU_NAMES: &[&str] = &["filament_settings_id"];

/// Keys carrying `category` in `dialect`, highest priority first
pub fn keys_for(dialect: SlicerDialect, category: MetadataCategory) -> &'static [&'static str] {
    use MetadataCategory::*;

    match dialect {
        SlicerDialect::PrusaSlicer | SlicerDialect::SuperSlicer => match category {
            Colors => PRUSA_COLORS,
            Materials => PRUSA_MATERIALS,
            Temperatures => PRUSA_TEMPERATURES,
            PurgeVolumes => PRUSA_PURGE,
            FilamentNames => PRUSA_NAMES,
        },
        SlicerDialect::OrcaSlicer | SlicerDialect::BambuStudio => match category {
            Colors => BAMBU_COLORS,
            Materials => BAMBU_MATERIALS,
            Temperatures => BAMBU_TEMPERATURES,
            PurgeVolumes => BAMBU_PURGE,
            FilamentNames => BAMBU_NAMES,
        },
    }
}

/// Split a raw setting value into trimmed entries
///
/// Surrounding double quotes are removed from every entry; empty entries are
/// kept so positions still line up with tool numbers.
pub fn split_values(category: MetadataCategory, raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(category.separators())
        .map(|part| part.trim().trim_matches('"').trim().to_string())
        .collect()
}

/// Merge per-key value lists position by position, keeping the first
/// non-empty value in priority order
pub fn merge_preferring_non_empty(lists: &[Vec<String>]) -> Vec<String> {
    let len = lists.iter().map(Vec::len).max().unwrap_or(0);
    (0..len)
        .map(|i| {
            lists
                .iter()
                .filter_map(|list| list.get(i))
                .find(|value| !value.is_empty())
                .cloned()
                .unwrap_or_default()
        })
        .collect()
}
