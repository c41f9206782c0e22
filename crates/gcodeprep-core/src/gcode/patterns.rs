//! Pattern catalog
//!
//! Compiled recognizers for the instruction syntaxes the processors care about:
//! - Tool selection in four dialects
//! - Linear motion (G0/G1) with present-only axes and feed rate
//! - Dwell (G4), distance mode (G90/G91)
//! - Tool heater targets (M104/M109 with a `T` word)
//! - Slicer signature lines and `; key = value` metadata comments
//!
//! Every recognizer is a pure function of its input line. Lines that match
//! nothing are simply not recognized; callers pass them through unchanged.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use super::line::strip_terminator;

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("invalid regex pattern"))
}

/// Check if a line is a comment (`;` or `(` as first non-blank character)
pub fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with(';') || trimmed.starts_with('(')
}

/// Split a line into its command part and its comment part
pub fn strip_comment(line: &str) -> (&str, Option<&str>) {
    let line = strip_terminator(line);
    match line.find([';', '(']) {
        Some(pos) => (&line[..pos], Some(&line[pos..])),
        None => (line, None),
    }
}

/// Syntax family a tool selection was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSelectDialect {
    /// Bare `T1` as emitted by FDM slicers
    Bare,
    /// `M6 T1` or `T1 M6` tool change
    ToolChange,
    /// Klipper `SELECT_TOOL T=1`
    SelectTool,
    /// Klipper `ACTIVATE_EXTRUDER EXTRUDER=extruder1`
    ActivateExtruder,
}

/// A recognized tool activation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSelect {
    /// Selected tool number
    pub tool: u32,
    /// Dialect the selection was written in
    pub dialect: ToolSelectDialect,
}

/// Recognize a tool activation in any supported dialect
///
/// Temperature or offset commands that merely carry a `T` parameter
/// (`M104 T1 S0`, `G10 T2`) are not activations.
pub fn match_tool_select(line: &str) -> Option<ToolSelect> {
    static BARE: OnceLock<Regex> = OnceLock::new();
    static TOOL_CHANGE: OnceLock<Regex> = OnceLock::new();
    static SELECT_TOOL: OnceLock<Regex> = OnceLock::new();
    static ACTIVATE_EXTRUDER: OnceLock<Regex> = OnceLock::new();

    let (code, _) = strip_comment(line);
    let code = code.trim();
    if code.is_empty() {
        return None;
    }

    let bare = regex(&BARE, r"(?i)^(?:N\d+\s+)?T(\d+)$");
    if let Some(caps) = bare.captures(code) {
        return caps[1].parse().ok().map(|tool| ToolSelect {
            tool,
            dialect: ToolSelectDialect::Bare,
        });
    }

    let tool_change = regex(
        &TOOL_CHANGE,
        r"(?i)^(?:N\d+\s+)?(?:M0*6\s+T(\d+)|T(\d+)\s+M0*6)(?:\s|$)",
    );
    if let Some(caps) = tool_change.captures(code) {
        let number = caps.get(1).or_else(|| caps.get(2))?;
        return number.as_str().parse().ok().map(|tool| ToolSelect {
            tool,
            dialect: ToolSelectDialect::ToolChange,
        });
    }

    let select_tool = regex(&SELECT_TOOL, r"(?i)^SELECT_TOOL\s+(?:T|TOOL)\s*=\s*(\d+)\b");
    if let Some(caps) = select_tool.captures(code) {
        return caps[1].parse().ok().map(|tool| ToolSelect {
            tool,
            dialect: ToolSelectDialect::SelectTool,
        });
    }

    let activate = regex(
        &ACTIVATE_EXTRUDER,
        r"(?i)^ACTIVATE_EXTRUDER\s+EXTRUDER\s*=\s*extruder(\d*)\b",
    );
    if let Some(caps) = activate.captures(code) {
        let tool = match &caps[1] {
            "" => 0,
            digits => digits.parse().ok()?,
        };
        return Some(ToolSelect {
            tool,
            dialect: ToolSelectDialect::ActivateExtruder,
        });
    }

    None
}

/// Extract the tool number from an activation line, if it is one
pub fn extract_tool_number(line: &str) -> Option<u32> {
    match_tool_select(line).map(|select| select.tool)
}

/// Words of a linear move; absent words are `None`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionCommand {
    /// X word
    pub x: Option<f64>,
    /// Y word
    pub y: Option<f64>,
    /// Z word
    pub z: Option<f64>,
    /// F word (distance per minute)
    pub feedrate: Option<f64>,
}

/// Recognize a G0/G1 linear move and extract its present words
pub fn parse_motion(line: &str) -> Option<MotionCommand> {
    static MOTION: OnceLock<Regex> = OnceLock::new();
    static WORD: OnceLock<Regex> = OnceLock::new();

    let (code, _) = strip_comment(line);
    let motion = regex(&MOTION, r"(?i)^\s*(?:N\d+\s+)?G0*[01](?:[^0-9.]|$)");
    if !motion.is_match(code) {
        return None;
    }

    let word = regex(&WORD, r"(?i)([XYZF])\s*([-+]?(?:\d+\.?\d*|\.\d+))");
    let mut command = MotionCommand::default();
    for caps in word.captures_iter(code) {
        let Ok(value) = caps[2].parse::<f64>() else {
            continue;
        };
        match caps[1].to_ascii_uppercase().as_str() {
            "X" => command.x = Some(value),
            "Y" => command.y = Some(value),
            "Z" => command.z = Some(value),
            "F" => command.feedrate = Some(value),
            _ => {}
        }
    }
    Some(command)
}

/// Recognize a G4 dwell and return its duration in minutes
///
/// `P` is milliseconds, `S` is seconds.
pub fn parse_dwell_minutes(line: &str) -> Option<f64> {
    static DWELL: OnceLock<Regex> = OnceLock::new();

    let (code, _) = strip_comment(line);
    let dwell = regex(
        &DWELL,
        r"(?i)^\s*(?:N\d+\s+)?G0*4\s+([PS])\s*(\d+\.?\d*|\.\d+)",
    );
    let caps = dwell.captures(code)?;
    let value: f64 = caps[2].parse().ok()?;
    if caps[1].eq_ignore_ascii_case("P") {
        Some(value / 1000.0 / 60.0)
    } else {
        Some(value / 60.0)
    }
}

/// Positioning mode set by G90/G91
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMode {
    /// G90
    #[default]
    Absolute,
    /// G91
    Relative,
}

/// Recognize a G90/G91 word anywhere in the command part of a line
pub fn parse_distance_mode(line: &str) -> Option<DistanceMode> {
    static DISTANCE: OnceLock<Regex> = OnceLock::new();

    let (code, _) = strip_comment(line);
    let distance = regex(&DISTANCE, r"(?i)(?:^|\s)G9([01])(?:\s|$)");
    distance.captures(code).map(|caps| match &caps[1] {
        "1" => DistanceMode::Relative,
        _ => DistanceMode::Absolute,
    })
}

/// A tool heater target set by `M104`/`M109 T<n> S<temp>`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolTemperature {
    pub tool: u32,
    /// Target in degrees; zero turns the heater off
    pub target: f64,
    /// `M109`, which waits for the target
    pub wait: bool,
}

impl ToolTemperature {
    /// Whether the command heats the tool rather than switching it off
    pub fn is_heating(&self) -> bool {
        self.target > 0.0
    }
}

/// Recognize an `M104`/`M109` that addresses a specific tool
///
/// Commands without both a `T` and an `S` word apply to the active tool and
/// are not recognized.
pub fn parse_tool_temperature(line: &str) -> Option<ToolTemperature> {
    static TEMPERATURE: OnceLock<Regex> = OnceLock::new();
    static WORD: OnceLock<Regex> = OnceLock::new();

    let (code, _) = strip_comment(line);
    let temperature = regex(&TEMPERATURE, r"(?i)^\s*(?:N\d+\s+)?M10([49])(?:\s|$)");
    let caps = temperature.captures(code)?;
    let wait = &caps[1] == "9";

    let word = regex(&WORD, r"(?i)([TS])\s*([-+]?(?:\d+\.?\d*|\.\d+))");
    let mut tool = None;
    let mut target = None;
    for caps in word.captures_iter(&code[caps.get(0)?.end()..]) {
        match caps[1].to_ascii_uppercase().as_str() {
            "T" => tool = caps[2].parse::<u32>().ok(),
            _ => target = caps[2].parse::<f64>().ok(),
        }
    }

    Some(ToolTemperature {
        tool: tool?,
        target: target?,
        wait,
    })
}

/// Slicers whose metadata comments are understood, in detection priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlicerDialect {
    PrusaSlicer,
    SuperSlicer,
    OrcaSlicer,
    BambuStudio,
}

impl SlicerDialect {
    /// All dialects in detection priority order
    pub const ALL: [SlicerDialect; 4] = [
        SlicerDialect::PrusaSlicer,
        SlicerDialect::SuperSlicer,
        SlicerDialect::OrcaSlicer,
        SlicerDialect::BambuStudio,
    ];

    /// Name as it appears in the slicer signature
    pub fn name(&self) -> &'static str {
        match self {
            SlicerDialect::PrusaSlicer => "PrusaSlicer",
            SlicerDialect::SuperSlicer => "SuperSlicer",
            SlicerDialect::OrcaSlicer => "OrcaSlicer",
            SlicerDialect::BambuStudio => "BambuStudio",
        }
    }
}

impl std::fmt::Display for SlicerDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Recognize a slicer signature comment
///
/// Matches `; generated by PrusaSlicer 2.7.1 on ...` and the bare
/// `; BambuStudio 01.08.00.57` header form.
pub fn match_slicer_signature(line: &str) -> Option<SlicerDialect> {
    static SIGNATURE: OnceLock<Regex> = OnceLock::new();

    if !is_comment(line) {
        return None;
    }
    let signature = regex(
        &SIGNATURE,
        r"(?i)^\s*;\s*(?:generated by\s+)?(PrusaSlicer|SuperSlicer|OrcaSlicer|BambuStudio)\b",
    );
    let caps = signature.captures(line)?;
    let found = &caps[1];
    SlicerDialect::ALL
        .into_iter()
        .find(|dialect| dialect.name().eq_ignore_ascii_case(found))
}

/// A `; key = value` metadata comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataComment<'a> {
    /// Setting name
    pub key: &'a str,
    /// Raw value, trimmed
    pub value: &'a str,
}

/// Recognize a `; key = value` metadata comment
pub fn parse_metadata_comment(line: &str) -> Option<MetadataComment<'_>> {
    static METADATA: OnceLock<Regex> = OnceLock::new();

    let line = strip_terminator(line);
    let metadata = regex(&METADATA, r"^\s*;\s*([A-Za-z0-9_\-\[\]]+)\s*=\s*(.*?)\s*$");
    let caps = metadata.captures(line)?;
    let key = caps.get(1)?.as_str();
    let value = caps.get(2)?.as_str();
    Some(MetadataComment { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_select_dialects() {
        assert_eq!(extract_tool_number("T0\n"), Some(0));
        assert_eq!(extract_tool_number("  T12 ; next color"), Some(12));
        assert_eq!(extract_tool_number("M6 T3"), Some(3));
        assert_eq!(extract_tool_number("T4 M06"), Some(4));
        assert_eq!(extract_tool_number("SELECT_TOOL T=2"), Some(2));
        assert_eq!(extract_tool_number("select_tool TOOL=5"), Some(5));
        assert_eq!(
            extract_tool_number("ACTIVATE_EXTRUDER EXTRUDER=extruder"),
            Some(0)
        );
        assert_eq!(
            extract_tool_number("ACTIVATE_EXTRUDER EXTRUDER=extruder2"),
            Some(2)
        );
        assert_eq!(
            match_tool_select("M6 T3").map(|s| s.dialect),
            Some(ToolSelectDialect::ToolChange)
        );
    }

    #[test]
    fn test_tool_select_rejects_parameters() {
        assert_eq!(extract_tool_number("M104 T1 S0"), None);
        assert_eq!(extract_tool_number("M109 T0 S215"), None);
        assert_eq!(extract_tool_number("; T1 is next"), None);
        assert_eq!(extract_tool_number("G10 P1 T2"), None);
        assert_eq!(extract_tool_number("TIMELAPSE_TAKE_FRAME"), None);
    }

    #[test]
    fn test_motion_present_words_only() {
        let m = parse_motion("G1 X100 Y50.5 F3000 ; move").unwrap();
        assert_eq!(m.x, Some(100.0));
        assert_eq!(m.y, Some(50.5));
        assert_eq!(m.z, None);
        assert_eq!(m.feedrate, Some(3000.0));

        let m = parse_motion("G0 Z.2").unwrap();
        assert_eq!(m.z, Some(0.2));
        assert_eq!(m.x, None);

        assert!(parse_motion("G01X-5").is_some());
        assert!(parse_motion("G10 L2 P1 X0").is_none());
        assert!(parse_motion("G17").is_none());
        assert!(parse_motion("; G1 X10").is_none());
        assert!(parse_motion("M104 S200").is_none());
    }

    #[test]
    fn test_dwell_units() {
        let p = parse_dwell_minutes("G4 P60000").unwrap();
        assert!((p - 1.0).abs() < 1e-9);
        let s = parse_dwell_minutes("G4 S30").unwrap();
        assert!((s - 0.5).abs() < 1e-9);
        assert!(parse_dwell_minutes("G4").is_none());
    }

    #[test]
    fn test_distance_mode() {
        assert_eq!(parse_distance_mode("G91"), Some(DistanceMode::Relative));
        assert_eq!(parse_distance_mode("G21 G90"), Some(DistanceMode::Absolute));
        assert_eq!(parse_distance_mode("G1 X10"), None);
        assert_eq!(parse_distance_mode("; G91"), None);
    }

    #[test]
    fn test_tool_temperature() {
        let heat = parse_tool_temperature("M109 T1 S215 ; wait").unwrap();
        assert_eq!(heat.tool, 1);
        assert_eq!(heat.target, 215.0);
        assert!(heat.wait);
        assert!(heat.is_heating());

        let off = parse_tool_temperature("M104 T0 S0").unwrap();
        assert!(!off.is_heating());
        assert!(!off.wait);

        assert!(parse_tool_temperature("M104 S200").is_none());
        assert!(parse_tool_temperature("M104 T2").is_none());
        assert!(parse_tool_temperature("M1040 T1 S200").is_none());
        assert!(parse_tool_temperature("; M104 T1 S200").is_none());
    }

    #[test]
    fn test_slicer_signature() {
        assert_eq!(
            match_slicer_signature("; generated by PrusaSlicer 2.7.1+win64 on 2024-01-01"),
            Some(SlicerDialect::PrusaSlicer)
        );
        assert_eq!(
            match_slicer_signature("; generated by OrcaSlicer 2.0.0 on 2024-01-01"),
            Some(SlicerDialect::OrcaSlicer)
        );
        assert_eq!(
            match_slicer_signature("; BambuStudio 01.08.00.57"),
            Some(SlicerDialect::BambuStudio)
        );
        assert_eq!(match_slicer_signature("; generated by Cura_SteamEngine 5.0"), None);
        assert_eq!(match_slicer_signature("G1 X1"), None);
    }

    #[test]
    fn test_metadata_comment() {
        let m = parse_metadata_comment("; filament_type = PLA;PETG\n").unwrap();
        assert_eq!(m.key, "filament_type");
        assert_eq!(m.value, "PLA;PETG");
        assert!(parse_metadata_comment("G1 X1").is_none());
        assert!(parse_metadata_comment("; just a note").is_none());
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("G1 X1 ; go"), ("G1 X1 ", Some("; go")));
        assert_eq!(strip_comment("M117 (hi)"), ("M117 ", Some("(hi)")));
        assert_eq!(strip_comment("G28\n"), ("G28", None));
    }
}
