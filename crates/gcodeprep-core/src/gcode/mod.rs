//! G-code text handling: line reading and instruction recognizers

pub mod line;
pub mod patterns;

pub use line::{
    fingerprint_marker, is_fingerprint, read_source_lines, LineTerminator, SourceLine,
    FINGERPRINT_PREFIX,
};
pub use patterns::{
    extract_tool_number, is_comment, match_slicer_signature, match_tool_select, parse_motion,
    parse_tool_temperature, DistanceMode, MotionCommand, SlicerDialect, ToolSelect,
    ToolSelectDialect, ToolTemperature,
};
