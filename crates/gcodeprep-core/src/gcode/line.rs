//! Instruction stream reading
//!
//! Files are read whole and split into [`SourceLine`]s that keep their
//! original terminator, so a file that passes through the pipeline untouched
//! comes out byte-for-byte identical apart from the fingerprint line. Lines
//! that are not valid UTF-8 are handed to processors in lossy form but keep
//! their original bytes for output.

use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Prefix shared by every fingerprint marker, independent of version
pub const FINGERPRINT_PREFIX: &str = "; processed by gcodeprep";

/// The exact first line written by this build (without terminator)
pub fn fingerprint_marker() -> String {
    format!("{} v{}", FINGERPRINT_PREFIX, env!("CARGO_PKG_VERSION"))
}

/// Check whether a line is a fingerprint written by any gcodeprep version
pub fn is_fingerprint(line: &str) -> bool {
    line.strip_prefix(FINGERPRINT_PREFIX)
        .is_some_and(|rest| rest.starts_with(" v"))
}

/// One line of the input file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceLine {
    /// 0-based position in the original file
    pub index: usize,
    /// Line text including its terminator, if it had one
    pub text: String,
    /// Original bytes when they are not valid UTF-8
    raw: Option<Vec<u8>>,
}

impl SourceLine {
    /// Create a new source line
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            raw: None,
        }
    }

    /// Create a source line from raw file bytes
    ///
    /// Invalid UTF-8 is replaced in `text` and the bytes are kept as read.
    pub fn from_bytes(index: usize, bytes: &[u8]) -> Self {
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::new(index, text),
            Err(_) => Self {
                index,
                text: String::from_utf8_lossy(bytes).into_owned(),
                raw: Some(bytes.to_vec()),
            },
        }
    }

    /// Bytes to write when the line passes through unchanged
    pub fn bytes(&self) -> &[u8] {
        self.raw.as_deref().unwrap_or(self.text.as_bytes())
    }

    /// Whether `text` is a lossy decoding of the original bytes
    pub fn is_lossy(&self) -> bool {
        self.raw.is_some()
    }

    /// Line content without the trailing terminator
    pub fn content(&self) -> &str {
        strip_terminator(&self.text)
    }
}

/// Line terminator convention of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTerminator {
    /// Unix style `\n`
    #[default]
    Lf,
    /// Windows style `\r\n`
    CrLf,
}

impl LineTerminator {
    /// Detect the convention from the first terminated line
    pub fn detect(text: impl AsRef<[u8]>) -> Self {
        let bytes = text.as_ref();
        match bytes.iter().position(|&b| b == b'\n') {
            Some(pos) if pos > 0 && bytes[pos - 1] == b'\r' => LineTerminator::CrLf,
            _ => LineTerminator::Lf,
        }
    }

    /// The terminator characters
    pub fn as_str(&self) -> &'static str {
        match self {
            LineTerminator::Lf => "\n",
            LineTerminator::CrLf => "\r\n",
        }
    }

    /// Append the terminator to `text`
    pub fn terminate(&self, text: &str) -> String {
        format!("{}{}", text, self.as_str())
    }
}

/// Remove a trailing `\n` or `\r\n` from a line
pub fn strip_terminator(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

/// Check whether a line ends with a terminator
pub fn has_terminator(line: &str) -> bool {
    line.ends_with('\n')
}

/// Split text into lines, keeping terminators attached
pub fn split_lines(text: &str) -> Vec<SourceLine> {
    text.split_inclusive('\n')
        .enumerate()
        .map(|(index, line)| SourceLine::new(index, line))
        .collect()
}

/// Split raw file content into lines, keeping terminators attached
pub fn split_bytes(bytes: &[u8]) -> Vec<SourceLine> {
    bytes
        .split_inclusive(|&b| b == b'\n')
        .enumerate()
        .map(|(index, line)| SourceLine::from_bytes(index, line))
        .collect()
}

/// Read a G-code file into ordered source lines
///
/// Slicers occasionally emit Latin-1 in comments. Such lines are not rejected;
/// see [`SourceLine::from_bytes`].
pub fn read_source_lines(path: &Path) -> Result<(Vec<SourceLine>, LineTerminator)> {
    if path.is_dir() {
        return Err(PipelineError::InvalidInput {
            path: path.to_path_buf(),
            reason: "path is a directory".to_string(),
        });
    }

    let bytes = fs::read(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let terminator = LineTerminator::detect(&bytes);

    Ok((split_bytes(&bytes), terminator))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_preserves_terminators() {
        let lines = split_lines("G28\r\nT0\nG1 X1");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].text, "G28\r\n");
        assert_eq!(lines[0].content(), "G28");
        assert_eq!(lines[1].text, "T0\n");
        assert_eq!(lines[2].text, "G1 X1");
        assert_eq!(lines[2].index, 2);
    }

    #[test]
    fn test_terminator_detection() {
        assert_eq!(LineTerminator::detect("G28\r\nT0\r\n"), LineTerminator::CrLf);
        assert_eq!(LineTerminator::detect("G28\nT0\n"), LineTerminator::Lf);
        assert_eq!(LineTerminator::detect("G28"), LineTerminator::Lf);
        assert_eq!(LineTerminator::CrLf.terminate("T1"), "T1\r\n");
    }

    #[test]
    fn test_fingerprint_detection() {
        assert!(is_fingerprint(&fingerprint_marker()));
        assert!(is_fingerprint(&format!("{}\n", fingerprint_marker())));
        assert!(is_fingerprint("; processed by gcodeprep v0.1.0\r\n"));
        assert!(!is_fingerprint("; Processed By gcodeprep v0.1.0"));
        assert!(!is_fingerprint("; generated by PrusaSlicer 2.7.1"));
    }

    #[test]
    fn test_invalid_utf8_keeps_original_bytes() {
        let lines = split_bytes(b"; Temp\xe9rature PLA\r\nG28\r\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].is_lossy());
        assert_eq!(lines[0].text, "; Temp\u{fffd}rature PLA\r\n");
        assert_eq!(lines[0].bytes(), b"; Temp\xe9rature PLA\r\n");
        assert!(!lines[1].is_lossy());
        assert_eq!(lines[1].bytes(), b"G28\r\n");
        assert_eq!(LineTerminator::detect(b"G28\r\n"), LineTerminator::CrLf);
    }

    #[test]
    fn test_empty_text_has_no_lines() {
        assert!(split_lines("").is_empty());
    }
}
