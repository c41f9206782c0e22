//! Output commit
//!
//! The processed buffer is handed to an [`OutputSink`] as a whole. The default
//! [`AtomicFileSink`] writes a temporary file next to the target and renames it
//! over the original, so a reader of the public path sees either the old file
//! or the complete new one. The temporary file is removed on every failure path.

use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Destination for the final line sequence of a run
pub trait OutputSink: Send + Sync {
    /// Commit `lines` (each already terminated) as the new content of `path`
    fn commit(&self, path: &Path, lines: &[Vec<u8>]) -> io::Result<()>;
}

/// Replace the target atomically through a sibling temporary file
#[derive(Debug, Clone, Copy, Default)]
pub struct AtomicFileSink;

impl AtomicFileSink {
    pub fn new() -> Self {
        Self
    }
}

impl OutputSink for AtomicFileSink {
    fn commit(&self, path: &Path, lines: &[Vec<u8>]) -> io::Result<()> {
        write_lines_atomic(path, lines)
    }
}

/// Write lines to a sibling temporary file, then rename it over `path`
///
/// Permissions of an existing target are carried over to the replacement.
pub fn write_lines_atomic<L: AsRef<[u8]>>(path: &Path, lines: &[L]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "gcode".to_string())
    );
    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".preprocessing")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        for line in lines {
            writer.write_all(line.as_ref())?;
        }
        writer.flush()?;
    }
    temp.as_file().sync_all()?;

    if let Ok(metadata) = std::fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }

    persist(temp, path)
}

fn persist(temp: NamedTempFile, path: &Path) -> io::Result<()> {
    temp.persist(path).map(|_| ()).map_err(|e| {
        tracing::warn!("Failed to replace {}: {}", path.display(), e.error);
        // Dropping the returned handle deletes the temporary file
        e.error
    })
}
