//! Idempotent output writing.
//!
//! A destination whose bytes already match is left alone, so mtimes only
//! move when content does. Destinations that resolve outside the output
//! root are refused and logged; renderers can set arbitrary paths, and a
//! bad one must not escape the output tree.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
    Written,
    /// Existing file already had identical content.
    Unchanged,
    /// Destination outside the output root.
    Refused,
}

impl WriteOutcome {
    pub fn wrote(self) -> bool {
        self == WriteOutcome::Written
    }
}

#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize(&root.into()),
        }
    }

    /// Whether `dest` lies under the output root, judged lexically.
    pub fn contains(&self, dest: &Path) -> bool {
        let dest = normalize(dest);
        dest != self.root && dest.starts_with(&self.root)
    }

    /// Write `content` to `dest`, creating parent directories.
    pub fn write(&self, dest: &Path, content: &[u8]) -> Result<WriteOutcome, WriteError> {
        if !self.contains(dest) {
            warn!(
                dest = %dest.display(),
                root = %self.root.display(),
                "refusing to write outside the output root"
            );
            return Ok(WriteOutcome::Refused);
        }
        if is_unchanged(dest, content) {
            debug!(dest = %dest.display(), "unchanged");
            return Ok(WriteOutcome::Unchanged);
        }
        let io_err = |source| WriteError::Io {
            path: dest.to_path_buf(),
            source,
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(dest, content).map_err(io_err)?;
        debug!(dest = %dest.display(), bytes = content.len(), "written");
        Ok(WriteOutcome::Written)
    }

    /// Copy `source` to `dest` with the same rules as [`write`](Self::write).
    pub fn copy(&self, source: &Path, dest: &Path) -> Result<WriteOutcome, WriteError> {
        let content = fs::read(source).map_err(|source_err| WriteError::Io {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        self.write(dest, &content)
    }
}

/// True only when `dest` exists, is readable and matches `content`.
/// Read failures count as "no existing file".
fn is_unchanged(dest: &Path, content: &[u8]) -> bool {
    match fs::metadata(dest) {
        Ok(meta) if meta.is_file() && meta.len() == content.len() as u64 => {}
        _ => return false,
    }
    match fs::read(dest) {
        Ok(existing) => existing == content,
        Err(e) => {
            warn!(dest = %dest.display(), error = %e, "cannot compare existing file, overwriting");
            false
        }
    }
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let writer = OutputWriter::new(tmp.path().join("out"));
        let dest = tmp.path().join("out/a/b/c.html");
        assert_eq!(writer.write(&dest, b"hi").unwrap(), WriteOutcome::Written);
        assert_eq!(fs::read(&dest).unwrap(), b"hi");
    }

    #[test]
    fn identical_content_is_written_once() {
        let tmp = TempDir::new().unwrap();
        let writer = OutputWriter::new(tmp.path());
        let dest = tmp.path().join("page.html");
        assert!(writer.write(&dest, b"same").unwrap().wrote());
        let before = fs::metadata(&dest).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(writer.write(&dest, b"same").unwrap(), WriteOutcome::Unchanged);
        let after = fs::metadata(&dest).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn changed_content_is_rewritten() {
        let tmp = TempDir::new().unwrap();
        let writer = OutputWriter::new(tmp.path());
        let dest = tmp.path().join("page.html");
        writer.write(&dest, b"one").unwrap();
        assert!(writer.write(&dest, b"two").unwrap().wrote());
        assert_eq!(fs::read(&dest).unwrap(), b"two");
    }

    #[test]
    fn refuses_paths_outside_root() {
        let tmp = TempDir::new().unwrap();
        let writer = OutputWriter::new(tmp.path().join("out"));
        let escape = tmp.path().join("out/../escaped.html");
        assert_eq!(writer.write(&escape, b"x").unwrap(), WriteOutcome::Refused);
        assert!(!tmp.path().join("escaped.html").exists());
        let sibling = tmp.path().join("output2/a.html");
        assert_eq!(writer.write(&sibling, b"x").unwrap(), WriteOutcome::Refused);
    }

    #[test]
    fn refuses_the_root_itself() {
        let tmp = TempDir::new().unwrap();
        let writer = OutputWriter::new(tmp.path().join("out"));
        assert_eq!(
            writer.write(&tmp.path().join("out"), b"x").unwrap(),
            WriteOutcome::Refused
        );
    }

    #[test]
    fn directory_in_the_way_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let writer = OutputWriter::new(tmp.path());
        let dest = tmp.path().join("taken");
        fs::create_dir_all(&dest).unwrap();
        assert!(matches!(
            writer.write(&dest, b"x"),
            Err(WriteError::Io { .. })
        ));
    }

    #[test]
    fn copy_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("logo.png");
        fs::write(&src, [0u8, 1, 2, 255]).unwrap();
        let writer = OutputWriter::new(tmp.path().join("out"));
        let dest = tmp.path().join("out/images/logo.png");
        assert_eq!(writer.copy(&src, &dest).unwrap(), WriteOutcome::Written);
        assert_eq!(writer.copy(&src, &dest).unwrap(), WriteOutcome::Unchanged);
        assert_eq!(fs::read(&dest).unwrap(), vec![0u8, 1, 2, 255]);
    }

    #[test]
    fn normalize_resolves_dots() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    }
}
