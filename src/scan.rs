//! Discovery: walk a folder and report every file the build should see.
//!
//! Entries come back sorted by path so discovery order, and therefore the
//! order files are scheduled in, is the same on every run and platform.
//!
//! A `.kilnignore` at the top of the walked folder uses gitignore syntax.
//! `.git`, `node_modules` and the ignore file itself are always skipped, as
//! is anything under the excluded folders (normally the output root).

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::types::FileStats;

pub const IGNORE_FILE: &str = ".kilnignore";

const DEFAULT_IGNORES: &[&str] = &[IGNORE_FILE, ".git", "node_modules"];

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("ignore file error: {0}")]
    Ignore(#[from] ignore::Error),
}

/// One discovered file.
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: PathBuf,
    pub stats: FileStats,
}

/// Walk `dir` recursively. A missing folder yields no entries.
pub fn walk(dir: &Path, exclude: &[PathBuf]) -> Result<Vec<Entry>, ScanError> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "nothing to walk");
        return Ok(Vec::new());
    }
    let matcher = ignore_matcher(dir)?;
    let mut entries = Vec::new();
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let path = e.path();
            let skip = exclude.iter().any(|x| path.starts_with(x))
                || matcher.matched(path, e.file_type().is_dir()).is_ignore();
            if skip {
                debug!(path = %path.display(), "skipped");
            }
            !skip
        });
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let meta = entry.metadata()?;
        entries.push(Entry {
            path: entry.into_path(),
            stats: FileStats::from(&meta),
        });
    }
    Ok(entries)
}

fn ignore_matcher(dir: &Path) -> Result<Gitignore, ScanError> {
    let mut builder = GitignoreBuilder::new(dir);
    for pattern in DEFAULT_IGNORES {
        builder.add_line(None, pattern)?;
    }
    let file = dir.join(IGNORE_FILE);
    if file.is_file() {
        debug!(file = %file.display(), "loaded ignore file");
        for line in fs::read_to_string(&file)?.lines() {
            builder.add_line(Some(file.clone()), line)?;
        }
    }
    Ok(builder.build()?)
}
