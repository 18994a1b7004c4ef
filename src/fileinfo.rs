//! Per-file build state.

use std::collections::VecDeque;
use std::path::PathBuf;

use crate::renderer::RendererHandle;
use crate::types::{Fields, FileStats, Usage};

/// Where a file came from and where it goes. Fixed once classified.
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// `None` for virtual files.
    pub source_path: Option<PathBuf>,
    /// Slash-separated path relative to its root. Layouts and partials
    /// outside a theme are normalised to `_layouts/...` and `_partials/...`;
    /// theme files are relative to the theme folder.
    pub rel_path: String,
    pub stats: FileStats,
    pub usage: Usage,
    pub is_layout: bool,
    pub is_partial: bool,
    pub is_theme: bool,
    pub is_virtual: bool,
    /// Slash-separated, lowercased, relative to the output root.
    pub dest_rel_path: String,
    pub dest_path: PathBuf,
}

impl FileMeta {
    /// Layouts and partials are only used through other files.
    pub fn is_building_block(&self) -> bool {
        self.is_layout || self.is_partial
    }

    /// Whether `rel_path` sits somewhere under the relative folder `dir`.
    pub fn is_rel_in_dir(&self, dir: &str) -> bool {
        let dir = dir.trim_matches('/');
        !dir.is_empty()
            && self
                .rel_path
                .strip_prefix(dir)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// A classified file and its remaining renderer queue.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub meta: FileMeta,
    pub fields: Fields,
    /// Renderers still to run, front first.
    pub chain: VecDeque<RendererHandle>,
    pub can_save: bool,
}

impl FileInfo {
    pub fn new(meta: FileMeta, chain: Vec<RendererHandle>) -> Self {
        let can_save = !meta.is_building_block() && meta.usage != Usage::Ignore;
        Self {
            meta,
            fields: Fields::default(),
            chain: chain.into(),
            can_save,
        }
    }

    /// Theme and virtual files lose destination collisions to user files.
    pub fn is_theme_owned(&self) -> bool {
        self.meta.is_theme || self.meta.is_virtual
    }

    /// Renderer names still pending, padding excluded.
    pub fn pending_names(&self) -> Vec<&str> {
        self.chain
            .iter()
            .filter(|r| !r.is_dummy())
            .map(|r| r.name())
            .collect()
    }
}

/// A page synthesised by a renderer rather than read from disk.
#[derive(Debug, Clone)]
pub struct VirtualFile {
    /// Output path relative to the output root.
    pub dest_rel_path: String,
    /// Initial fields. `content` must not be empty.
    pub fields: Fields,
    /// Renderers to run, expanded through their links.
    pub renderers: Vec<String>,
}
