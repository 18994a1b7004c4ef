//! The build set: every known file plus the cross-file data renderers share.
//!
//! Files are kept in discovery order; the scheduler walks them by index.
//! Two lookups are maintained next to the list:
//!
//! - By destination, to enforce that a destination has exactly one owner.
//!   When a user file and a theme (or virtual) file want the same
//!   destination the user file wins; two user files is an error.
//! - By normalised name, for layouts and partials, so templates can refer
//!   to `Page.html`, `page.html` or `page` interchangeably. User entries
//!   shadow theme entries of the same name.
//!
//! [`Aggregate`] holds the collation tables (`post_type`, `tags`, ...)
//! built while pages are rendered and read by listing pages.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{SiteConfig, SitePaths, ThemeConfig};
use crate::fileinfo::{FileInfo, VirtualFile};
use crate::naming::{cache_key, split_extensions};

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("'{existing}' and '{incoming}' both write to '{dest}'")]
    AmbiguousDestination {
        dest: String,
        existing: String,
        incoming: String,
    },
}

/// What happened to a file offered to [`BuildSet::insert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Added,
    /// Added, replacing the theme file at `replaced`.
    Replaced { replaced: String },
    /// Dropped because a user file already owns the destination.
    Shadowed { by: String },
    /// Classified as ignored, never added.
    Ignored,
}

#[derive(Debug)]
pub struct BuildSet {
    pub config: SiteConfig,
    pub paths: SitePaths,
    /// Settings of the active theme, if one was found.
    pub theme: Option<ThemeConfig>,
    pub aggregate: Aggregate,
    files: Vec<FileInfo>,
    by_dest: HashMap<PathBuf, usize>,
    by_rel: HashMap<String, usize>,
    layouts: HashMap<String, String>,
    partials: HashMap<String, String>,
    pending: Vec<VirtualFile>,
}

impl BuildSet {
    pub fn new(config: SiteConfig, paths: SitePaths, theme: Option<ThemeConfig>) -> Self {
        Self {
            config,
            paths,
            theme,
            aggregate: Aggregate::default(),
            files: Vec::new(),
            by_dest: HashMap::new(),
            by_rel: HashMap::new(),
            layouts: HashMap::new(),
            partials: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Add a classified file, resolving destination collisions.
    pub fn insert(&mut self, file: FileInfo) -> Result<Admission, ContextError> {
        if file.meta.usage == crate::types::Usage::Ignore {
            return Ok(Admission::Ignored);
        }
        let mut admission = Admission::Added;
        if let Some(&i) = self.by_dest.get(&file.meta.dest_path) {
            let existing = &self.files[i];
            match (existing.is_theme_owned(), file.is_theme_owned()) {
                (true, false) => {
                    let replaced = existing.meta.rel_path.clone();
                    debug!(
                        theme_file = %replaced,
                        user_file = %file.meta.rel_path,
                        "user file replaces theme file"
                    );
                    self.remove(i);
                    admission = Admission::Replaced { replaced };
                }
                (false, true) => {
                    debug!(
                        theme_file = %file.meta.rel_path,
                        user_file = %existing.meta.rel_path,
                        "theme file shadowed by user file"
                    );
                    return Ok(Admission::Shadowed {
                        by: existing.meta.rel_path.clone(),
                    });
                }
                _ => {
                    return Err(ContextError::AmbiguousDestination {
                        dest: file.meta.dest_rel_path.clone(),
                        existing: existing.meta.rel_path.clone(),
                        incoming: file.meta.rel_path.clone(),
                    });
                }
            }
        }
        self.register_names(&file);
        let i = self.files.len();
        self.by_dest.insert(file.meta.dest_path.clone(), i);
        self.by_rel.insert(file.meta.rel_path.clone(), i);
        self.files.push(file);
        Ok(admission)
    }

    fn remove(&mut self, i: usize) {
        let removed = self.files.remove(i);
        let rel = removed.meta.rel_path;
        self.layouts.retain(|_, v| *v != rel);
        self.partials.retain(|_, v| *v != rel);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.by_dest.clear();
        self.by_rel.clear();
        for (i, f) in self.files.iter().enumerate() {
            self.by_dest.insert(f.meta.dest_path.clone(), i);
            self.by_rel.insert(f.meta.rel_path.clone(), i);
        }
    }

    fn register_names(&mut self, file: &FileInfo) {
        let meta = &file.meta;
        if !meta.is_building_block() {
            return;
        }
        let space = &self.config.filename_space_char;
        let source_name = meta
            .source_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| meta.rel_path.clone());
        let mut keys = vec![
            cache_key(&source_name, space),
            cache_key(&meta.dest_rel_path, space),
        ];
        if meta.is_partial {
            keys.push(cache_key(&split_extensions(&source_name).base, space));
        }
        keys.dedup();

        let (cache, files) = if meta.is_partial {
            (&mut self.partials, &self.files)
        } else {
            (&mut self.layouts, &self.files)
        };
        for key in keys {
            let shadowed_by_user = cache
                .get(&key)
                .and_then(|rel| self.by_rel.get(rel))
                .is_some_and(|&i| !files[i].is_theme_owned());
            if file.is_theme_owned() && shadowed_by_user {
                continue;
            }
            cache.insert(key, meta.rel_path.clone());
        }
    }

    pub fn files(&self) -> &[FileInfo] {
        &self.files
    }

    pub fn file(&self, index: usize) -> Option<&FileInfo> {
        self.files.get(index)
    }

    pub fn file_mut(&mut self, index: usize) -> Option<&mut FileInfo> {
        self.files.get_mut(index)
    }

    pub fn files_mut(&mut self) -> &mut [FileInfo] {
        &mut self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file_by_rel_path(&self, rel_path: &str) -> Option<&FileInfo> {
        self.by_rel.get(rel_path).map(|&i| &self.files[i])
    }

    /// Layout by name, insensitive to case and whitespace style.
    pub fn lookup_layout(&self, name: &str) -> Option<&FileInfo> {
        let key = cache_key(name, &self.config.filename_space_char);
        self.layouts
            .get(&key)
            .and_then(|rel| self.file_by_rel_path(rel))
    }

    /// Partial by name, insensitive to case and whitespace style.
    pub fn lookup_partial(&self, name: &str) -> Option<&FileInfo> {
        let key = cache_key(name, &self.config.filename_space_char);
        self.partials
            .get(&key)
            .and_then(|rel| self.file_by_rel_path(rel))
    }

    /// Queue a virtual file. It joins the set at the next pass boundary.
    pub fn add_virtual(&mut self, file: VirtualFile) {
        debug!(dest = %file.dest_rel_path, "queued virtual file");
        self.pending.push(file);
    }

    /// Whether a file in the set, or one still queued, writes to
    /// `dest_rel_path`.
    pub fn is_destination_taken(&self, dest_rel_path: &str) -> bool {
        let dest_rel_path = dest_rel_path.trim_start_matches('/');
        self.by_dest.contains_key(&self.paths.out.join(dest_rel_path))
            || self
                .pending
                .iter()
                .any(|p| p.dest_rel_path.trim_start_matches('/') == dest_rel_path)
    }

    pub fn take_pending(&mut self) -> Vec<VirtualFile> {
        std::mem::take(&mut self.pending)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Collation tables shared by every file in the build.
///
/// Keyed tables map a field value to the pages carrying it
/// (`tags → {rust: [a.md, b.md]}`); lists hold pages directly
/// (`featured → [a.md]`). Entries are relative source paths, without
/// duplicates, in collation order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregate(BTreeMap<String, Collation>);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Collation {
    Keyed(BTreeMap<String, Vec<String>>),
    List(Vec<String>),
}

impl Aggregate {
    /// Record `rel_path` under `table[value]`. Returns true if `value` was
    /// not in the table before.
    pub fn collate(&mut self, table: &str, value: &str, rel_path: &str) -> bool {
        let entry = self
            .0
            .entry(table.to_string())
            .or_insert_with(|| Collation::Keyed(BTreeMap::new()));
        match entry {
            Collation::Keyed(map) => {
                let is_new = !map.contains_key(value);
                let items = map.entry(value.to_string()).or_default();
                if !items.iter().any(|r| r == rel_path) {
                    items.push(rel_path.to_string());
                }
                is_new
            }
            Collation::List(_) => {
                warn!(table, "cannot collate a keyed value into a list");
                false
            }
        }
    }

    /// Append `rel_path` to the list `table`.
    pub fn push(&mut self, table: &str, rel_path: &str) {
        let entry = self
            .0
            .entry(table.to_string())
            .or_insert_with(|| Collation::List(Vec::new()));
        match entry {
            Collation::List(items) => {
                if !items.iter().any(|r| r == rel_path) {
                    items.push(rel_path.to_string());
                }
            }
            Collation::Keyed(_) => warn!(table, "cannot push into a keyed collation"),
        }
    }

    pub fn get(&self, table: &str) -> Option<&Collation> {
        self.0.get(table)
    }

    pub fn keyed(&self, table: &str) -> Option<&BTreeMap<String, Vec<String>>> {
        match self.0.get(table) {
            Some(Collation::Keyed(map)) => Some(map),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Collation)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{build_set, meta};

    fn file(rel: &str, dest: &str) -> FileInfo {
        FileInfo::new(meta(rel, dest), vec![])
    }

    fn theme_file(rel: &str, dest: &str) -> FileInfo {
        let mut m = meta(rel, dest);
        m.is_theme = true;
        FileInfo::new(m, vec![])
    }

    fn layout(rel: &str, source: &str, is_theme: bool) -> FileInfo {
        let mut m = meta(rel, rel);
        m.is_layout = true;
        m.is_theme = is_theme;
        m.source_path = Some(PathBuf::from(source));
        FileInfo::new(m, vec![])
    }

    #[test]
    fn user_file_replaces_theme_file() {
        let mut set = build_set();
        set.insert(theme_file("index.html", "index.html")).unwrap();
        let admission = set.insert(file("index.tem.html", "index.html")).unwrap();
        assert_eq!(
            admission,
            Admission::Replaced {
                replaced: "index.html".into()
            }
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.files()[0].meta.rel_path, "index.tem.html");
    }

    #[test]
    fn theme_file_is_dropped_when_user_file_exists() {
        let mut set = build_set();
        set.insert(file("css/site.css", "css/site.css")).unwrap();
        let admission = set.insert(theme_file("css/site.css", "css/site.css")).unwrap();
        assert!(matches!(admission, Admission::Shadowed { .. }));
        assert_eq!(set.len(), 1);
        assert!(!set.files()[0].meta.is_theme);
    }

    #[test]
    fn two_user_files_are_ambiguous() {
        let mut set = build_set();
        set.insert(file("about.md", "about.html")).unwrap();
        let err = set.insert(file("about.tex", "about.html")).unwrap_err();
        let ContextError::AmbiguousDestination {
            dest,
            existing,
            incoming,
        } = err;
        assert_eq!(dest, "about.html");
        assert_eq!(existing, "about.md");
        assert_eq!(incoming, "about.tex");
    }

    #[test]
    fn two_theme_files_are_ambiguous() {
        let mut set = build_set();
        set.insert(theme_file("a.md", "a.html")).unwrap();
        assert!(set.insert(theme_file("a.tex", "a.html")).is_err());
    }

    #[test]
    fn ignored_files_are_not_added() {
        let mut set = build_set();
        let mut f = file("x", "x");
        f.meta.usage = crate::types::Usage::Ignore;
        assert_eq!(set.insert(f).unwrap(), Admission::Ignored);
        assert!(set.is_empty());
    }

    #[test]
    fn removal_keeps_indexes_consistent() {
        let mut set = build_set();
        set.insert(theme_file("a.html", "a.html")).unwrap();
        set.insert(file("b.html", "b.html")).unwrap();
        set.insert(file("a.tem.html", "a.html")).unwrap();
        assert_eq!(set.file_by_rel_path("b.html").unwrap().meta.rel_path, "b.html");
        assert_eq!(
            set.file_by_rel_path("a.tem.html").unwrap().meta.dest_rel_path,
            "a.html"
        );
        assert!(set.file_by_rel_path("a.html").is_none());
    }

    #[test]
    fn layouts_are_found_by_normalised_name() {
        let mut set = build_set();
        set.insert(layout("_layouts/Main Page.html", "/s/_layouts/Main Page.html", false))
            .unwrap();
        assert!(set.lookup_layout("main-page.html").is_some());
        assert!(set.lookup_layout("MAIN PAGE.html").is_some());
        assert!(set.lookup_layout("other.html").is_none());
    }

    #[test]
    fn user_layout_shadows_theme_layout_of_same_name() {
        let mut set = build_set();
        set.insert(layout("_layouts/page.html", "/s/_layouts/page.html", false))
            .unwrap();
        set.insert(layout(
            "_layouts/nested/page.html",
            "/t/_layouts/nested/page.html",
            true,
        ))
        .unwrap();
        let found = set.lookup_layout("page.html").unwrap();
        assert!(!found.meta.is_theme);
    }

    #[test]
    fn user_layout_added_after_theme_layout_wins() {
        let mut set = build_set();
        set.insert(layout(
            "_layouts/nested/page.html",
            "/t/_layouts/nested/page.html",
            true,
        ))
        .unwrap();
        set.insert(layout("_layouts/page.html", "/s/_layouts/page.html", false))
            .unwrap();
        assert!(!set.lookup_layout("page.html").unwrap().meta.is_theme);
    }

    #[test]
    fn partials_are_found_by_stem() {
        let mut set = build_set();
        let mut m = meta("_partials/header.tem.html", "_partials/header.html");
        m.is_partial = true;
        m.source_path = Some(PathBuf::from("/s/_partials/header.tem.html"));
        set.insert(FileInfo::new(m, vec![])).unwrap();
        assert!(set.lookup_partial("header").is_some());
        assert!(set.lookup_partial("header.html").is_some());
        assert!(set.lookup_partial("header.tem.html").is_some());
    }

    #[test]
    fn pending_virtual_files_are_taken_once() {
        let mut set = build_set();
        set.add_virtual(VirtualFile {
            dest_rel_path: "tags.html".into(),
            fields: Default::default(),
            renderers: vec![],
        });
        assert!(set.has_pending());
        assert_eq!(set.take_pending().len(), 1);
        assert!(set.take_pending().is_empty());
    }

    #[test]
    fn destinations_count_as_taken_when_queued_or_inserted() {
        let mut set = build_set();
        set.insert(file("about.md", "about.html")).unwrap();
        set.add_virtual(VirtualFile {
            dest_rel_path: "tags.html".into(),
            fields: Default::default(),
            renderers: vec![],
        });
        assert!(set.is_destination_taken("about.html"));
        assert!(set.is_destination_taken("/tags.html"));
        assert!(!set.is_destination_taken("authors.html"));
    }

    // =========================================================================
    // Aggregate
    // =========================================================================

    #[test]
    fn collate_reports_new_values_and_dedups() {
        let mut agg = Aggregate::default();
        assert!(agg.collate("tags", "rust", "a.md"));
        assert!(!agg.collate("tags", "rust", "b.md"));
        assert!(!agg.collate("tags", "rust", "a.md"));
        assert_eq!(agg.keyed("tags").unwrap()["rust"], vec!["a.md", "b.md"]);
    }

    #[test]
    fn lists_keep_order_without_duplicates() {
        let mut agg = Aggregate::default();
        agg.push("featured", "b.md");
        agg.push("featured", "a.md");
        agg.push("featured", "b.md");
        assert_eq!(
            agg.get("featured"),
            Some(&Collation::List(vec!["b.md".into(), "a.md".into()]))
        );
    }

    #[test]
    fn mismatched_collation_kinds_are_ignored() {
        let mut agg = Aggregate::default();
        agg.push("featured", "a.md");
        assert!(!agg.collate("featured", "x", "b.md"));
        agg.collate("tags", "x", "a.md");
        agg.push("tags", "b.md");
        assert_eq!(agg.keyed("tags").unwrap().len(), 1);
    }

    #[test]
    fn aggregate_serializes_untagged() {
        let mut agg = Aggregate::default();
        agg.collate("tags", "rust", "a.md");
        agg.push("featured", "a.md");
        let json = serde_json::to_value(&agg).unwrap();
        assert_eq!(json["tags"]["rust"][0], "a.md");
        assert_eq!(json["featured"][0], "a.md");
    }
}
