//! Shared test utilities.
//!
//! Provides a temp-dir site builder, a configurable stub renderer and a
//! few shortcuts for building sets without touching the filesystem.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let site = SiteFixture::new()
//!     .file("source/blog/post1.md", "post")
//!     .file("source/blog.tem.html", "listing");
//! let registry = stub_registry(vec![
//!     StubRenderer::new("markdown").exts(&["md"]).pre("header"),
//!     StubRenderer::new("header"),
//! ]);
//! let set = populate(&site, &registry);
//! assert_eq!(set.len(), 2);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use crate::classify::Classifier;
use crate::config::{SiteConfig, SitePaths, load_config};
use crate::context::BuildSet;
use crate::fileinfo::FileMeta;
use crate::registry::RendererRegistry;
use crate::renderer::{Linker, PluginOptions, RenderError, Renderer, RendererError};
use crate::types::{Content, Fields, FileStats, Usage};

// =========================================================================
// Site fixture
// =========================================================================

/// A site directory in a temp folder, removed on drop.
pub struct SiteFixture {
    dir: TempDir,
}

impl SiteFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Write a file relative to the site base, creating folders.
    pub fn file(self, rel: &str, content: &str) -> Self {
        let path = self.dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    /// Write `config.toml`.
    pub fn config(self, toml: &str) -> Self {
        self.file("config.toml", toml)
    }

    pub fn base(&self) -> &Path {
        self.dir.path()
    }

    pub fn out_root(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    pub fn out(&self, rel: &str) -> PathBuf {
        self.out_root().join(rel)
    }

    /// Read an output file. Panics with the list of outputs on a miss.
    pub fn read_out(&self, rel: &str) -> String {
        let path = self.out(rel);
        fs::read_to_string(&path).unwrap_or_else(|_| {
            let found: Vec<String> = walkdir::WalkDir::new(self.out_root())
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().display().to_string())
                .collect();
            panic!("output '{rel}' not found. Available: {found:?}")
        })
    }
}

/// Classify every file under the fixture's source folder into a new set.
pub fn populate(site: &SiteFixture, registry: &RendererRegistry) -> BuildSet {
    let config = load_config(site.base()).unwrap();
    let paths = SitePaths::resolve(site.base(), &config);
    let mut set = BuildSet::new(config, paths, None);
    let entries = crate::scan::walk(&set.paths.source, std::slice::from_ref(&set.paths.out)).unwrap();
    let default_ext = set.config.default_extension.clone();
    let classifier = Classifier::new(registry, &default_ext);
    for entry in entries {
        let file = classifier.classify(&entry.path, entry.stats, &set).unwrap();
        set.insert(file).unwrap();
    }
    set
}

// =========================================================================
// In-memory sets
// =========================================================================

pub fn build_set() -> BuildSet {
    build_set_at("/site", None)
}

/// A set rooted at `base` with default config and optional active theme.
pub fn build_set_at(base: &str, theme: Option<&str>) -> BuildSet {
    let config = SiteConfig {
        theme: theme.map(str::to_string),
        ..SiteConfig::default()
    };
    let paths = SitePaths::resolve(Path::new(base), &config);
    BuildSet::new(config, paths, None)
}

/// Metadata for a plain user file in a set from [`build_set`].
pub fn meta(rel: &str, dest: &str) -> FileMeta {
    FileMeta {
        source_path: Some(PathBuf::from("/site/source").join(rel)),
        rel_path: rel.to_string(),
        stats: FileStats::default(),
        usage: Usage::Process,
        is_layout: false,
        is_partial: false,
        is_theme: false,
        is_virtual: false,
        dest_rel_path: dest.to_string(),
        dest_path: PathBuf::from("/site/output").join(dest),
    }
}

// =========================================================================
// Stub renderer
// =========================================================================

/// Records `renderer:rel_path` for every render, in order.
pub type RenderLog = Arc<Mutex<Vec<String>>>;

/// Renderer that appends `|name` to the content it is given.
#[derive(Default)]
pub struct StubRenderer {
    name: String,
    exts: Vec<String>,
    priority: i32,
    calc: Option<String>,
    pre: Vec<String>,
    post: Vec<String>,
    after: Vec<String>,
    log: Option<RenderLog>,
}

impl StubRenderer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            priority: crate::renderer::DEFAULT_PRIORITY,
            ..Self::default()
        }
    }

    pub fn exts(mut self, exts: &[&str]) -> Self {
        self.exts = exts.iter().map(|e| e.to_string()).collect();
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Extension this renderer produces.
    pub fn calc(mut self, ext: &str) -> Self {
        self.calc = Some(ext.to_string());
        self
    }

    pub fn pre(mut self, name: &str) -> Self {
        self.pre.push(name.to_string());
        self
    }

    pub fn post(mut self, name: &str) -> Self {
        self.post.push(name.to_string());
        self
    }

    pub fn after(mut self, name: &str) -> Self {
        self.after.push(name.to_string());
        self
    }

    pub fn log(mut self, log: &RenderLog) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }
}

impl Renderer for StubRenderer {
    fn name(&self) -> &str {
        &self.name
    }

    fn extensions(&self) -> Vec<String> {
        self.exts.clone()
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn calc_extension(&self, _filename: &str, _current_ext: &str, default_ext: &str) -> String {
        self.calc.clone().unwrap_or_else(|| default_ext.to_string())
    }

    fn init(&mut self, linker: &mut Linker, _options: &PluginOptions) -> Result<(), RendererError> {
        for name in &self.pre {
            linker.pre(name, 50);
        }
        for name in &self.post {
            linker.post(name, 50);
        }
        for name in &self.after {
            linker.after(name, 50);
        }
        Ok(())
    }

    fn render(
        &self,
        fields: &mut Fields,
        file: &FileMeta,
        _set: &mut BuildSet,
    ) -> Result<Content, RenderError> {
        if let Some(log) = &self.log {
            log.lock()
                .unwrap()
                .push(format!("{}:{}", self.name, file.rel_path));
        }
        Ok(Content::Text(format!(
            "{}|{}",
            fields.content.as_text(),
            self.name
        )))
    }
}

/// Register every stub and initialise the registry with default config.
pub fn stub_registry(stubs: Vec<StubRenderer>) -> RendererRegistry {
    let mut registry = RendererRegistry::new();
    for stub in stubs {
        registry.register(stub).unwrap();
    }
    registry.init(&SiteConfig::default()).unwrap();
    registry
}
