//! Build orchestration.
//!
//! ```text
//! config.toml ─→ SiteConfig ─→ RendererRegistry (register, init)
//!                    │
//!                    └─→ walk partials/layouts/theme (outside source), source
//!                          └─→ classify ─→ BuildSet
//!                                            └─→ Scheduler ─→ output/
//! ```
//!
//! [`prepare`] stops after classification, which is all `kiln check`
//! needs; [`build`] runs the scheduler on a prepared site.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::classify::{ClassifyError, Classifier};
use crate::config::{self, ConfigError, SitePaths};
use crate::context::{Admission, BuildSet, ContextError};
use crate::plugins;
use crate::registry::RendererRegistry;
use crate::renderer::RendererError;
use crate::scan::{self, ScanError};
use crate::schedule::{BuildEvent, ScheduleError, ScheduleSummary, Scheduler};
use crate::types::Usage;
use crate::writer::OutputWriter;

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("source folder not found: {}", .0.display())]
    MissingSource(PathBuf),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("discovery failed: {0}")]
    Scan(#[from] ScanError),
    #[error("renderer setup failed: {0}")]
    Renderer(#[from] RendererError),
    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Remove the output folder before building.
    pub clean: bool,
}

/// A site whose files are discovered and classified but not rendered.
pub struct Site {
    pub registry: RendererRegistry,
    pub set: BuildSet,
    /// Files found by discovery, before classification.
    pub discovered: usize,
    pub ignored: usize,
    pub shadowed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub out: PathBuf,
    pub files: usize,
    pub schedule: ScheduleSummary,
}

/// One line of `kiln check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckedFile {
    pub rel_path: String,
    pub usage: Usage,
    pub dest: String,
    pub chain: Vec<String>,
    pub is_theme: bool,
    pub is_building_block: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub base: PathBuf,
    pub theme: Option<String>,
    pub files: Vec<CheckedFile>,
    pub discovered: usize,
    pub ignored: usize,
    pub shadowed: usize,
}

/// Load config, set up renderers and classify every discovered file.
pub fn prepare(base: &Path) -> Result<Site, BuildError> {
    let config = config::load_config(base)?;
    let mut paths = SitePaths::resolve(base, &config);
    if !paths.source.is_dir() {
        return Err(BuildError::MissingSource(paths.source));
    }

    let theme = match paths.theme.clone() {
        Some(root) if root.is_dir() => Some(config::load_theme_config(&root)?),
        Some(root) => {
            warn!(theme = %root.display(), "theme folder not found, building without a theme");
            paths.theme = None;
            None
        }
        None => None,
    };

    let mut registry = RendererRegistry::new();
    plugins::register_builtins(&mut registry, &config.plugins)?;
    registry.init(&config)?;
    debug!(renderers = ?registry.names(), "renderers ready");

    let mut set = BuildSet::new(config, paths, theme);
    let entries = discover(&set)?;
    let discovered = entries.len();
    let mut ignored = 0;
    let mut shadowed = 0;
    {
        let default_ext = set.config.default_extension.clone();
        let classifier = Classifier::new(&registry, &default_ext);
        for entry in entries {
            let file = classifier.classify(&entry.path, entry.stats, &set)?;
            match set.insert(file)? {
                Admission::Ignored => ignored += 1,
                Admission::Shadowed { .. } => shadowed += 1,
                Admission::Replaced { .. } => shadowed += 1,
                Admission::Added => {}
            }
        }
    }
    info!(
        files = set.len(),
        ignored,
        shadowed,
        "classified {discovered} discovered files"
    );
    Ok(Site {
        registry,
        set,
        discovered,
        ignored,
        shadowed,
    })
}

/// Walk every folder the build reads from, in scheduling order.
fn discover(set: &BuildSet) -> Result<Vec<scan::Entry>, BuildError> {
    let paths = &set.paths;
    let config = &set.config;
    let exclude = [paths.out.clone()];
    let mut entries = Vec::new();

    let extra = [
        ("partials", &paths.partials, config.partials_path.is_some()),
        ("layouts", &paths.layouts, config.layouts_path.is_some()),
    ];
    for (kind, dir, configured) in extra {
        if dir.starts_with(&paths.source) {
            if configured {
                warn!(
                    folder = %dir.display(),
                    "configured {kind} folder is inside the source folder"
                );
            }
            continue;
        }
        entries.extend(scan::walk(dir, &exclude)?);
    }
    if let Some(theme) = &paths.theme
        && !theme.starts_with(&paths.source)
    {
        entries.extend(scan::walk(theme, &exclude)?);
    }
    entries.extend(scan::walk(&paths.source, &exclude)?);
    Ok(entries)
}

/// Render a prepared site into its output folder.
pub fn build(
    site: Site,
    options: &BuildOptions,
    events: Option<Sender<BuildEvent>>,
) -> Result<BuildSummary, BuildError> {
    let Site {
        registry, mut set, ..
    } = site;
    let out = set.paths.out.clone();
    if options.clean && out.exists() {
        let removed = clean_output(&out)?;
        info!(out = %out.display(), removed, "cleaned output folder");
    }
    fs::create_dir_all(&out)?;

    let mut scheduler = Scheduler::new(&registry, OutputWriter::new(&out));
    if let Some(tx) = events {
        scheduler = scheduler.with_events(tx);
    }
    let schedule = scheduler.run(&mut set)?;
    Ok(BuildSummary {
        out,
        files: set.len(),
        schedule,
    })
}

/// Delete everything in `out` that a walk of it would discover, then any
/// directories left empty. `.git` and whatever the output folder's
/// `.kilnignore` lists are kept.
fn clean_output(out: &Path) -> Result<usize, BuildError> {
    let entries = scan::walk(out, &[])?;
    for entry in &entries {
        fs::remove_file(&entry.path)?;
    }
    for dir in WalkDir::new(out).min_depth(1).contents_first(true) {
        let dir = dir.map_err(ScanError::from)?;
        if dir.file_type().is_dir() && fs::read_dir(dir.path())?.next().is_none() {
            fs::remove_dir(dir.path())?;
        }
    }
    Ok(entries.len())
}

/// Classify a site and describe what a build would do with every file.
pub fn check(base: &Path) -> Result<CheckReport, BuildError> {
    let site = prepare(base)?;
    let files = site
        .set
        .files()
        .iter()
        .map(|f| CheckedFile {
            rel_path: f.meta.rel_path.clone(),
            usage: f.meta.usage,
            dest: f.meta.dest_rel_path.clone(),
            chain: f.pending_names().into_iter().map(str::to_string).collect(),
            is_theme: f.meta.is_theme,
            is_building_block: f.meta.is_building_block(),
        })
        .collect();
    Ok(CheckReport {
        base: base.to_path_buf(),
        theme: site.set.theme.as_ref().map(|t| t.name.clone()),
        files,
        discovered: site.discovered,
        ignored: site.ignored,
        shadowed: site.shadowed,
    })
}
