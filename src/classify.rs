//! File classification.
//!
//! Decides for every discovered path whether it is ignored, copied verbatim
//! or processed through its renderer chain, and where it lands in the
//! output tree. Rules, first match wins:
//!
//! 1. Under the themes root but not the active theme → ignore.
//! 2. In the active theme: layouts and partials are processed; files under
//!    one of the theme's asset paths are copied (`*` matches any file in a
//!    theme subfolder); everything else is ignored.
//! 3. Anywhere else: files no renderer claims are copied, unless they are
//!    layouts or partials; the rest are processed.
//!
//! Destination paths are lowercased and have filename whitespace replaced
//! by `filename_space_char`.

use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::chain::ChainBuilder;
use crate::config::ThemeConfig;
use crate::context::BuildSet;
use crate::fileinfo::{FileInfo, FileMeta, VirtualFile};
use crate::naming::{join_rel, rel_string, sanitize};
use crate::registry::RendererRegistry;
use crate::renderer::RendererError;
use crate::types::{FileStats, Usage};

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error(transparent)]
    Renderer(#[from] RendererError),
    #[error("virtual file '{0}' has no content")]
    InvalidVirtualFile(String),
}

pub struct Classifier<'a> {
    chains: ChainBuilder<'a>,
}

impl<'a> Classifier<'a> {
    pub fn new(registry: &'a RendererRegistry, default_ext: &'a str) -> Self {
        Self {
            chains: ChainBuilder::new(registry, default_ext),
        }
    }

    pub fn classify(
        &self,
        path: &Path,
        stats: FileStats,
        set: &BuildSet,
    ) -> Result<FileInfo, ClassifyError> {
        let paths = &set.paths;
        let theme_root = paths.theme.as_deref();
        let is_theme = theme_root.is_some_and(|t| path.starts_with(t));
        let in_themes_root = path.starts_with(&paths.themes_root);
        let under = |dir: Option<std::path::PathBuf>| dir.is_some_and(|d| path.starts_with(d));
        let is_layout = if is_theme {
            under(paths.theme_layouts())
        } else {
            !in_themes_root && path.starts_with(&paths.layouts)
        };
        let is_partial = if is_theme {
            under(paths.theme_partials())
        } else {
            !in_themes_root && path.starts_with(&paths.partials)
        };

        let rel_path = if is_theme {
            relative(path, theme_root.unwrap_or(&paths.themes_root))
        } else if is_layout {
            join_rel("_layouts", &relative(path, &paths.layouts))
        } else if is_partial {
            join_rel("_partials", &relative(path, &paths.partials))
        } else if path.starts_with(&paths.source) {
            relative(path, &paths.source)
        } else {
            relative(path, &paths.base)
        };

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if in_themes_root && !is_theme {
            let meta = self.meta(set, path, rel_path, &file_name, stats);
            return Ok(FileInfo::new(
                FileMeta {
                    usage: Usage::Ignore,
                    ..meta
                },
                Vec::new(),
            ));
        }

        let chain = self.chains.build(&file_name)?;
        let mut meta = self.meta(set, path, rel_path, &chain.dest_filename, stats);
        meta.is_theme = is_theme;
        meta.is_layout = is_layout;
        meta.is_partial = is_partial;
        meta.usage = if is_theme {
            if is_layout || is_partial {
                Usage::Process
            } else if is_theme_asset(set.theme.as_ref(), &meta.rel_path, &meta.dest_rel_path) {
                Usage::Copy
            } else {
                Usage::Ignore
            }
        } else if chain.renderers.is_empty() && !(is_layout || is_partial) {
            Usage::Copy
        } else {
            Usage::Process
        };
        debug!(
            file = %meta.rel_path,
            usage = %meta.usage,
            dest = %meta.dest_rel_path,
            "classified"
        );
        let chain = if meta.usage == Usage::Process {
            chain.renderers
        } else {
            Vec::new()
        };
        Ok(FileInfo::new(meta, chain))
    }

    fn meta(
        &self,
        set: &BuildSet,
        path: &Path,
        rel_path: String,
        dest_filename: &str,
        stats: FileStats,
    ) -> FileMeta {
        let dir = rel_path
            .rsplit_once('/')
            .map(|(d, _)| d.to_lowercase())
            .unwrap_or_default();
        let dest_rel_path = join_rel(
            &dir,
            &sanitize(dest_filename, &set.config.filename_space_char),
        );
        FileMeta {
            source_path: Some(path.to_path_buf()),
            dest_path: set.paths.out.join(&dest_rel_path),
            dest_rel_path,
            rel_path,
            stats,
            usage: Usage::Process,
            is_layout: false,
            is_partial: false,
            is_theme: false,
            is_virtual: false,
        }
    }

    /// Classify a synthesised page. Always processed.
    pub fn classify_virtual(
        &self,
        file: VirtualFile,
        set: &BuildSet,
    ) -> Result<FileInfo, ClassifyError> {
        if file.fields.content.is_empty() {
            return Err(ClassifyError::InvalidVirtualFile(file.dest_rel_path));
        }
        let chain = self.chains.build_from_names(&file.renderers)?;
        let trimmed = file.dest_rel_path.trim_start_matches('/');
        let (dir, name) = trimmed.rsplit_once('/').unwrap_or(("", trimmed));
        let dest_rel_path = join_rel(
            &dir.to_lowercase(),
            &sanitize(name, &set.config.filename_space_char),
        );
        let meta = FileMeta {
            source_path: None,
            rel_path: dest_rel_path.clone(),
            stats: FileStats::default(),
            usage: Usage::Process,
            is_layout: false,
            is_partial: false,
            is_theme: false,
            is_virtual: true,
            dest_path: set.paths.out.join(&dest_rel_path),
            dest_rel_path,
        };
        debug!(dest = %meta.dest_rel_path, "classified virtual file");
        let mut info = FileInfo::new(meta, chain);
        info.fields = file.fields;
        Ok(info)
    }
}

fn relative(path: &Path, root: &Path) -> String {
    rel_string(path.strip_prefix(root).unwrap_or(path))
}

fn is_theme_asset(theme: Option<&ThemeConfig>, rel_path: &str, dest_rel_path: &str) -> bool {
    let default_theme = ThemeConfig::default();
    let mut asset_paths = theme.unwrap_or(&default_theme).asset_paths.as_slice();
    if asset_paths.first().is_some_and(|p| p == "*") {
        if dest_rel_path.contains('/') {
            return true;
        }
        asset_paths = &asset_paths[1..];
    }
    asset_paths.iter().any(|folder| {
        let folder = folder.trim_matches('/');
        rel_path == folder
            || rel_path
                .strip_prefix(folder)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}
