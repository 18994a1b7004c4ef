//! Site configuration module.
//!
//! Handles loading, validating and merging `config.toml`. Stock defaults are
//! serialized to a TOML value, the user's file is deep-merged on top, and the
//! result is deserialized with unknown keys rejected.
//!
//! ## Config File Location
//!
//! `config.toml` lives in the site base directory, next to the source folder:
//!
//! ```text
//! site/
//! ├── config.toml
//! ├── source/
//! │   ├── _layouts/
//! │   ├── _partials/
//! │   ├── _themes/
//! │   │   └── clean/
//! │   │       ├── theme.toml
//! │   │       ├── _layouts/
//! │   │       └── css/
//! │   └── index.tem.html
//! └── output/
//! ```
//!
//! ## Configuration Options
//!
//! See [`stock_config_toml`] for the documented file printed by
//! `kiln gen-config`. Config files are sparse; override only what you need:
//!
//! ```toml
//! theme = "clean"
//!
//! [post_types.article]
//! layout = "page.html"
//! ```
//!
//! ## Plugin Options
//!
//! `[plugin_options.<renderer>]` blocks are handed verbatim to the renderer
//! of that name during registry initialisation. The `priority` key is
//! reserved: the registry applies it before the renderer sees its options.
//!
//! ## Themes
//!
//! The active theme's root may contain a `theme.toml` ([`ThemeConfig`])
//! naming the asset folders that get copied into the output.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Source folder, relative to the site base directory.
    pub source_path: String,
    /// Layouts folder. Defaults to `<source_path>/_layouts`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layouts_path: Option<String>,
    /// Partials folder. Defaults to `<source_path>/_partials`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partials_path: Option<String>,
    /// Themes root. Defaults to `<source_path>/_themes`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub themes_path: Option<String>,
    /// Name of the active theme folder under the themes root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    /// Output folder, relative to the site base directory.
    pub out_path: String,
    /// Extension given to renderer output when no renderer names a better one.
    pub default_extension: String,
    /// Replacement for whitespace in destination filenames.
    pub filename_space_char: String,
    /// Post type for files outside every configured post type path.
    pub default_post_type: String,
    pub post_types: BTreeMap<String, PostTypeConfig>,
    /// Fields every page starts with. Header fields override them.
    pub default_fields: toml::Table,
    pub date_format: DateFormatConfig,
    /// Built-in renderers to enable. `"default"` enables all of them.
    pub plugins: Vec<String>,
    /// Per-renderer option blocks keyed by renderer name.
    pub plugin_options: BTreeMap<String, toml::Table>,
    /// Parallel I/O settings.
    pub processing: ProcessingConfig,
}

impl Default for SiteConfig {
    fn default() -> Self {
        let mut post_types = BTreeMap::new();
        post_types.insert(
            "article".to_string(),
            PostTypeConfig {
                path: Some("article".to_string()),
                layout: Some("article.html".to_string()),
                default_fields: toml::Table::new(),
            },
        );
        Self {
            source_path: "source".to_string(),
            layouts_path: None,
            partials_path: None,
            themes_path: None,
            theme: None,
            out_path: "output".to_string(),
            default_extension: "html".to_string(),
            filename_space_char: "-".to_string(),
            default_post_type: "article".to_string(),
            post_types,
            default_fields: toml::Table::new(),
            date_format: DateFormatConfig::default(),
            plugins: vec!["default".to_string()],
            plugin_options: BTreeMap::new(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl SiteConfig {
    /// Validate config values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_path.trim().is_empty() {
            return Err(ConfigError::Validation(
                "source_path must not be empty".into(),
            ));
        }
        if self.out_path.trim().is_empty() {
            return Err(ConfigError::Validation("out_path must not be empty".into()));
        }
        if self.default_extension.is_empty() || self.default_extension.contains('.') {
            return Err(ConfigError::Validation(
                "default_extension must be a non-empty extension without dots".into(),
            ));
        }
        if self.filename_space_char.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(ConfigError::Validation(
                "filename_space_char must not contain whitespace or '/'".into(),
            ));
        }
        if let Some(theme) = &self.theme
            && (theme.is_empty() || theme.contains(['/', '\\']))
        {
            return Err(ConfigError::Validation(format!(
                "theme must be a folder name, got '{theme}'"
            )));
        }
        Ok(())
    }

    /// Post type settings, falling back to the default post type.
    pub fn post_type(&self, name: &str) -> Option<&PostTypeConfig> {
        self.post_types
            .get(name)
            .or_else(|| self.post_types.get(&self.default_post_type))
    }

    /// Options block for a renderer, empty when none is configured.
    pub fn plugin_options(&self, renderer: &str) -> toml::Table {
        self.plugin_options
            .get(renderer)
            .cloned()
            .unwrap_or_default()
    }
}

/// Settings for one post type (`[post_types.<name>]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostTypeConfig {
    /// Source-relative folder whose files get this post type.
    /// Defaults to the post type's own name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Layout applied to pages of this type.
    #[serde(alias = "item_template", skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    /// Fields merged under every page of this type.
    pub default_fields: toml::Table,
}

/// strftime patterns used to derive the `dates` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DateFormatConfig {
    pub day: String,
    pub month: String,
    pub year: String,
    pub time: String,
    pub full: String,
}

impl Default for DateFormatConfig {
    fn default() -> Self {
        Self {
            day: "%d".to_string(),
            month: "%b".to_string(),
            year: "%Y".to_string(),
            time: "%H:%M".to_string(),
            full: "%e %B %Y".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel read/write workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, at least one
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

/// Theme settings read from `<theme root>/theme.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThemeConfig {
    pub name: String,
    /// Theme folders copied to the output. A leading `"*"` copies every
    /// file that sits in a subfolder of the theme.
    pub asset_paths: Vec<String>,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            asset_paths: vec!["*".to_string()],
        }
    }
}

/// Load `theme.toml` from a theme root. Missing file yields the defaults.
pub fn load_theme_config(theme_root: &Path) -> Result<ThemeConfig, ConfigError> {
    let path = theme_root.join("theme.toml");
    let mut theme: ThemeConfig = if path.exists() {
        toml::from_str(&fs::read_to_string(&path)?)?
    } else {
        ThemeConfig::default()
    };
    if theme.name.is_empty() {
        theme.name = theme_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    Ok(theme)
}

/// Absolute locations of every folder the build reads or writes.
#[derive(Debug, Clone)]
pub struct SitePaths {
    pub base: PathBuf,
    pub source: PathBuf,
    pub layouts: PathBuf,
    pub partials: PathBuf,
    pub themes_root: PathBuf,
    /// Root of the active theme, when one is configured.
    pub theme: Option<PathBuf>,
    pub out: PathBuf,
}

impl SitePaths {
    pub fn resolve(base: &Path, config: &SiteConfig) -> Self {
        let source = base.join(&config.source_path);
        let or_source = |opt: &Option<String>, default: &str| match opt {
            Some(p) => base.join(p),
            None => source.join(default),
        };
        let themes_root = or_source(&config.themes_path, "_themes");
        Self {
            base: base.to_path_buf(),
            layouts: or_source(&config.layouts_path, "_layouts"),
            partials: or_source(&config.partials_path, "_partials"),
            theme: config.theme.as_ref().map(|t| themes_root.join(t)),
            themes_root,
            out: base.join(&config.out_path),
            source,
        }
    }

    pub fn theme_layouts(&self) -> Option<PathBuf> {
        self.theme.as_ref().map(|t| t.join("_layouts"))
    }

    pub fn theme_partials(&self) -> Option<PathBuf> {
        self.theme.as_ref().map(|t| t.join("_partials"))
    }
}

/// Serialize the stock defaults to a TOML value for merging.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(SiteConfig::default()).expect("default config must serialize")
}

/// Deep-merge `overlay` onto `base`. Tables merge recursively; any other
/// overlay value replaces the base value.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: SiteConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
pub fn load_config(root: &Path) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Kiln Configuration
# ==================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Folders, relative to this file.
source_path = "source"
out_path = "output"
# layouts_path = "source/_layouts"
# partials_path = "source/_partials"
# themes_path = "source/_themes"

# Active theme folder under the themes root. Omit for no theme.
# theme = "clean"

# Extension for rendered files when no renderer picks one.
default_extension = "html"

# Whitespace in destination filenames is replaced with this.
filename_space_char = "-"

# Built-in renderers to enable: header_read, add_data, collate, markdown,
# textile, template_man, tag. "default" enables all of them.
plugins = ["default"]

# Post type for files outside every `post_types.<name>.path`.
default_post_type = "article"

# ---------------------------------------------------------------------------
# Fields
# ---------------------------------------------------------------------------
# Available to every page and template. Page headers override them.
[default_fields]
# site_title = "My site"

# ---------------------------------------------------------------------------
# Post types
# ---------------------------------------------------------------------------
# Files under `path` (relative to the source folder) get this post type and
# are wrapped in `layout`. Files elsewhere use `default_post_type` (set at
# the top of this file).
[post_types.article]
path = "article"
layout = "article.html"

[post_types.article.default_fields]

# ---------------------------------------------------------------------------
# Dates (strftime patterns)
# ---------------------------------------------------------------------------
[date_format]
day = "%d"
month = "%b"
year = "%Y"
time = "%H:%M"
full = "%e %B %Y"

# ---------------------------------------------------------------------------
# Renderer options, keyed by renderer name
# ---------------------------------------------------------------------------
[plugin_options]
# [plugin_options.markdown]
# priority = 50
# tables = true
#
# [plugin_options.add_data]
# collate_fields = "post_type,category,tags"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel read/write workers.
# Omit to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
