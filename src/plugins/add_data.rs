//! Derived page fields.
//!
//! Runs right after the header has been read and fills in what every page
//! needs but few authors write:
//!
//! - `uri`: the destination path relative to the output root
//! - `date` and `dates.*`: from the `date` field, falling back to mtime
//! - `post_type`: the field, else the post type whose folder holds the file,
//!   else `default_post_type`
//! - site and post type `default_fields`, under anything already set
//!
//! It then collates each field named in `collate_fields` into the aggregate
//! (`tags = a, b` puts the page under `tags.a` and `tags.b`). Layouts,
//! partials, virtual pages and drafts are not collated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use tracing::{debug, warn};

use super::{field_values, is_truthy, toml_to_json};
use crate::config::{DateFormatConfig, SiteConfig};
use crate::context::BuildSet;
use crate::fileinfo::FileMeta;
use crate::renderer::{Linker, PluginOptions, RenderError, Renderer, RendererError, parse_options};
use crate::types::{Content, Fields};

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AddDataOptions {
    collate_fields: Vec<String>,
}

impl Default for AddDataOptions {
    fn default() -> Self {
        Self {
            collate_fields: vec!["post_type".into(), "category".into(), "tags".into()],
        }
    }
}

#[derive(Debug, Default)]
pub struct AddData {
    options: AddDataOptions,
}

impl Renderer for AddData {
    fn name(&self) -> &str {
        super::ADD_DATA
    }

    fn init(&mut self, _linker: &mut Linker, options: &PluginOptions) -> Result<(), RendererError> {
        self.options = parse_options(self.name(), options)?;
        Ok(())
    }

    fn render(
        &self,
        fields: &mut Fields,
        file: &FileMeta,
        set: &mut BuildSet,
    ) -> Result<Content, RenderError> {
        if file.is_building_block() {
            return Ok(std::mem::take(&mut fields.content));
        }
        if fields.get("uri").is_none() {
            fields.set("uri", file.dest_rel_path.clone());
        }
        if let Some(date) = page_date(fields, file) {
            add_dates(fields, date, &set.config.date_format);
        }
        let post_type = match fields.get_str("post_type") {
            Some(t) => t.to_string(),
            None => post_type_for(&set.config, file),
        };
        fields.set("post_type", post_type.clone());
        fields.merge_defaults(&defaults_for(&set.config, &post_type));

        let draft = fields.get("draft").is_some_and(is_truthy);
        if file.is_virtual || draft {
            debug!(file = %file.rel_path, draft, "not collated");
        } else {
            for field in &self.options.collate_fields {
                let Some(value) = fields.get(field) else {
                    continue;
                };
                for v in field_values(value, true) {
                    set.aggregate.collate(field, &v, &file.rel_path);
                }
            }
        }
        Ok(std::mem::take(&mut fields.content))
    }
}

/// The post type owning `file` by folder, else the default.
fn post_type_for(config: &SiteConfig, file: &FileMeta) -> String {
    config
        .post_types
        .iter()
        .find(|(name, pt)| file.is_rel_in_dir(pt.path.as_deref().unwrap_or(name)))
        .map(|(name, _)| name.clone())
        .unwrap_or_else(|| config.default_post_type.clone())
}

/// Site default fields overlaid with those of `post_type`.
fn defaults_for(config: &SiteConfig, post_type: &str) -> Map<String, Value> {
    let mut defaults = toml_to_json(&config.default_fields);
    if let Some(pt) = config.post_types.get(post_type) {
        defaults.extend(toml_to_json(&pt.default_fields));
    }
    defaults
}

fn page_date(fields: &Fields, file: &FileMeta) -> Option<DateTime<Utc>> {
    if let Some(raw) = fields.get_str("date") {
        match parse_date(raw) {
            Some(date) => return Some(date),
            None => warn!(file = %file.rel_path, date = raw, "unrecognised date, using file time"),
        }
    }
    file.stats.modified.map(DateTime::<Utc>::from)
}

/// Accepts RFC 3339, RFC 2822 and the usual `YYYY-MM-DD[ HH:MM[:SS]]` forms.
pub(crate) fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(d) = DateTime::parse_from_rfc3339(raw) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(d) = DateTime::parse_from_rfc2822(raw) {
        return Some(d.with_timezone(&Utc));
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(d) = NaiveDateTime::parse_from_str(raw, pattern) {
            return Some(d.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
}

fn add_dates(fields: &mut Fields, date: DateTime<Utc>, formats: &DateFormatConfig) {
    let iso = date.to_rfc3339_opts(SecondsFormat::Millis, true);
    let utc = date.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let mut dates = Map::new();
    dates.insert("day".into(), format_date(date, &formats.day).into());
    dates.insert("month".into(), format_date(date, &formats.month).into());
    dates.insert("year".into(), format_date(date, &formats.year).into());
    dates.insert("time".into(), format_date(date, &formats.time).into());
    dates.insert("formatted".into(), format_date(date, &formats.full).into());
    dates.insert("rss".into(), date.to_rfc2822().into());
    dates.insert("iso".into(), iso.clone().into());
    dates.insert("utc".into(), utc.clone().into());
    dates.insert("atom".into(), iso.into());
    if fields.get("date").is_none() {
        fields.set("date", utc);
    }
    fields.set("dates", Value::Object(dates));
}

/// strftime formatting that degrades to an empty string on a bad pattern.
fn format_date(date: DateTime<Utc>, pattern: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", date.format(pattern)).is_err() {
        warn!(pattern, "invalid date format pattern");
        out.clear();
    }
    out.trim().to_string()
}
