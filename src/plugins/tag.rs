//! Template rendering with Tera.
//!
//! The page body is rendered as a Tera template, then the layout chosen by
//! `template_man` (if any) is rendered with the result as `content`. The
//! layout output is what gets saved.
//!
//! Template data, later entries overriding earlier ones:
//!
//! - `default_fields` from the site config
//! - every aggregate table named by the page, its layout or its partials,
//!   with source paths resolved to page objects
//!   (`{% for page in all_tags.rust %}`)
//! - `list`, for pages with a `list_type` field (see below)
//! - the page's own fields, and `content`
//!
//! `list_type = "blog"` lists the pages of the `blog` table (or of any keyed
//! table's `blog` entry); `list_type = "all_tags.*"` lists a keyed table as
//! `{key, value}` pairs. `list_len` caps the length.
//!
//! Partials are included by any of their cached names
//! (`{% include "header.html" %}`, `{% include "Header" %}`). Including one
//! that does not exist fails the build unless `ignore missing` is given.
//! Output is never auto-escaped.

use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::LazyLock;
use tera::{Context, Tera};
use tracing::debug;

use super::template_man::template_extension;
use super::{HEADER_READ, toml_to_json};
use crate::context::{BuildSet, Collation};
use crate::fileinfo::FileMeta;
use crate::renderer::{DEFAULT_PRIORITY, Linker, PluginOptions, RenderError, Renderer, RendererError};
use crate::types::{Content, Fields};

static INCLUDE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{%-?\s*(include|import|extends)\s+["']([^"']+)["']([^%]*ignore\s+missing)?"#)
        .expect("include pattern is valid")
});

pub struct Tag;

impl Renderer for Tag {
    fn name(&self) -> &str {
        super::TAG
    }

    fn extensions(&self) -> Vec<String> {
        vec!["tem".into(), "tpl".into()]
    }

    fn calc_extension(&self, filename: &str, _current_ext: &str, default_ext: &str) -> String {
        template_extension(filename, default_ext)
    }

    fn init(&mut self, linker: &mut Linker, _options: &PluginOptions) -> Result<(), RendererError> {
        linker.pre(HEADER_READ, DEFAULT_PRIORITY);
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
        let body = fields.content.as_text().into_owned();
        let layout = fields
            .template
            .as_deref()
            .and_then(|rel| set.file_by_rel_path(rel))
            .map(|l| (l.meta.rel_path.clone(), l.fields.content.as_text().into_owned()));

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        let mut sources = vec![body.clone()];
        if let Some((_, text)) = &layout {
            sources.push(text.clone());
        }
        let partials = register_partials(&mut tera, set, &sources)?;
        sources.extend(partials);

        let pages = Pages {
            set: &*set,
            current: &file.rel_path,
            fields: &*fields,
        };
        let mut data = pages.template_data(&sources);
        let page_name = format!("page:{}", file.rel_path);
        tera.add_raw_template(&page_name, &body)?;
        let rendered = tera.render(&page_name, &Context::from_value(Value::Object(data.clone()))?)?;

        if let Some((rel, text)) = layout {
            debug!(file = %file.rel_path, layout = %rel, "applying layout");
            data.insert("content".into(), Value::String(rendered.clone()));
            let layout_name = format!("layout:{rel}");
            tera.add_raw_template(&layout_name, &text)?;
            fields.template_content =
                Some(tera.render(&layout_name, &Context::from_value(Value::Object(data))?)?);
        }
        Ok(Content::Text(rendered))
    }
}

/// Register every partial reachable from `sources` under the name it is
/// referenced by. Returns the text of each registered partial.
fn register_partials(
    tera: &mut Tera,
    set: &BuildSet,
    sources: &[String],
) -> Result<Vec<String>, RenderError> {
    let mut queue: Vec<(String, bool)> = sources.iter().flat_map(|s| references(s)).collect();
    let mut seen = HashSet::new();
    let mut templates = Vec::new();
    while let Some((name, optional)) = queue.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        match set.lookup_partial(&name) {
            Some(partial) => {
                let text = partial.fields.content.as_text().into_owned();
                queue.extend(references(&text));
                templates.push((name, text));
            }
            None if optional => debug!(partial = %name, "optional partial not found"),
            None => return Err(RenderError::MissingPartial(name)),
        }
    }
    tera.add_raw_templates(templates.iter().map(|(n, t)| (n.as_str(), t.as_str())))?;
    Ok(templates.into_iter().map(|(_, text)| text).collect())
}

/// Template names referenced by `text`, each flagged when it may be missing.
fn references(text: &str) -> Vec<(String, bool)> {
    INCLUDE
        .captures_iter(text)
        .map(|c| {
            let optional = &c[1] == "include" && c.get(3).is_some();
            (c[2].to_string(), optional)
        })
        .collect()
}

/// Whether `name` occurs in `text` as a whole identifier.
fn mentions(text: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_';
    text.match_indices(name).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

/// Resolves collated source paths to page objects.
///
/// The page being rendered has been taken out of the set for the duration
/// of the render, so its own entry is served from `fields`.
struct Pages<'a> {
    set: &'a BuildSet,
    current: &'a str,
    fields: &'a Fields,
}

impl Pages<'_> {
    /// Only the aggregate tables some template in `sources` names are
    /// resolved.
    fn template_data(&self, sources: &[String]) -> Map<String, Value> {
        let mut data = toml_to_json(&self.set.config.default_fields);
        for (table, collation) in self.set.aggregate.iter() {
            if sources.iter().any(|s| mentions(s, table)) {
                data.insert(table.clone(), self.resolve_collation(collation));
            }
        }
        if let Some(list) = self.list() {
            data.insert("list".into(), list);
        }
        data.extend(self.fields.to_json());
        data
    }

    /// The fields of the page at `rel_path`, plus its content and path.
    fn page(&self, rel_path: &str) -> Option<Value> {
        let fields = if rel_path == self.current {
            self.fields
        } else {
            &self.set.file_by_rel_path(rel_path)?.fields
        };
        let mut page = fields.values.clone();
        page.insert(
            "content".into(),
            Value::String(fields.content.as_text().into_owned()),
        );
        page.insert("rel_path".into(), Value::String(rel_path.to_string()));
        Some(Value::Object(page))
    }

    fn pages(&self, rel_paths: &[String]) -> Vec<Value> {
        rel_paths.iter().filter_map(|r| self.page(r)).collect()
    }

    fn resolve_collation(&self, collation: &Collation) -> Value {
        match collation {
            Collation::List(items) => Value::Array(self.pages(items)),
            Collation::Keyed(map) => Value::Object(
                map.iter()
                    .map(|(k, items)| (k.clone(), Value::Array(self.pages(items))))
                    .collect(),
            ),
        }
    }

    fn key_values(&self, table: &str) -> Option<Vec<Value>> {
        let map = self.set.aggregate.keyed(table)?;
        Some(
            map.iter()
                .map(|(k, items)| {
                    let mut pair = Map::new();
                    pair.insert("key".into(), Value::String(k.clone()));
                    pair.insert("value".into(), Value::Array(self.pages(items)));
                    Value::Object(pair)
                })
                .collect(),
        )
    }

    fn list(&self) -> Option<Value> {
        let list_type = self.fields.get_str("list_type")?;
        let aggregate = &self.set.aggregate;
        let mut items = if let Some(table) = list_type.strip_suffix(".*") {
            self.key_values(table).unwrap_or_default()
        } else {
            match aggregate.get(list_type) {
                Some(Collation::List(rels)) => self.pages(rels),
                Some(Collation::Keyed(_)) => self.key_values(list_type).unwrap_or_default(),
                None => aggregate
                    .iter()
                    .find_map(|(_, c)| match c {
                        Collation::Keyed(map) => map.get(list_type),
                        Collation::List(_) => None,
                    })
                    .map(|rels| self.pages(rels))
                    .unwrap_or_default(),
            }
        };
        if let Some(len) = self.fields.get("list_len").and_then(Value::as_u64) {
            items.truncate(usize::try_from(len).unwrap_or(usize::MAX));
        }
        Some(Value::Array(items))
    }
}
