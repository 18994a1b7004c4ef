//! Built-in renderers.
//!
//! | Renderer | Claims | Runs | Does |
//! |----------|--------|------|------|
//! | [`HeaderRead`] | | first | splits the `key: value` header block off the content |
//! | [`AddData`] | | after `header_read` | dates, `uri`, `post_type`, default fields, field collation |
//! | [`Collate`] | | after `add_data` | rule-based collation, listing pages |
//! | [`Markdown`] | `md`, `markdown` | after the header | Markdown → HTML |
//! | [`Textile`] | `tex`, `textile` | after the header | Textile subset → HTML |
//! | [`TemplateMan`] | `tem`, `tpl` | after the body converter | picks the page layout |
//! | [`Tag`] | `tem`, `tpl` (lower priority) | last | Tera: page body, partials, layout |
//!
//! A Markdown post therefore runs
//! `header_read → add_data → collate → markdown → template_man → tag`
//! and a `blog.tem.html` listing runs the same chain minus `markdown`.

mod add_data;
mod collate;
mod header_read;
mod markdown;
mod tag;
mod template_man;
mod textile;

pub use add_data::AddData;
pub use collate::{Collate, CollateRule};
pub use header_read::{HeaderRead, split_header};
pub use markdown::Markdown;
pub use tag::Tag;
pub use template_man::TemplateMan;
pub use textile::Textile;

use serde_json::{Map, Value};

use crate::registry::RendererRegistry;
use crate::renderer::RendererError;

pub const HEADER_READ: &str = "header_read";
pub const ADD_DATA: &str = "add_data";
pub const COLLATE: &str = "collate";
pub const MARKDOWN: &str = "markdown";
pub const TEXTILE: &str = "textile";
pub const TEMPLATE_MAN: &str = "template_man";
pub const TAG: &str = "tag";

/// Every built-in renderer name.
pub const BUILTIN: &[&str] = &[
    HEADER_READ,
    ADD_DATA,
    COLLATE,
    MARKDOWN,
    TEXTILE,
    TEMPLATE_MAN,
    TAG,
];

/// Value of `plugins` that enables every built-in renderer.
pub const ALL_PLUGINS: &str = "default";

/// Register the built-in renderers named in `enabled`.
pub fn register_builtins(
    registry: &mut RendererRegistry,
    enabled: &[String],
) -> Result<(), RendererError> {
    if let Some(unknown) = enabled
        .iter()
        .find(|p| *p != ALL_PLUGINS && !BUILTIN.contains(&p.as_str()))
    {
        return Err(RendererError::UnknownRenderer(unknown.clone()));
    }
    let all = enabled.iter().any(|p| p == ALL_PLUGINS);
    let wanted = |name: &str| all || enabled.iter().any(|p| p == name);

    if wanted(HEADER_READ) {
        registry.register(HeaderRead)?;
    }
    if wanted(ADD_DATA) {
        registry.register(AddData::default())?;
    }
    if wanted(COLLATE) {
        registry.register(Collate::default())?;
    }
    if wanted(MARKDOWN) {
        registry.register(Markdown::default())?;
    }
    if wanted(TEXTILE) {
        registry.register(Textile)?;
    }
    if wanted(TEMPLATE_MAN) {
        registry.register(TemplateMan)?;
    }
    if wanted(TAG) {
        registry.register(Tag)?;
    }
    Ok(())
}

/// Header-style truthiness: `false`, `0`, `no`, empty and null are false.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("no"))
        }
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Values of a field, trimmed, empties dropped. Strings are split on
/// commas when `split` is set; arrays contribute one value per element.
pub(crate) fn field_values(value: &Value, split: bool) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::String(s) if split => s.split(',').map(str::to_string).collect(),
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .flat_map(|v| field_values(v, split))
            .collect(),
        Value::Bool(_) | Value::Number(_) => vec![value.to_string()],
        Value::Null | Value::Object(_) => Vec::new(),
    };
    raw.into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// A config table as template data. Datetimes become strings.
pub(crate) fn toml_to_json(table: &toml::Table) -> Map<String, Value> {
    table
        .iter()
        .map(|(k, v)| (k.clone(), toml_value_to_json(v)))
        .collect()
}

fn toml_value_to_json(value: &toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s.clone()),
        toml::Value::Integer(i) => Value::from(*i),
        toml::Value::Float(f) => Value::from(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(d) => Value::String(d.to_string()),
        toml::Value::Array(items) => Value::Array(items.iter().map(toml_value_to_json).collect()),
        toml::Value::Table(t) => Value::Object(toml_to_json(t)),
    }
}
