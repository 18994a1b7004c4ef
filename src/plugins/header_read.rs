//! Header block parsing.
//!
//! ```text
//! title: Hello
//! tags = rust, web
//! draft: false
//! ###
//! The content starts here.
//! ```
//!
//! Everything above a line made only of three or more `#` is the header.
//! A file without such a line has no header.

use serde_json::Value;

use super::ADD_DATA;
use crate::context::BuildSet;
use crate::fileinfo::FileMeta;
use crate::renderer::{DEFAULT_PRIORITY, Linker, PluginOptions, RenderError, Renderer, RendererError};
use crate::types::{Content, Fields};

pub struct HeaderRead;

impl Renderer for HeaderRead {
    fn name(&self) -> &str {
        super::HEADER_READ
    }

    fn init(&mut self, linker: &mut Linker, _options: &PluginOptions) -> Result<(), RendererError> {
        linker.post(ADD_DATA, DEFAULT_PRIORITY);
        Ok(())
    }

    fn render(
        &self,
        fields: &mut Fields,
        file: &FileMeta,
        _set: &mut BuildSet,
    ) -> Result<Content, RenderError> {
        let split = split_header(&fields.content.as_text())?;
        let Some((header, body)) = split else {
            return Ok(std::mem::take(&mut fields.content));
        };
        tracing::debug!(file = %file.rel_path, fields = header.len(), "read header");
        for (key, value) in header {
            fields.values.insert(key, value);
        }
        Ok(Content::Text(body))
    }
}

/// Split `text` into header fields and body. `None` when there is no
/// divider line.
pub fn split_header(text: &str) -> Result<Option<(Vec<(String, Value)>, String)>, RenderError> {
    let mut offset = 0;
    let mut divider = None;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.len() >= 3 && trimmed.chars().all(|c| c == '#') {
            divider = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }
    let Some((header_end, body_start)) = divider else {
        return Ok(None);
    };

    let mut values = Vec::new();
    for (n, line) in text[..header_end].lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(at) = line.find([':', '=']) else {
            return Err(RenderError::Header(format!(
                "line {}: expected 'key: value', got '{line}'",
                n + 1
            )));
        };
        let key = line[..at].trim();
        if key.is_empty() {
            return Err(RenderError::Header(format!("line {}: empty key", n + 1)));
        }
        values.push((key.to_string(), parse_value(line[at + 1..].trim())));
    }
    Ok(Some((values, text[body_start..].to_string())))
}

fn parse_value(raw: &str) -> Value {
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
    if let Some(s) = unquoted {
        return Value::String(s.to_string());
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}
