//! Shared types used by the classifier, the scheduler and every renderer.

use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

/// The body of a file as it moves through its renderer chain.
///
/// Files are loaded as raw bytes; the scheduler converts to text before
/// handing the content to any renderer that is not binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Bytes(Vec<u8>),
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl Content {
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Bytes(b) => b.is_empty(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(s) => s.as_bytes(),
            Content::Bytes(b) => b,
        }
    }

    /// Borrow the content as text, replacing invalid UTF-8 sequences.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Content::Text(s) => Cow::Borrowed(s),
            Content::Bytes(b) => String::from_utf8_lossy(b),
        }
    }

    /// Convert to the text variant in place.
    pub fn make_text(&mut self) {
        if let Content::Bytes(b) = self {
            let bytes = std::mem::take(b);
            *self = Content::Text(match String::from_utf8(bytes) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            });
        }
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

/// Per-file metadata plus content, mutated by every renderer in the chain.
///
/// `values` is the open field map seeded by header parsing. `template` names
/// the layout chosen for the file and `template_content` holds the page after
/// the layout was applied; when set it is what gets saved.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    pub content: Content,
    pub template: Option<String>,
    pub template_content: Option<String>,
    pub values: Map<String, Value>,
}

impl Fields {
    pub fn with_content(content: impl Into<Content>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value of a field, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Insert every key from `defaults` that is not already present.
    pub fn merge_defaults(&mut self, defaults: &Map<String, Value>) {
        for (k, v) in defaults {
            if !self.values.contains_key(k) {
                self.values.insert(k.clone(), v.clone());
            }
        }
    }

    /// The field map as a JSON object, including `content` as text.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut map = self.values.clone();
        map.insert(
            "content".to_string(),
            Value::String(self.content.as_text().into_owned()),
        );
        map
    }

    /// Whether rendering left anything to save.
    pub fn has_output(&self) -> bool {
        !self.content.is_empty() || self.template_content.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// The bytes that the save phase persists for this file.
    pub fn output_bytes(&self) -> &[u8] {
        match &self.template_content {
            Some(t) => t.as_bytes(),
            None => self.content.as_bytes(),
        }
    }
}

/// What a build does with a discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Usage {
    /// Treated as if it did not exist.
    Ignore,
    /// Copied byte-for-byte to the destination.
    Copy,
    /// Loaded and run through its renderer chain.
    Process,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Usage::Ignore => "ignore",
            Usage::Copy => "copy",
            Usage::Process => "process",
        })
    }
}

/// The subset of filesystem metadata the build cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub modified: Option<SystemTime>,
    pub len: u64,
}

impl From<&std::fs::Metadata> for FileStats {
    fn from(meta: &std::fs::Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}
