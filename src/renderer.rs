//! The renderer plugin contract.
//!
//! A renderer is a named content transform. It claims file extensions, has a
//! priority used to break ties between renderers claiming the same
//! extension, and may declare pre/post relationships to other renderers by
//! name. Chains are derived from these declarations by
//! [`ChainBuilder`](crate::chain::ChainBuilder); the scheduler then invokes
//! [`Renderer::render`] once per chain entry.
//!
//! Plugin state lives on the concrete type. [`Renderer::init`] is the only
//! place it may be mutated, which happens once, before any handle to the
//! renderer is shared.

use serde::de::DeserializeOwned;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use thiserror::Error;

use crate::context::BuildSet;
use crate::fileinfo::FileMeta;
use crate::types::{Content, Fields};

/// Priority given to renderers that don't pick their own.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Registry name of the padding renderer. Never shown to users.
pub const DUMMY_NAME: &str = "__dummy";

/// Options from `[plugin_options.<name>]`.
pub type PluginOptions = toml::Table;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("renderer '{0}' is already registered")]
    DuplicateName(String),
    #[error("unknown renderer '{0}'")]
    UnknownRenderer(String),
    #[error("renderer dependency cycle: {0}")]
    Cycle(String),
    #[error("renderer '{0}' is in use and cannot be initialised")]
    Busy(String),
    #[error("invalid options for renderer '{renderer}': {message}")]
    Options { renderer: String, message: String },
}

/// Failure inside a single renderer invocation. Always fatal to the build.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("layout '{0}' not found")]
    MissingLayout(String),
    #[error("partial '{0}' not found")]
    MissingPartial(String),
    #[error("template error: {0}")]
    Template(#[from] tera::Error),
    #[error("header error: {0}")]
    Header(String),
}

/// A content transform plugged into the build.
pub trait Renderer: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase, dot-free extensions this renderer claims.
    fn extensions(&self) -> Vec<String> {
        Vec::new()
    }

    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    /// Binary renderers receive content exactly as loaded. Everyone else
    /// gets it converted to text first.
    fn is_binary(&self) -> bool {
        false
    }

    /// Extension of this renderer's output for `filename`, whose extension
    /// currently being processed is `current_ext`.
    fn calc_extension(&self, _filename: &str, _current_ext: &str, default_ext: &str) -> String {
        default_ext.to_string()
    }

    /// Declare links and read options. Runs once after every renderer has
    /// been registered.
    fn init(&mut self, _linker: &mut Linker, _options: &PluginOptions) -> Result<(), RendererError> {
        Ok(())
    }

    /// Runs after classification, before chains are aligned. May add
    /// virtual files.
    fn load(&self, _set: &mut BuildSet) -> Result<(), RenderError> {
        Ok(())
    }

    /// Transform one file. The returned content replaces `fields.content`.
    fn render(
        &self,
        fields: &mut Fields,
        file: &FileMeta,
        set: &mut BuildSet,
    ) -> Result<Content, RenderError>;

    /// Runs once every file has been written.
    fn save(&self, _set: &BuildSet) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Shared reference to a registered renderer.
///
/// Equality is identity: two handles are equal when they point at the same
/// registered instance.
#[derive(Clone)]
pub struct RendererHandle(Arc<dyn Renderer>);

impl RendererHandle {
    pub fn new(renderer: impl Renderer + 'static) -> Self {
        Self(Arc::new(renderer))
    }

    pub fn is_dummy(&self) -> bool {
        self.0.name() == DUMMY_NAME
    }

    /// Mutable access, available only while no other handle exists.
    pub(crate) fn get_mut(&mut self) -> Option<&mut (dyn Renderer + 'static)> {
        Arc::get_mut(&mut self.0)
    }
}

impl Deref for RendererHandle {
    type Target = dyn Renderer;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for RendererHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for RendererHandle {}

impl fmt::Debug for RendererHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Renderer").field(&self.0.name()).finish()
    }
}

/// A by-name reference to another renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    pub priority: i32,
}

/// Pre and post renderer lists, each kept in descending priority order.
/// Links of equal priority keep their declaration order.
#[derive(Debug, Clone, Default)]
pub struct Links {
    pub pre: Vec<Link>,
    pub post: Vec<Link>,
}

impl Links {
    pub fn add_pre(&mut self, name: &str, priority: i32) {
        insert_sorted(&mut self.pre, name, priority);
    }

    pub fn add_post(&mut self, name: &str, priority: i32) {
        insert_sorted(&mut self.post, name, priority);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.pre.iter().chain(&self.post).map(|l| l.name.as_str())
    }
}

fn insert_sorted(list: &mut Vec<Link>, name: &str, priority: i32) {
    if list.iter().any(|l| l.name == name) {
        return;
    }
    let at = list
        .iter()
        .position(|l| l.priority < priority)
        .unwrap_or(list.len());
    list.insert(
        at,
        Link {
            name: name.to_string(),
            priority,
        },
    );
}

/// Collects the link declarations a renderer makes during `init`.
#[derive(Debug)]
pub struct Linker {
    owner: String,
    pub(crate) links: Links,
    /// `(target, priority)`: the owner becomes a post renderer of `target`.
    pub(crate) after: Vec<(String, i32)>,
}

impl Linker {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            links: Links::default(),
            after: Vec::new(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Run `name` before the owner.
    pub fn pre(&mut self, name: &str, priority: i32) -> &mut Self {
        self.links.add_pre(name, priority);
        self
    }

    /// Run `name` after the owner.
    pub fn post(&mut self, name: &str, priority: i32) -> &mut Self {
        self.links.add_post(name, priority);
        self
    }

    /// Run the owner after `target`, wherever `target` appears in a chain.
    pub fn after(&mut self, target: &str, priority: i32) -> &mut Self {
        self.after.push((target.to_string(), priority));
        self
    }
}

/// Deserialize a renderer's option block into its typed options.
pub fn parse_options<T: DeserializeOwned>(
    renderer: &str,
    options: &PluginOptions,
) -> Result<T, RendererError> {
    toml::Value::Table(options.clone())
        .try_into()
        .map_err(|e: toml::de::Error| RendererError::Options {
            renderer: renderer.to_string(),
            message: e.message().to_string(),
        })
}

/// The padding renderer. Identity transform at the highest priority.
#[derive(Debug, Default)]
pub struct DummyRenderer;

impl Renderer for DummyRenderer {
    fn name(&self) -> &str {
        DUMMY_NAME
    }

    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn is_binary(&self) -> bool {
        true
    }

    fn render(
        &self,
        fields: &mut Fields,
        _file: &FileMeta,
        _set: &mut BuildSet,
    ) -> Result<Content, RenderError> {
        Ok(std::mem::take(&mut fields.content))
    }
}
