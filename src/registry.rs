//! The renderer registry.
//!
//! One registry is owned by each build run. It holds every registered
//! renderer in descending priority order (stable for ties), answers lookups
//! by name and by extension, and stores each renderer's pre/post links.
//!
//! The pre/post declarations form a directed graph over renderer names
//! (`pre → owner → post`). [`RendererRegistry::init`] rejects cycles in that
//! graph before any chain is built, and [`RendererRegistry::ordering`]
//! exposes a deterministic topological order for diagnostics.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::SiteConfig;
use crate::context::BuildSet;
use crate::naming::normalize_ext;
use crate::renderer::{
    DummyRenderer, Linker, Links, RenderError, Renderer, RendererError, RendererHandle,
};

#[derive(Debug)]
struct Entry {
    handle: RendererHandle,
    priority: i32,
    extensions: Vec<String>,
    links: Links,
}

/// Summary of one registered renderer, for listings.
#[derive(Debug, Clone)]
pub struct RendererInfo {
    pub name: String,
    pub priority: i32,
    pub extensions: Vec<String>,
    pub pre: Vec<String>,
    pub post: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RendererRegistry {
    entries: Vec<Entry>,
    initialised: bool,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a renderer. The padding renderer is registered first, the
    /// first time anything is registered.
    pub fn register(&mut self, renderer: impl Renderer + 'static) -> Result<(), RendererError> {
        if self.entries.is_empty() {
            self.push(RendererHandle::new(DummyRenderer));
        }
        if self.position(renderer.name()).is_some() {
            return Err(RendererError::DuplicateName(renderer.name().to_string()));
        }
        debug!(renderer = renderer.name(), "registered renderer");
        self.push(RendererHandle::new(renderer));
        self.resort();
        Ok(())
    }

    fn push(&mut self, handle: RendererHandle) {
        let extensions = handle
            .extensions()
            .iter()
            .map(|e| normalize_ext(e))
            .collect();
        self.entries.push(Entry {
            priority: handle.priority(),
            extensions,
            links: Links::default(),
            handle,
        });
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.handle.name() == name)
    }

    pub fn find_by_name(&self, name: &str) -> Option<RendererHandle> {
        self.position(name).map(|i| self.entries[i].handle.clone())
    }

    /// First renderer, in descending priority order, claiming `ext`.
    /// A leading dot on `ext` is ignored.
    pub fn find_by_extension(&self, ext: &str) -> Option<RendererHandle> {
        let ext = normalize_ext(ext);
        self.entries
            .iter()
            .find(|e| e.extensions.contains(&ext))
            .map(|e| e.handle.clone())
    }

    /// Re-sort by priority. Needed after any priority change.
    pub fn resort(&mut self) {
        self.entries.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Change a renderer's priority. Takes effect on the next [`resort`](Self::resort).
    pub fn set_priority(&mut self, name: &str, priority: i32) -> Result<(), RendererError> {
        let i = self
            .position(name)
            .ok_or_else(|| RendererError::UnknownRenderer(name.to_string()))?;
        self.entries[i].priority = priority;
        Ok(())
    }

    pub fn priority(&self, name: &str) -> Option<i32> {
        self.position(name).map(|i| self.entries[i].priority)
    }

    pub fn links(&self, name: &str) -> Option<&Links> {
        self.position(name).map(|i| &self.entries[i].links)
    }

    /// Declare that `pre` runs before `owner`.
    pub fn add_pre_renderer(
        &mut self,
        owner: &str,
        pre: &str,
        priority: i32,
    ) -> Result<(), RendererError> {
        let i = self
            .position(owner)
            .ok_or_else(|| RendererError::UnknownRenderer(owner.to_string()))?;
        self.entries[i].links.add_pre(pre, priority);
        Ok(())
    }

    /// Declare that `post` runs after `owner`.
    pub fn add_post_renderer(
        &mut self,
        owner: &str,
        post: &str,
        priority: i32,
    ) -> Result<(), RendererError> {
        let i = self
            .position(owner)
            .ok_or_else(|| RendererError::UnknownRenderer(owner.to_string()))?;
        self.entries[i].links.add_post(post, priority);
        Ok(())
    }

    /// The padding renderer, once anything has been registered.
    pub fn dummy(&self) -> Option<RendererHandle> {
        self.entries
            .iter()
            .find(|e| e.handle.is_dummy())
            .map(|e| e.handle.clone())
    }

    /// Run every renderer's `init` with its options, then validate links.
    ///
    /// A `priority` key in a renderer's options overrides its priority and
    /// is not passed on. Runs at most once; later calls only re-validate.
    pub fn init(&mut self, config: &SiteConfig) -> Result<(), RendererError> {
        if !self.initialised {
            let mut after = Vec::new();
            for entry in &mut self.entries {
                if entry.handle.is_dummy() {
                    continue;
                }
                let name = entry.handle.name().to_string();
                let mut options = config.plugin_options(&name);
                if let Some(value) = options.remove("priority") {
                    let priority = value
                        .as_integer()
                        .and_then(|p| i32::try_from(p).ok())
                        .ok_or_else(|| RendererError::Options {
                            renderer: name.clone(),
                            message: "priority must be an integer".to_string(),
                        })?;
                    entry.priority = priority;
                }
                let mut linker = Linker::new(&name);
                entry
                    .handle
                    .get_mut()
                    .ok_or_else(|| RendererError::Busy(name.clone()))?
                    .init(&mut linker, &options)?;
                for link in &linker.links.pre {
                    entry.links.add_pre(&link.name, link.priority);
                }
                for link in &linker.links.post {
                    entry.links.add_post(&link.name, link.priority);
                }
                after.extend(linker.after.into_iter().map(|(t, p)| (t, name.clone(), p)));
            }
            for (target, owner, priority) in after {
                match self.position(&target) {
                    Some(i) => self.entries[i].links.add_post(&owner, priority),
                    None => warn!(
                        renderer = %owner,
                        target = %target,
                        "renderer asked to run after an unregistered renderer"
                    ),
                }
            }
            self.resort();
            self.initialised = true;
        }
        for entry in &self.entries {
            for name in entry.links.names() {
                if self.position(name).is_none() {
                    warn!(
                        renderer = entry.handle.name(),
                        link = name,
                        "renderer links to an unregistered renderer"
                    );
                }
            }
        }
        self.detect_cycles()
    }

    fn graph(&self) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for entry in &self.entries {
            if entry.handle.is_dummy() {
                continue;
            }
            let name = entry.handle.name().to_string();
            nodes.insert(name.clone(), graph.add_node(name));
        }
        for entry in &self.entries {
            let Some(&owner) = nodes.get(entry.handle.name()) else {
                continue;
            };
            for link in &entry.links.pre {
                if let Some(&pre) = nodes.get(&link.name) {
                    graph.add_edge(pre, owner, ());
                }
            }
            for link in &entry.links.post {
                if let Some(&post) = nodes.get(&link.name) {
                    graph.add_edge(owner, post, ());
                }
            }
        }
        (graph, nodes)
    }

    /// Fail with the offending path if the link graph has a cycle.
    pub fn detect_cycles(&self) -> Result<(), RendererError> {
        let (graph, _) = self.graph();
        let mut colors: HashMap<NodeIndex, Color> =
            graph.node_indices().map(|n| (n, Color::White)).collect();
        for node in graph.node_indices() {
            if colors.get(&node) == Some(&Color::White) {
                let mut path = Vec::new();
                if let Some(cycle) = visit(&graph, node, &mut colors, &mut path) {
                    let names: Vec<&str> = cycle.iter().map(|n| graph[*n].as_str()).collect();
                    return Err(RendererError::Cycle(names.join(" → ")));
                }
            }
        }
        Ok(())
    }

    /// Renderer names in dependency order: every renderer comes after its
    /// pre renderers and before its post renderers.
    pub fn ordering(&self) -> Result<Vec<String>, RendererError> {
        let (graph, _) = self.graph();
        toposort(&graph, None)
            .map(|order| order.into_iter().map(|n| graph[n].clone()).collect())
            .map_err(|cycle| RendererError::Cycle(graph[cycle.node_id()].clone()))
    }

    /// Run every renderer's load hook, in priority order.
    pub fn load_all(&self, set: &mut BuildSet) -> Result<(), (String, RenderError)> {
        for entry in &self.entries {
            entry
                .handle
                .load(set)
                .map_err(|e| (entry.handle.name().to_string(), e))?;
        }
        Ok(())
    }

    /// Run every renderer's save hook, in priority order.
    pub fn save_all(&self, set: &BuildSet) -> Result<(), (String, RenderError)> {
        for entry in &self.entries {
            entry
                .handle
                .save(set)
                .map_err(|e| (entry.handle.name().to_string(), e))?;
        }
        Ok(())
    }

    /// Names of user-visible renderers in priority order.
    pub fn names(&self) -> Vec<String> {
        self.describe().into_iter().map(|r| r.name).collect()
    }

    /// Listing of user-visible renderers in priority order.
    pub fn describe(&self) -> Vec<RendererInfo> {
        self.entries
            .iter()
            .filter(|e| !e.handle.is_dummy())
            .map(|e| RendererInfo {
                name: e.handle.name().to_string(),
                priority: e.priority,
                extensions: e.extensions.clone(),
                pre: e.links.pre.iter().map(|l| l.name.clone()).collect(),
                post: e.links.post.iter().map(|l| l.name.clone()).collect(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.handle.is_dummy())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

fn visit(
    graph: &DiGraph<String, ()>,
    node: NodeIndex,
    colors: &mut HashMap<NodeIndex, Color>,
    path: &mut Vec<NodeIndex>,
) -> Option<Vec<NodeIndex>> {
    colors.insert(node, Color::Gray);
    path.push(node);
    for next in graph.neighbors(node) {
        match colors.get(&next) {
            Some(Color::Gray) => {
                let start = path.iter().position(|n| *n == next).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            Some(Color::White) => {
                if let Some(cycle) = visit(graph, next, colors, path) {
                    return Some(cycle);
                }
            }
            _ => {}
        }
    }
    path.pop();
    colors.insert(node, Color::Black);
    None
}
