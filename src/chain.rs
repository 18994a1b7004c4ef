//! Per-file renderer chains.
//!
//! A chain is derived from the filename's extensions, left to right:
//!
//! ```text
//! about.tex       textile → html        chain: header_read, add_data, collate,
//!                                              textile, template_man, tag
//!                                       dest:  about.html
//! blog.tem.html   template_man → html   chain: header_read, ..., template_man, tag
//!                                       dest:  blog.html
//! logo.png        (no renderer)         chain: []
//!                                       dest:  logo.png
//! ```
//!
//! An extension a renderer produces is itself looked up, so `post.tex`
//! reaches an `html` minifier even though the filename never says `html`.
//! The selected renderers are then expanded through their pre/post links
//! into one flat, duplicate-free sequence.

use std::collections::HashSet;
use tracing::debug;

use crate::naming::{normalize_ext, split_extensions};
use crate::registry::RendererRegistry;
use crate::renderer::{RendererError, RendererHandle};

/// The renderers one file runs through and the name it is saved under.
#[derive(Debug, Clone)]
pub struct Chain {
    pub renderers: Vec<RendererHandle>,
    pub dest_filename: String,
}

impl Chain {
    pub fn names(&self) -> Vec<&str> {
        self.renderers.iter().map(|r| r.name()).collect()
    }
}

pub struct ChainBuilder<'a> {
    registry: &'a RendererRegistry,
    default_ext: &'a str,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(registry: &'a RendererRegistry, default_ext: &'a str) -> Self {
        Self {
            registry,
            default_ext,
        }
    }

    /// Chain and destination filename for `filename`.
    ///
    /// Files with an empty chain keep their name unchanged.
    pub fn build(&self, filename: &str) -> Result<Chain, RendererError> {
        let split = split_extensions(filename);
        let mut exts = split.exts;
        let mut next_ext = exts
            .last()
            .cloned()
            .unwrap_or_else(|| self.default_ext.to_string());
        let mut selected: Vec<RendererHandle> = Vec::new();

        // `exts` may grow while we walk it.
        let mut i = 0;
        while i < exts.len() {
            let ext = exts[i].clone();
            i += 1;
            let Some(renderer) = self.registry.find_by_extension(&ext) else {
                continue;
            };
            if !selected.contains(&renderer) {
                selected.push(renderer.clone());
            }
            next_ext = normalize_ext(&renderer.calc_extension(filename, &ext, self.default_ext));
            if !exts.contains(&next_ext) && self.registry.find_by_extension(&next_ext).is_some() {
                debug!(file = filename, ext = %next_ext, "chaining produced extension");
                exts.push(next_ext.clone());
            }
        }

        let renderers = self.expand(&selected)?;
        let dest_filename = if renderers.is_empty() {
            file_name(filename).to_string()
        } else {
            format!("{}.{}", split.base, next_ext)
        };
        debug!(
            file = filename,
            chain = ?renderers.iter().filter(|r| !r.is_dummy()).map(|r| r.name()).collect::<Vec<_>>(),
            dest = %dest_filename,
            "built renderer chain"
        );
        Ok(Chain {
            renderers,
            dest_filename,
        })
    }

    /// Chain for an explicit list of renderer names, used by virtual files.
    pub fn build_from_names<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> Result<Vec<RendererHandle>, RendererError> {
        let selected = names
            .iter()
            .map(|n| {
                self.registry
                    .find_by_name(n.as_ref())
                    .ok_or_else(|| RendererError::UnknownRenderer(n.as_ref().to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.expand(&selected)
    }

    /// Depth-first expansion: pre renderers, the renderer, post renderers.
    /// Each renderer appears at most once.
    fn expand(&self, selected: &[RendererHandle]) -> Result<Vec<RendererHandle>, RendererError> {
        let mut walk = Walk::default();
        for renderer in selected {
            self.visit(renderer, &mut walk)?;
        }
        Ok(walk.out)
    }

    fn visit(&self, renderer: &RendererHandle, walk: &mut Walk) -> Result<(), RendererError> {
        let name = renderer.name().to_string();
        if walk.visited.contains(&name) {
            return Ok(());
        }
        if !walk.in_progress.insert(name.clone()) {
            walk.stack.push(name);
            return Err(RendererError::Cycle(walk.stack.join(" → ")));
        }
        walk.stack.push(name.clone());

        let links = self.registry.links(&name).cloned().unwrap_or_default();
        for link in &links.pre {
            let pre = self.resolve(&link.name)?;
            self.visit(&pre, walk)?;
        }
        walk.in_progress.remove(&name);
        walk.stack.pop();
        walk.visited.insert(name);
        walk.out.push(renderer.clone());
        for link in &links.post {
            let post = self.resolve(&link.name)?;
            self.visit(&post, walk)?;
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Result<RendererHandle, RendererError> {
        self.registry
            .find_by_name(name)
            .ok_or_else(|| RendererError::UnknownRenderer(name.to_string()))
    }
}

#[derive(Default)]
struct Walk {
    visited: HashSet<String>,
    in_progress: HashSet<String>,
    stack: Vec<String>,
    out: Vec<RendererHandle>,
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::StubRenderer;

    fn registry(stubs: Vec<StubRenderer>) -> RendererRegistry {
        let mut registry = RendererRegistry::new();
        for stub in stubs {
            registry.register(stub).unwrap();
        }
        registry
    }

    fn build(registry: &RendererRegistry, filename: &str) -> Chain {
        ChainBuilder::new(registry, "html").build(filename).unwrap()
    }

    #[test]
    fn tex_becomes_html() {
        let reg = registry(vec![StubRenderer::new("textile").exts(&["tex"]).calc("html")]);
        let chain = build(&reg, "post.tex");
        assert_eq!(chain.names(), vec!["textile"]);
        assert_eq!(chain.dest_filename, "post.html");
    }

    #[test]
    fn produced_extension_chains_into_minifier() {
        let reg = registry(vec![
            StubRenderer::new("textile").exts(&["tex"]).calc("html"),
            StubRenderer::new("minify").exts(&["html"]).calc("html"),
        ]);
        let chain = build(&reg, "post.tex");
        assert_eq!(chain.names(), vec!["textile", "minify"]);
        assert_eq!(chain.dest_filename, "post.html");
    }

    #[test]
    fn unclaimed_file_keeps_its_name() {
        let reg = registry(vec![StubRenderer::new("textile").exts(&["tex"])]);
        let chain = build(&reg, "images/Logo Big.PNG");
        assert!(chain.renderers.is_empty());
        assert_eq!(chain.dest_filename, "Logo Big.PNG");
    }

    #[test]
    fn multiple_extensions_resolve_left_to_right() {
        let reg = registry(vec![
            StubRenderer::new("tags").exts(&["tem"]),
            StubRenderer::new("less").exts(&["less"]).calc("css"),
        ]);
        let chain = build(&reg, "site.tem.less");
        assert_eq!(chain.names(), vec!["tags", "less"]);
        assert_eq!(chain.dest_filename, "site.css");
    }

    #[test]
    fn renderer_claiming_two_extensions_is_selected_once() {
        let reg = registry(vec![StubRenderer::new("tags").exts(&["tem", "tpl"])]);
        let chain = build(&reg, "a.tem.tpl");
        assert_eq!(chain.names(), vec!["tags"]);
    }

    #[test]
    fn pre_and_post_links_expand_depth_first() {
        let mut reg = registry(vec![
            StubRenderer::new("markdown").exts(&["md"]).pre("header").post("layout"),
            StubRenderer::new("header").post("data"),
            StubRenderer::new("data"),
            StubRenderer::new("layout").pre("header").post("tag"),
            StubRenderer::new("tag"),
        ]);
        reg.init(&crate::config::SiteConfig::default()).unwrap();
        let chain = build(&reg, "post.md");
        assert_eq!(
            chain.names(),
            vec!["header", "data", "markdown", "layout", "tag"]
        );
    }

    #[test]
    fn shared_dependency_runs_once() {
        let mut reg = registry(vec![
            StubRenderer::new("tags").exts(&["tem"]).pre("header"),
            StubRenderer::new("markdown").exts(&["md"]).pre("header"),
            StubRenderer::new("header"),
        ]);
        reg.init(&crate::config::SiteConfig::default()).unwrap();
        let chain = build(&reg, "x.md.tem");
        assert_eq!(chain.names(), vec!["header", "markdown", "tags"]);
    }

    #[test]
    fn unknown_link_fails() {
        let mut reg = registry(vec![StubRenderer::new("md").exts(&["md"]).pre("ghost")]);
        reg.init(&crate::config::SiteConfig::default()).unwrap();
        let err = ChainBuilder::new(&reg, "html").build("a.md").unwrap_err();
        assert!(matches!(err, RendererError::UnknownRenderer(n) if n == "ghost"));
    }

    #[test]
    fn pre_cycle_fails_fast() {
        // Links added directly bypass the init-time graph check.
        let mut reg = registry(vec![
            StubRenderer::new("a").exts(&["a"]),
            StubRenderer::new("b"),
        ]);
        reg.add_pre_renderer("a", "b", 50).unwrap();
        reg.add_pre_renderer("b", "a", 50).unwrap();
        let err = ChainBuilder::new(&reg, "html").build("x.a").unwrap_err();
        match err {
            RendererError::Cycle(path) => assert_eq!(path, "a → b → a"),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn build_from_names_expands_links() {
        let mut reg = registry(vec![
            StubRenderer::new("tags").pre("header"),
            StubRenderer::new("header"),
        ]);
        reg.init(&crate::config::SiteConfig::default()).unwrap();
        let chain = ChainBuilder::new(&reg, "html")
            .build_from_names(&["tags"])
            .unwrap();
        let names: Vec<_> = chain.iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["header", "tags"]);
    }

    #[test]
    fn build_from_names_rejects_unknown() {
        let reg = registry(vec![StubRenderer::new("tags")]);
        let err = ChainBuilder::new(&reg, "html")
            .build_from_names(&["nope"])
            .unwrap_err();
        assert!(matches!(err, RendererError::UnknownRenderer(_)));
    }
}
