//! Markdown to HTML with pulldown-cmark.

use pulldown_cmark::{Options, Parser, html as md_html};
use serde::Deserialize;

use super::{HEADER_READ, TEMPLATE_MAN};
use crate::context::BuildSet;
use crate::fileinfo::FileMeta;
use crate::renderer::{
    DEFAULT_PRIORITY, Linker, PluginOptions, RenderError, Renderer, RendererError, parse_options,
};
use crate::types::{Content, Fields};

/// `[plugin_options.markdown]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct MarkdownOptions {
    tables: bool,
    footnotes: bool,
    strikethrough: bool,
    tasklists: bool,
    smart_punctuation: bool,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            tables: true,
            footnotes: true,
            strikethrough: true,
            tasklists: true,
            smart_punctuation: false,
        }
    }
}

impl From<&MarkdownOptions> for Options {
    fn from(opts: &MarkdownOptions) -> Self {
        let mut options = Options::empty();
        options.set(Options::ENABLE_TABLES, opts.tables);
        options.set(Options::ENABLE_FOOTNOTES, opts.footnotes);
        options.set(Options::ENABLE_STRIKETHROUGH, opts.strikethrough);
        options.set(Options::ENABLE_TASKLISTS, opts.tasklists);
        options.set(Options::ENABLE_SMART_PUNCTUATION, opts.smart_punctuation);
        options
    }
}

pub struct Markdown {
    options: Options,
}

impl Default for Markdown {
    fn default() -> Self {
        Self {
            options: Options::from(&MarkdownOptions::default()),
        }
    }
}

impl Renderer for Markdown {
    fn name(&self) -> &str {
        super::MARKDOWN
    }

    fn extensions(&self) -> Vec<String> {
        vec!["md".into(), "markdown".into()]
    }

    fn init(&mut self, linker: &mut Linker, options: &PluginOptions) -> Result<(), RendererError> {
        linker
            .pre(HEADER_READ, DEFAULT_PRIORITY)
            .post(TEMPLATE_MAN, DEFAULT_PRIORITY);
        let options: MarkdownOptions = parse_options(self.name(), options)?;
        self.options = Options::from(&options);
        Ok(())
    }

    fn render(
        &self,
        fields: &mut Fields,
        _file: &FileMeta,
        _set: &mut BuildSet,
    ) -> Result<Content, RenderError> {
        let text = fields.content.as_text();
        let mut html = String::with_capacity(text.len() * 3 / 2);
        md_html::push_html(&mut html, Parser::new_ext(&text, self.options));
        Ok(Content::Text(html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{build_set, meta};

    fn render(md: &Markdown, input: &str) -> String {
        let mut set = build_set();
        let mut fields = Fields::with_content(input);
        let out = md
            .render(&mut fields, &meta("a.md", "a.html"), &mut set)
            .unwrap();
        out.as_text().into_owned()
    }

    #[test]
    fn converts_basic_markdown() {
        let html = render(&Markdown::default(), "# Title\n\nSome *text*.");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<em>text</em>"));
    }

    #[test]
    fn tables_are_on_by_default() {
        let html = render(&Markdown::default(), "| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
    }

    #[test]
    fn options_can_turn_extensions_off() {
        let mut md = Markdown::default();
        let options: PluginOptions = toml::from_str("tables = false").unwrap();
        md.init(&mut Linker::new("markdown"), &options).unwrap();
        let html = render(&md, "| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(!html.contains("<table>"));
    }

    #[test]
    fn unknown_options_are_rejected() {
        let mut md = Markdown::default();
        let options: PluginOptions = toml::from_str("emoji = true").unwrap();
        assert!(matches!(
            md.init(&mut Linker::new("markdown"), &options),
            Err(RendererError::Options { .. })
        ));
    }

    #[test]
    fn links_to_header_and_layout() {
        let mut md = Markdown::default();
        let mut linker = Linker::new("markdown");
        md.init(&mut linker, &PluginOptions::new()).unwrap();
        assert_eq!(linker.links.pre[0].name, "header_read");
        assert_eq!(linker.links.post[0].name, "template_man");
    }
}
