//! A Textile subset, rendered with maud.
//!
//! Blocks are separated by blank lines:
//!
//! ```text
//! h1. Heading           (h1. to h6.)
//! p. Paragraph          (also the default for plain text)
//! bq. Quoted text
//! bc. Code, verbatim
//! * item / # item       unordered / ordered lists
//! <div>...</div>        raw HTML, passed through
//! ```
//!
//! Inline: `*strong*`, `_emphasis_`, `@code@`, `"link text":url`. Single
//! line breaks inside a paragraph become `<br>`.

use maud::{Markup, PreEscaped, html};
use regex::Regex;
use std::sync::LazyLock;

use super::{HEADER_READ, TEMPLATE_MAN};
use crate::context::BuildSet;
use crate::fileinfo::FileMeta;
use crate::renderer::{DEFAULT_PRIORITY, Linker, PluginOptions, RenderError, Renderer, RendererError};
use crate::types::{Content, Fields};

static INLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)":(\S+)|\*([^*\s][^*]*?)\*|\b_([^_\s][^_]*?)_\b|@([^@]+)@"#)
        .expect("inline pattern is valid")
});

pub struct Textile;

impl Renderer for Textile {
    fn name(&self) -> &str {
        super::TEXTILE
    }

    fn extensions(&self) -> Vec<String> {
        vec!["tex".into(), "textile".into()]
    }

    fn init(&mut self, linker: &mut Linker, _options: &PluginOptions) -> Result<(), RendererError> {
        linker
            .pre(HEADER_READ, DEFAULT_PRIORITY)
            .post(TEMPLATE_MAN, DEFAULT_PRIORITY);
        Ok(())
    }

    fn render(
        &self,
        fields: &mut Fields,
        _file: &FileMeta,
        _set: &mut BuildSet,
    ) -> Result<Content, RenderError> {
        Ok(Content::Text(to_html(&fields.content.as_text())))
    }
}

#[derive(Debug, PartialEq)]
enum Block<'a> {
    Heading(u8, &'a str),
    Paragraph(Vec<&'a str>),
    Quote(Vec<&'a str>),
    Code(String),
    List { ordered: bool, items: Vec<&'a str> },
    Html(&'a str),
}

/// Convert Textile markup to HTML.
pub fn to_html(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    parse_blocks(&text)
        .iter()
        .map(|b| render_block(b).into_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn parse_blocks(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    for chunk in text.split("\n\n") {
        let chunk = chunk.trim_matches('\n');
        if chunk.trim().is_empty() {
            continue;
        }
        let lines: Vec<&str> = chunk.lines().collect();
        let first = lines[0];
        if let Some(level) = heading_level(first) {
            blocks.push(Block::Heading(level, first[4..].trim()));
        } else if let Some(rest) = first.strip_prefix("bq. ") {
            let mut quoted = vec![rest];
            quoted.extend(&lines[1..]);
            blocks.push(Block::Quote(quoted));
        } else if let Some(rest) = chunk.strip_prefix("bc. ") {
            blocks.push(Block::Code(rest.to_string()));
        } else if let Some(rest) = first.strip_prefix("p. ") {
            let mut para = vec![rest];
            para.extend(&lines[1..]);
            blocks.push(Block::Paragraph(para));
        } else if lines.iter().all(|l| l.starts_with("* ")) {
            blocks.push(Block::List {
                ordered: false,
                items: lines.iter().map(|l| l[2..].trim()).collect(),
            });
        } else if lines.iter().all(|l| l.starts_with("# ")) {
            blocks.push(Block::List {
                ordered: true,
                items: lines.iter().map(|l| l[2..].trim()).collect(),
            });
        } else if first.trim_start().starts_with('<') {
            blocks.push(Block::Html(chunk));
        } else {
            blocks.push(Block::Paragraph(lines));
        }
    }
    blocks
}

fn heading_level(line: &str) -> Option<u8> {
    let bytes = line.as_bytes();
    if bytes.len() >= 4 && bytes[0] == b'h' && bytes[2] == b'.' && bytes[3] == b' ' {
        let level = bytes[1].wrapping_sub(b'0');
        if (1..=6).contains(&level) {
            return Some(level);
        }
    }
    None
}

fn render_block(block: &Block<'_>) -> Markup {
    match block {
        Block::Heading(level, text) => {
            let inner = inline(text);
            match *level {
                1 => html! { h1 { (inner) } },
                2 => html! { h2 { (inner) } },
                3 => html! { h3 { (inner) } },
                4 => html! { h4 { (inner) } },
                5 => html! { h5 { (inner) } },
                _ => html! { h6 { (inner) } },
            }
        }
        Block::Paragraph(lines) => html! { p { (lines_with_breaks(lines)) } },
        Block::Quote(lines) => html! { blockquote { p { (lines_with_breaks(lines)) } } },
        Block::Code(code) => html! { pre { code { (code) } } },
        Block::List { ordered, items } => {
            if *ordered {
                html! { ol { @for item in items { li { (inline(item)) } } } }
            } else {
                html! { ul { @for item in items { li { (inline(item)) } } } }
            }
        }
        Block::Html(raw) => html! { (PreEscaped(*raw)) },
    }
}

fn lines_with_breaks(lines: &[&str]) -> Markup {
    html! {
        @for (i, line) in lines.iter().enumerate() {
            @if i > 0 { br; }
            (inline(line))
        }
    }
}

#[derive(Debug, PartialEq)]
enum Span<'a> {
    Text(&'a str),
    Strong(&'a str),
    Em(&'a str),
    Code(&'a str),
    Link { text: &'a str, href: &'a str },
}

fn spans(text: &str) -> Vec<Span<'_>> {
    let mut out = Vec::new();
    let mut last = 0;
    for caps in INLINE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let mut end = whole.end();
        let span = if let (Some(label), Some(href)) = (caps.get(1), caps.get(2)) {
            let trimmed = href.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')']);
            end = href.start() + trimmed.len();
            Span::Link {
                text: label.as_str(),
                href: trimmed,
            }
        } else if let Some(m) = caps.get(3) {
            Span::Strong(m.as_str())
        } else if let Some(m) = caps.get(4) {
            Span::Em(m.as_str())
        } else if let Some(m) = caps.get(5) {
            Span::Code(m.as_str())
        } else {
            continue;
        };
        if whole.start() > last {
            out.push(Span::Text(&text[last..whole.start()]));
        }
        out.push(span);
        last = end;
    }
    if last < text.len() {
        out.push(Span::Text(&text[last..]));
    }
    out
}

fn inline(text: &str) -> Markup {
    html! {
        @for span in spans(text) {
            @match span {
                Span::Text(t) => { (t) }
                Span::Strong(t) => { strong { (t) } }
                Span::Em(t) => { em { (t) } }
                Span::Code(t) => { code { (t) } }
                Span::Link { text, href } => { a href=(href) { (text) } }
            }
        }
    }
}
