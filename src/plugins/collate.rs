//! Rule-based collation and listing pages.
//!
//! Each rule collects the pages carrying one of its `fields` into an
//! aggregate table named after the rule:
//!
//! | rule | fields | kind | listing |
//! |------|--------|------|---------|
//! | `all_post_types` | `post_type` | keyed, values also get a root list | `sitemap.html` |
//! | `all_authors` | `author` | keyed | `authors.html` |
//! | `all_categories` | `category`, `categories` | keyed, comma separated | `categories.html` |
//! | `all_tags` | `tag`, `tags` | keyed, comma separated | `tags.html` |
//! | `featured` | `feature`, `featured` | list of truthy pages | `featured.html` |
//! | `popular` | `popular` | list of truthy pages | `popular.html` |
//!
//! Rules are configured under `[plugin_options.collate.rules.<name>]`; a
//! rule with the name of a stock rule replaces it.
//!
//! Listing pages are virtual files rendered with the `list.html` layout
//! (single lists) or `keyed_list.html` (keyed tables). They are only
//! generated when that layout exists and nothing else owns the destination.
//! With `add_to_root`, every value seen for the first time also gets its own
//! list and listing page, in the middle of the build.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use super::{ADD_DATA, TEMPLATE_MAN, field_values, is_truthy};
use crate::context::BuildSet;
use crate::fileinfo::{FileMeta, VirtualFile};
use crate::naming::{sanitize, split_extensions};
use crate::renderer::{
    DEFAULT_PRIORITY, Linker, PluginOptions, RenderError, Renderer, RendererError, parse_options,
};
use crate::types::{Content, Fields};

const LIST_LAYOUT: &str = "list.html";
const KEYED_LIST_LAYOUT: &str = "keyed_list.html";
const LIST_LEN: i64 = 100;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollateRule {
    pub fields: Vec<String>,
    /// Split string values on commas.
    pub multiple_values: bool,
    /// Also keep a top-level list per value.
    pub add_to_root: bool,
    /// Collect truthy pages into one list instead of a keyed table.
    pub single_list: bool,
    /// Listing page name. Defaults to the rule name.
    pub filename: Option<String>,
    pub generate_html: bool,
    pub enabled: bool,
}

impl Default for CollateRule {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            multiple_values: false,
            add_to_root: false,
            single_list: false,
            filename: None,
            generate_html: true,
            enabled: true,
        }
    }
}

fn rule(fields: &[&str]) -> CollateRule {
    CollateRule {
        fields: fields.iter().map(|f| f.to_string()).collect(),
        ..CollateRule::default()
    }
}

fn stock_rules() -> BTreeMap<String, CollateRule> {
    BTreeMap::from([
        (
            "all_post_types".to_string(),
            CollateRule {
                add_to_root: true,
                filename: Some("sitemap.html".into()),
                ..rule(&["post_type"])
            },
        ),
        (
            "all_authors".to_string(),
            CollateRule {
                filename: Some("authors.html".into()),
                ..rule(&["author"])
            },
        ),
        (
            "all_categories".to_string(),
            CollateRule {
                multiple_values: true,
                filename: Some("categories.html".into()),
                ..rule(&["category", "categories"])
            },
        ),
        (
            "all_tags".to_string(),
            CollateRule {
                multiple_values: true,
                filename: Some("tags.html".into()),
                ..rule(&["tag", "tags"])
            },
        ),
        (
            "featured".to_string(),
            CollateRule {
                single_list: true,
                ..rule(&["feature", "featured"])
            },
        ),
        (
            "popular".to_string(),
            CollateRule {
                single_list: true,
                ..rule(&["popular"])
            },
        ),
    ])
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CollateOptions {
    rules: BTreeMap<String, CollateRule>,
}

#[derive(Debug)]
pub struct Collate {
    rules: BTreeMap<String, CollateRule>,
}

impl Default for Collate {
    fn default() -> Self {
        Self {
            rules: stock_rules(),
        }
    }
}

impl Collate {
    pub fn rules(&self) -> &BTreeMap<String, CollateRule> {
        &self.rules
    }
}

impl Renderer for Collate {
    fn name(&self) -> &str {
        super::COLLATE
    }

    fn init(&mut self, linker: &mut Linker, options: &PluginOptions) -> Result<(), RendererError> {
        linker.after(ADD_DATA, DEFAULT_PRIORITY);
        let options: CollateOptions = parse_options(self.name(), options)?;
        self.rules.extend(options.rules);
        self.rules.retain(|_, r| r.enabled);
        Ok(())
    }

    fn load(&self, set: &mut BuildSet) -> Result<(), RenderError> {
        for (name, rule) in &self.rules {
            if rule.generate_html {
                add_listing(set, name, rule.filename.as_deref(), rule.single_list);
            }
        }
        Ok(())
    }

    fn render(
        &self,
        fields: &mut Fields,
        file: &FileMeta,
        set: &mut BuildSet,
    ) -> Result<Content, RenderError> {
        let draft = fields.get("draft").is_some_and(is_truthy);
        if file.is_building_block() || file.is_virtual || draft {
            return Ok(std::mem::take(&mut fields.content));
        }
        let rel = file.rel_path.as_str();
        for (name, rule) in &self.rules {
            for field in &rule.fields {
                let Some(value) = fields.get(field) else {
                    continue;
                };
                if rule.single_list {
                    if is_truthy(value) {
                        set.aggregate.push(name, rel);
                    }
                    continue;
                }
                for v in field_values(value, rule.multiple_values) {
                    set.aggregate.collate(name, &v, rel);
                    if rule.add_to_root {
                        let first = set.aggregate.get(&v).is_none();
                        set.aggregate.push(&v, rel);
                        if first && rule.generate_html {
                            add_listing(set, &v, None, true);
                        }
                    }
                }
            }
        }
        Ok(std::mem::take(&mut fields.content))
    }
}

/// Queue a listing page for the aggregate table `name`.
fn add_listing(set: &mut BuildSet, name: &str, filename: Option<&str>, single_list: bool) {
    let layout = if single_list { LIST_LAYOUT } else { KEYED_LIST_LAYOUT };
    if set.lookup_layout(layout).is_none() {
        debug!(list = name, layout, "no listing layout, skipping listing page");
        return;
    }
    let split = split_extensions(filename.unwrap_or(name));
    let dest = sanitize(
        &format!("{}.{}", split.base, set.config.default_extension),
        &set.config.filename_space_char,
    );
    if set.is_destination_taken(&dest) {
        debug!(list = name, dest = %dest, "destination taken, skipping listing page");
        return;
    }
    let mut fields = Fields::with_content(".");
    fields.set("title", title_case(name));
    fields.set("layout", layout);
    fields.set(
        "list_type",
        if single_list {
            name.to_string()
        } else {
            format!("{name}.*")
        },
    );
    fields.set("list_len", LIST_LEN);
    fields.set("list_hide_content", true);
    set.add_virtual(VirtualFile {
        dest_rel_path: dest,
        fields,
        renderers: vec![TEMPLATE_MAN.to_string()],
    });
}

/// `all_post_types` → `All Post Types`.
fn title_case(name: &str) -> String {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Collation;
    use crate::fileinfo::FileInfo;
    use crate::test_helpers::{build_set, meta};

    fn with_layouts(set: &mut BuildSet, names: &[&str]) {
        for name in names {
            let rel = format!("_layouts/{name}");
            let mut m = meta(&rel, &rel);
            m.is_layout = true;
            m.source_path = Some(format!("/site/source/_layouts/{name}").into());
            set.insert(FileInfo::new(m, vec![])).unwrap();
        }
    }

    fn collate(fields: &mut Fields, rel: &str, set: &mut BuildSet) {
        Collate::default()
            .render(fields, &meta(rel, rel), set)
            .unwrap();
    }

    #[test]
    fn keyed_rules_split_multiple_values() {
        let mut set = build_set();
        let mut fields = Fields::with_content("x");
        fields.set("tags", "rust, web");
        fields.set("category", "code, notes");
        collate(&mut fields, "a.md", &mut set);
        let tags = set.aggregate.keyed("all_tags").unwrap();
        assert_eq!(tags.keys().collect::<Vec<_>>(), vec!["rust", "web"]);
        let cats = set.aggregate.keyed("all_categories").unwrap();
        assert_eq!(cats.len(), 2);
    }

    #[test]
    fn single_lists_take_truthy_pages() {
        let mut set = build_set();
        let mut a = Fields::with_content("x");
        a.set("featured", true);
        collate(&mut a, "a.md", &mut set);
        let mut b = Fields::with_content("x");
        b.set("featured", "false");
        collate(&mut b, "b.md", &mut set);
        assert_eq!(
            set.aggregate.get("featured"),
            Some(&Collation::List(vec!["a.md".into()]))
        );
    }

    #[test]
    fn add_to_root_builds_a_list_per_value() {
        let mut set = build_set();
        let mut fields = Fields::with_content("x");
        fields.set("post_type", "blog");
        collate(&mut fields, "blog/a.md", &mut set);
        assert_eq!(
            set.aggregate.get("blog"),
            Some(&Collation::List(vec!["blog/a.md".into()]))
        );
        assert_eq!(set.aggregate.keyed("all_post_types").unwrap()["blog"], vec!["blog/a.md"]);
    }

    #[test]
    fn new_root_value_queues_a_listing_page_once() {
        let mut set = build_set();
        with_layouts(&mut set, &["list.html"]);
        for rel in ["blog/a.md", "blog/b.md"] {
            let mut fields = Fields::with_content("x");
            fields.set("post_type", "blog");
            collate(&mut fields, rel, &mut set);
        }
        let pending = set.take_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].dest_rel_path, "blog.html");
        assert_eq!(pending[0].fields.get_str("list_type"), Some("blog"));
        assert_eq!(pending[0].renderers, vec!["template_man"]);
    }

    #[test]
    fn drafts_and_building_blocks_are_skipped() {
        let mut set = build_set();
        let mut fields = Fields::with_content("x");
        fields.set("tags", "rust");
        fields.set("draft", "yes");
        collate(&mut fields, "a.md", &mut set);
        let mut layout = meta("_layouts/x.html", "_layouts/x.html");
        layout.is_layout = true;
        let mut fields = Fields::with_content("x");
        fields.set("tags", "rust");
        Collate::default().render(&mut fields, &layout, &mut set).unwrap();
        assert!(set.aggregate.is_empty());
    }

    #[test]
    fn load_queues_listings_for_available_layouts() {
        let mut set = build_set();
        with_layouts(&mut set, &["keyed_list.html"]);
        Collate::default().load(&mut set).unwrap();
        let mut dests: Vec<String> = set
            .take_pending()
            .into_iter()
            .map(|v| v.dest_rel_path)
            .collect();
        dests.sort();
        assert_eq!(
            dests,
            vec!["authors.html", "categories.html", "sitemap.html", "tags.html"]
        );
    }

    #[test]
    fn listings_never_take_an_owned_destination() {
        let mut set = build_set();
        with_layouts(&mut set, &["keyed_list.html", "list.html"]);
        set.insert(FileInfo::new(meta("tags.tem.html", "tags.html"), vec![]))
            .unwrap();
        Collate::default().load(&mut set).unwrap();
        let pending = set.take_pending();
        assert!(pending.iter().all(|v| v.dest_rel_path != "tags.html"));
        assert!(pending.iter().any(|v| v.dest_rel_path == "featured.html"));
    }

    #[test]
    fn listing_fields_describe_the_list() {
        let mut set = build_set();
        with_layouts(&mut set, &["keyed_list.html"]);
        add_listing(&mut set, "all_tags", Some("tags.xml"), false);
        let v = set.take_pending().remove(0);
        assert_eq!(v.dest_rel_path, "tags.html");
        assert_eq!(v.fields.get_str("title"), Some("All Tags"));
        assert_eq!(v.fields.get_str("layout"), Some("keyed_list.html"));
        assert_eq!(v.fields.get_str("list_type"), Some("all_tags.*"));
        assert!(!v.fields.content.is_empty());
    }

    #[test]
    fn options_replace_and_disable_rules() {
        let mut collate = Collate::default();
        let options: PluginOptions = toml::from_str(
            r#"
            [rules.popular]
            enabled = false
            [rules.series]
            fields = ["series"]
            filename = "series.html"
            "#,
        )
        .unwrap();
        collate
            .init(&mut Linker::new("collate"), &options)
            .unwrap();
        assert!(!collate.rules().contains_key("popular"));
        assert_eq!(
            collate.rules()["series"].filename.as_deref(),
            Some("series.html")
        );
    }

    #[test]
    fn title_case_splits_on_punctuation() {
        assert_eq!(title_case("all_post_types"), "All Post Types");
        assert_eq!(title_case("blog"), "Blog");
    }
}
