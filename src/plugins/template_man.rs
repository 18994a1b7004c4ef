//! Layout selection.
//!
//! Picks the layout a page is wrapped in, first match wins:
//!
//! 1. the page's `layout` field (`layout:` with no value means none)
//! 2. its `item_template` field
//! 3. the layout of its post type
//! 4. the layout of the default post type
//!
//! A layout named by the page itself must exist. One inherited from a post
//! type is optional: the page is then saved without a layout. The chosen
//! layout's header fields become defaults for the page. The layout is
//! applied later, by `tag`.

use tracing::{debug, warn};

use super::{HEADER_READ, TAG};
use crate::context::BuildSet;
use crate::fileinfo::FileMeta;
use crate::naming::split_extensions;
use crate::renderer::{DEFAULT_PRIORITY, Linker, PluginOptions, RenderError, Renderer, RendererError};
use crate::types::{Content, Fields};

/// Priority above `tag`, so `tem`/`tpl` files select this renderer.
pub const TEMPLATE_MAN_PRIORITY: i32 = 60;

pub struct TemplateMan;

impl Renderer for TemplateMan {
    fn name(&self) -> &str {
        super::TEMPLATE_MAN
    }

    fn extensions(&self) -> Vec<String> {
        vec!["tem".into(), "tpl".into()]
    }

    fn priority(&self) -> i32 {
        TEMPLATE_MAN_PRIORITY
    }

    fn calc_extension(&self, filename: &str, _current_ext: &str, default_ext: &str) -> String {
        template_extension(filename, default_ext)
    }

    fn init(&mut self, linker: &mut Linker, _options: &PluginOptions) -> Result<(), RendererError> {
        linker
            .pre(HEADER_READ, DEFAULT_PRIORITY)
            .post(TAG, DEFAULT_PRIORITY);
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
        let explicit = fields
            .get_str("layout")
            .or_else(|| fields.get_str("item_template"))
            .map(str::to_string);
        if explicit.as_deref().is_some_and(|l| l.trim().is_empty()) {
            fields.template = None;
            return Ok(std::mem::take(&mut fields.content));
        }
        let name = explicit.clone().or_else(|| {
            let config = &set.config;
            let post_type = fields
                .get_str("post_type")
                .unwrap_or(&config.default_post_type);
            config
                .post_type(post_type)
                .and_then(|pt| pt.layout.clone())
                .or_else(|| {
                    config
                        .post_types
                        .get(&config.default_post_type)
                        .and_then(|pt| pt.layout.clone())
                })
        });
        let Some(name) = name else {
            return Ok(std::mem::take(&mut fields.content));
        };

        match set.lookup_layout(&name) {
            Some(layout) => {
                debug!(file = %file.rel_path, layout = %layout.meta.rel_path, "selected layout");
                fields.template = Some(layout.meta.rel_path.clone());
                fields.merge_defaults(&layout.fields.values);
            }
            None if explicit.is_some() => return Err(RenderError::MissingLayout(name)),
            None => {
                warn!(file = %file.rel_path, layout = %name, "post type layout not found, saving without layout");
            }
        }
        Ok(std::mem::take(&mut fields.content))
    }
}

/// The rightmost extension of `filename`, or `default_ext` when that is a
/// template or `html` extension.
pub(crate) fn template_extension(filename: &str, default_ext: &str) -> String {
    match split_extensions(filename).exts.last().map(String::as_str) {
        None | Some("tem" | "tpl" | "html") => default_ext.to_string(),
        Some(ext) => ext.to_string(),
    }
}
