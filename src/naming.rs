//! Centralized filename parsing.
//!
//! Every component that derives something from a filename goes through this
//! module so that the rules stay consistent:
//!
//! - Renderer lookup splits `page.tem.html` into the base `page` and the
//!   extension list `["tem", "html"]`.
//! - Destination names are lowercased and have whitespace replaced by the
//!   configured `filename_space_char` (`My Post.md` → `my-post.html`).
//! - Layout and partial caches are keyed by the same normalised form, so
//!   `{% include "Site Header.html" %}` finds `_partials/site header.html`.

use std::path::Path;

/// A filename broken into its base and its dot-separated extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitName {
    /// Everything before the first dot. Empty for dotfiles like `.htaccess`.
    pub base: String,
    /// Extensions in left-to-right order, lowercased and dot-free.
    pub exts: Vec<String>,
}

/// Split a filename (directories are stripped) into base and extensions.
///
/// - `"page.tem.html"` → base `page`, exts `["tem", "html"]`
/// - `"post.MD"` → base `post`, exts `["md"]`
/// - `"README"` → base `README`, exts `[]`
/// - `"archive.tar..gz"` → base `archive`, exts `["tar", "gz"]`
pub fn split_extensions(filename: &str) -> SplitName {
    let name = file_name(filename);
    match name.find('.') {
        Some(dot) => SplitName {
            base: name[..dot].to_string(),
            exts: name[dot + 1..]
                .split('.')
                .filter(|e| !e.is_empty())
                .map(str::to_lowercase)
                .collect(),
        },
        None => SplitName {
            base: name.to_string(),
            exts: Vec::new(),
        },
    }
}

/// Normalise an extension for lookup: strip one leading dot and lowercase.
pub fn normalize_ext(ext: &str) -> String {
    ext.strip_prefix('.').unwrap_or(ext).to_lowercase()
}

/// Lowercase a name and replace every whitespace character with `space_char`.
pub fn sanitize(name: &str, space_char: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_whitespace() {
            out.push_str(space_char);
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Cache key used by the layout and partial lookups.
///
/// Only the final path component counts, so `_partials/nav/Menu.html` and
/// `menu.html` resolve to the same entry.
pub fn cache_key(name: &str, space_char: &str) -> String {
    sanitize(file_name(name), space_char)
}

/// Join a slash-separated relative directory and a filename.
pub fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Render a relative path with `/` separators regardless of platform.
pub fn rel_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multiple_extensions() {
        let s = split_extensions("page.tem.html");
        assert_eq!(s.base, "page");
        assert_eq!(s.exts, vec!["tem", "html"]);
    }

    #[test]
    fn strips_directories_before_splitting() {
        let s = split_extensions("blog/2016.archive/post.md");
        assert_eq!(s.base, "post");
        assert_eq!(s.exts, vec!["md"]);
    }

    #[test]
    fn extensions_are_lowercased() {
        assert_eq!(split_extensions("Post.MD").exts, vec!["md"]);
        assert_eq!(split_extensions("Post.MD").base, "Post");
    }

    #[test]
    fn no_extension() {
        let s = split_extensions("README");
        assert_eq!(s.base, "README");
        assert!(s.exts.is_empty());
    }

    #[test]
    fn dotfile_has_empty_base() {
        let s = split_extensions(".htaccess");
        assert_eq!(s.base, "");
        assert_eq!(s.exts, vec!["htaccess"]);
    }

    #[test]
    fn empty_segments_are_dropped() {
        assert_eq!(split_extensions("a.tar..gz").exts, vec!["tar", "gz"]);
    }

    #[test]
    fn normalize_ext_strips_one_dot() {
        assert_eq!(normalize_ext(".MD"), "md");
        assert_eq!(normalize_ext("html"), "html");
    }

    #[test]
    fn sanitize_lowercases_and_replaces_whitespace() {
        assert_eq!(sanitize("My Great\tPost.html", "-"), "my-great-post.html");
        assert_eq!(sanitize("A B", "_"), "a_b");
    }

    #[test]
    fn cache_key_uses_final_component() {
        assert_eq!(cache_key("_partials/nav/Site Menu.html", "-"), "site-menu.html");
        assert_eq!(cache_key("site-menu.html", "-"), "site-menu.html");
    }

    #[test]
    fn join_rel_handles_root() {
        assert_eq!(join_rel("", "a.html"), "a.html");
        assert_eq!(join_rel("blog", "a.html"), "blog/a.html");
    }
}
