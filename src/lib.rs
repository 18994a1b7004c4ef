//! # Kiln
//!
//! A static site generator where each file's name decides how it is built.
//! `post.md` runs through the Markdown renderer and lands as `post.html`;
//! `feed.tem.xml` is a template producing `feed.xml`; `logo.png` is claimed
//! by nothing and copied as is.
//!
//! # Architecture: Chains and Passes
//!
//! ```text
//! 1. Discover   source/        →  entries          (walk, .kilnignore)
//! 2. Classify   entries        →  BuildSet         (usage, chain, destination)
//! 3. Load       BuildSet       →  contents         (read, copy, load hooks)
//! 4. Align      chains         →  equal lengths    (left-pad with a no-op)
//! 5. Passes     stage k of every file, then stage k+1, until nothing runs
//! 6. Save       BuildSet       →  output/          (byte-identical files skipped)
//! ```
//!
//! A file's chain is derived from its extensions and from the pre/post links
//! renderers declare on each other. Because chains are padded at the front,
//! their last stages line up: a listing template reaches its `tag` stage in
//! the same pass as every post, after all posts were collated.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`renderer`] | The `Renderer` trait, link declarations, the padding renderer |
//! | [`registry`] | Renderer registration, lookup by extension, link graph validation |
//! | [`chain`] | Filename → ordered renderer chain and destination filename |
//! | [`classify`] | Usage (ignore/copy/process), theme rules, destination paths |
//! | [`context`] | `BuildSet`: files, destination ownership, layout/partial caches, collation tables |
//! | [`schedule`] | Load, align, multi-pass execution, save; progress events |
//! | [`writer`] | Idempotent writes confined to the output folder |
//! | [`scan`] | Deterministic discovery walk with ignore-file support |
//! | [`pipeline`] | Config → renderers → discovery → classification → scheduling |
//! | [`plugins`] | Built-in renderers: headers, dates, collation, Markdown, Textile, layouts, Tera |
//! | [`config`] | `config.toml` and `theme.toml` loading, merging and validation |
//! | [`fileinfo`] | Per-file state and virtual files |
//! | [`types`] | Content, fields, file stats, usage |
//! | [`naming`] | Extension splitting, filename sanitising, cache keys |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## An Explicit Registry
//!
//! Renderers live in a [`registry::RendererRegistry`] owned by the build,
//! not in global state. Links are checked as a graph when the registry is
//! initialised, so a pre/post cycle fails before any file is read.
//!
//! ## Virtual Files Join at Pass Boundaries
//!
//! Pages synthesised during a pass (a tag listing seen for the first time)
//! are queued and appended once the pass ends, padded to the longest
//! remaining chain. They first run in the next pass and finish with
//! everything else, whatever their position in the file list.

pub mod chain;
pub mod classify;
pub mod config;
pub mod context;
pub mod fileinfo;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod plugins;
pub mod registry;
pub mod renderer;
pub mod scan;
pub mod schedule;
pub mod types;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_helpers;
