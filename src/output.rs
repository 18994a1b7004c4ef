//! CLI output formatting.
//!
//! Every command has a `format_*` function returning lines, which keeps them
//! testable, and a `print_*` wrapper that writes to stdout. Diagnostics go
//! through `tracing`; this module only formats what the user asked for.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Copied css/site.css → css/site.css (written)
//! Aligned 4 files to 6 stages
//! Pass 1
//!     header_read blog/post1.md
//! ...
//! Saved blog/post1.html (written)
//! Saved about.html (unchanged)
//!
//! Built 4 files in 6 passes → output
//!     14 renders, 1 generated page
//!     2 written, 1 unchanged, 1 copied
//! ```
//!
//! ## Check
//!
//! ```text
//! Process
//!     blog/post1.md → blog/post1.html
//!         header_read → add_data → collate → markdown → template_man → tag
//! Copy
//!     logo.png → logo.png
//! Layouts and partials
//!     _layouts/page.html
//!
//! 4 files: 2 processed, 1 copied, 1 building block (1 ignored)
//! ```

use crate::pipeline::{BuildSummary, CheckReport, CheckedFile};
use crate::registry::RendererInfo;
use crate::schedule::BuildEvent;
use crate::types::Usage;
use crate::writer::WriteOutcome;

// ============================================================================
// Shared helpers
// ============================================================================

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn status(outcome: WriteOutcome) -> &'static str {
    match outcome {
        WriteOutcome::Written => "written",
        WriteOutcome::Unchanged => "unchanged",
        WriteOutcome::Refused => "refused",
    }
}

/// `1 page`, `2 pages`, `3 passes`.
fn plural(n: usize, word: &str) -> String {
    match n {
        1 => format!("{n} {word}"),
        _ if word.ends_with('s') => format!("{n} {word}es"),
        _ => format!("{n} {word}s"),
    }
}

// ============================================================================
// Build
// ============================================================================

/// Format one scheduler event as display lines.
pub fn format_build_event(event: &BuildEvent) -> Vec<String> {
    match event {
        BuildEvent::Copied {
            rel_path,
            dest,
            status: outcome,
        } => vec![format!("Copied {} → {} ({})", rel_path, dest, status(*outcome))],
        BuildEvent::Aligned { files, stages } => {
            vec![format!("Aligned {} to {}", plural(*files, "file"), plural(*stages, "stage"))]
        }
        BuildEvent::PassStarted { pass } => vec![format!("Pass {pass}")],
        BuildEvent::Rendered { renderer, file, .. } => {
            vec![format!("{}{} {}", indent(1), renderer, file)]
        }
        BuildEvent::VirtualAdded { dest } => vec![format!("{}+ {} (generated)", indent(1), dest)],
        BuildEvent::Saved {
            dest,
            status: outcome,
        } => vec![format!("Saved {} ({})", dest, status(*outcome))],
        BuildEvent::Stalled { file, remaining } => vec![
            format!("Stalled {file}"),
            format!("{}never ran: {}", indent(1), remaining.join(", ")),
        ],
    }
}

pub fn format_build_summary(summary: &BuildSummary) -> Vec<String> {
    let s = &summary.schedule;
    let mut lines = vec![
        String::new(),
        format!(
            "Built {} in {} → {}",
            plural(summary.files, "file"),
            plural(s.passes, "pass"),
            summary.out.display()
        ),
        format!(
            "{}{}, {}",
            indent(1),
            plural(s.renders, "render"),
            plural(s.virtual_files, "generated page")
        ),
        format!(
            "{}{} written, {} unchanged, {} copied",
            indent(1),
            s.written,
            s.unchanged,
            s.copied
        ),
    ];
    if s.refused > 0 {
        lines.push(format!(
            "{}{} refused (outside the output folder)",
            indent(1),
            plural(s.refused, "file")
        ));
    }
    if s.stalled > 0 {
        lines.push(format!(
            "{}{} never finished rendering",
            indent(1),
            plural(s.stalled, "file")
        ));
    }
    lines
}

pub fn print_build_summary(summary: &BuildSummary) {
    for line in format_build_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

fn file_lines(file: &CheckedFile, with_chain: bool) -> Vec<String> {
    let theme = if file.is_theme { " [theme]" } else { "" };
    let mut lines = vec![format!("{}{} → {}{}", indent(1), file.rel_path, file.dest, theme)];
    if with_chain && !file.chain.is_empty() {
        lines.push(format!("{}{}", indent(2), file.chain.join(" → ")));
    }
    lines
}

pub fn format_check_output(report: &CheckReport) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(theme) = &report.theme {
        lines.push(format!("Theme: {theme}"));
    }
    let pages: Vec<&CheckedFile> = report
        .files
        .iter()
        .filter(|f| f.usage == Usage::Process && !f.is_building_block)
        .collect();
    let copies: Vec<&CheckedFile> = report
        .files
        .iter()
        .filter(|f| f.usage == Usage::Copy)
        .collect();
    let blocks: Vec<&CheckedFile> = report
        .files
        .iter()
        .filter(|f| f.is_building_block)
        .collect();

    if !pages.is_empty() {
        lines.push("Process".to_string());
        lines.extend(pages.iter().flat_map(|f| file_lines(f, true)));
    }
    if !copies.is_empty() {
        lines.push("Copy".to_string());
        lines.extend(copies.iter().flat_map(|f| file_lines(f, false)));
    }
    if !blocks.is_empty() {
        lines.push("Layouts and partials".to_string());
        for f in &blocks {
            let theme = if f.is_theme { " [theme]" } else { "" };
            lines.push(format!("{}{}{}", indent(1), f.rel_path, theme));
        }
    }

    lines.push(String::new());
    let mut total = format!(
        "{}: {} processed, {} copied, {}",
        plural(report.files.len(), "file"),
        pages.len(),
        copies.len(),
        plural(blocks.len(), "building block")
    );
    if report.ignored > 0 || report.shadowed > 0 {
        total.push_str(&format!(
            " ({} ignored, {} shadowed)",
            report.ignored, report.shadowed
        ));
    }
    lines.push(total);
    lines
}

pub fn print_check_output(report: &CheckReport) {
    for line in format_check_output(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Renderers
// ============================================================================

pub fn format_renderers(renderers: &[RendererInfo]) -> Vec<String> {
    let mut lines = Vec::new();
    for r in renderers {
        lines.push(format!("{} (priority {})", r.name, r.priority));
        if !r.extensions.is_empty() {
            lines.push(format!("{}Extensions: {}", indent(1), r.extensions.join(", ")));
        }
        if !r.pre.is_empty() {
            lines.push(format!("{}Pre: {}", indent(1), r.pre.join(", ")));
        }
        if !r.post.is_empty() {
            lines.push(format!("{}Post: {}", indent(1), r.post.join(", ")));
        }
    }
    lines
}

pub fn print_renderers(renderers: &[RendererInfo]) {
    for line in format_renderers(renderers) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleSummary;
    use std::path::PathBuf;

    fn checked(rel: &str, usage: Usage, dest: &str, chain: &[&str]) -> CheckedFile {
        CheckedFile {
            rel_path: rel.to_string(),
            usage,
            dest: dest.to_string(),
            chain: chain.iter().map(|s| s.to_string()).collect(),
            is_theme: false,
            is_building_block: false,
        }
    }

    // =========================================================================
    // Build events
    // =========================================================================

    #[test]
    fn rendered_event_is_indented() {
        let lines = format_build_event(&BuildEvent::Rendered {
            pass: 2,
            renderer: "markdown".into(),
            file: "blog/post1.md".into(),
        });
        assert_eq!(lines, vec!["    markdown blog/post1.md"]);
    }

    #[test]
    fn saved_event_shows_status() {
        let lines = format_build_event(&BuildEvent::Saved {
            dest: "about.html".into(),
            status: WriteOutcome::Unchanged,
        });
        assert_eq!(lines, vec!["Saved about.html (unchanged)"]);
    }

    #[test]
    fn aligned_event_pluralises() {
        let lines = format_build_event(&BuildEvent::Aligned { files: 1, stages: 6 });
        assert_eq!(lines, vec!["Aligned 1 file to 6 stages"]);
    }

    #[test]
    fn stalled_event_lists_remaining_renderers() {
        let lines = format_build_event(&BuildEvent::Stalled {
            file: "empty.md".into(),
            remaining: vec!["markdown".into(), "tag".into()],
        });
        assert_eq!(lines, vec!["Stalled empty.md", "    never ran: markdown, tag"]);
    }

    #[test]
    fn summary_mentions_problems_only_when_present() {
        let mut summary = BuildSummary {
            out: PathBuf::from("output"),
            files: 3,
            schedule: ScheduleSummary {
                passes: 6,
                renders: 14,
                written: 2,
                unchanged: 1,
                copied: 1,
                virtual_files: 1,
                ..ScheduleSummary::default()
            },
        };
        let lines = format_build_summary(&summary);
        assert_eq!(lines[1], "Built 3 files in 6 passes → output");
        assert_eq!(lines[2], "    14 renders, 1 generated page");
        assert_eq!(lines.len(), 4);

        summary.schedule.refused = 1;
        summary.schedule.stalled = 2;
        let lines = format_build_summary(&summary);
        assert!(lines.contains(&"    1 file refused (outside the output folder)".to_string()));
        assert!(lines.contains(&"    2 files never finished rendering".to_string()));
    }

    // =========================================================================
    // Check
    // =========================================================================

    #[test]
    fn check_groups_files_by_usage() {
        let mut layout = checked("_layouts/page.html", Usage::Process, "_layouts/page.html", &[]);
        layout.is_building_block = true;
        layout.is_theme = true;
        let report = CheckReport {
            base: PathBuf::from("site"),
            theme: Some("clean".into()),
            files: vec![
                checked("post.md", Usage::Process, "post.html", &["header_read", "markdown"]),
                checked("logo.png", Usage::Copy, "logo.png", &[]),
                layout,
            ],
            discovered: 4,
            ignored: 1,
            shadowed: 0,
        };
        let lines = format_check_output(&report);
        assert_eq!(
            lines,
            vec![
                "Theme: clean",
                "Process",
                "    post.md → post.html",
                "        header_read → markdown",
                "Copy",
                "    logo.png → logo.png",
                "Layouts and partials",
                "    _layouts/page.html [theme]",
                "",
                "3 files: 1 processed, 1 copied, 1 building block (1 ignored, 0 shadowed)",
            ]
        );
    }

    // =========================================================================
    // Renderers
    // =========================================================================

    #[test]
    fn renderer_listing_skips_empty_sections() {
        let lines = format_renderers(&[
            RendererInfo {
                name: "header_read".into(),
                priority: 50,
                extensions: vec![],
                pre: vec![],
                post: vec!["add_data".into()],
            },
            RendererInfo {
                name: "markdown".into(),
                priority: 50,
                extensions: vec!["md".into(), "markdown".into()],
                pre: vec!["header_read".into()],
                post: vec!["template_man".into()],
            },
        ]);
        assert_eq!(
            lines,
            vec![
                "header_read (priority 50)",
                "    Post: add_data",
                "markdown (priority 50)",
                "    Extensions: md, markdown",
                "    Pre: header_read",
                "    Post: template_man",
            ]
        );
    }
}
