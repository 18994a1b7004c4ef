//! The multi-pass scheduler.
//!
//! Every file's chain advances one renderer per pass, all files in order,
//! until a pass changes nothing:
//!
//! ```text
//! load     read Process files, copy Copy files, run load hooks
//! align    left-pad every chain with the padding renderer to the same length
//! pass 1   file[0].chain[0], file[1].chain[0], ...
//! pass 2   file[0].chain[1], file[1].chain[1], ...
//!   ...    virtual files queued during a pass join at its end
//! save     write every saveable file, run save hooks
//! ```
//!
//! Alignment makes stage `k` of every chain run in pass `k`. A listing page
//! whose chain is shorter than a post's therefore reaches its template
//! stage only after every post has had its header read and its fields
//! collated. This relies on chains being compatible: stages at the same
//! index must not depend on each other across files.

use rayon::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::{ClassifyError, Classifier};
use crate::context::{Admission, BuildSet, ContextError};
use crate::registry::RendererRegistry;
use crate::renderer::{DUMMY_NAME, RenderError, RendererError};
use crate::types::Usage;
use crate::writer::{OutputWriter, WriteError, WriteOutcome};

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("renderer '{renderer}' failed on '{file}': {source}")]
    Render {
        renderer: String,
        file: String,
        #[source]
        source: RenderError,
    },
    #[error("{hook} hook of renderer '{renderer}' failed: {source}")]
    Hook {
        renderer: String,
        hook: &'static str,
        #[source]
        source: RenderError,
    },
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Renderer(#[from] RendererError),
}

/// Progress reported while a build runs.
#[derive(Debug, Clone, Serialize)]
pub enum BuildEvent {
    Copied {
        rel_path: String,
        dest: String,
        status: WriteOutcome,
    },
    Aligned {
        files: usize,
        stages: usize,
    },
    PassStarted {
        pass: usize,
    },
    Rendered {
        pass: usize,
        renderer: String,
        file: String,
    },
    VirtualAdded {
        dest: String,
    },
    Saved {
        dest: String,
        status: WriteOutcome,
    },
    Stalled {
        file: String,
        remaining: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleSummary {
    /// Passes in which at least one renderer ran.
    pub passes: usize,
    /// Renderer invocations, padding excluded.
    pub renders: usize,
    pub copied: usize,
    pub written: usize,
    pub unchanged: usize,
    pub refused: usize,
    pub virtual_files: usize,
    pub stalled: usize,
}

pub struct Scheduler<'a> {
    registry: &'a RendererRegistry,
    writer: OutputWriter,
    events: Option<Sender<BuildEvent>>,
}

impl<'a> Scheduler<'a> {
    pub fn new(registry: &'a RendererRegistry, writer: OutputWriter) -> Self {
        Self {
            registry,
            writer,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Sender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.events {
            // A closed receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }

    /// Load, align, run passes to a fixed point, save.
    pub fn run(&self, set: &mut BuildSet) -> Result<ScheduleSummary, ScheduleError> {
        let mut summary = ScheduleSummary::default();
        self.load(set, &mut summary)?;
        self.align(set)?;
        self.run_passes(set, &mut summary)?;
        self.save(set, &mut summary)?;
        Ok(summary)
    }

    /// Read every Process file, copy every Copy file, run load hooks and
    /// admit the virtual files they queued.
    pub fn load(&self, set: &mut BuildSet, summary: &mut ScheduleSummary) -> Result<(), ScheduleError> {
        let to_read: Vec<(usize, PathBuf)> = set
            .files()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.meta.usage == Usage::Process && f.fields.content.is_empty())
            .filter_map(|(i, f)| f.meta.source_path.clone().map(|p| (i, p)))
            .collect();
        let reads: Vec<(usize, PathBuf, std::io::Result<Vec<u8>>)> = to_read
            .into_par_iter()
            .map(|(i, path)| {
                let bytes = fs::read(&path);
                (i, path, bytes)
            })
            .collect();
        for (i, path, bytes) in reads {
            let bytes = bytes.map_err(|source| ScheduleError::Read { path, source })?;
            if let Some(file) = set.file_mut(i) {
                file.fields.content = crate::types::Content::Bytes(bytes);
            }
        }

        let writer = &self.writer;
        let copies: Vec<(usize, Result<WriteOutcome, WriteError>)> = set
            .files()
            .par_iter()
            .enumerate()
            .filter(|(_, f)| f.meta.usage == Usage::Copy)
            .filter_map(|(i, f)| {
                let source = f.meta.source_path.as_ref()?;
                Some((i, writer.copy(source, &f.meta.dest_path)))
            })
            .collect();
        for (i, outcome) in copies {
            let outcome = outcome?;
            let Some(file) = set.file_mut(i) else { continue };
            file.can_save = false;
            file.chain.clear();
            summary.copied += 1;
            count(summary, outcome);
            let event = BuildEvent::Copied {
                rel_path: file.meta.rel_path.clone(),
                dest: file.meta.dest_rel_path.clone(),
                status: outcome,
            };
            self.emit(event);
        }

        self.registry
            .load_all(set)
            .map_err(|(renderer, source)| ScheduleError::Hook {
                renderer,
                hook: "load",
                source,
            })?;
        summary.virtual_files += self.admit_pending(set, None)?;
        Ok(())
    }

    /// Left-pad every Process chain to the longest one. Returns that length.
    pub fn align(&self, set: &mut BuildSet) -> Result<usize, ScheduleError> {
        let longest = set
            .files()
            .iter()
            .filter(|f| f.meta.usage == Usage::Process)
            .map(|f| f.chain.len())
            .max()
            .unwrap_or(0);
        let mut padded = 0;
        for file in set.files_mut() {
            if file.meta.usage != Usage::Process || file.chain.len() >= longest {
                continue;
            }
            let dummy = self
                .registry
                .dummy()
                .ok_or_else(|| RendererError::UnknownRenderer(DUMMY_NAME.to_string()))?;
            while file.chain.len() < longest {
                file.chain.push_front(dummy.clone());
            }
            padded += 1;
        }
        debug!(stages = longest, padded, "aligned chains");
        self.emit(BuildEvent::Aligned {
            files: set.len(),
            stages: longest,
        });
        Ok(longest)
    }

    /// Run passes until one makes no progress.
    pub fn run_passes(
        &self,
        set: &mut BuildSet,
        summary: &mut ScheduleSummary,
    ) -> Result<(), ScheduleError> {
        let mut pass = 0;
        loop {
            pass += 1;
            self.emit(BuildEvent::PassStarted { pass });
            let mut progress = false;
            for i in 0..set.len() {
                let Some(file) = set.file_mut(i) else { break };
                if file.meta.usage != Usage::Process
                    || file.chain.is_empty()
                    || file.fields.content.is_empty()
                {
                    continue;
                }
                let Some(renderer) = file.chain.pop_front() else {
                    continue;
                };
                let meta = file.meta.clone();
                let mut fields = std::mem::take(&mut file.fields);
                if !renderer.is_binary() {
                    fields.content.make_text();
                }
                let result = renderer.render(&mut fields, &meta, set);
                let content = result.map_err(|source| ScheduleError::Render {
                    renderer: renderer.name().to_string(),
                    file: meta.rel_path.clone(),
                    source,
                })?;
                fields.content = content;
                if let Some(file) = set.file_mut(i) {
                    file.fields = fields;
                }
                progress = true;
                if !renderer.is_dummy() {
                    summary.renders += 1;
                    self.emit(BuildEvent::Rendered {
                        pass,
                        renderer: renderer.name().to_string(),
                        file: meta.rel_path,
                    });
                }
            }
            let remaining = set
                .files()
                .iter()
                .filter(|f| f.meta.usage == Usage::Process)
                .map(|f| f.chain.len())
                .max()
                .unwrap_or(0);
            let added = self.admit_pending(set, Some(remaining))?;
            summary.virtual_files += added;
            if progress {
                summary.passes = pass;
            }
            if !progress && added == 0 {
                break;
            }
        }

        for file in set.files() {
            if file.meta.usage != Usage::Process {
                continue;
            }
            let remaining: Vec<String> = file
                .pending_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            if remaining.is_empty() {
                continue;
            }
            warn!(
                file = %file.meta.rel_path,
                remaining = ?remaining,
                "file has no content; its renderers never ran"
            );
            summary.stalled += 1;
            self.emit(BuildEvent::Stalled {
                file: file.meta.rel_path.clone(),
                remaining,
            });
        }
        info!(passes = summary.passes, renders = summary.renders, "rendering complete");
        Ok(())
    }

    /// Classify and insert queued virtual files. When `align_to` is set,
    /// their chains are left-padded to that length so they finish in the
    /// same pass as everything already in the set.
    fn admit_pending(
        &self,
        set: &mut BuildSet,
        align_to: Option<usize>,
    ) -> Result<usize, ScheduleError> {
        let pending = set.take_pending();
        if pending.is_empty() {
            return Ok(0);
        }
        let default_ext = set.config.default_extension.clone();
        let classifier = Classifier::new(self.registry, &default_ext);
        let mut added = 0;
        for virtual_file in pending {
            let mut file = classifier.classify_virtual(virtual_file, set)?;
            if let Some(target) = align_to
                && file.chain.len() < target
            {
                let dummy = self
                    .registry
                    .dummy()
                    .ok_or_else(|| RendererError::UnknownRenderer(DUMMY_NAME.to_string()))?;
                while file.chain.len() < target {
                    file.chain.push_front(dummy.clone());
                }
            }
            let dest = file.meta.dest_rel_path.clone();
            match set.insert(file)? {
                Admission::Added | Admission::Replaced { .. } => {
                    added += 1;
                    self.emit(BuildEvent::VirtualAdded { dest });
                }
                Admission::Shadowed { by } => {
                    debug!(dest = %dest, by = %by, "virtual file shadowed");
                }
                Admission::Ignored => {}
            }
        }
        Ok(added)
    }

    /// Write every saveable Process file, then run save hooks.
    pub fn save(&self, set: &BuildSet, summary: &mut ScheduleSummary) -> Result<(), ScheduleError> {
        let writer = &self.writer;
        let results: Vec<(String, Result<WriteOutcome, WriteError>)> = set
            .files()
            .par_iter()
            .filter(|f| {
                f.meta.usage == Usage::Process && f.can_save && f.fields.has_output()
            })
            .map(|f| {
                let outcome = writer.write(&f.meta.dest_path, f.fields.output_bytes());
                (f.meta.dest_rel_path.clone(), outcome)
            })
            .collect();
        for (dest, outcome) in results {
            let outcome = outcome?;
            count(summary, outcome);
            self.emit(BuildEvent::Saved {
                dest,
                status: outcome,
            });
        }
        self.registry
            .save_all(set)
            .map_err(|(renderer, source)| ScheduleError::Hook {
                renderer,
                hook: "save",
                source,
            })
    }
}

fn count(summary: &mut ScheduleSummary, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Written => summary.written += 1,
        WriteOutcome::Unchanged => summary.unchanged += 1,
        WriteOutcome::Refused => summary.refused += 1,
    }
}
