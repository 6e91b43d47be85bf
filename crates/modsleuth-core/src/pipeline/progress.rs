/// Pass reporting — lightweight messages sent from the coordinating thread
/// to whoever renders the catalog, via a crossbeam channel.
use crate::error::{ErrorKind, PipelineError};
use std::collections::BTreeMap;
use std::time::Duration;

/// Counters for one completed pass. Each stage returns its own report and
/// the pipeline adds them up here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassSummary {
    pub archives: usize,
    pub prioritized: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Error count per category label.
    pub errors_by_kind: BTreeMap<&'static str, usize>,
    pub accepted: usize,
    pub rejected: usize,
    pub fallback_links: usize,
    /// Folder names whose casing differs between archives.
    pub conflicts: usize,
    /// Base names of archives first seen in this pass.
    pub new_archives: Vec<String>,
    pub removed_archives: usize,
    pub modified_archives: usize,
    /// Cached files deleted for removed / replaced archives.
    pub purged: usize,
    /// `true` when the whole cache was cleared because the reserved set changed.
    pub cache_cleared: bool,
    pub duration: Duration,
}

impl PassSummary {
    pub fn count_errors<'a>(&mut self, errors: impl IntoIterator<Item = &'a PipelineError>) {
        for err in errors {
            self.errors += 1;
            *self.errors_by_kind.entry(err.kind().label()).or_default() += 1;
        }
    }

    pub fn errors_of(&self, kind: ErrorKind) -> usize {
        self.errors_by_kind.get(kind.label()).copied().unwrap_or(0)
    }
}

/// Messages emitted by a pass or by the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A pass has started for the given root (`None` for a manual pass).
    ScanStarted { root: Option<usize> },
    /// Archives added since the previous pass, by base name.
    NewArchives(Vec<String>),
    /// The pass finished; the catalog files are up to date.
    ScanComplete(PassSummary),
    /// A directory-level precondition failed; nothing was written.
    PassFailed(String),
}
