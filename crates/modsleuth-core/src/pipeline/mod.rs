/// Pipeline — runs one complete pass over the configured roots.
///
/// A pass, in order:
///
/// 1. Locate archives and diff them against the recorded watcher state.
/// 2. Purge cached files of removed / replaced archives; clear the whole
///    cache if the reserved-name set changed.
/// 3. Index every archive (prioritized first) and write `zip_structure.txt`.
/// 4. Plan resolution and snapshot it as `outputGOOD (Original).txt`.
/// 5. Extract assets for new and changed archives (all archives on a full
///    pass, a first run, or after a cache clear).
/// 6. Finalize resolution against the cache and write `outputGOOD.txt`,
///    `outputBAD.txt` and `NewMods.txt`.
/// 7. Record the archive set as the new watcher state.
///
/// Everything runs on the calling thread except extraction, which fans out
/// to the worker pool and is awaited before step 6.
pub mod progress;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::extract::{self, ensure_placeholder, CacheDir, PreviewSize};
use crate::fsio;
use crate::model::archive::{archive_id_of, order_by_priority};
use crate::model::Resolution;
use crate::monitor::state::WatchState;
use crate::reserved::ReservedNameSet;
use crate::resolver::{self, render_bad, render_conflicts, render_good};
use crate::scanner::locator::{locate_in_root, normalize_key, LocatedArchive};
use crate::scanner::{index_archives, manifest, IndexReport};
use progress::{PassSummary, PipelineEvent};

use crossbeam_channel::Receiver;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{info, warn};

/// Maximum number of pipeline events that may queue up in a channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;

pub struct Pipeline {
    config: Config,
    cache: CacheDir,
}

impl Pipeline {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let cache = CacheDir::new(&config.cache_dir);
        Ok(Self { config, cache })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &CacheDir {
        &self.cache
    }

    fn preview_size(&self) -> PreviewSize {
        PreviewSize {
            width: self.config.preview_width,
            height: self.config.preview_height,
        }
    }

    /// Create the data and cache directories and the placeholder image.
    fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.config.data_dir)
            .map_err(|e| PipelineError::io(&self.config.data_dir, e))?;
        self.cache.ensure()?;
        ensure_placeholder(
            &self.config.placeholder_path(),
            self.config.preview_width,
            self.config.preview_height,
        )?;
        Ok(())
    }

    /// Archives per root (normalized root key → archives) and merged.
    fn locate(&self) -> (BTreeMap<String, BTreeMap<String, f64>>, BTreeMap<String, LocatedArchive>) {
        let ext = self.config.extension();
        let mut per_root = BTreeMap::new();
        let mut all = BTreeMap::new();
        for root in &self.config.roots {
            let found = locate_in_root(root, &ext);
            per_root.insert(
                normalize_key(root),
                found.iter().map(|(k, a)| (k.clone(), a.modified)).collect(),
            );
            for (key, archive) in found {
                all.entry(key).or_insert(archive);
            }
        }
        (per_root, all)
    }

    /// Locate and index only; writes the manifest.
    pub fn index(&self) -> Result<IndexReport> {
        fs::create_dir_all(&self.config.data_dir)
            .map_err(|e| PipelineError::io(&self.config.data_dir, e))?;
        let (_, located) = self.locate();
        let report = index_archives(located.values());
        manifest::write_manifest(&self.config.manifest_path(), &report.records)?;
        info!(
            "Indexed {} archive(s) into {}",
            report.records.len(),
            self.config.manifest_path().display()
        );
        Ok(report)
    }

    /// Resolve from the existing manifest against the current cache and
    /// write the catalog outputs. No extraction.
    pub fn resolve_from_manifest(&self) -> Result<(Resolution, Vec<PipelineError>)> {
        self.prepare()?;
        let contents = manifest::load_manifest(
            &self.config.manifest_path(),
            &self.config.extension(),
            self.config.read_retry_attempts,
            self.config.read_retry_backoff(),
        )?;
        let mut records = contents.records;
        order_by_priority(&mut records);

        let reserved = self.load_reserved();
        let snapshot = self.cache.snapshot()?;
        let resolution = resolver::resolve(
            &records,
            &reserved,
            &snapshot,
            self.cache.root(),
            &self.config.placeholder_path(),
        );
        self.write_outputs(&resolution)?;
        Ok((resolution, contents.errors))
    }

    fn load_reserved(&self) -> ReservedNameSet {
        ReservedNameSet::load(&self.config.reserved_source, &self.config.extension())
    }

    fn write_outputs(&self, resolution: &Resolution) -> Result<()> {
        fsio::write_atomic(
            &self.config.good_output_path(),
            render_good(&resolution.accepted).as_bytes(),
        )?;
        let mut bad = render_bad(&resolution.rejected);
        bad.push_str(&render_conflicts(&resolution.conflicts));
        fsio::write_atomic(&self.config.bad_output_path(), bad.as_bytes())?;
        Ok(())
    }

    /// Run one pass. `full` re-extracts every archive instead of only new
    /// and changed ones. Per-archive and per-entry failures are counted in
    /// the summary; only directory-level failures return `Err`.
    pub fn run_pass(&self, full: bool) -> Result<PassSummary> {
        let start = Instant::now();
        let mut summary = PassSummary::default();
        self.prepare()?;

        let state_path = self.config.state_path();
        let mut state = WatchState::load(&state_path)?;
        let first_run = state.is_empty();
        let reserved = self.load_reserved();

        // 1. Locate and diff.
        let (per_root, located) = self.locate();
        let diff = state.diff(&located);
        summary.archives = located.len();
        summary.removed_archives = diff.removed.len();
        summary.modified_archives = diff.modified.len();

        // 2. Invalidate stale cache entries.
        let reserved_changed = !first_run && reserved.differs_from(&state.reserved_names());
        let mut refresh: HashSet<String> = HashSet::new();
        if reserved_changed {
            info!("Reserved vehicle names changed; clearing the cache");
            summary.purged += self.cache.clear()?;
            summary.cache_cleared = true;
        } else {
            let stale_ids: HashSet<String> = diff
                .removed
                .iter()
                .chain(&diff.modified)
                .map(|key| archive_id_of(Path::new(key)).to_lowercase().to_string())
                .collect();
            for id in &stale_ids {
                summary.purged += self.cache.purge_archive(id)?;
            }
            // Archives sharing a purged file name lost their cache too.
            refresh.extend(
                located
                    .iter()
                    .filter(|(_, a)| {
                        stale_ids.contains(archive_id_of(&a.path).to_lowercase().as_str())
                    })
                    .map(|(k, _)| k.clone()),
            );
        }

        // 3. Index and write the manifest.
        let index = index_archives(located.values());
        summary.prioritized = index.prioritized_count();
        summary.count_errors(&index.errors);
        manifest::write_manifest(&self.config.manifest_path(), &index.records)?;

        // 4. Plan.
        let placeholder = self.config.placeholder_path();
        let plan = resolver::plan(&index.records, &reserved, &placeholder);
        fsio::write_atomic(
            &self.config.original_output_path(),
            render_good(&plan.candidates).as_bytes(),
        )?;

        // 5. Extract.
        let extract_all = full || first_run || reserved_changed;
        refresh.extend(diff.added.iter().cloned());
        refresh.extend(diff.modified.iter().cloned());
        let only = (!extract_all).then_some(&refresh);
        let jobs = extract::build_jobs(&index.records, only);
        let report = extract::run_extraction(
            &jobs,
            &self.cache,
            self.config.workers,
            self.preview_size(),
        );
        summary.extracted = report.extracted;
        summary.skipped = report.skipped;
        summary.count_errors(&report.errors);

        // 6. Finalize and write outputs.
        let snapshot = self.cache.snapshot()?;
        let resolution =
            resolver::finalize(&plan, &reserved, &snapshot, self.cache.root(), &placeholder);
        self.write_outputs(&resolution)?;
        summary.accepted = resolution.accepted.len();
        summary.rejected = resolution.rejected.len();
        summary.fallback_links = resolution.fallback_links();
        summary.conflicts = resolution.conflicts.len();
        if summary.conflicts > 0 {
            warn!(
                "{} naming conflict(s) listed in {}",
                summary.conflicts,
                self.config.bad_output_path().display()
            );
        }

        let missing = resolver::missing_previews(&resolution);
        if !missing.is_empty() {
            warn!("{} preview path(s) do not exist on disk", missing.len());
        }

        if !first_run {
            summary.new_archives = diff
                .added
                .iter()
                .filter_map(|key| located.get(key))
                .map(|a| archive_id_of(&a.path).to_string())
                .collect();
            summary.new_archives.sort();
        }
        let mut new_list = summary.new_archives.join("\r\n");
        if !new_list.is_empty() {
            new_list.push_str("\r\n");
        }
        fsio::write_atomic(&self.config.new_archives_path(), new_list.as_bytes())?;

        // 7. Record state.
        state.set_roots(per_root);
        state.set_reserved(&reserved);
        state.save(&state_path)?;

        summary.duration = start.elapsed();
        info!(
            "Pass complete in {:.2?}: {} archive(s), {} accepted, {} rejected, {} extracted, {} skipped, {} error(s)",
            summary.duration,
            summary.archives,
            summary.accepted,
            summary.rejected,
            summary.extracted,
            summary.skipped,
            summary.errors
        );
        Ok(summary)
    }

    /// Load the finalized catalog for display.
    pub fn load_catalog(&self) -> Result<Catalog> {
        Catalog::load(
            &self.config.good_output_path(),
            &self.cache,
            &self.config.placeholder_path(),
        )
    }
}

/// Handle to a pass running on a background thread.
pub struct PassHandle {
    /// `ScanStarted`, optionally `NewArchives`, then `ScanComplete` or `PassFailed`.
    pub events_rx: Receiver<PipelineEvent>,
    _thread: Option<thread::JoinHandle<()>>,
}

/// Run a single pass on a background thread, reporting through a channel.
pub fn start_pass(pipeline: Arc<Pipeline>, full: bool) -> std::io::Result<PassHandle> {
    let (events_tx, events_rx) = crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY);
    let thread = thread::Builder::new()
        .name("modsleuth-pass".into())
        .spawn(move || {
            let _ = events_tx.send(PipelineEvent::ScanStarted { root: None });
            for event in pass_events(pipeline.run_pass(full)) {
                let _ = events_tx.send(event);
            }
        })?;
    Ok(PassHandle {
        events_rx,
        _thread: Some(thread),
    })
}

/// Events announcing a finished pass.
pub(crate) fn pass_events(outcome: Result<PassSummary>) -> Vec<PipelineEvent> {
    match outcome {
        Ok(summary) => {
            let mut events = Vec::with_capacity(2);
            if !summary.new_archives.is_empty() {
                events.push(PipelineEvent::NewArchives(summary.new_archives.clone()));
            }
            events.push(PipelineEvent::ScanComplete(summary));
            events
        }
        Err(err) => {
            warn!("Pass failed: {err}");
            vec![PipelineEvent::PassFailed(err.to_string())]
        }
    }
}
