/// Asset extraction — copies metadata and normalized preview images out of
/// archives into the derived cache.
///
/// Work is grouped into one [`ExtractionJob`] per archive. Jobs run on a
/// bounded `rayon` pool; a job opens its archive once and handles its tasks
/// sequentially. Workers share nothing but the cache directory, and every
/// task writes a distinct derived file name.
///
/// # Skip rule
///
/// Each task is checked on its own: a metadata target is skipped when its
/// exact name exists, a preview when its base name exists under any image
/// extension. An archive whose tasks are all satisfied is never opened.
pub mod cache;

use crate::error::{PipelineError, Result};
use crate::fsio;
use crate::model::{naming, ArchiveRecord};
use crate::scanner::indexer::open_archive;
use crate::scanner::normalize_key;
pub use cache::{ensure_placeholder, CacheDir, CacheIndex};

use compact_str::CompactString;
use image::imageops::FilterType;
use image::ImageFormat;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info};

/// Upper bound on the buffer reserved up front for one entry. The declared
/// size comes from the archive header and is not trusted beyond this.
const MAX_PREALLOC_BYTES: u64 = 64 << 20;

/// What a single task produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionTask {
    /// Copy `internal_path` verbatim to the cache file `target`.
    Metadata { internal_path: String, target: String },
    /// Decode, resize and store `internal_path` as `<base>.<extension>`.
    Preview {
        internal_path: String,
        base: String,
        extension: String,
    },
}

impl ExtractionTask {
    fn internal_path(&self) -> &str {
        match self {
            Self::Metadata { internal_path, .. } | Self::Preview { internal_path, .. } => {
                internal_path
            }
        }
    }

    fn is_satisfied(&self, cache: &CacheDir) -> bool {
        match self {
            Self::Metadata { target, .. } => cache.contains(target),
            Self::Preview { base, .. } => cache.existing_preview(base).is_some(),
        }
    }
}

/// All tasks for one archive.
#[derive(Debug, Clone)]
pub struct ExtractionJob {
    pub archive_id: CompactString,
    pub archive_path: PathBuf,
    pub tasks: Vec<ExtractionTask>,
}

/// Outcome of an extraction batch. Aggregated by the caller.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub extracted: usize,
    pub skipped: usize,
    pub errors: Vec<PipelineError>,
}

impl ExtractionReport {
    fn merge(mut self, other: Self) -> Self {
        self.extracted += other.extracted;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
        self
    }

    fn record_error(&mut self, err: PipelineError) {
        error!(
            "[{}] {err}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        self.errors.push(err);
    }
}

/// Canonical preview size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSize {
    pub width: u32,
    pub height: u32,
}

impl Default for PreviewSize {
    fn default() -> Self {
        Self {
            width: 200,
            height: 110,
        }
    }
}

/// Build one job per archive, in record (priority) order.
///
/// Every folder that contributes accepted entries, i.e. has at least one
/// config, is extracted. `only` restricts the jobs to archives whose
/// normalized path key is in the set.
pub fn build_jobs(records: &[ArchiveRecord], only: Option<&HashSet<String>>) -> Vec<ExtractionJob> {
    let mut jobs = Vec::new();
    for record in records {
        if let Some(keys) = only {
            if !keys.contains(&normalize_key(&record.path)) {
                continue;
            }
        }
        let id = record.archive_id.as_str();
        let mut tasks = Vec::new();
        for folder in record.folders.iter().filter(|f| !f.config_files.is_empty()) {
            let lower = folder.lower_name.as_str();
            if let Some(path) = &folder.metadata_path {
                tasks.push(ExtractionTask::Metadata {
                    internal_path: path.clone(),
                    target: naming::metadata_name(lower, id),
                });
            }
            for config in &folder.config_files {
                if let Some(path) = &config.metadata_path {
                    tasks.push(ExtractionTask::Metadata {
                        internal_path: path.clone(),
                        target: naming::variant_metadata_name(lower, id, config.stem()),
                    });
                }
                if let (Some(path), Some(ext)) =
                    (&config.preview_image_path, config.preview_extension())
                {
                    tasks.push(ExtractionTask::Preview {
                        internal_path: path.clone(),
                        base: naming::preview_base(lower, id, config.stem()),
                        extension: ext.to_ascii_lowercase(),
                    });
                }
            }
        }
        if !tasks.is_empty() {
            jobs.push(ExtractionJob {
                archive_id: record.archive_id.clone(),
                archive_path: record.path.clone(),
                tasks,
            });
        }
    }
    jobs
}

/// Run `jobs` on a pool of `workers` threads and wait for all of them.
pub fn run_extraction(
    jobs: &[ExtractionJob],
    cache: &CacheDir,
    workers: usize,
    size: PreviewSize,
) -> ExtractionReport {
    let start = Instant::now();
    let run = || {
        jobs.par_iter()
            .map(|job| run_job(job, cache, size))
            .reduce(ExtractionReport::default, ExtractionReport::merge)
    };

    let report = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("modsleuth-extract-{i}"))
        .build()
    {
        Ok(pool) => pool.install(run),
        Err(e) => {
            error!("Failed to build extraction pool ({e}); extracting on the calling thread");
            jobs.iter()
                .map(|job| run_job(job, cache, size))
                .fold(ExtractionReport::default(), ExtractionReport::merge)
        }
    };

    info!(
        "Extraction finished in {:.2?}: {} extracted, {} skipped, {} error(s) across {} archive(s)",
        start.elapsed(),
        report.extracted,
        report.skipped,
        report.errors.len(),
        jobs.len()
    );
    report
}

/// Process one archive's tasks in order on a single archive handle.
fn run_job(job: &ExtractionJob, cache: &CacheDir, size: PreviewSize) -> ExtractionReport {
    let mut report = ExtractionReport::default();
    let mut pending = Vec::new();
    for task in &job.tasks {
        if task.is_satisfied(cache) {
            report.skipped += 1;
        } else {
            pending.push(task);
        }
    }
    if pending.is_empty() {
        return report;
    }

    let mut archive = match open_archive(&job.archive_path) {
        Ok(a) => a,
        Err(err) => {
            report.record_error(err);
            return report;
        }
    };

    for task in pending {
        let outcome = read_entry(&mut archive, &job.archive_id, task.internal_path())
            .and_then(|bytes| write_task(task, &bytes, &job.archive_id, cache, size));
        match outcome {
            Ok(()) => report.extracted += 1,
            Err(err) => report.record_error(err),
        }
    }
    debug!(
        "{}: {} extracted, {} skipped",
        job.archive_id, report.extracted, report.skipped
    );
    report
}

fn read_entry(
    archive: &mut zip::ZipArchive<File>,
    archive_id: &str,
    internal_path: &str,
) -> Result<Vec<u8>> {
    let mut entry = archive.by_name(internal_path).map_err(|e| match e {
        zip::result::ZipError::FileNotFound => PipelineError::EntryNotFound {
            archive: archive_id.to_string(),
            entry: internal_path.to_string(),
        },
        other => PipelineError::CorruptArchive {
            path: PathBuf::from(archive_id),
            source: other,
        },
    })?;
    let mut bytes = Vec::with_capacity(prealloc_len(entry.size()));
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| PipelineError::io(format!("{archive_id}:{internal_path}"), e))?;
    Ok(bytes)
}

fn prealloc_len(declared: u64) -> usize {
    usize::try_from(declared.min(MAX_PREALLOC_BYTES)).unwrap_or(0)
}

fn write_task(
    task: &ExtractionTask,
    bytes: &[u8],
    archive_id: &str,
    cache: &CacheDir,
    size: PreviewSize,
) -> Result<()> {
    match task {
        ExtractionTask::Metadata { target, .. } => fsio::write_atomic(&cache.path_of(target), bytes),
        ExtractionTask::Preview {
            internal_path,
            base,
            extension,
        } => {
            let asset_err = |source| PipelineError::AssetProcessing {
                archive: archive_id.to_string(),
                entry: internal_path.clone(),
                source,
            };
            let img = image::load_from_memory(bytes).map_err(asset_err)?;
            let resized = img.resize_exact(size.width, size.height, FilterType::Triangle);
            let mut buf = Cursor::new(Vec::new());
            resized
                .write_to(&mut buf, ImageFormat::Png)
                .map_err(asset_err)?;

            // Encode under a temporary name, then rename to the source extension.
            let intermediate =
                fsio::temp_sibling(&cache.path_of(&format!("{base}.canonical.png")));
            fs::write(&intermediate, buf.get_ref())
                .map_err(|e| PipelineError::io(&intermediate, e))?;
            let target = cache.path_of(&format!("{base}.{extension}"));
            if let Err(e) = fs::rename(&intermediate, &target) {
                let _ = fs::remove_file(&intermediate);
                return Err(PipelineError::io(&target, e));
            }
            Ok(())
        }
    }
}
