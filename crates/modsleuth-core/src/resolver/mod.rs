/// Conflict & fallback resolution.
///
/// Resolution happens in two steps around extraction:
///
/// 1. [`plan`] turns the ordered archive records into candidate entries and
///    rejections. Reserved names are lowercased here; nothing depends on the
///    cache yet.
/// 2. [`finalize`] runs after extraction, against a snapshot of the cache.
///    Pass 1 records, per lowercase folder name, the casing and metadata file
///    of the first candidate that owns folder-level metadata. Pass 2 links
///    every candidate without metadata of its own to that file (a `USE`
///    link) and adopts its casing; failing that, to the first cached
///    metadata file for the name. Reserved lowering is applied last.
///
/// Both steps are pure functions of their inputs, so an unchanged archive
/// set and cache always render to identical bytes.
pub mod render;

use crate::extract::CacheIndex;
use crate::model::{
    naming, ArchiveRecord, NamingConflict, RejectReason, Rejection, Resolution, ResolvedEntry,
};
use crate::reserved::ReservedNameSet;
use compact_str::CompactString;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub use render::{render_bad, render_conflicts, render_good};

/// Candidates and rejections before any cache lookups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub candidates: Vec<ResolvedEntry>,
    pub rejected: Vec<Rejection>,
    pub conflicts: Vec<NamingConflict>,
}

impl Plan {
    /// The plan viewed as a resolution: every preview is the placeholder and
    /// no metadata is linked.
    pub fn as_resolution(&self) -> Resolution {
        Resolution {
            accepted: self.candidates.clone(),
            rejected: self.rejected.clone(),
            conflicts: self.conflicts.clone(),
        }
    }
}

/// Build candidates and rejections from records in priority order.
pub fn plan(records: &[ArchiveRecord], reserved: &ReservedNameSet, placeholder: &Path) -> Plan {
    let mut out = Plan::default();
    // lowercase name → (raw casing, archive) of its first folder.
    let mut first_seen: HashMap<&str, (&CompactString, &CompactString)> = HashMap::new();
    for record in records {
        if record.folders.is_empty() {
            out.rejected.push(Rejection {
                reason: RejectReason::NoVehicleFolders,
                archive_id: record.archive_id.clone(),
                folder: None,
            });
            continue;
        }

        for folder in &record.folders {
            let is_reserved = reserved.contains(&folder.lower_name);
            match first_seen.get(folder.lower_name.as_str()).copied() {
                None => {
                    first_seen.insert(
                        folder.lower_name.as_str(),
                        (&folder.raw_name, &record.archive_id),
                    );
                }
                Some((first_raw, first_archive))
                    if !is_reserved
                        && *first_raw != folder.raw_name
                        && *first_archive != record.archive_id =>
                {
                    warn!(
                        "Naming conflict: {} has \"{}\" but {} already has \"{}\"",
                        record.archive_id, folder.raw_name, first_archive, first_raw
                    );
                    out.conflicts.push(NamingConflict {
                        lower_name: folder.lower_name.clone(),
                        first_raw: first_raw.clone(),
                        first_archive: first_archive.clone(),
                        raw_name: folder.raw_name.clone(),
                        archive_id: record.archive_id.clone(),
                    });
                }
                Some(_) => {}
            }
            let display = if is_reserved {
                folder.lower_name.clone()
            } else {
                folder.raw_name.clone()
            };

            for config in &folder.config_files {
                out.candidates.push(ResolvedEntry {
                    archive_id: record.archive_id.clone(),
                    raw_folder: folder.raw_name.clone(),
                    lower_name: folder.lower_name.clone(),
                    display_name: display.clone(),
                    spawn_arg: display.clone(),
                    config_file: config.file_name.clone(),
                    preview_internal: config.preview_image_path.clone(),
                    extra_previews: config.extra_preview_paths.clone(),
                    preview_asset_path: placeholder.to_path_buf(),
                    metadata_ref: None,
                    use_fallback_from: None,
                });
            }

            if is_reserved {
                out.rejected.push(Rejection {
                    reason: RejectReason::ReservedName,
                    archive_id: record.archive_id.clone(),
                    folder: Some(folder.lower_name.clone()),
                });
            } else if folder.config_files.is_empty() {
                out.rejected.push(Rejection {
                    reason: RejectReason::NoConfigFiles,
                    archive_id: record.archive_id.clone(),
                    folder: Some(folder.raw_name.clone()),
                });
            }
        }
    }
    debug!(
        "Planned {} candidate(s), {} rejection(s), {} naming conflict(s)",
        out.candidates.len(),
        out.rejected.len(),
        out.conflicts.len()
    );
    out
}

/// Attach metadata, fallback links and previews using the cache snapshot.
pub fn finalize(
    plan: &Plan,
    reserved: &ReservedNameSet,
    cache: &CacheIndex,
    cache_root: &Path,
    placeholder: &Path,
) -> Resolution {
    // Pass 1: lowercase name → (casing, metadata file) of the first owner.
    let mut canonical: HashMap<&str, (CompactString, String)> = HashMap::new();
    for entry in &plan.candidates {
        let own = naming::metadata_name(&entry.lower_name, &entry.archive_id);
        if cache.contains(&own) && !canonical.contains_key(entry.lower_name.as_str()) {
            canonical.insert(entry.lower_name.as_str(), (entry.display_name.clone(), own));
        }
    }

    // Pass 2.
    let mut accepted = Vec::with_capacity(plan.candidates.len());
    for candidate in &plan.candidates {
        let lower = candidate.lower_name.as_str();
        let archive = candidate.archive_id.as_str();
        let stem = candidate.config_stem();
        let own = naming::metadata_name(lower, archive);
        let variant = naming::variant_metadata_name(lower, archive, stem);

        let mut entry = candidate.clone();
        if cache.contains(&own) {
            let file = if cache.contains(&variant) { variant } else { own };
            entry.metadata_ref = Some(cache_root.join(file));
        } else if cache.contains(&variant) {
            entry.metadata_ref = Some(cache_root.join(variant));
        } else if let Some((casing, file)) = canonical.get(lower) {
            entry.display_name = casing.clone();
            entry.metadata_ref = Some(cache_root.join(file));
            entry.use_fallback_from = Some(file.clone());
        } else if let Some(file) = cache.first_metadata_for(lower) {
            entry.metadata_ref = Some(cache_root.join(file));
            entry.use_fallback_from = Some(file.to_string());
        }

        if reserved.contains(lower) {
            entry.display_name = candidate.lower_name.clone();
        }
        entry.spawn_arg = entry.display_name.clone();

        entry.preview_asset_path = cache
            .preview_for(&naming::preview_base(lower, archive, stem))
            .map(|name| cache_root.join(name))
            .unwrap_or_else(|| placeholder.to_path_buf());

        accepted.push(entry);
    }

    let resolution = Resolution {
        accepted,
        rejected: plan.rejected.clone(),
        conflicts: plan.conflicts.clone(),
    };
    debug!(
        "Finalized {} entries ({} fallback link(s))",
        resolution.accepted.len(),
        resolution.fallback_links()
    );
    resolution
}

/// [`plan`] followed by [`finalize`], for callers that skip extraction.
pub fn resolve(
    records: &[ArchiveRecord],
    reserved: &ReservedNameSet,
    cache: &CacheIndex,
    cache_root: &Path,
    placeholder: &Path,
) -> Resolution {
    let planned = plan(records, reserved, placeholder);
    finalize(&planned, reserved, cache, cache_root, placeholder)
}

/// Preview paths of a resolution that do not exist on disk.
pub fn missing_previews(resolution: &Resolution) -> Vec<PathBuf> {
    resolution
        .accepted
        .iter()
        .map(|e| e.preview_asset_path.clone())
        .filter(|p| !p.is_file())
        .collect()
}
