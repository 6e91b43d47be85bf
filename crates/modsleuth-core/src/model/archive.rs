/// Structural view of one archive: which vehicle folders it defines, which
/// configurations each folder carries, and which preview / metadata files
/// sit next to them.
///
/// Built from a flat entry list, either read straight from the archive or
/// from the text manifest, so both paths classify entries identically.
use compact_str::CompactString;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level directory every vehicle folder lives under.
pub const VEHICLES_DIR: &str = "vehicles";

/// Configuration descriptor extension (without the dot).
pub const CONFIG_EXTENSION: &str = "pc";

/// Folder-level metadata file name.
pub const METADATA_FILE: &str = "info.json";

/// Preview image extensions, in lookup order.
pub const PREVIEW_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// One `.pc` configuration inside a vehicle folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// File name including extension, e.g. `sport.pc`.
    pub file_name: String,
    /// Exact internal path of the first `<stem>.{jpg,jpeg,png}` present.
    pub preview_image_path: Option<String>,
    /// Further previews for the same stem, in lookup order.
    pub extra_preview_paths: Vec<String>,
    /// Exact internal path of `info_<stem>.json`, if the archive ships one.
    pub metadata_path: Option<String>,
}

impl ConfigFile {
    /// File name with the `.pc` extension stripped (case-insensitively).
    pub fn stem(&self) -> &str {
        strip_extension(&self.file_name, CONFIG_EXTENSION)
    }

    /// Extension of the preview image, as written in the archive.
    pub fn preview_extension(&self) -> Option<&str> {
        self.preview_image_path
            .as_deref()
            .and_then(|p| p.rsplit_once('.'))
            .map(|(_, ext)| ext)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleFolder {
    /// Casing of the first entry seen for this folder.
    pub raw_name: CompactString,
    /// Conflict identity across archives.
    pub lower_name: CompactString,
    pub config_files: Vec<ConfigFile>,
    /// Exact internal path of the folder-level `info.json`.
    pub metadata_path: Option<String>,
}

impl VehicleFolder {
    fn new(raw_name: &str) -> Self {
        Self {
            raw_name: CompactString::new(raw_name),
            lower_name: CompactString::new(raw_name.to_lowercase()),
            config_files: Vec::new(),
            metadata_path: None,
        }
    }

    /// A folder defines a complete base vehicle when it has at least one
    /// configuration and its own `info.json`.
    pub fn is_complete(&self) -> bool {
        !self.config_files.is_empty() && self.metadata_path.is_some()
    }
}

/// Everything the pipeline knows about one archive for the current pass.
#[derive(Debug, Clone)]
pub struct ArchiveRecord {
    pub path: PathBuf,
    /// Archive file name, e.g. `cars.zip`. Used in every derived cache name.
    pub archive_id: CompactString,
    /// Modification time in seconds since the epoch, when known.
    pub modified: Option<f64>,
    /// Internal entries with `/` separators, in archive order.
    pub entries: Vec<String>,
    /// Vehicle folders in first-seen order; lower names are unique.
    pub folders: Vec<VehicleFolder>,
    /// Number of complete folders.
    pub priority_score: u32,
}

impl ArchiveRecord {
    pub fn new(path: impl Into<PathBuf>, modified: Option<f64>, entries: Vec<String>) -> Self {
        let path = path.into();
        let archive_id = archive_id_of(&path);
        let folders = classify_entries(&entries);
        let priority_score = folders.iter().filter(|f| f.is_complete()).count() as u32;
        Self {
            path,
            archive_id,
            modified,
            entries,
            folders,
            priority_score,
        }
    }

    /// Record for an archive that could not be opened: no entries, no folders.
    pub fn unreadable(path: impl Into<PathBuf>, modified: Option<f64>) -> Self {
        Self::new(path, modified, Vec::new())
    }

    pub fn is_prioritized(&self) -> bool {
        self.priority_score > 0
    }

    pub fn folder(&self, lower_name: &str) -> Option<&VehicleFolder> {
        self.folders.iter().find(|f| f.lower_name == lower_name)
    }
}

/// Archive file name, accepting either separator.
pub fn archive_id_of(path: &Path) -> CompactString {
    let text = path.to_string_lossy();
    let name = text.rsplit(['/', '\\']).next().unwrap_or(&text);
    CompactString::new(name)
}

/// Order records prioritized-first, preserving relative order otherwise.
pub fn order_by_priority(records: &mut [ArchiveRecord]) {
    records.sort_by_key(|r| !r.is_prioritized());
}

/// Group entries under `vehicles/<folder>/` into vehicle folders.
///
/// Only direct children of a folder count as configs or metadata; deeper
/// entries still register the folder itself.
pub fn classify_entries(entries: &[String]) -> Vec<VehicleFolder> {
    let present: HashSet<&str> = entries.iter().map(String::as_str).collect();
    let mut folders: Vec<VehicleFolder> = Vec::new();

    for entry in entries {
        let Some(rest) = strip_vehicles_prefix(entry) else {
            continue;
        };
        let mut parts = rest.split('/');
        let raw_folder = parts.next().unwrap_or_default();
        let Some(file_name) = parts.next() else {
            // `vehicles/<name>` with no trailing separator is a file, not a folder.
            continue;
        };
        if raw_folder.is_empty() {
            continue;
        }
        let nested = parts.next().is_some();

        let lower = raw_folder.to_lowercase();
        let idx = match folders.iter().position(|f| f.lower_name == lower) {
            Some(idx) => idx,
            None => {
                folders.push(VehicleFolder::new(raw_folder));
                folders.len() - 1
            }
        };
        if nested || file_name.is_empty() {
            continue;
        }

        let folder = &mut folders[idx];
        let lower_file = file_name.to_lowercase();
        if has_extension(&lower_file, CONFIG_EXTENSION) {
            let parent = &entry[..entry.len() - file_name.len()];
            let stem = strip_extension(file_name, CONFIG_EXTENSION);
            let mut previews = PREVIEW_EXTENSIONS
                .iter()
                .map(|ext| format!("{parent}{stem}.{ext}"))
                .filter(|candidate| present.contains(candidate.as_str()));
            let preview_image_path = previews.next();
            let extra_preview_paths = previews.collect();
            let variant = format!("{parent}info_{stem}.json");
            let metadata_path = present.contains(variant.as_str()).then_some(variant);
            folder.config_files.push(ConfigFile {
                file_name: file_name.to_string(),
                preview_image_path,
                extra_preview_paths,
                metadata_path,
            });
        } else if lower_file == METADATA_FILE && folder.metadata_path.is_none() {
            folder.metadata_path = Some(entry.clone());
        }
    }
    folders
}

fn strip_vehicles_prefix(entry: &str) -> Option<&str> {
    let prefix_len = VEHICLES_DIR.len() + 1;
    let head = entry.as_bytes().get(..prefix_len)?;
    // An ASCII match guarantees `prefix_len` is a char boundary.
    if head[..VEHICLES_DIR.len()].eq_ignore_ascii_case(VEHICLES_DIR.as_bytes())
        && head[VEHICLES_DIR.len()] == b'/'
    {
        entry.get(prefix_len..)
    } else {
        None
    }
}

fn has_extension(lower_name: &str, ext: &str) -> bool {
    lower_name
        .rsplit_once('.')
        .is_some_and(|(stem, e)| !stem.is_empty() && e == ext)
}

fn strip_extension<'a>(name: &'a str, ext: &str) -> &'a str {
    match name.rsplit_once('.') {
        Some((stem, e)) if e.eq_ignore_ascii_case(ext) => stem,
        _ => name,
    }
}
