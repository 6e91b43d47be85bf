/// Derived cache directory — a flat folder of extracted metadata and
/// normalized preview images, named by [`crate::model::naming`].
use crate::error::{PipelineError, Result};
use crate::fsio;
use crate::model::archive::PREVIEW_EXTENSIONS;
use crate::model::naming;
use image::{ImageFormat, Rgb, RgbImage};
use std::collections::BTreeSet;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fill colour of the generated "missing picture" placeholder.
const PLACEHOLDER_GREY: Rgb<u8> = Rgb([96, 96, 96]);

#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory. Failure is fatal to the pass.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|source| PipelineError::CacheUncreatable {
            path: self.root.clone(),
            source,
        })
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.path_of(file_name).is_file()
    }

    /// Existing preview for `base` under any image extension.
    pub fn existing_preview(&self, base: &str) -> Option<PathBuf> {
        PREVIEW_EXTENSIONS
            .iter()
            .map(|ext| self.path_of(&format!("{base}.{ext}")))
            .find(|p| p.is_file())
    }

    /// Point-in-time listing of the cache, used for resolution.
    pub fn snapshot(&self) -> Result<CacheIndex> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CacheIndex::default());
            }
            Err(e) => return Err(PipelineError::io(&self.root, e)),
        };
        let names = read_dir
            .flatten()
            .filter(|e| e.file_type().is_ok_and(|t| t.is_file()))
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| !n.ends_with(".tmp") && !n.ends_with(".canonical.png"))
            .collect();
        Ok(CacheIndex { names })
    }

    /// Delete every file derived from `archive_id`. Returns the number removed.
    pub fn purge_archive(&self, archive_id: &str) -> Result<usize> {
        let index = self.snapshot()?;
        let mut removed = 0;
        for name in index
            .names()
            .filter(|n| naming::derived_from_archive(n, archive_id))
        {
            if fsio::remove_if_exists(&self.path_of(name))? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Purged {removed} cached file(s) derived from {archive_id}");
        }
        Ok(removed)
    }

    /// Delete every derived file, keeping the directory itself.
    pub fn clear(&self) -> Result<usize> {
        let index = self.snapshot()?;
        let mut removed = 0;
        for name in index.names() {
            if fsio::remove_if_exists(&self.path_of(name))? {
                removed += 1;
            }
        }
        info!("Cleared {removed} cached file(s) from {}", self.root.display());
        Ok(removed)
    }
}

/// Sorted set of cache file names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheIndex {
    names: BTreeSet<String>,
}

impl CacheIndex {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.names.contains(file_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// First of `<base>.jpg`, `<base>.jpeg`, `<base>.png` present.
    pub fn preview_for(&self, base: &str) -> Option<String> {
        PREVIEW_EXTENSIONS
            .iter()
            .map(|ext| format!("{base}.{ext}"))
            .find(|n| self.names.contains(n))
    }

    /// Lexicographically first folder-level metadata file for `lower_name`,
    /// from any archive.
    pub fn first_metadata_for(&self, lower_name: &str) -> Option<&str> {
        let prefix = naming::metadata_search_prefix(lower_name);
        self.names
            .range(prefix.clone()..)
            .take_while(|n| n.starts_with(&prefix))
            .map(String::as_str)
            .find(|n| naming::is_folder_metadata(n))
    }
}

/// Write the solid grey placeholder to `path` unless it already exists.
/// Returns `true` when a file was written.
pub fn ensure_placeholder(path: &Path, width: u32, height: u32) -> Result<bool> {
    if path.is_file() {
        return Ok(false);
    }
    let img = RgbImage::from_pixel(width, height, PLACEHOLDER_GREY);
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|source| PipelineError::AssetProcessing {
            archive: String::new(),
            entry: path.display().to_string(),
            source,
        })?;
    fsio::write_atomic(path, buf.get_ref())?;
    info!("Generated placeholder preview at {}", path.display());
    Ok(true)
}
