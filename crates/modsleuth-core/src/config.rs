/// Pipeline configuration, loaded from `modsleuth.toml`.
///
/// Every field has a default, so an empty (or absent) file yields a usable
/// configuration rooted at `./data`.
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Conventional configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "modsleuth.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directories searched (recursively) for archives.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Directory holding the manifest, catalog outputs and watcher state.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Flat directory receiving extracted metadata and preview images.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Text file whose first line names the directory of stock archives.
    #[serde(default = "default_reserved_source")]
    pub reserved_source: PathBuf,

    /// Extraction worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Archive file extension, matched case-insensitively, without the dot.
    #[serde(default = "default_archive_extension")]
    pub archive_extension: String,

    #[serde(default = "default_preview_width")]
    pub preview_width: u32,

    #[serde(default = "default_preview_height")]
    pub preview_height: u32,

    /// Attempts made to read the input manifest before giving up.
    #[serde(default = "default_read_retry_attempts")]
    pub read_retry_attempts: u32,

    /// Initial back-off between manifest read attempts; doubles each retry.
    #[serde(default = "default_read_retry_backoff_ms")]
    pub read_retry_backoff_ms: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data").join("cache")
}

fn default_reserved_source() -> PathBuf {
    PathBuf::from("data").join("beamng_VANILLA_vehicles_folder.txt")
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_debounce_ms() -> u64 {
    3_000
}

fn default_archive_extension() -> String {
    "zip".to_string()
}

fn default_preview_width() -> u32 {
    200
}

fn default_preview_height() -> u32 {
    110
}

fn default_read_retry_attempts() -> u32 {
    3
}

fn default_read_retry_backoff_ms() -> u64 {
    250
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            data_dir: default_data_dir(),
            cache_dir: default_cache_dir(),
            reserved_source: default_reserved_source(),
            workers: default_workers(),
            debounce_ms: default_debounce_ms(),
            archive_extension: default_archive_extension(),
            preview_width: default_preview_width(),
            preview_height: default_preview_height(),
            read_retry_attempts: default_read_retry_attempts(),
            read_retry_backoff_ms: default_read_retry_backoff_ms(),
        }
    }
}

impl Config {
    /// Configuration rooted at `data_dir`, with the cache directory inside it.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            cache_dir: data_dir.join("cache"),
            reserved_source: data_dir.join("beamng_VANILLA_vehicles_folder.txt"),
            data_dir,
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| PipelineError::Config(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| PipelineError::io(path, e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(PipelineError::Config("workers must be at least 1".into()));
        }
        if self.preview_width == 0 || self.preview_height == 0 {
            return Err(PipelineError::Config(format!(
                "preview size must be non-zero, got {}x{}",
                self.preview_width, self.preview_height
            )));
        }
        if self.archive_extension.trim_start_matches('.').is_empty() {
            return Err(PipelineError::Config("archive_extension is empty".into()));
        }
        if self.read_retry_attempts == 0 {
            return Err(PipelineError::Config(
                "read_retry_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Extension without a leading dot, lowercased.
    pub fn extension(&self) -> String {
        self.archive_extension
            .trim_start_matches('.')
            .to_ascii_lowercase()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn read_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.read_retry_backoff_ms)
    }

    // ── Derived paths ───────────────────────────────────────────────────

    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("zip_structure.txt")
    }

    pub fn good_output_path(&self) -> PathBuf {
        self.data_dir.join("outputGOOD.txt")
    }

    /// Snapshot of the accepted list before metadata fallback is applied.
    pub fn original_output_path(&self) -> PathBuf {
        self.data_dir.join("outputGOOD (Original).txt")
    }

    pub fn bad_output_path(&self) -> PathBuf {
        self.data_dir.join("outputBAD.txt")
    }

    pub fn new_archives_path(&self) -> PathBuf {
        self.data_dir.join("NewMods.txt")
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join("WatcherOutput.txt")
    }

    pub fn placeholder_path(&self) -> PathBuf {
        self.data_dir.join("MissingZipConfigPic.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(config.workers > 0);
        assert_eq!(config.debounce_ms, 3_000);
        assert_eq!(config.archive_extension, "zip");
        assert_eq!((config.preview_width, config.preview_height), (200, 110));
        assert_eq!(config.read_retry_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.roots.is_empty());
    }

    #[test]
    fn save_then_load_preserves_fields() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);

        let mut config = Config::with_data_dir(tmp.path().join("data"));
        config.roots = vec![tmp.path().join("mods")];
        config.workers = 3;
        config.debounce_ms = 500;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.roots, config.roots);
        assert_eq!(loaded.workers, 3);
        assert_eq!(loaded.debounce_ms, 500);
        assert_eq!(loaded.cache_dir, tmp.path().join("data").join("cache"));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = toml::from_str::<Config>("workers = 0")
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn extension_is_normalized() {
        let config = Config {
            archive_extension: ".ZIP".into(),
            ..Config::default()
        };
        assert_eq!(config.extension(), "zip");
    }
}
