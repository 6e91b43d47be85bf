/// Archive locator — finds candidate archives under the configured roots.
///
/// Uses `jwalk`'s rayon-backed parallel traversal. Roots that are missing or
/// unreadable contribute nothing; per-directory read errors are logged at
/// debug level and skipped.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// One archive found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedArchive {
    pub path: PathBuf,
    /// Seconds since the Unix epoch.
    pub modified: f64,
}

/// Canonical key for a path: lowercase with `/` separators, so the same
/// physical file never appears under two keys.
pub fn normalize_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

/// Enumerate every `*.<extension>` file beneath `root`, keyed by
/// [`normalize_key`].
pub fn locate_in_root(root: &Path, extension: &str) -> BTreeMap<String, LocatedArchive> {
    let mut found = BTreeMap::new();
    if !root.is_dir() {
        warn!("Archive root {} is missing or not a directory", root.display());
        return found;
    }

    let walker = jwalk::WalkDir::new(root)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .parallelism(jwalk::Parallelism::RayonNewPool(num_cpus::get()));

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                debug!("Skipping unreadable path under {}: {err}", root.display());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if !has_extension(&entry.file_name().to_string_lossy(), extension) {
            continue;
        }

        let path = entry.path();
        let modified = match std::fs::symlink_metadata(&path) {
            Ok(meta) => meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
            Err(err) => {
                debug!("No metadata for {}: {err}", path.display());
                continue;
            }
        };
        found.insert(normalize_key(&path), LocatedArchive { path, modified });
    }
    found
}

/// Enumerate archives across several roots. Later roots never replace an
/// archive already found under an earlier one.
pub fn locate_archives(roots: &[PathBuf], extension: &str) -> BTreeMap<String, LocatedArchive> {
    let mut all = BTreeMap::new();
    for root in roots {
        for (key, archive) in locate_in_root(root, extension) {
            all.entry(key).or_insert(archive);
        }
    }
    debug!("Located {} archive(s) across {} root(s)", all.len(), roots.len());
    all
}

fn has_extension(file_name: &str, extension: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && ext.eq_ignore_ascii_case(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_archives_recursively_case_insensitively() {
        let tmp = tempfile::TempDir::new().unwrap();
        let nested = tmp.path().join("repo").join("deep");
        fs::create_dir_all(&nested).unwrap();
        fs::write(tmp.path().join("a.zip"), b"x").unwrap();
        fs::write(nested.join("B.ZIP"), b"x").unwrap();
        fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        let found = locate_in_root(tmp.path(), "zip");
        assert_eq!(found.len(), 2);
        for (key, archive) in &found {
            assert_eq!(key, &key.to_lowercase());
            assert!(!key.contains('\\'));
            assert!(archive.modified > 0.0);
        }
    }

    #[test]
    fn missing_root_yields_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let found = locate_archives(&[tmp.path().join("does-not-exist")], "zip");
        assert!(found.is_empty());
    }

    #[test]
    fn normalize_key_unifies_case_and_separators() {
        assert_eq!(
            normalize_key(Path::new(r"C:\Mods\Repo\Cars.ZIP")),
            "c:/mods/repo/cars.zip"
        );
    }

    #[test]
    fn bare_extension_file_is_not_an_archive() {
        assert!(!has_extension(".zip", "zip"));
        assert!(has_extension("x.Zip", "zip"));
    }
}
