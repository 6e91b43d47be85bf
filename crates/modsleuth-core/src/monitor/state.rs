/// Persisted watcher state — the archive set seen by the last completed pass.
///
/// ```text
/// [root:d:/mods]
/// d:/mods/cars.zip=1712345678.25
/// d:/mods/repo/vanilla.zip=1712345000
/// [reserved]
/// pickup=1700000000
/// ```
///
/// Keys are normalized paths (lowercase, `/` separators); values are
/// modification times in seconds. Only the coordinating thread writes it,
/// after a pass completes.
use crate::error::{PipelineError, Result};
use crate::fsio;
use crate::reserved::ReservedNameSet;
use crate::scanner::LocatedArchive;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::warn;

const ROOT_SECTION_PREFIX: &str = "root:";
const RESERVED_SECTION: &str = "reserved";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchState {
    roots: BTreeMap<String, BTreeMap<String, f64>>,
    reserved: BTreeMap<String, f64>,
}

/// How the current archive set differs from the recorded one. Each list
/// holds normalized keys, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

impl ArchiveDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

impl WatchState {
    /// Load from disk. A missing file is an empty state; unreadable lines
    /// are logged and skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(PipelineError::io(path, e)),
        };
        let (state, errors) = Self::parse(&String::from_utf8_lossy(&bytes));
        for err in errors {
            warn!("{}: {err}", path.display());
        }
        Ok(state)
    }

    pub fn parse(text: &str) -> (Self, Vec<PipelineError>) {
        enum Section {
            None,
            Root(String),
            Reserved,
        }

        let mut state = Self::default();
        let mut errors = Vec::new();
        let mut section = Section::None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = if let Some(root) = name.strip_prefix(ROOT_SECTION_PREFIX) {
                    let root = root.to_string();
                    state.roots.entry(root.clone()).or_default();
                    Section::Root(root)
                } else if name == RESERVED_SECTION {
                    Section::Reserved
                } else {
                    errors.push(PipelineError::MalformedManifestLine {
                        line: idx + 1,
                        text: line.to_string(),
                    });
                    Section::None
                };
                continue;
            }

            let parsed = line
                .rsplit_once('=')
                .and_then(|(k, v)| Some((k.trim(), v.trim().parse::<f64>().ok()?)));
            let target = match &section {
                Section::Root(root) => state.roots.get_mut(root),
                Section::Reserved => Some(&mut state.reserved),
                Section::None => None,
            };
            match (parsed, target) {
                (Some((key, ts)), Some(map)) if !key.is_empty() => {
                    map.insert(key.to_string(), ts);
                }
                _ => errors.push(PipelineError::MalformedManifestLine {
                    line: idx + 1,
                    text: line.to_string(),
                }),
            }
        }
        (state, errors)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (root, archives) in &self.roots {
            let _ = writeln!(out, "[{ROOT_SECTION_PREFIX}{root}]");
            for (key, ts) in archives {
                let _ = writeln!(out, "{key}={ts}");
            }
        }
        let _ = writeln!(out, "[{RESERVED_SECTION}]");
        for (name, ts) in &self.reserved {
            let _ = writeln!(out, "{name}={ts}");
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fsio::write_atomic(path, self.render().as_bytes())
    }

    /// `true` before the first pass has ever been recorded.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.reserved.is_empty()
    }

    /// Every recorded archive across all roots.
    pub fn known_archives(&self) -> BTreeMap<&str, f64> {
        self.roots
            .values()
            .flat_map(|m| m.iter().map(|(k, v)| (k.as_str(), *v)))
            .collect()
    }

    pub fn root(&self, root_key: &str) -> Option<&BTreeMap<String, f64>> {
        self.roots.get(root_key)
    }

    /// Replace the recorded roots with exactly these.
    pub fn set_roots(&mut self, roots: BTreeMap<String, BTreeMap<String, f64>>) {
        self.roots = roots;
    }

    pub fn set_reserved(&mut self, reserved: &ReservedNameSet) {
        self.reserved = reserved.entries().clone();
    }

    pub fn reserved_names(&self) -> BTreeSet<String> {
        self.reserved.keys().cloned().collect()
    }

    /// Classify `current` against the recorded archive set.
    pub fn diff(&self, current: &BTreeMap<String, LocatedArchive>) -> ArchiveDiff {
        let known = self.known_archives();
        let mut diff = ArchiveDiff::default();
        for (key, archive) in current {
            match known.get(key.as_str()) {
                None => diff.added.push(key.clone()),
                Some(ts) if *ts != archive.modified => diff.modified.push(key.clone()),
                Some(_) => {}
            }
        }
        diff.removed = known
            .keys()
            .filter(|k| !current.contains_key(**k))
            .map(|k| k.to_string())
            .collect();
        diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn located(modified: f64) -> LocatedArchive {
        LocatedArchive {
            path: PathBuf::from("unused"),
            modified,
        }
    }

    fn sample() -> WatchState {
        let mut state = WatchState::default();
        let mut root = BTreeMap::new();
        root.insert("d:/mods/cars.zip".to_string(), 1712345678.25);
        root.insert("d:/mods/old.zip".to_string(), 10.0);
        state.set_roots(BTreeMap::from([("d:/mods".to_string(), root)]));
        state.set_reserved(&ReservedNameSet::from_names(["pickup"]));
        state
    }

    #[test]
    fn render_parse_round_trip() {
        let state = sample();
        let text = state.render();
        assert!(text.contains("[root:d:/mods]\n"));
        assert!(text.contains("d:/mods/cars.zip=1712345678.25\n"));
        assert!(text.contains("[reserved]\npickup=0\n"));
        let (parsed, errors) = WatchState::parse(&text);
        assert!(errors.is_empty());
        assert_eq!(parsed, state);
    }

    #[test]
    fn diff_classifies_added_removed_modified() {
        let state = sample();
        let current = BTreeMap::from([
            ("d:/mods/cars.zip".to_string(), located(1712345999.0)),
            ("d:/mods/new.zip".to_string(), located(5.0)),
        ]);
        let diff = state.diff(&current);
        assert_eq!(diff.added, ["d:/mods/new.zip"]);
        assert_eq!(diff.removed, ["d:/mods/old.zip"]);
        assert_eq!(diff.modified, ["d:/mods/cars.zip"]);
    }

    #[test]
    fn unchanged_set_has_empty_diff() {
        let state = sample();
        let current = BTreeMap::from([
            ("d:/mods/cars.zip".to_string(), located(1712345678.25)),
            ("d:/mods/old.zip".to_string(), located(10.0)),
        ]);
        assert!(state.diff(&current).is_empty());
    }

    #[test]
    fn garbage_lines_are_reported_not_fatal() {
        let (state, errors) =
            WatchState::parse("orphan=1\n[root:x]\nx/a.zip=notanumber\nx/b.zip=2\n[weird]\n");
        assert_eq!(errors.len(), 3);
        assert_eq!(state.root("x").unwrap().len(), 1);
    }

    #[test]
    fn missing_file_loads_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = WatchState::load(&tmp.path().join("WatcherOutput.txt")).unwrap();
        assert!(state.is_empty());
    }
}
