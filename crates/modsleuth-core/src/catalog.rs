/// Catalog store — reads `outputGOOD.txt` back into browsable entries with
/// their preview image and vehicle metadata resolved against the cache.
///
/// This is the hand-off consumed by a viewer. Metadata lookup order for an
/// entry is: variant file, folder-level file, `USE` link, defaults.
use crate::error::{PipelineError, Result};
use crate::extract::CacheDir;
use crate::model::naming;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static DESCRIPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(.+?)\s+\(package\)\s+-\s+"([^"]+)"\s+\(internal folder name\)\s+-\s+"([^"]*)"\s+\(config picture\)$"#,
    )
    .expect("description pattern is valid")
});

static SPAWN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^core_vehicles\.spawnNewVehicle\("([^"]+)",\s*\{config\s*=\s*'([^']+)'\}\)(?:\s+\(USE\s+([^)]+)\))?$"#,
    )
    .expect("spawn pattern is valid")
});

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma pattern is valid"));

/// Display fields pulled from a vehicle's `info.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleInfo {
    pub name: String,
    pub value: f64,
    /// The whole document, for fields the catalog does not model.
    pub raw: Value,
}

impl VehicleInfo {
    /// Parse metadata JSON, tolerating trailing commas. `Name` defaults to
    /// empty and `Value` to 0; a numeric string is accepted for `Value`.
    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        let cleaned = TRAILING_COMMA.replace_all(text, "$1");
        let raw: Value = serde_json::from_str(&cleaned)?;
        let name = raw
            .get("Name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let value = match raw.get("Value") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };
        Ok(Self { name, value, raw })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub archive_id: String,
    pub display_name: String,
    pub spawn_arg: String,
    /// `vehicles/<folder>/<config>.pc`
    pub config_ref: String,
    /// Picture column as written: an internal path or the missing marker.
    pub picture: String,
    pub use_fallback_from: Option<String>,
    pub preview_path: PathBuf,
    pub metadata_path: Option<PathBuf>,
    pub info: VehicleInfo,
}

impl CatalogEntry {
    pub fn spawn_command(&self) -> String {
        format!(
            "core_vehicles.spawnNewVehicle(\"{}\", {{config = '{}'}})",
            self.spawn_arg, self.config_ref
        )
    }

    /// Lowercase folder name and config stem, taken from `config_ref`.
    fn folder_and_stem(&self) -> Option<(String, &str)> {
        let rest = self.config_ref.strip_prefix("vehicles/")?;
        let (folder, file) = rest.rsplit_once('/')?;
        let stem = match file.rsplit_once('.') {
            Some((stem, ext)) if ext.eq_ignore_ascii_case("pc") => stem,
            _ => file,
        };
        Some((folder.to_lowercase(), stem))
    }
}

/// Entries parsed from a catalog file, with one error per unusable line.
#[derive(Debug, Default)]
pub struct Catalog {
    pub entries: Vec<CatalogEntry>,
    pub errors: Vec<PipelineError>,
}

impl Catalog {
    /// Load `good_path` and resolve previews and metadata from `cache`.
    pub fn load(good_path: &Path, cache: &CacheDir, placeholder: &Path) -> Result<Self> {
        let bytes = fs::read(good_path).map_err(|e| PipelineError::io(good_path, e))?;
        let mut catalog = parse_catalog(&String::from_utf8_lossy(&bytes));
        for entry in &mut catalog.entries {
            attach_assets(entry, cache, placeholder);
        }
        for err in &catalog.errors {
            warn!("{}: {err}", good_path.display());
        }
        debug!(
            "Loaded {} catalog entr(ies) from {}",
            catalog.entries.len(),
            good_path.display()
        );
        Ok(catalog)
    }

    /// Entries whose display name contains `needle`, case-insensitively.
    pub fn search<'a>(&'a self, needle: &str) -> impl Iterator<Item = &'a CatalogEntry> {
        let needle = needle.to_lowercase();
        self.entries.iter().filter(move |e| {
            e.display_name.to_lowercase().contains(&needle)
                || e.info.name.to_lowercase().contains(&needle)
        })
    }
}

/// Parse catalog text without touching the cache. Previews are left empty
/// and metadata defaulted.
pub fn parse_catalog(text: &str) -> Catalog {
    let mut catalog = Catalog::default();
    let mut pending: Option<(String, String, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = DESCRIPTION_LINE.captures(line) {
            // Further previews of the same entry; the first picture is kept.
            let same_entry = matches!(
                &pending,
                Some((archive, name, _)) if *archive == caps[1] && *name == caps[2]
            );
            if same_entry {
                continue;
            }
            if pending.is_some() {
                catalog.errors.push(malformed(idx, "description without spawn line"));
            }
            pending = Some((caps[1].to_string(), caps[2].to_string(), caps[3].to_string()));
            continue;
        }
        if let Some(caps) = SPAWN_LINE.captures(line) {
            let Some((archive_id, display_name, picture)) = pending.take() else {
                catalog.errors.push(malformed(idx, line));
                continue;
            };
            catalog.entries.push(CatalogEntry {
                archive_id,
                display_name,
                spawn_arg: caps[1].to_string(),
                config_ref: caps[2].to_string(),
                picture,
                use_fallback_from: caps.get(3).map(|m| m.as_str().trim().to_string()),
                preview_path: PathBuf::new(),
                metadata_path: None,
                info: VehicleInfo::default(),
            });
            continue;
        }
        catalog.errors.push(malformed(idx, line));
    }
    if pending.is_some() {
        catalog
            .errors
            .push(malformed(text.lines().count().saturating_sub(1), "description without spawn line"));
    }
    catalog
}

fn malformed(idx: usize, text: &str) -> PipelineError {
    PipelineError::MalformedManifestLine {
        line: idx + 1,
        text: text.to_string(),
    }
}

fn attach_assets(entry: &mut CatalogEntry, cache: &CacheDir, placeholder: &Path) {
    let Some((lower, stem)) = entry.folder_and_stem() else {
        entry.preview_path = placeholder.to_path_buf();
        return;
    };
    let stem = stem.to_string();
    let archive = entry.archive_id.as_str();

    entry.preview_path = cache
        .existing_preview(&naming::preview_base(&lower, archive, &stem))
        .unwrap_or_else(|| placeholder.to_path_buf());

    let candidates = [
        Some(naming::variant_metadata_name(&lower, archive, &stem)),
        Some(naming::metadata_name(&lower, archive)),
        entry.use_fallback_from.clone(),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .map(|name| cache.path_of(&name))
        .find(|p| p.is_file());

    if let Some(path) = found {
        match fs::read(&path) {
            Ok(bytes) => match VehicleInfo::parse(&String::from_utf8_lossy(&bytes)) {
                Ok(info) => entry.info = info,
                Err(e) => warn!("Unparseable metadata {}: {e}", path.display()),
            },
            Err(e) => warn!("Unreadable metadata {}: {e}", path.display()),
        }
        entry.metadata_path = Some(path);
    }
}
