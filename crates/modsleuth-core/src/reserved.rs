/// Reserved vehicle names — folder names that ship with the base game.
///
/// A mod folder whose lowercase name is reserved must spawn under the
/// lowercase name, whatever casing the author used. The set is rebuilt at
/// the start of every pass from a source file whose first line names the
/// directory holding the stock archives; when that cannot be used, the
/// built-in list applies.
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// Stock vehicle folder names, used when no stock directory is available.
pub const DEFAULT_RESERVED_NAMES: &[&str] = &[
    "atv", "autobello", "ball", "barrels", "barrier", "barrier_plastic", "barstow", "bastion",
    "blockwall", "bluebuck", "bolide", "bollard", "boxutility", "boxutility_large", "burnside",
    "bx", "cannon", "caravan", "cardboard_box", "cargotrailer", "chair", "christmas_tree",
    "citybus", "common", "cones", "containertrailer", "couch", "covet", "delineator", "dolly",
    "dryvan", "engine_props", "etk800", "etkc", "etki", "flail", "flatbed", "flipramp",
    "frameless_dump", "fridge", "fullsize", "gate", "haybale", "hopper", "inflated_mat",
    "kickplate", "lansdale", "large_angletester", "large_bridge", "large_cannon",
    "large_crusher", "large_hamster_wheel", "large_roller", "large_spinner", "large_tilt",
    "large_tire", "legran", "log_trailer", "logs", "mattress", "md_series", "metal_box",
    "metal_ramp", "midsize", "midtruck", "miramar", "moonhawk", "nine", "pessima", "piano",
    "pickup", "pigeon", "porta_potty", "racetruck", "roadsigns", "roamer", "rockbouncer",
    "rocks", "rollover", "sawhorse", "sbr", "scintilla", "shipping_container",
    "simple_traffic", "steel_coil", "streetlight", "sunburst", "suspensionbridge", "tanker",
    "testroller", "tiltdeck", "tirestacks", "tirewall", "trafficbarrel", "tsfb", "tub", "tube",
    "tv", "unicycle", "us_semi", "utv", "van", "vivace", "wall", "weightpad", "wendover",
    "wigeon", "woodcrate", "woodplanks",
];

/// Where the current set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedSource {
    StockDirectory,
    BuiltIn,
    Explicit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReservedNameSet {
    /// Lowercase name → modification time of the stock archive it came from
    /// (0 for built-in or explicit names).
    names: BTreeMap<String, f64>,
    source: ReservedSource,
}

impl ReservedNameSet {
    pub fn builtin() -> Self {
        Self {
            names: DEFAULT_RESERVED_NAMES
                .iter()
                .map(|n| (n.to_string(), 0.0))
                .collect(),
            source: ReservedSource::BuiltIn,
        }
    }

    /// A set with exactly these names (lowercased).
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|n| (n.as_ref().to_lowercase(), 0.0))
                .collect(),
            source: ReservedSource::Explicit,
        }
    }

    pub fn empty() -> Self {
        Self::from_names(std::iter::empty::<&str>())
    }

    /// Load the set from `source_file`, falling back to the built-in list
    /// when the file is missing, its directory is invalid, or the directory
    /// holds no archives.
    pub fn load(source_file: &Path, extension: &str) -> Self {
        let first_line = match fs::read(source_file) {
            Ok(bytes) => String::from_utf8_lossy(&bytes)
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
            Err(e) => {
                debug!(
                    "Reserved-name source {} unavailable ({e}); using built-in list",
                    source_file.display()
                );
                return Self::builtin();
            }
        };

        let dir = Path::new(&first_line);
        if first_line.is_empty() || !dir.is_dir() {
            warn!(
                "Stock vehicle directory {first_line:?} from {} is not a directory; using built-in list",
                source_file.display()
            );
            return Self::builtin();
        }

        let names = stock_archive_names(dir, extension);
        if names.is_empty() {
            warn!(
                "No stock archives in {}; using built-in list",
                dir.display()
            );
            return Self::builtin();
        }
        debug!("Loaded {} reserved name(s) from {}", names.len(), dir.display());
        Self {
            names,
            source: ReservedSource::StockDirectory,
        }
    }

    pub fn contains(&self, lower_name: &str) -> bool {
        self.names.contains_key(lower_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn source(&self) -> ReservedSource {
        self.source
    }

    /// Name → timestamp pairs, as persisted in the watcher state.
    pub fn entries(&self) -> &BTreeMap<String, f64> {
        &self.names
    }

    /// `true` when the two sets would lower a different set of names.
    pub fn differs_from(&self, names: &BTreeSet<String>) -> bool {
        self.names.len() != names.len() || !self.names.keys().all(|n| names.contains(n))
    }
}

/// Lowercased base names of the archives directly inside `dir`.
fn stock_archive_names(dir: &Path, extension: &str) -> BTreeMap<String, f64> {
    let mut names = BTreeMap::new();
    let Ok(read_dir) = fs::read_dir(dir) else {
        return names;
    };
    for entry in read_dir.flatten() {
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some((stem, ext)) = file_name.rsplit_once('.') else {
            continue;
        };
        if stem.is_empty() || !ext.eq_ignore_ascii_case(extension) {
            continue;
        }
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        names.insert(stem.to_lowercase(), modified);
    }
    names
}
