/// Text form of a resolution: `outputGOOD.txt` and `outputBAD.txt`.
///
/// Both files use CRLF line endings and are parsed downstream with fixed
/// regular expressions, so the layout here is part of the contract.
use crate::model::resolved::MISSING_PICTURE_MARKER;
use crate::model::{NamingConflict, RejectReason, Rejection, ResolvedEntry};
use compact_str::CompactString;
use std::fmt::Write as _;

pub const NO_CONFIG_HEADER: &str = "DOES NOT CONTAIN CONFIGURATION FILES (UNDER VEHICLES FOLDER)";
pub const NO_FOLDERS_HEADER: &str = "POSSIBLY NOT VEHICLE MODS";
pub const CONFLICTS_HEADER: &str = "NAMING CONFLICTS";

/// Accepted entries: one description line per preview (a single marker
/// line when there is none), then the spawn line.
pub fn render_good(entries: &[ResolvedEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let mut pictures: Vec<&str> = entry
            .preview_internal
            .iter()
            .chain(&entry.extra_previews)
            .map(String::as_str)
            .collect();
        if pictures.is_empty() {
            pictures.push(MISSING_PICTURE_MARKER);
        }
        for picture in pictures {
            let _ = write!(
                out,
                "{} (package)  - \"{}\" (internal folder name) - \"{}\" (config picture)\r\n",
                entry.archive_id, entry.display_name, picture
            );
        }
        out.push_str(&entry.spawn_command());
        if let Some(file) = &entry.use_fallback_from {
            let _ = write!(out, " (USE {file})");
        }
        out.push_str("\r\n\r\n");
    }
    out
}

/// Rejections grouped under `=== <reason> ===` headers: one group per
/// reserved name (first-seen order), then folders without configs, then
/// archives without vehicle folders.
pub fn render_bad(rejected: &[Rejection]) -> String {
    let mut reserved: Vec<(CompactString, Vec<&str>)> = Vec::new();
    let mut no_config: Vec<(&str, &str)> = Vec::new();
    let mut no_folders: Vec<&str> = Vec::new();

    for rejection in rejected {
        let archive = rejection.archive_id.as_str();
        let folder = rejection.folder.as_deref().unwrap_or_default();
        match rejection.reason {
            RejectReason::ReservedName => {
                let name = CompactString::new(folder.to_lowercase());
                match reserved.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, archives)) => {
                        if !archives.contains(&archive) {
                            archives.push(archive);
                        }
                    }
                    None => reserved.push((name, vec![archive])),
                }
            }
            RejectReason::NoConfigFiles => no_config.push((archive, folder)),
            RejectReason::NoVehicleFolders => no_folders.push(archive),
        }
    }

    let mut out = String::new();
    for (name, archives) in &reserved {
        let _ = write!(out, "=== {name} ===\r\n");
        for archive in archives {
            let _ = write!(out, "{archive} (package)  - \"{name}\" (internal folder name)\r\n\r\n");
        }
    }
    if !no_config.is_empty() {
        let _ = write!(out, "=== {NO_CONFIG_HEADER} ===\r\n");
        for (archive, folder) in &no_config {
            let _ = write!(out, "{archive} (package)  - \"{folder}\" (internal folder name)\r\n\r\n");
        }
    }
    if !no_folders.is_empty() {
        let _ = write!(out, "=== {NO_FOLDERS_HEADER} ===\r\n");
        for archive in &no_folders {
            let _ = write!(out, "{archive} (package)\r\n\r\n");
        }
    }
    out
}

/// Naming conflicts under their own header, in detection order. Empty when
/// there are none.
pub fn render_conflicts(conflicts: &[NamingConflict]) -> String {
    let mut out = String::new();
    if conflicts.is_empty() {
        return out;
    }
    let _ = write!(out, "=== {CONFLICTS_HEADER} ===\r\n");
    for c in conflicts {
        let _ = write!(
            out,
            "{} (package)  - \"{}\" (internal folder name) - conflicts with {} \"{}\"\r\n\r\n",
            c.archive_id, c.raw_name, c.first_archive, c.first_raw
        );
    }
    out
}
