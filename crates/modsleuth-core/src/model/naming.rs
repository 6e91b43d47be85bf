/// Derived cache file names.
///
/// Every cached file is named `vehicles--<lower folder>_<archive id>--<rest>`,
/// so a name is a pure function of the archive, the folder's conflict
/// identity and the config (or metadata) it came from.
use std::fmt::Write as _;

const PREFIX: &str = "vehicles--";
const SEPARATOR: &str = "--";

/// `vehicles--<lower>_<archive>--`
pub fn derived_prefix(lower_name: &str, archive_id: &str) -> String {
    let mut name = String::with_capacity(PREFIX.len() + lower_name.len() + archive_id.len() + 3);
    let _ = write!(name, "{PREFIX}{lower_name}_{archive_id}{SEPARATOR}");
    name
}

/// Folder-level metadata: `vehicles--<lower>_<archive>--info.json`.
pub fn metadata_name(lower_name: &str, archive_id: &str) -> String {
    format!("{}info.json", derived_prefix(lower_name, archive_id))
}

/// Variant metadata: `vehicles--<lower>_<archive>--info_<stem>.json`.
pub fn variant_metadata_name(lower_name: &str, archive_id: &str, stem: &str) -> String {
    format!("{}info_{stem}.json", derived_prefix(lower_name, archive_id))
}

/// Preview base name without extension: `vehicles--<lower>_<archive>--<stem>`.
pub fn preview_base(lower_name: &str, archive_id: &str, stem: &str) -> String {
    format!("{}{stem}", derived_prefix(lower_name, archive_id))
}

pub fn preview_name(lower_name: &str, archive_id: &str, stem: &str, ext: &str) -> String {
    format!("{}.{ext}", preview_base(lower_name, archive_id, stem))
}

/// Prefix shared by every folder-level metadata file for `lower_name`,
/// whichever archive supplied it.
pub fn metadata_search_prefix(lower_name: &str) -> String {
    format!("{PREFIX}{lower_name}_")
}

/// `true` when `file_name` is a folder-level metadata file.
pub fn is_folder_metadata(file_name: &str) -> bool {
    file_name.starts_with(PREFIX) && file_name.ends_with("--info.json")
}

/// `true` when `file_name` was derived from the archive `archive_id`.
///
/// The middle segment (`<lower>_<archive>`) must end with `_<archive id>`,
/// compared case-insensitively since watcher state keys are lowercased.
pub fn derived_from_archive(file_name: &str, archive_id: &str) -> bool {
    let Some(rest) = file_name.strip_prefix(PREFIX) else {
        return false;
    };
    let Some((middle, _)) = rest.split_once(SEPARATOR) else {
        return false;
    };
    middle
        .to_lowercase()
        .strip_suffix(&archive_id.to_lowercase())
        .is_some_and(|head| head.ends_with('_') && head.len() > 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_cache_convention() {
        assert_eq!(
            metadata_name("hopper", "modA.zip"),
            "vehicles--hopper_modA.zip--info.json"
        );
        assert_eq!(
            variant_metadata_name("hopper", "modA.zip", "race"),
            "vehicles--hopper_modA.zip--info_race.json"
        );
        assert_eq!(
            preview_name("hopper", "modA.zip", "race", "jpg"),
            "vehicles--hopper_modA.zip--race.jpg"
        );
    }

    #[test]
    fn folder_metadata_detection() {
        assert!(is_folder_metadata("vehicles--van_x.zip--info.json"));
        assert!(!is_folder_metadata("vehicles--van_x.zip--info_a.json"));
        assert!(!is_folder_metadata("vehicles--van_x.zip--a.png"));
    }

    #[test]
    fn archive_ownership_matches_suffix_only() {
        assert!(derived_from_archive("vehicles--van_cars.zip--a.png", "cars.zip"));
        assert!(derived_from_archive(
            "vehicles--my_van_cars.zip--info.json",
            "cars.zip"
        ));
        assert!(!derived_from_archive("vehicles--van_supercars.zip--a.png", "cars.zip"));
        assert!(!derived_from_archive("vehicles--van_cars.zip--a.png", "bars.zip"));
        assert!(derived_from_archive("vehicles--van_Cars.zip--a.png", "cars.zip"));
        assert!(!derived_from_archive("MissingZipConfigPic.png", "cars.zip"));
    }
}
