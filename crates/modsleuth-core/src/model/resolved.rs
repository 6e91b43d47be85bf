/// Output of conflict resolution: catalog entries that will be offered to
/// the user, and the folders / archives that were set aside.
use compact_str::CompactString;
use std::path::PathBuf;

/// Placeholder written in the picture column when the archive has no image.
pub const MISSING_PICTURE_MARKER: &str = "IMAGE_NOT_FOUND-USEMISSING";

/// One spawnable configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntry {
    pub archive_id: CompactString,
    /// Folder casing as it appears in the archive; used in `config_ref`.
    pub raw_folder: CompactString,
    pub lower_name: CompactString,
    pub display_name: CompactString,
    pub spawn_arg: CompactString,
    /// Config file name, e.g. `sport.pc`.
    pub config_file: String,
    /// Internal path of the archive's own preview image, if any.
    pub preview_internal: Option<String>,
    /// Other previews shipped for the same config; each gets its own
    /// description line.
    pub extra_previews: Vec<String>,
    /// Always an existing file: the extracted preview or the placeholder.
    pub preview_asset_path: PathBuf,
    /// Cache path of the metadata this entry will display, if any.
    pub metadata_ref: Option<PathBuf>,
    /// Cache file name borrowed from another entry (`USE` link).
    pub use_fallback_from: Option<String>,
}

impl ResolvedEntry {
    /// `vehicles/<raw folder>/<config file>`
    pub fn config_ref(&self) -> String {
        format!("vehicles/{}/{}", self.raw_folder, self.config_file)
    }

    pub fn config_stem(&self) -> &str {
        match self.config_file.rsplit_once('.') {
            Some((stem, ext)) if ext.eq_ignore_ascii_case("pc") => stem,
            _ => &self.config_file,
        }
    }

    pub fn spawn_command(&self) -> String {
        format!(
            "core_vehicles.spawnNewVehicle(\"{}\", {{config = '{}'}})",
            self.spawn_arg,
            self.config_ref()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The folder name collides with a reserved (stock) vehicle name.
    ReservedName,
    NoConfigFiles,
    NoVehicleFolders,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectReason,
    pub archive_id: CompactString,
    /// Folder name as displayed: lowercase for reserved names, raw otherwise.
    /// Absent for `NoVehicleFolders`.
    pub folder: Option<CompactString>,
}

/// Folders from different archives that share a lowercase name but not
/// its casing. Entries stay accepted; the conflict is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingConflict {
    pub lower_name: CompactString,
    /// Casing and archive of the first folder seen in priority order.
    pub first_raw: CompactString,
    pub first_archive: CompactString,
    pub raw_name: CompactString,
    pub archive_id: CompactString,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub accepted: Vec<ResolvedEntry>,
    pub rejected: Vec<Rejection>,
    pub conflicts: Vec<NamingConflict>,
}

impl Resolution {
    pub fn fallback_links(&self) -> usize {
        self.accepted
            .iter()
            .filter(|e| e.use_fallback_from.is_some())
            .count()
    }
}
