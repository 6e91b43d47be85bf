/// Data model — archive structure, derived cache names, and resolved
/// catalog entries.
pub mod archive;
pub mod naming;
pub mod resolved;

pub use archive::{ArchiveRecord, ConfigFile, VehicleFolder};
pub use resolved::{NamingConflict, RejectReason, Rejection, Resolution, ResolvedEntry};
