/// Change monitoring — keeps the catalog in sync with the mods folders.
///
/// - [`watcher`] forwards `notify` events for archives.
/// - [`timer`] is the resettable one-shot timer used for debouncing.
/// - [`scheduler`] owns the per-root phases and runs passes.
/// - [`state`] is the archive set recorded by the last pass.
///
/// # Usage
///
/// ```ignore
/// let handle = start_scheduler(Arc::new(pipeline), options)?;
/// while let Ok(event) = handle.events_rx.recv() { /* ... */ }
/// handle.stop();
/// ```
pub mod scheduler;
pub mod state;
pub mod timer;
pub mod watcher;

pub use scheduler::{start_scheduler, PassRunner, SchedulerHandle, SchedulerOptions, WatchPhase};
pub use state::{ArchiveDiff, WatchState};
pub use timer::{DebounceTimer, TimerFired};
pub use watcher::{ChangeKind, WatchEvent};
