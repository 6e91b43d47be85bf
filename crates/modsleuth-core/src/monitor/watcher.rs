/// Filesystem watcher — forwards archive create / delete / rename events
/// from `notify` to the scheduler.
///
/// Only events naming a file with the watched extension qualify. Content
/// modifications are ignored: a replaced archive shows up as a rename or a
/// remove + create, and modification times are re-checked by the pass
/// anyway.
use crossbeam_channel::Sender;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Removed,
    Renamed,
}

/// Message from a watcher callback to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Changed {
        /// Index of the root in the scheduler's root list.
        root: usize,
        path: PathBuf,
        kind: ChangeKind,
    },
    /// The backend reported an error; the watch may have lost events.
    Error { root: usize, message: String },
}

/// Map a raw `notify` event to the qualifying changes it contains.
pub fn classify_event(event: &Event, extension: &str) -> Vec<(PathBuf, ChangeKind)> {
    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(
            RenameMode::From | RenameMode::To | RenameMode::Both | RenameMode::Any,
        )) => ChangeKind::Renamed,
        _ => return Vec::new(),
    };
    event
        .paths
        .iter()
        .filter(|p| has_extension(p, extension))
        .map(|p| (p.clone(), kind))
        .collect()
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Start a recursive `notify` watch on `root`. Events are forwarded on `tx`
/// until the returned watcher is dropped.
pub fn watch_root(
    root_idx: usize,
    root: &Path,
    extension: &str,
    tx: Sender<WatchEvent>,
) -> notify::Result<RecommendedWatcher> {
    let extension = extension.to_string();
    let mut watcher = RecommendedWatcher::new(
        move |res: std::result::Result<Event, notify::Error>| match res {
            Ok(event) => {
                for (path, kind) in classify_event(&event, &extension) {
                    debug!("Watch event {kind:?} on {}", path.display());
                    let _ = tx.send(WatchEvent::Changed {
                        root: root_idx,
                        path,
                        kind,
                    });
                }
            }
            Err(err) => {
                warn!("Watcher error on root {root_idx}: {err}");
                let _ = tx.send(WatchEvent::Error {
                    root: root_idx,
                    message: err.to_string(),
                });
            }
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    debug!("Watching {} (recursive)", root.display());
    Ok(watcher)
}
