/// Debounce scheduler — turns bursts of archive events into single passes.
///
/// One coordinating thread owns a [`DebounceTimer`] per root and a phase per
/// root:
///
/// ```text
/// Idle ──event──▶ PendingDebounce ──timer expired──▶ Scanning ──pass done──▶ Idle
///                   ▲        │
///                   └─event──┘ (timer reset)
/// ```
///
/// The pass runs synchronously on the coordinating thread. Events that arrive
/// meanwhile stay queued in the watch channel and are handled once the pass
/// returns, which puts the root back into `PendingDebounce`.
use super::timer::{DebounceTimer, TimerFired};
use super::watcher::{watch_root, WatchEvent};
use crate::error::Result;
use crate::pipeline::progress::{PassSummary, PipelineEvent};
use crate::pipeline::{pass_events, Pipeline, EVENT_CHANNEL_CAPACITY};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Anything that can run a pass. Implemented by [`Pipeline`]; tests use
/// lightweight fakes.
pub trait PassRunner: Send + Sync + 'static {
    fn run_pass(&self, full: bool) -> Result<PassSummary>;
}

impl PassRunner for Pipeline {
    fn run_pass(&self, full: bool) -> Result<PassSummary> {
        Pipeline::run_pass(self, full)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    Idle,
    PendingDebounce,
    Scanning,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub roots: Vec<PathBuf>,
    pub extension: String,
    pub debounce: Duration,
    /// Start OS watches on the roots. Off when events are fed by hand.
    pub watch_filesystem: bool,
    /// Run one pass before waiting for events.
    pub initial_pass: bool,
}

enum SchedulerCommand {
    RunNow { full: bool },
    Stop,
}

/// Handle to the running scheduler. Dropping it stops the coordinator.
pub struct SchedulerHandle {
    /// Pass lifecycle events (`ScanStarted`, `NewArchives`, `ScanComplete`, `PassFailed`).
    pub events_rx: Receiver<PipelineEvent>,
    watch_tx: Sender<WatchEvent>,
    cmd_tx: Sender<SchedulerCommand>,
    phases: Arc<RwLock<Vec<WatchPhase>>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Sender feeding the same queue as the filesystem watches.
    pub fn event_sender(&self) -> Sender<WatchEvent> {
        self.watch_tx.clone()
    }

    /// Queue an immediate pass, bypassing the debounce.
    pub fn request_pass(&self, full: bool) {
        let _ = self.cmd_tx.send(SchedulerCommand::RunNow { full });
    }

    pub fn phases(&self) -> Vec<WatchPhase> {
        self.phases.read().clone()
    }

    pub fn phase(&self, root: usize) -> Option<WatchPhase> {
        self.phases.read().get(root).copied()
    }

    /// Stop the coordinator and wait for it. A pass in progress finishes first.
    pub fn stop(mut self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SchedulerCommand::Stop);
    }
}

/// Spawn the coordinating thread.
pub fn start_scheduler<R: PassRunner>(
    runner: Arc<R>,
    options: SchedulerOptions,
) -> std::io::Result<SchedulerHandle> {
    let (events_tx, events_rx) = bounded(EVENT_CHANNEL_CAPACITY);
    let (watch_tx, watch_rx) = unbounded::<WatchEvent>();
    let (fire_tx, fire_rx) = unbounded::<TimerFired>();
    let (cmd_tx, cmd_rx) = unbounded::<SchedulerCommand>();

    let timers = (0..options.roots.len())
        .map(|idx| DebounceTimer::new(idx, options.debounce, fire_tx.clone()))
        .collect::<std::io::Result<Vec<_>>>()?;
    drop(fire_tx);

    let phases = Arc::new(RwLock::new(vec![WatchPhase::Idle; options.roots.len()]));

    let coordinator = Coordinator {
        runner,
        events_tx,
        timers,
        phases: Arc::clone(&phases),
    };
    let thread_watch_tx = watch_tx.clone();
    let thread = thread::Builder::new()
        .name("modsleuth-scheduler".into())
        .spawn(move || coordinator.run(options, thread_watch_tx, watch_rx, fire_rx, cmd_rx))?;

    Ok(SchedulerHandle {
        events_rx,
        watch_tx,
        cmd_tx,
        phases,
        thread: Some(thread),
    })
}

struct Coordinator<R: PassRunner> {
    runner: Arc<R>,
    events_tx: Sender<PipelineEvent>,
    timers: Vec<DebounceTimer>,
    phases: Arc<RwLock<Vec<WatchPhase>>>,
}

impl<R: PassRunner> Coordinator<R> {
    fn run(
        self,
        options: SchedulerOptions,
        watch_tx: Sender<WatchEvent>,
        watch_rx: Receiver<WatchEvent>,
        fire_rx: Receiver<TimerFired>,
        cmd_rx: Receiver<SchedulerCommand>,
    ) {
        // Watches live as long as this thread.
        let mut watchers = Vec::new();
        if options.watch_filesystem {
            for (idx, root) in options.roots.iter().enumerate() {
                match watch_root(idx, root, &options.extension, watch_tx.clone()) {
                    Ok(w) => watchers.push(w),
                    Err(e) => warn!("Cannot watch {}: {e}", root.display()),
                }
            }
        }
        drop(watch_tx);

        info!(
            "Scheduler running: {} root(s), debounce {:?}",
            options.roots.len(),
            options.debounce
        );
        if options.initial_pass {
            self.pass_all_roots(false);
        }

        loop {
            select! {
                recv(cmd_rx) -> cmd => match cmd {
                    Ok(SchedulerCommand::RunNow { full }) => self.pass_all_roots(full),
                    Ok(SchedulerCommand::Stop) | Err(_) => break,
                },
                recv(watch_rx) -> event => match event {
                    Ok(event) => self.on_watch_event(event),
                    // Every sender is gone, so the handle is too.
                    Err(_) => break,
                },
                recv(fire_rx) -> fired => {
                    if let Ok(fired) = fired {
                        self.on_timer(fired);
                    }
                }
            }
        }

        for timer in &self.timers {
            timer.cancel();
        }
        drop(watchers);
        info!("Scheduler stopped");
    }

    fn set_phase(&self, root: usize, phase: WatchPhase) {
        if let Some(slot) = self.phases.write().get_mut(root) {
            *slot = phase;
        }
    }

    fn on_watch_event(&self, event: WatchEvent) {
        let root = match &event {
            WatchEvent::Changed { root, path, kind } => {
                debug!("Root {root}: {kind:?} {}", path.display());
                *root
            }
            WatchEvent::Error { root, message } => {
                warn!("Root {root}: watch error ({message}); scheduling a pass");
                *root
            }
        };
        let Some(timer) = self.timers.get(root) else {
            warn!("Event for unknown root {root} ignored");
            return;
        };
        timer.reset();
        self.set_phase(root, WatchPhase::PendingDebounce);
    }

    fn on_timer(&self, fired: TimerFired) {
        let Some(timer) = self.timers.get(fired.tag) else {
            return;
        };
        if !timer.is_current(&fired) {
            debug!("Stale timer fire for root {} ignored", fired.tag);
            return;
        }
        if self.phases.read().get(fired.tag) != Some(&WatchPhase::PendingDebounce) {
            return;
        }
        self.set_phase(fired.tag, WatchPhase::Scanning);
        self.pass(Some(fired.tag), false);
        self.set_phase(fired.tag, WatchPhase::Idle);
    }

    /// A pass not tied to one root: every root reads `Scanning` while it
    /// runs, then returns to the phase it had before.
    fn pass_all_roots(&self, full: bool) {
        let before = {
            let mut phases = self.phases.write();
            let before = phases.clone();
            phases.fill(WatchPhase::Scanning);
            before
        };
        self.pass(None, full);
        *self.phases.write() = before;
    }

    fn pass(&self, root: Option<usize>, full: bool) {
        self.emit(PipelineEvent::ScanStarted { root });
        for event in pass_events(self.runner.run_pass(full)) {
            self.emit(event);
        }
    }

    fn emit(&self, event: PipelineEvent) {
        match self.events_tx.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => warn!("Event channel full; pipeline event dropped"),
        }
    }
}
