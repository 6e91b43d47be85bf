/// Cancelable, resettable one-shot timer running on its own thread.
///
/// Every [`DebounceTimer::reset`] or [`DebounceTimer::cancel`] bumps a
/// generation counter. A [`TimerFired`] message carries the generation it was
/// armed with, so the receiver can discard a fire that raced with a later
/// reset by comparing against [`DebounceTimer::generation`].
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Sent when a timer expires without being reset or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    /// Caller-chosen tag identifying the timer (e.g. a root index).
    pub tag: usize,
    pub generation: u64,
}

enum TimerCommand {
    Arm(u64),
    Disarm,
}

pub struct DebounceTimer {
    tag: usize,
    delay: Duration,
    generation: Arc<AtomicU64>,
    cmd_tx: Sender<TimerCommand>,
    _thread: Option<thread::JoinHandle<()>>,
}

impl DebounceTimer {
    /// Spawn the timer thread. Fires are delivered on `fire_tx`. The thread
    /// exits when the timer is dropped.
    pub fn new(tag: usize, delay: Duration, fire_tx: Sender<TimerFired>) -> std::io::Result<Self> {
        let (cmd_tx, cmd_rx) = unbounded::<TimerCommand>();
        let thread = thread::Builder::new()
            .name(format!("modsleuth-debounce-{tag}"))
            .spawn(move || {
                let mut armed: Option<(Instant, u64)> = None;
                loop {
                    let cmd = match armed {
                        Some((deadline, generation)) => {
                            let wait = deadline.saturating_duration_since(Instant::now());
                            match cmd_rx.recv_timeout(wait) {
                                Ok(cmd) => cmd,
                                Err(RecvTimeoutError::Timeout) => {
                                    armed = None;
                                    if fire_tx.send(TimerFired { tag, generation }).is_err() {
                                        return;
                                    }
                                    continue;
                                }
                                Err(RecvTimeoutError::Disconnected) => return,
                            }
                        }
                        None => match cmd_rx.recv() {
                            Ok(cmd) => cmd,
                            Err(_) => return,
                        },
                    };
                    armed = match cmd {
                        TimerCommand::Arm(generation) => Some((Instant::now() + delay, generation)),
                        TimerCommand::Disarm => None,
                    };
                }
            })?;

        Ok(Self {
            tag,
            delay,
            generation: Arc::new(AtomicU64::new(0)),
            cmd_tx,
            _thread: Some(thread),
        })
    }

    pub fn tag(&self) -> usize {
        self.tag
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the countdown from now. Returns the new generation.
    pub fn reset(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.cmd_tx.send(TimerCommand::Arm(generation));
        debug!("Debounce timer {} reset (generation {generation})", self.tag);
        generation
    }

    /// Stop the countdown; any fire already in flight becomes stale.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let _ = self.cmd_tx.send(TimerCommand::Disarm);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// `true` when `fired` belongs to this timer's latest arming.
    pub fn is_current(&self, fired: &TimerFired) -> bool {
        fired.tag == self.tag && fired.generation == self.generation()
    }
}
