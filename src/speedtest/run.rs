//! Per-run plumbing shared by the download and upload phases: state
//! publication guarded by the run's cancellation flag, and checkpointed awaits.

use super::{SpeedTestState, TestPhase};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// The run was cancelled; nothing more may be published for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cancelled;

pub(crate) enum Outcome<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

struct BusState {
    /// Cancellation flag of the active run, if any.
    active: Option<Arc<AtomicBool>>,
    current: SpeedTestState,
}

/// Owns the state stream. Checking a run's flag and sending happen under one
/// lock, which `cancel` also takes, so no event can slip out after a cancel.
pub(crate) struct StateBus {
    events: broadcast::Sender<SpeedTestState>,
    state: Mutex<BusState>,
}

impl StateBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            events,
            state: Mutex::new(BusState {
                active: None,
                current: SpeedTestState::Idle,
            }),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SpeedTestState> {
        self.events.subscribe()
    }

    pub(crate) fn current(&self) -> SpeedTestState {
        self.state.lock().current
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state.lock().active.is_some()
    }

    /// Registers a new run and publishes its first state. Returns `None` if a
    /// run is already active.
    pub(crate) fn begin(&self, first: SpeedTestState) -> Option<Arc<AtomicBool>> {
        let mut state = self.state.lock();
        if state.active.is_some() {
            return None;
        }
        let flag = Arc::new(AtomicBool::new(false));
        state.active = Some(flag.clone());
        state.current = first;
        let _ = self.events.send(first);
        Some(flag)
    }

    /// Flags the active run as cancelled and forgets it. Returns whether a run was active.
    pub(crate) fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        match state.active.take() {
            Some(flag) => {
                flag.store(true, Ordering::Release);
                state.current = SpeedTestState::Idle;
                true
            }
            None => false,
        }
    }

    fn publish(&self, flag: &Arc<AtomicBool>, next: SpeedTestState) -> Result<(), Cancelled> {
        let mut state = self.state.lock();
        if flag.load(Ordering::Acquire) {
            return Err(Cancelled);
        }
        state.current = next;
        if next.is_terminal() && state.active.as_ref().is_some_and(|a| Arc::ptr_eq(a, flag)) {
            state.active = None;
        }
        let _ = self.events.send(next);
        Ok(())
    }
}

/// Progress inside one phase's `(floor, ceiling)` band. Each tick closes a
/// fixed share of the remaining gap, so the value rises but never reaches the ceiling.
#[derive(Debug, Clone, Copy)]
struct PhaseProgress {
    phase: TestPhase,
    value: f64,
    ceiling: f64,
}

const TICK_SHARE: f64 = 0.08;

impl PhaseProgress {
    fn enter(phase: TestPhase, floor: f64, ceiling: f64) -> Self {
        Self {
            phase,
            value: floor + (ceiling - floor) * TICK_SHARE,
            ceiling,
        }
    }

    fn advance(&mut self) {
        self.value += (self.ceiling - self.value) * TICK_SHARE;
    }
}

pub(crate) struct RunContext {
    bus: Arc<StateBus>,
    flag: Arc<AtomicBool>,
    ticker: Interval,
    progress: Option<PhaseProgress>,
}

impl RunContext {
    pub(crate) fn new(bus: Arc<StateBus>, flag: Arc<AtomicBool>, checkpoint_every: Duration) -> Self {
        let mut ticker = interval_at(Instant::now() + checkpoint_every, checkpoint_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            bus,
            flag,
            ticker,
            progress: None,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn publish(&self, state: SpeedTestState) -> Result<(), Cancelled> {
        self.bus.publish(&self.flag, state)
    }

    pub(crate) fn enter_phase(&mut self, phase: TestPhase, floor: f64, ceiling: f64) -> Result<(), Cancelled> {
        let progress = PhaseProgress::enter(phase, floor, ceiling);
        self.progress = Some(progress);
        self.publish(SpeedTestState::Testing {
            progress: progress.value,
            phase,
        })
    }

    /// Awaits `fut`, waking every checkpoint interval to look at the
    /// cancellation flag and report progress. Dropping `fut` on cancel or
    /// deadline aborts whatever request it was driving.
    ///
    /// The ticker and deadline are polled ahead of `fut` so that a stream
    /// which is always ready still reports progress and still times out.
    pub(crate) async fn checkpoint<F: Future>(&mut self, fut: F, deadline: Instant) -> Outcome<F::Output> {
        if self.is_cancelled() {
            return Outcome::Cancelled;
        }
        tokio::pin!(fut);

        loop {
            tokio::select! {
                biased;
                _ = self.ticker.tick() => {
                    if self.is_cancelled() {
                        return Outcome::Cancelled;
                    }
                    if let Some(progress) = self.progress.as_mut() {
                        progress.advance();
                        let state = SpeedTestState::Testing {
                            progress: progress.value,
                            phase: progress.phase,
                        };
                        if self.bus.publish(&self.flag, state).is_err() {
                            return Outcome::Cancelled;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => return Outcome::TimedOut,
                out = &mut fut => return Outcome::Done(out),
            }
        }
    }
}
