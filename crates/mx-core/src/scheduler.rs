//! Callback scheduler for driver timers.
//!
//! Drivers that emulate continuous behavior in software (a pulse train, a
//! motor settling, a gate delay) register a timer with the database's
//! [`CallbackScheduler`] instead of running a thread. When a timer falls due,
//! the scheduler sends a single [`Tick`] message on its channel; the database
//! drains the channel and hands each tick to the owning driver's `on_tick`,
//! one at a time, from the same context that dispatches class operations.
//!
//! Each timer has at most one pending firing. One-shot timers stay registered
//! after they fire and are re-armed by the callback with
//! [`CallbackScheduler::restart`]; periodic timers re-arm themselves.
//!
//! Time comes from a [`Clock`]: [`SystemClock`] in production,
//! [`ManualClock`] in tests.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{MxError, Result};
use crate::limits::MIN_TIMER_PERIOD;
use crate::types::RecordId;

// =============================================================================
// Clocks
// =============================================================================

/// Monotonic time source shared by the scheduler and the drivers.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

// =============================================================================
// Timers
// =============================================================================

/// Handle of a registered timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Firing behavior of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once per arming.
    OneShot(Duration),
    /// Fires every period until cancelled.
    Periodic(Duration),
}

impl TimerKind {
    fn interval(self) -> Duration {
        match self {
            TimerKind::OneShot(d) | TimerKind::Periodic(d) => d,
        }
    }
}

/// Message delivered to a driver when one of its timers fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub timer: TimerId,
    pub record: RecordId,
    /// When the firing was due, which may be earlier than delivery.
    pub deadline: Instant,
}

#[derive(Debug)]
struct TimerEntry {
    owner: RecordId,
    kind: TimerKind,
    /// Bumped on every re-arm or cancel; stale heap entries are skipped.
    generation: u64,
    armed: bool,
    /// A tick has been sent and not yet taken by `next_tick`.
    in_flight: bool,
}

/// Timer table plus the tick channel.
pub struct CallbackScheduler {
    clock: Arc<dyn Clock>,
    timers: HashMap<TimerId, TimerEntry>,
    queue: BinaryHeap<Reverse<(Instant, TimerId, u64)>>,
    next_id: u64,
    tx: mpsc::UnboundedSender<Tick>,
    rx: mpsc::UnboundedReceiver<Tick>,
}

impl CallbackScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            clock,
            timers: HashMap::new(),
            queue: BinaryHeap::new(),
            next_id: 1,
            tx,
            rx,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Registers and arms a timer owned by `owner`.
    pub fn start(&mut self, owner: RecordId, kind: TimerKind) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.insert(
            id,
            TimerEntry {
                owner,
                kind,
                generation: 0,
                armed: false,
                in_flight: false,
            },
        );
        self.arm(id, kind.interval());
        debug!("Timer {:?} started for record {} ({:?})", id, owner, kind);
        id
    }

    /// Re-arms a registered timer, replacing any pending firing.
    pub fn restart(&mut self, timer: TimerId) -> Result<()> {
        let interval = self
            .timers
            .get(&timer)
            .map(|entry| entry.kind.interval())
            .ok_or_else(|| unknown_timer(timer))?;
        self.arm(timer, interval);
        Ok(())
    }

    /// Removes a timer. Cancelling an unknown timer is a no-op.
    pub fn cancel(&mut self, timer: TimerId) {
        if self.timers.remove(&timer).is_some() {
            debug!("Timer {:?} cancelled", timer);
        }
    }

    /// Removes every timer owned by `owner`, returning how many there were.
    pub fn cancel_all(&mut self, owner: RecordId) -> usize {
        let before = self.timers.len();
        self.timers.retain(|_, entry| entry.owner != owner);
        before - self.timers.len()
    }

    pub fn is_armed(&self, timer: TimerId) -> bool {
        self.timers.get(&timer).is_some_and(|entry| entry.armed)
    }

    pub fn timers_owned_by(&self, owner: RecordId) -> usize {
        self.timers.values().filter(|e| e.owner == owner).count()
    }

    fn arm(&mut self, timer: TimerId, interval: Duration) {
        let deadline = self.clock.now() + interval;
        if let Some(entry) = self.timers.get_mut(&timer) {
            entry.generation += 1;
            entry.armed = true;
            self.queue.push(Reverse((deadline, timer, entry.generation)));
        }
    }

    /// Sends a tick for every timer due at the current clock time.
    ///
    /// A timer whose previous tick is still undelivered gets no second one;
    /// the queued tick stands for both firings. Returns the number of ticks
    /// sent.
    pub(crate) fn poll(&mut self) -> usize {
        let now = self.clock.now();
        let mut sent = 0;

        while let Some(Reverse((deadline, timer, generation))) = self.queue.peek().copied() {
            if deadline > now {
                break;
            }
            self.queue.pop();

            let Some(entry) = self.timers.get_mut(&timer) else {
                continue;
            };
            if entry.generation != generation || !entry.armed {
                continue;
            }

            match entry.kind {
                TimerKind::OneShot(_) => entry.armed = false,
                TimerKind::Periodic(period) => {
                    // Missed periods collapse into one firing.
                    let period = period.max(MIN_TIMER_PERIOD);
                    let mut next = deadline + period;
                    while next <= now {
                        next += period;
                    }
                    self.queue.push(Reverse((next, timer, generation)));
                }
            }

            if entry.in_flight {
                continue;
            }
            let tick = Tick {
                timer,
                record: entry.owner,
                deadline,
            };
            if self.tx.send(tick).is_ok() {
                entry.in_flight = true;
                sent += 1;
            }
        }
        sent
    }

    /// Takes the next delivered tick, if any.
    pub fn next_tick(&mut self) -> Option<Tick> {
        let tick = self.rx.try_recv().ok()?;
        if let Some(entry) = self.timers.get_mut(&tick.timer) {
            entry.in_flight = false;
        }
        Some(tick)
    }

    /// Earliest pending deadline, for callers that sleep between polls.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue
            .iter()
            .filter(|Reverse((_, timer, generation))| {
                self.timers
                    .get(timer)
                    .is_some_and(|e| e.armed && e.generation == *generation)
            })
            .map(|Reverse((deadline, _, _))| *deadline)
            .min()
    }
}

fn unknown_timer(timer: TimerId) -> MxError {
    MxError::not_found("restart_timer", format!("timer {:?} is not registered", timer))
}

impl std::fmt::Debug for CallbackScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackScheduler")
            .field("timers", &self.timers.len())
            .field("pending", &self.queue.len())
            .finish()
    }
}
