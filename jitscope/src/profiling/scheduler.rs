//! # Periodic Scheduling
//!
//! The reader registers one periodic event and toggles it on and off; it
//! never drives the clock itself. [`IntervalScheduler`] keeps the tick
//! schedule for the `jitscope` binary, which does the sleeping.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Handle to a registered periodic event
pub trait PeriodicTrigger {
    fn enable(&mut self);
    fn disable(&mut self);
    fn is_enabled(&self) -> bool;
}

/// Something that can register periodic events
pub trait PeriodicScheduler {
    /// Register an event firing every `interval`, initially disabled
    fn register_periodic(&mut self, interval: Duration) -> Box<dyn PeriodicTrigger>;
}

/// Trigger shared between the reader and an [`IntervalScheduler`]
#[derive(Debug, Clone)]
pub struct IntervalHandle {
    enabled: Rc<Cell<bool>>,
}

impl PeriodicTrigger for IntervalHandle {
    fn enable(&mut self) {
        self.enabled.set(true);
    }

    fn disable(&mut self) {
        self.enabled.set(false);
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }
}

/// Fixed-rate ticker for a single periodic event
#[derive(Debug, Default)]
pub struct IntervalScheduler {
    interval: Duration,
    next_tick: Option<Instant>,
    handle: Option<IntervalHandle>,
}

impl IntervalScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time left until the next tick, advancing the schedule past it
    ///
    /// Returns `None` if nothing has been registered. Missed ticks are
    /// skipped rather than replayed.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.handle.as_ref()?;

        let now = Instant::now();
        let tick = self.next_tick.map_or(now + self.interval, |tick| tick.max(now));
        self.next_tick = Some(tick + self.interval);
        Some(tick - now)
    }

    /// Is the registered event enabled?
    #[must_use]
    pub fn is_event_enabled(&self) -> bool {
        self.handle.as_ref().is_some_and(PeriodicTrigger::is_enabled)
    }

    /// The registered handle, if any
    #[must_use]
    pub fn handle(&self) -> Option<&IntervalHandle> {
        self.handle.as_ref()
    }
}

impl PeriodicScheduler for IntervalScheduler {
    fn register_periodic(&mut self, interval: Duration) -> Box<dyn PeriodicTrigger> {
        let handle = IntervalHandle { enabled: Rc::new(Cell::new(false)) };
        self.interval = interval;
        self.next_tick = None;
        self.handle = Some(handle.clone());
        Box::new(handle)
    }
}
