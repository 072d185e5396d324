//! Clocks and the cooperative stage timers.
//! - Clock/StdClock/ManualClock: time sources, the manual one for deterministic tests
//! - StageTimers: one deadline per timer kind, polled by the session

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Monotonic time source for the session timers.
pub trait Clock {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Monotonic clock based on `std::time::Instant`.
#[derive(Debug, Clone)]
pub struct StdClock {
    start: Instant,
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Deterministic clock for tests; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current_time(&self) -> Duration {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Advance time by the given delta.
    pub fn advance(&self, delta: Duration) -> Duration {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.saturating_add(delta);
        *now
    }

    pub fn set_time(&self, time: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.current_time()
    }
}

/// The cooperative timeouts a session can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    StartupInfo,
    Capabilities,
    PreviousResults,
    InProgress,
    Inactivity,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::StartupInfo => "startup-info",
            Self::Capabilities => "capabilities",
            Self::PreviousResults => "previous-results",
            Self::InProgress => "in-progress",
            Self::Inactivity => "inactivity",
        };
        f.write_str(text)
    }
}

/// At most one deadline per kind; re-arming replaces it.
#[derive(Debug, Clone, Default)]
pub struct StageTimers {
    deadlines: Vec<(TimerKind, Duration)>,
}

impl StageTimers {
    /// Arm `kind` to fire `after` from `now`. A zero duration only disarms.
    pub fn arm(&mut self, kind: TimerKind, now: Duration, after: Duration) {
        self.disarm(kind);
        if !after.is_zero() {
            self.deadlines.push((kind, now.saturating_add(after)));
        }
    }

    pub fn disarm(&mut self, kind: TimerKind) {
        self.deadlines.retain(|(armed, _)| *armed != kind);
    }

    pub fn disarm_all(&mut self) {
        self.deadlines.clear();
    }

    #[must_use]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.deadlines.iter().any(|(armed, _)| *armed == kind)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.deadlines.iter().map(|(_, deadline)| *deadline).min()
    }

    /// Remove and return every timer whose deadline is at or before `now`, earliest first.
    pub fn take_due(&mut self, now: Duration) -> Vec<TimerKind> {
        let mut due: Vec<(TimerKind, Duration)> = self
            .deadlines
            .iter()
            .copied()
            .filter(|(_, deadline)| *deadline <= now)
            .collect();
        if due.is_empty() {
            return Vec::new();
        }
        self.deadlines.retain(|(_, deadline)| *deadline > now);
        due.sort_by_key(|(_, deadline)| *deadline);
        due.into_iter().map(|(kind, _)| kind).collect()
    }
}
