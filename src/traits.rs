//! Collaborator traits for testability and abstraction.
//!
//! The store does not talk to the outside world directly. Observers, the
//! clock and the wake-up scheduler are injected values implementing the
//! traits below, so tests can substitute deterministic doubles.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// A sink for change notifications.
///
/// After every committed transaction the provider calls [`ChangeSink::notify`]
/// exactly once for each distinct resource path whose underlying data changed.
/// Nothing is delivered for rolled-back transactions.
pub trait ChangeSink: Send + Sync {
    /// Notify observers that the given resource changed.
    fn notify(&self, resource: &str);
}

/// A [`ChangeSink`] that discards all notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ChangeSink for NoopSink {
    fn notify(&self, _resource: &str) {}
}

/// A [`ChangeSink`] that records notifications, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    notified: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications received so far, in delivery order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn notifications(&self) -> Vec<String> {
        self.notified.lock().unwrap().clone()
    }

    /// Drop all recorded notifications.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear(&self) {
        self.notified.lock().unwrap().clear();
    }
}

impl ChangeSink for RecordingSink {
    fn notify(&self, resource: &str) {
        self.notified.lock().unwrap().push(resource.to_string());
    }
}

/// A source of "now", in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// The current time in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;
}

/// A [`Clock`] backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[allow(clippy::cast_possible_truncation)]
    fn now_millis(&self) -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as i64)
    }
}

/// A [`Clock`] frozen at a fixed instant, for tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_millis(&self) -> i64 {
        self.0
    }
}

/// A service that wakes the caller at a given time.
///
/// The provider reports the next upcoming start or due timestamp across all
/// open instances, so an external alarm facility can reschedule itself.
pub trait Scheduler: Send + Sync {
    /// Request a wake-up at the given time (milliseconds since the epoch).
    fn schedule(&self, at_millis: i64);
}

/// A [`Scheduler`] that records the most recent request, for tests.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Option<i64>>,
}

impl RecordingScheduler {
    /// Create a scheduler with no recorded request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently requested wake-up time, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn last_scheduled(&self) -> Option<i64> {
        *self.scheduled.lock().unwrap()
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule(&self, at_millis: i64) {
        *self.scheduled.lock().unwrap() = Some(at_millis);
    }
}
