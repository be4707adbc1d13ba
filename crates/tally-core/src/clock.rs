//! Injectable time source and day arithmetic.
//!
//! Every component reads time through a [`Clock`] so tests can drive the
//! store deterministically with a [`ManualClock`]. Day-level helpers live
//! here too, so that "whole days elapsed" and "same calendar date" are
//! computed the same way everywhere.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Utc};

/// A source of the current time.
pub trait Clock: Send + Sync + core::fmt::Debug {
    /// Return the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Time is stored as Unix milliseconds in an atomic so the clock can be
/// shared across tasks without a lock.
#[derive(Debug)]
pub struct ManualClock {
    /// Current time in Unix milliseconds.
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::Release);
    }

    /// Move forward (or backward, for a negative delta) by `delta`.
    ///
    /// Saturates at the representable range instead of overflowing.
    pub fn advance(&self, delta: TimeDelta) {
        let current = self.millis.load(Ordering::Acquire);
        let next = current.saturating_add(delta.num_milliseconds());
        self.millis.store(next, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::Acquire)).unwrap_or_default()
    }
}

/// Whole days elapsed from `since` to `now`, truncated toward zero.
///
/// Negative when `since` lies in the future.
pub fn elapsed_whole_days(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(since).num_days()
}

/// Calendar date of `at` as seen from `offset`.
pub fn calendar_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

/// `now` minus `days` whole days, clamped to the earliest representable
/// instant.
pub fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
