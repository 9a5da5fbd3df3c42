//! Wall clock abstraction.
//!
//! Schedules are expressed in local wall time, so every component that
//! compares against "now" goes through a [`Clock`].

use chrono::{Local, NaiveDateTime};

/// Source of the current local wall time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> NaiveDateTime;
}

/// The system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// A clock pinned to one instant.
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock(pub NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    /// A clock that starts at `base` and advances with tokio time.
    ///
    /// With `start_paused` tests this follows tokio's auto-advance, so
    /// sleeps and wall time stay consistent.
    #[derive(Debug, Clone, Copy)]
    pub struct TokioClock {
        base: NaiveDateTime,
        origin: tokio::time::Instant,
    }

    impl TokioClock {
        pub fn starting_at(base: NaiveDateTime) -> Self {
            Self {
                base,
                origin: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> NaiveDateTime {
            let elapsed = tokio::time::Instant::now() - self.origin;
            self.base
                + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
        }
    }

    /// Build a local datetime from its parts.
    pub fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, s))
            .expect("valid test datetime")
    }
}
