//! Time-based triggers.
//!
//! A [`TriggerScheduler`] runs callbacks at wall-clock moments, either once
//! or weekly on a set of days. [`CronScheduler`] is the tokio
//! implementation used by the daemon.
//!
//! # How It Works
//!
//! 1. Each installed trigger gets its own task that computes the next fire
//!    time, from a [`cron::Schedule`] for weekly triggers
//! 2. The task sleeps towards it in bounded slices, re-reading the wall clock
//! 3. A firing later than the misfire grace is skipped with a warning
//! 4. The callback runs as a separate task tracked outside the scheduler,
//!    so cancelling the scheduler never interrupts a running recording

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use futures::future::BoxFuture;
use hdhr_schedule::{DaySet, DaySetError};
use log::{debug, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::clock::Clock;

/// Longest single sleep before the wall clock is consulted again.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Callback run when a trigger fires.
pub type TriggerCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Scheduler errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// The scheduler was cancelled and accepts no new triggers.
    #[error("Scheduler has been shut down")]
    Shutdown,

    /// The day set could not be turned into a cron schedule.
    #[error(transparent)]
    Recurrence(#[from] DaySetError),
}

/// When a trigger fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Exactly once, at the given local time.
    Once(NaiveDateTime),
    /// Every time the cron schedule matches.
    Recurring(cron::Schedule),
}

impl Trigger {
    /// A weekly trigger at `time_of_day` on every day in `days`.
    pub fn weekly(time_of_day: NaiveTime, days: DaySet) -> Result<Self, DaySetError> {
        days.schedule_at(time_of_day).map(Trigger::Recurring)
    }

    /// The first fire time strictly after `after`.
    pub fn next_fire_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Trigger::Once(at) => (*at > after).then_some(*at),
            // Wall-clock times carry no offset; evaluate them on a fixed-offset zone
            Trigger::Recurring(schedule) => schedule
                .after(&Utc.from_utc_datetime(&after))
                .next()
                .map(|at| at.naive_utc()),
        }
    }
}

/// Installs callbacks to run at computed wall-clock times.
pub trait TriggerScheduler: Send + Sync {
    /// Run `callback` at `time_of_day` on each day in `days`.
    fn install_recurring(
        &self,
        name: &str,
        time_of_day: NaiveTime,
        days: DaySet,
        callback: TriggerCallback,
    ) -> Result<(), SchedulerError>;

    /// Run `callback` once at `at`.
    fn install_once(
        &self,
        name: &str,
        at: NaiveDateTime,
        callback: TriggerCallback,
    ) -> Result<(), SchedulerError>;

    /// Drop every trigger that has not fired yet.
    ///
    /// Callbacks that are already running are not affected.
    fn cancel_all(&self);
}

/// Tokio-based [`TriggerScheduler`].
pub struct CronScheduler {
    clock: Arc<dyn Clock>,
    misfire_grace: ChronoDuration,
    cancel: CancellationToken,
    /// Trigger loops owned by this scheduler.
    triggers: TaskTracker,
    /// Running callbacks; shared with the owner so they can outlive us.
    jobs: TaskTracker,
    installed: AtomicUsize,
}

impl CronScheduler {
    /// Create a scheduler whose callbacks are spawned on `jobs`.
    pub fn new(clock: Arc<dyn Clock>, misfire_grace: Duration, jobs: TaskTracker) -> Self {
        Self {
            clock,
            misfire_grace: ChronoDuration::from_std(misfire_grace)
                .unwrap_or_else(|_| ChronoDuration::seconds(60)),
            cancel: CancellationToken::new(),
            triggers: TaskTracker::new(),
            jobs,
            installed: AtomicUsize::new(0),
        }
    }

    /// Number of triggers installed since creation.
    pub fn trigger_count(&self) -> usize {
        self.installed.load(Ordering::SeqCst)
    }

    /// Cancel every pending trigger and wait for the trigger loops to exit.
    pub async fn shutdown(&self) {
        self.cancel_all();
        self.triggers.close();
        self.triggers.wait().await;
        debug!("CronScheduler: all triggers stopped");
    }

    fn install(
        &self,
        name: &str,
        trigger: Trigger,
        callback: TriggerCallback,
    ) -> Result<(), SchedulerError> {
        if self.cancel.is_cancelled() {
            return Err(SchedulerError::Shutdown);
        }

        let runner = TriggerRunner {
            name: name.to_string(),
            trigger,
            callback,
            clock: Arc::clone(&self.clock),
            misfire_grace: self.misfire_grace,
            cancel: self.cancel.clone(),
            jobs: self.jobs.clone(),
        };
        self.triggers.spawn(runner.run());
        self.installed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl TriggerScheduler for CronScheduler {
    fn install_recurring(
        &self,
        name: &str,
        time_of_day: NaiveTime,
        days: DaySet,
        callback: TriggerCallback,
    ) -> Result<(), SchedulerError> {
        debug!("CronScheduler: \"{}\" at {} on {}", name, time_of_day, days);
        self.install(name, Trigger::weekly(time_of_day, days)?, callback)
    }

    fn install_once(
        &self,
        name: &str,
        at: NaiveDateTime,
        callback: TriggerCallback,
    ) -> Result<(), SchedulerError> {
        debug!("CronScheduler: \"{}\" once at {}", name, at);
        self.install(name, Trigger::Once(at), callback)
    }

    fn cancel_all(&self) {
        if !self.cancel.is_cancelled() {
            info!("CronScheduler: cancelling {} trigger(s)", self.trigger_count());
            self.cancel.cancel();
        }
    }
}

/// The task behind one installed trigger.
struct TriggerRunner {
    name: String,
    trigger: Trigger,
    callback: TriggerCallback,
    clock: Arc<dyn Clock>,
    misfire_grace: ChronoDuration,
    cancel: CancellationToken,
    jobs: TaskTracker,
}

impl TriggerRunner {
    async fn run(self) {
        let running = Arc::new(AtomicBool::new(false));
        let mut after = self.clock.now();

        while let Some(fire_at) = self.trigger.next_fire_after(after) {
            if !self.sleep_until(fire_at).await {
                return;
            }
            after = fire_at;

            // Whole seconds, so wake-up jitter never counts against a zero grace
            let late = self.clock.now() - fire_at;
            if late.num_seconds() > self.misfire_grace.num_seconds() {
                warn!(
                    "Run time of \"{}\" ({}) was missed by {}s",
                    self.name,
                    fire_at,
                    late.num_seconds()
                );
                continue;
            }

            if running.swap(true, Ordering::SeqCst) {
                warn!(
                    "Skipping \"{}\" at {}: previous run still in progress",
                    self.name, fire_at
                );
                continue;
            }

            debug!("Firing \"{}\" scheduled at {}", self.name, fire_at);
            let guard = RunningGuard(Arc::clone(&running));
            let job = (self.callback)();
            self.jobs.spawn(async move {
                let _guard = guard;
                job.await;
            });
        }

        debug!("\"{}\" has no further fire times", self.name);
    }

    /// Sleep until the wall clock reaches `at`. Returns false if cancelled.
    async fn sleep_until(&self, at: NaiveDateTime) -> bool {
        loop {
            let remaining = match (at - self.clock.now()).to_std() {
                Ok(remaining) if !remaining.is_zero() => remaining,
                _ => return true,
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(remaining.min(MAX_SLEEP)) => {}
            }
        }
    }
}

/// Clears the per-trigger running flag when a callback finishes or unwinds.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
