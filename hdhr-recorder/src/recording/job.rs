//! One scheduled recording.
//!
//! A [`RecordingJob`] is bound to a trigger and runs every time it fires:
//!
//! ```text
//! IDLE -> ACQUIRING -> TUNING -> CAPTURING -> STOPPING -> RELEASED
//!            \            \          \            \
//!             +------------+----------+------------+--> ABORTED
//! ```
//!
//! The tuner is held through a [`TunerLease`], so it returns to the pool on
//! every path out of `record`, including errors and panics. A job never
//! waits for a tuner: if none is idle the recording is missed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime};
use futures::FutureExt;
use hdhr_schedule::{ChannelTarget, ScheduleEntry, TunerDescriptor};
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::scheduler::TriggerCallback;
use crate::tuner::{CommandOutcome, ControlError, TunerControl, TunerLease, TunerPool, TunerSetting};

/// Shared collaborators for every recording.
pub struct RecordingContext {
    pub pool: Arc<TunerPool>,
    pub control: Arc<dyn TunerControl>,
    pub clock: Arc<dyn Clock>,
    /// Cancelled at process shutdown; wakes captures early.
    pub shutdown: CancellationToken,
}

/// Lifecycle states of one recording run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordingState {
    Idle,
    Acquiring,
    Tuning,
    Capturing,
    Stopping,
    Released,
    Aborted,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingState::Idle => "IDLE",
            RecordingState::Acquiring => "ACQUIRING",
            RecordingState::Tuning => "TUNING",
            RecordingState::Capturing => "CAPTURING",
            RecordingState::Stopping => "STOPPING",
            RecordingState::Released => "RELEASED",
            RecordingState::Aborted => "ABORTED",
        };
        f.write_str(name)
    }
}

/// How a recording run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutcome {
    /// Captured through the end of the window and released the tuner.
    Completed,
    /// No tuner was idle at fire time.
    Missed,
    /// An unexpected failure ended the run in `state`.
    Aborted { state: RecordingState, reason: String },
}

/// A control program invocation that did not exit cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub action: String,
    pub outcome: CommandOutcome,
}

/// What happened during one run of a job.
#[derive(Debug, Clone)]
pub struct RecordingReport {
    pub program_name: String,
    pub tuner: Option<TunerDescriptor>,
    pub path: Option<PathBuf>,
    /// Every state entered, in order.
    pub trail: Vec<RecordingState>,
    pub failures: Vec<CommandFailure>,
    /// Status reported by the capture process.
    pub capture: Option<CommandOutcome>,
    pub outcome: RecordingOutcome,
}

impl RecordingReport {
    fn new(program_name: &str) -> Self {
        Self {
            program_name: program_name.to_string(),
            tuner: None,
            path: None,
            trail: vec![RecordingState::Idle],
            failures: Vec::new(),
            capture: None,
            outcome: RecordingOutcome::Missed,
        }
    }

    fn enter(&mut self, state: RecordingState) {
        debug!("Recording {}: {}", self.program_name, state);
        self.trail.push(state);
    }

    /// The state the run is currently in.
    pub fn state(&self) -> RecordingState {
        self.trail.last().copied().unwrap_or(RecordingState::Idle)
    }

    fn record_failure(&mut self, action: String, outcome: CommandOutcome) {
        self.failures.push(CommandFailure { action, outcome });
    }
}

/// Failures that abort a recording run.
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("Failed to create {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A schedule entry bound to its tuning parameters.
pub struct RecordingJob {
    base_dir: PathBuf,
    program_name: String,
    nominal_start: NaiveDateTime,
    duration_minutes: u32,
    physical_channel: String,
    program_number: String,
    context: Arc<RecordingContext>,
}

impl RecordingJob {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        entry: &ScheduleEntry,
        target: &ChannelTarget,
        context: Arc<RecordingContext>,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            program_name: entry.program_name.clone(),
            nominal_start: entry.start,
            duration_minutes: entry.duration_minutes,
            physical_channel: target.physical_channel.trim().to_string(),
            program_number: target.program_number.trim().to_string(),
            context,
        }
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    /// `<base>/<program>/<YYYY-MM-DD>.ts`
    pub fn output_path(&self, date: NaiveDate) -> PathBuf {
        self.base_dir
            .join(&self.program_name)
            .join(format!("{}.ts", date.format("%Y-%m-%d")))
    }

    /// Callback that runs this job each time its trigger fires.
    pub fn trigger_callback(self: &Arc<Self>) -> TriggerCallback {
        let job = Arc::clone(self);
        Arc::new(move || {
            let job = Arc::clone(&job);
            async move {
                let report = job.record().await;
                if !report.failures.is_empty() {
                    warn!(
                        "Recording {} finished with {} control failure(s)",
                        report.program_name,
                        report.failures.len()
                    );
                }
            }
            .boxed()
        })
    }

    /// Run one recording end to end.
    pub async fn record(&self) -> RecordingReport {
        let mut report = RecordingReport::new(&self.program_name);

        report.enter(RecordingState::Acquiring);
        let Some(lease) = self.context.pool.lease() else {
            debug!("No idle tuner for {}, recording missed", self.program_name);
            report.enter(RecordingState::Aborted);
            report.outcome = RecordingOutcome::Missed;
            return report;
        };
        report.tuner = Some(lease.tuner().clone());

        let result = self.run(&lease, &mut report).await;
        drop(lease);

        match result {
            Ok(()) => {
                report.enter(RecordingState::Released);
                report.outcome = RecordingOutcome::Completed;
            }
            Err(e) => {
                let state = report.state();
                error!("Recording {} aborted in {}: {}", self.program_name, state, e);
                report.enter(RecordingState::Aborted);
                report.outcome = RecordingOutcome::Aborted {
                    state,
                    reason: e.to_string(),
                };
            }
        }
        report
    }

    async fn run(
        &self,
        lease: &TunerLease,
        report: &mut RecordingReport,
    ) -> Result<(), RecordingError> {
        let tuner = lease.tuner();
        let control = &self.context.control;

        info!(
            "Started recording {} on device: ({}, {}:{})",
            self.program_name, tuner, self.physical_channel, self.program_number
        );

        report.enter(RecordingState::Tuning);
        for (setting, value) in [
            (TunerSetting::Channel, &self.physical_channel),
            (TunerSetting::Program, &self.program_number),
        ] {
            let outcome = control.set(tuner, setting, value).await?;
            if !outcome.success() {
                warn!(
                    "Setting {} {} on ({}) for {} failed: {}",
                    setting, value, tuner, self.program_name, outcome
                );
                report.record_failure(
                    format!("set {}/{} {}", tuner.control_path(), setting, value),
                    outcome,
                );
            }
        }

        report.enter(RecordingState::Capturing);
        let path = self.output_path(self.context.clock.now().date());
        ensure_parent(&path)?;
        report.path = Some(path.clone());

        let capture = control.save(tuner, &path).await?;

        let window = recording_window(
            self.nominal_start.time(),
            self.duration_minutes,
            self.context.clock.now(),
        );
        debug!("Recording {} to {} for {}s", self.program_name, path.display(), window.as_secs());

        tokio::select! {
            _ = tokio::time::sleep(window) => {}
            _ = self.context.shutdown.cancelled() => {
                info!("Stopping {} early for shutdown", self.program_name);
            }
        }

        report.enter(RecordingState::Stopping);
        let status = capture.stop().await?;

        info!(
            "Ended recording {} on device: ({}, {}:{}), status: {}",
            self.program_name,
            tuner,
            self.physical_channel,
            self.program_number,
            status.output.trim()
        );
        if !status.success() {
            report.record_failure(format!("save {}", tuner.control_path()), status.clone());
        }
        report.capture = Some(status);
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<(), RecordingError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| RecordingError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Time left until the program ends, measured from `now`.
///
/// The program is taken to have started at the latest `start_time` not
/// after `now`, so a run that fired late records for less time instead of
/// overrunning, and one that fired just past midnight still ends on time.
/// An elapsed window is zero.
pub fn recording_window(
    start_time: NaiveTime,
    duration_minutes: u32,
    now: NaiveDateTime,
) -> Duration {
    let mut started = now.date().and_time(start_time);
    if started > now {
        started -= ChronoDuration::days(1);
    }
    let end = started + ChronoDuration::minutes(i64::from(duration_minutes));
    (end - now).to_std().unwrap_or(Duration::ZERO)
}
