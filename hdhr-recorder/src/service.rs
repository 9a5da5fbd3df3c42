//! The recorder daemon's main loop.
//!
//! Each cycle builds a fresh [`CronScheduler`], fills it from the schedule
//! file and blocks until a reload or shutdown is requested. A reload throws
//! away every pending trigger and starts over; recordings already running
//! are tracked separately and keep going.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hdhr_schedule::ChannelMap;
use log::{error, info};
use thiserror::Error;
use tokio_util::task::TaskTracker;

use crate::recording::RecordingContext;
use crate::reload::{ReloadCoordinator, Wakeup};
use crate::scheduler::{CronScheduler, ScheduleTranslator, TranslateError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to load the initial schedule: {0}")]
    InitialSchedule(#[from] TranslateError),
}

/// Settings for [`Recorder`].
#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub media_dir: PathBuf,
    pub schedule_file: PathBuf,
    pub misfire_grace: Duration,
}

/// Owns the schedule lifecycle.
pub struct Recorder {
    settings: RecorderSettings,
    channels: ChannelMap,
    context: Arc<RecordingContext>,
    coordinator: Arc<ReloadCoordinator>,
    jobs: TaskTracker,
}

impl Recorder {
    pub fn new(
        settings: RecorderSettings,
        channels: ChannelMap,
        context: Arc<RecordingContext>,
        coordinator: Arc<ReloadCoordinator>,
    ) -> Self {
        Self {
            settings,
            channels,
            context,
            coordinator,
            jobs: TaskTracker::new(),
        }
    }

    /// Run until shutdown is requested, then wait for running recordings.
    ///
    /// An unreadable schedule file is fatal on the first load only; after a
    /// reload the daemon keeps running with no triggers until the next one.
    pub async fn run(&self) -> Result<(), ServiceError> {
        let translator =
            ScheduleTranslator::new(&self.settings.media_dir, Arc::clone(&self.context));
        let mut first = true;

        loop {
            self.coordinator.clear_reload();

            let scheduler = CronScheduler::new(
                Arc::clone(&self.context.clock),
                self.settings.misfire_grace,
                self.jobs.clone(),
            );

            match translator.translate(&self.settings.schedule_file, &self.channels, &scheduler) {
                Ok(summary) => info!(
                    "Loaded {}: {} trigger(s) installed, {} expired, {} malformed, {} rejected",
                    self.settings.schedule_file.display(),
                    summary.installed,
                    summary.expired,
                    summary.malformed,
                    summary.rejected
                ),
                Err(e) if first => {
                    scheduler.shutdown().await;
                    return Err(e.into());
                }
                Err(e) => error!("{}", e),
            }
            first = false;

            let wakeup = self.coordinator.wait().await;
            scheduler.shutdown().await;

            match wakeup {
                Wakeup::Reload => info!("Reloading the schedule-file"),
                Wakeup::Shutdown => break,
            }
        }

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        self.jobs.close();
        if !self.jobs.is_empty() {
            info!("Waiting for {} running recording(s) to stop", self.jobs.len());
        }
        self.jobs.wait().await;
        info!("All recordings stopped");
    }
}
