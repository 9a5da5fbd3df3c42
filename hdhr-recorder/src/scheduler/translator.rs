//! Schedule file to trigger translation.
//!
//! Every line of the schedule file becomes a [`RecordingJob`] installed on a
//! [`TriggerScheduler`]. Problems are contained to the line that caused
//! them:
//!
//! - blank lines and `#` comments are skipped silently
//! - lines that do not split into five fields are logged and skipped
//! - bad start times, durations, recurrences and unknown channels reject
//!   the entry and translation continues
//! - one-shot entries whose start time has passed are never installed

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hdhr_schedule::{parse_schedule_line, ChannelMap, LineError, Recurrence, ScheduleEntry};
use log::{debug, error, warn};
use thiserror::Error;

use crate::recording::{RecordingContext, RecordingJob};
use crate::scheduler::TriggerScheduler;

/// Errors that stop a whole translation.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Failed to read schedule file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-line results of one translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslateSummary {
    /// Triggers installed.
    pub installed: usize,
    /// One-shot entries already in the past.
    pub expired: usize,
    /// Lines with the wrong shape.
    pub malformed: usize,
    /// Well-formed lines with invalid values or unknown channels.
    pub rejected: usize,
}

/// Builds recording triggers from schedule files.
pub struct ScheduleTranslator {
    media_dir: PathBuf,
    context: Arc<RecordingContext>,
}

impl ScheduleTranslator {
    pub fn new(media_dir: impl Into<PathBuf>, context: Arc<RecordingContext>) -> Self {
        Self {
            media_dir: media_dir.into(),
            context,
        }
    }

    /// Read `schedule_file` and install a trigger for every valid entry.
    pub fn translate(
        &self,
        schedule_file: &Path,
        channels: &ChannelMap,
        scheduler: &dyn TriggerScheduler,
    ) -> Result<TranslateSummary, TranslateError> {
        let contents =
            std::fs::read_to_string(schedule_file).map_err(|source| TranslateError::Read {
                path: schedule_file.to_path_buf(),
                source,
            })?;
        Ok(self.translate_str(&contents, channels, scheduler))
    }

    /// Install triggers for every valid entry in `contents`.
    pub fn translate_str(
        &self,
        contents: &str,
        channels: &ChannelMap,
        scheduler: &dyn TriggerScheduler,
    ) -> TranslateSummary {
        let mut summary = TranslateSummary::default();

        for (index, line) in contents.lines().enumerate() {
            let line_no = index + 1;
            match parse_schedule_line(line) {
                Ok(None) => {}
                Ok(Some(entry)) => self.install(entry, line_no, channels, scheduler, &mut summary),
                Err(LineError::Unbalanced | LineError::FieldCount(_)) => {
                    warn!("Incorrect line {}: {}", line_no, line);
                    summary.malformed += 1;
                }
                Err(e) => {
                    warn!("Rejected line {}: {} ({})", line_no, e, line.trim());
                    summary.rejected += 1;
                }
            }
        }

        summary
    }

    fn install(
        &self,
        entry: ScheduleEntry,
        line_no: usize,
        channels: &ChannelMap,
        scheduler: &dyn TriggerScheduler,
        summary: &mut TranslateSummary,
    ) {
        let target = match channels.resolve(&entry.virtual_channel) {
            Ok(target) => target,
            Err(e) => {
                error!("Rejected line {} ({}): {}", line_no, entry.program_name, e);
                summary.rejected += 1;
                return;
            }
        };

        let job = Arc::new(RecordingJob::new(
            &self.media_dir,
            &entry,
            target,
            Arc::clone(&self.context),
        ));
        let start = entry.start;

        let result = match entry.recurrence {
            Recurrence::Weekly(days) => {
                let callback = job.trigger_callback();
                scheduler.install_recurring(job.program_name(), start.time(), days, callback)
            }
            Recurrence::Once => {
                if start <= self.context.clock.now() {
                    debug!("Skipping {}: start time {} has passed", entry.program_name, start);
                    summary.expired += 1;
                    return;
                }
                scheduler.install_once(job.program_name(), start, job.trigger_callback())
            }
        };

        match result {
            Ok(()) => summary.installed += 1,
            Err(e) => {
                error!("Failed to schedule {}: {}", entry.program_name, e);
                summary.rejected += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::{at, FixedClock};
    use crate::scheduler::{SchedulerError, TriggerCallback};
    use crate::testing::FakeControl;
    use crate::tuner::TunerPool;
    use chrono::{NaiveDateTime, NaiveTime};
    use hdhr_schedule::{DaySet, TunerDescriptor};
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Installed {
        Once(String, NaiveDateTime),
        Recurring(String, NaiveTime, DaySet),
    }

    /// Keeps installed triggers so tests can inspect and fire them.
    #[derive(Default)]
    struct FakeScheduler {
        installed: Mutex<Vec<(Installed, TriggerCallback)>>,
        closed: bool,
    }

    impl FakeScheduler {
        fn installed(&self) -> Vec<Installed> {
            self.installed.lock().iter().map(|(i, _)| i.clone()).collect()
        }

        fn callback(&self, index: usize) -> TriggerCallback {
            Arc::clone(&self.installed.lock()[index].1)
        }
    }

    impl TriggerScheduler for FakeScheduler {
        fn install_recurring(
            &self,
            name: &str,
            time_of_day: NaiveTime,
            days: DaySet,
            callback: TriggerCallback,
        ) -> Result<(), SchedulerError> {
            if self.closed {
                return Err(SchedulerError::Shutdown);
            }
            self.installed
                .lock()
                .push((Installed::Recurring(name.to_string(), time_of_day, days), callback));
            Ok(())
        }

        fn install_once(
            &self,
            name: &str,
            at: NaiveDateTime,
            callback: TriggerCallback,
        ) -> Result<(), SchedulerError> {
            if self.closed {
                return Err(SchedulerError::Shutdown);
            }
            self.installed
                .lock()
                .push((Installed::Once(name.to_string(), at), callback));
            Ok(())
        }

        fn cancel_all(&self) {
            self.installed.lock().clear();
        }
    }

    fn translator(now: NaiveDateTime) -> (ScheduleTranslator, Arc<FakeControl>, tempfile::TempDir) {
        let control = Arc::new(FakeControl::ok());
        let context = Arc::new(RecordingContext {
            pool: Arc::new(TunerPool::new([TunerDescriptor::new(0, "ABCD1234", "0")])),
            control: control.clone(),
            clock: Arc::new(FixedClock(now)),
            shutdown: CancellationToken::new(),
        });
        let media = tempfile::tempdir().unwrap();
        (ScheduleTranslator::new(media.path(), context), control, media)
    }

    fn channels() -> ChannelMap {
        ChannelMap::from_entries([("5", "8vsb:3, 4"), ("7.1", "qam256:7, 1")]).unwrap()
    }

    const SCHEDULE: &str = r#"
# program             start               minutes  channel  days
"NewsHour"            "2024-01-01 18:00"  30       5        once
'Morning Show'        "2023-12-01 07:30"  60       7.1      mon-fri

bad line with too few fields
"Old Movie"           "2023-12-25 20:00"  120      5        once
"Legacy Once"         "2024-01-02 09:00"  15       5        9
"Nowhere"             "2024-01-01 20:00"  30       99       once
"Bad Days"            "2024-01-01 20:00"  30       5        someday
"Unclosed             "2024-01-01 20:00"  30       5        once
"Weekend"             2024-01-06 12:15    45       7.1      sat,sun
"#;

    #[test]
    fn test_translate_mixed_schedule() {
        let (translator, _control, _media) = translator(at(2024, 1, 1, 12, 0, 0));
        let scheduler = FakeScheduler::default();

        let summary = translator.translate_str(SCHEDULE, &channels(), &scheduler);

        assert_eq!(
            summary,
            TranslateSummary {
                installed: 4,
                expired: 1,
                malformed: 2,
                rejected: 2,
            }
        );
        assert_eq!(
            scheduler.installed(),
            vec![
                Installed::Once("NewsHour".to_string(), at(2024, 1, 1, 18, 0, 0)),
                Installed::Recurring(
                    "Morning Show".to_string(),
                    NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
                    DaySet::parse("mon-fri").unwrap()
                ),
                Installed::Once("Legacy Once".to_string(), at(2024, 1, 2, 9, 0, 0)),
                Installed::Recurring(
                    "Weekend".to_string(),
                    NaiveTime::from_hms_opt(12, 15, 0).unwrap(),
                    DaySet::parse("sat,sun").unwrap()
                ),
            ]
        );
    }

    #[test]
    fn test_malformed_line_does_not_stop_translation() {
        let (translator, _control, _media) = translator(at(2024, 1, 1, 12, 0, 0));
        let scheduler = FakeScheduler::default();

        let summary = translator.translate_str(
            "bad line with too few fields\n\"NewsHour\" \"2024-01-01 18:00\" 30 5 once\n",
            &channels(),
            &scheduler,
        );

        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.installed, 1);
    }

    #[test]
    fn test_start_time_equal_to_now_is_expired() {
        let (translator, _control, _media) = translator(at(2024, 1, 1, 18, 0, 0));
        let scheduler = FakeScheduler::default();

        let summary = translator.translate_str(
            "\"NewsHour\" \"2024-01-01 18:00\" 30 5 once\n",
            &channels(),
            &scheduler,
        );

        assert_eq!(summary.expired, 1);
        assert!(scheduler.installed().is_empty());
    }

    #[test]
    fn test_scheduler_refusal_is_rejection() {
        let (translator, _control, _media) = translator(at(2024, 1, 1, 12, 0, 0));
        let scheduler = FakeScheduler {
            closed: true,
            ..Default::default()
        };

        let summary = translator.translate_str(
            "\"NewsHour\" \"2024-01-01 18:00\" 30 5 once\n",
            &channels(),
            &scheduler,
        );
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.installed, 0);
    }

    #[test]
    fn test_missing_schedule_file() {
        let (translator, _control, media) = translator(at(2024, 1, 1, 12, 0, 0));
        let scheduler = FakeScheduler::default();

        let err = translator
            .translate(&media.path().join("missing"), &channels(), &scheduler)
            .unwrap_err();
        assert!(matches!(err, TranslateError::Read { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_installed_callback_runs_the_recording() {
        let (translator, control, media) = translator(at(2024, 1, 1, 18, 0, 0));
        let scheduler = FakeScheduler::default();

        let schedule = media.path().join("schedule-file");
        std::fs::write(&schedule, "\"NewsHour\" \"2024-01-01 18:00\" 30 5 mon\n").unwrap();
        let summary = translator.translate(&schedule, &channels(), &scheduler).unwrap();
        assert_eq!(summary.installed, 1);

        (scheduler.callback(0))().await;

        let calls = control.calls();
        assert_eq!(calls[0], "ABCD1234 set /tuner0/channel 8vsb:3");
        assert_eq!(calls[1], "ABCD1234 set /tuner0/program 4");
        assert!(calls[2].ends_with(&format!("NewsHour{}2024-01-01.ts", std::path::MAIN_SEPARATOR)));
        assert_eq!(calls[3], "stop after 1800s");
    }
}
