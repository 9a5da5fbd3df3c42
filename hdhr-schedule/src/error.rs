//! Error types for schedule and configuration parsing.

use thiserror::Error;

/// Errors produced while parsing a single schedule line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// The line could not be split into tokens (unbalanced quotes, dangling escape).
    #[error("Unterminated quoting or escape")]
    Unbalanced,

    /// The line did not contain exactly five fields.
    #[error("Expected 5 fields, got {0}")]
    FieldCount(usize),

    /// The start time is not in `YYYY-MM-DD HH:MM` form.
    #[error("Invalid start time: {0:?}")]
    StartTime(String),

    /// The duration is not a non-negative integer number of minutes.
    #[error("Invalid duration: {0:?}")]
    Duration(String),

    /// The recurrence field is neither `once` nor a valid day-of-week set.
    #[error(transparent)]
    Recurrence(#[from] DaySetError),
}

/// Errors produced while parsing a day-of-week specifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DaySetError {
    /// Empty specifier or empty list element.
    #[error("Empty day-of-week specifier")]
    Empty,

    /// Unknown day name or out-of-range day number.
    #[error("Unknown day of week: {0:?}")]
    UnknownDay(String),

    /// Invalid `/step` component.
    #[error("Invalid step: {0:?}")]
    Step(String),

    /// Range whose start is after its end.
    #[error("Invalid range: {0:?}")]
    Range(String),

    /// The resolved days were rejected by the cron parser.
    #[error("Invalid cron schedule {0}")]
    Cron(String),
}

/// Configuration-level errors for channel maps and tuner lists.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// Channel map value without a `physical, program` pair.
    #[error("Invalid channel map value for {channel:?}: {value:?}")]
    ChannelValue { channel: String, value: String },

    /// Virtual channel referenced by a schedule entry but absent from the map.
    #[error("Unknown virtual channel: {0:?}")]
    UnknownChannel(String),

    /// Tuner specification without a `device:index` pair.
    #[error("Invalid tuner specification: {0:?}")]
    TunerSpec(String),

    /// No tuners were configured.
    #[error("No tuners configured")]
    NoTuners,

    /// The same device and tuner number were listed more than once.
    #[error("Tuner listed more than once: {0}")]
    DuplicateTuner(String),
}
