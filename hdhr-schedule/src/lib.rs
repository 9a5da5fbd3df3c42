//! Schedule, channel map and tuner definitions for hdhr-recorder.
//!
//! This crate holds the I/O-free half of the recorder: the data model and
//! the parsers for the operator-edited inputs.
//!
//! - [`ScheduleEntry`]: one line of the schedule file
//! - [`Recurrence`] / [`DaySet`]: one-shot or weekly recurrence, scheduled
//!   through [`cron::Schedule`]
//! - [`ChannelMap`]: virtual channel to physical tuning parameters
//! - [`TunerDescriptor`]: one physical tuner with its allocation priority
//! - [`scan`]: parsing of channel scan output for config generation
//!
//! # Example
//!
//! ```rust
//! use hdhr_schedule::{parse_schedule_line, ChannelMap, Recurrence};
//!
//! let channels = ChannelMap::from_entries([("5", "8vsb:3, 4")]).unwrap();
//!
//! let entry = parse_schedule_line(r#""NewsHour" "2024-01-01 18:00" 30 5 once"#)
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(entry.recurrence, Recurrence::Once);
//!
//! let target = channels.resolve(&entry.virtual_channel).unwrap();
//! assert_eq!(target.physical_channel, "8vsb:3");
//! assert_eq!(target.program_number, "4");
//! ```

pub mod days;
pub mod error;
pub mod parser;
pub mod scan;
pub mod types;

pub use days::DaySet;
pub use error::{DaySetError, LineError, ScheduleError};
pub use parser::{
    ensure_distinct_tuners, is_ignorable, parse_channel_value, parse_schedule_line,
    parse_start_time, parse_tuner_list, tokenize,
};
pub use types::{
    ChannelMap, ChannelTarget, Recurrence, ScheduleEntry, TunerDescriptor, START_TIME_FORMAT,
};
