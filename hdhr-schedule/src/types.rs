//! Data model shared by the schedule parser and the recorder.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDateTime;

use crate::days::DaySet;
use crate::error::ScheduleError;

/// Start time format used in schedule files.
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Recurrence literal for one-shot entries.
pub const ONCE: &str = "once";

/// Legacy recurrence literal for one-shot entries.
pub const LEGACY_ONCE: &str = "9";

/// One physical tuner on a network tuner device.
///
/// Lower `priority` values are handed out first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TunerDescriptor {
    pub priority: i32,
    pub device_id: String,
    pub tuner_index: String,
}

impl TunerDescriptor {
    pub fn new(
        priority: i32,
        device_id: impl Into<String>,
        tuner_index: impl Into<String>,
    ) -> Self {
        Self {
            priority,
            device_id: device_id.into(),
            tuner_index: tuner_index.into(),
        }
    }

    /// Path of this tuner in the device's control namespace, e.g. `/tuner0`.
    pub fn control_path(&self) -> String {
        format!("/tuner{}", self.tuner_index)
    }
}

impl fmt::Display for TunerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.device_id, self.tuner_index)
    }
}

/// Whether a schedule entry fires once or repeats weekly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Once,
    Weekly(DaySet),
}

impl Recurrence {
    /// Interpret a recurrence field. `once` and the legacy `9` are one-shot.
    pub fn parse(spec: &str) -> Result<Self, crate::error::DaySetError> {
        let spec = spec.trim();
        if spec.eq_ignore_ascii_case(ONCE) || spec == LEGACY_ONCE {
            Ok(Recurrence::Once)
        } else {
            DaySet::parse(spec).map(Recurrence::Weekly)
        }
    }
}

/// One parsed schedule line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub program_name: String,
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub virtual_channel: String,
    pub recurrence: Recurrence,
}

/// Physical tuning parameters for a virtual channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelTarget {
    /// Modulation channel, e.g. `8vsb:3`.
    pub physical_channel: String,
    /// Program (sub-channel) number within the multiplex.
    pub program_number: String,
}

impl ChannelTarget {
    pub fn new(physical_channel: impl Into<String>, program_number: impl Into<String>) -> Self {
        Self {
            physical_channel: physical_channel.into(),
            program_number: program_number.into(),
        }
    }
}

impl fmt::Display for ChannelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.physical_channel, self.program_number)
    }
}

/// Virtual channel to physical tuning parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMap {
    channels: HashMap<String, ChannelTarget>,
}

impl ChannelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from raw `virtual = "physical, program"` pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Result<Self, ScheduleError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut map = ChannelMap::new();
        for (channel, value) in entries {
            let target = crate::parser::parse_channel_value(channel.as_ref(), value.as_ref())?;
            map.insert(channel.as_ref().trim(), target);
        }
        Ok(map)
    }

    pub fn insert(&mut self, virtual_channel: impl Into<String>, target: ChannelTarget) {
        self.channels.insert(virtual_channel.into(), target);
    }

    /// Look up the tuning parameters for a virtual channel.
    pub fn resolve(&self, virtual_channel: &str) -> Result<&ChannelTarget, ScheduleError> {
        self.channels
            .get(virtual_channel.trim())
            .ok_or_else(|| ScheduleError::UnknownChannel(virtual_channel.to_string()))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
