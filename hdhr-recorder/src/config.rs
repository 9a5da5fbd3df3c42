//! Configuration file format.
//!
//! ```toml
//! tuners = "1234ABCD:0, 1234ABCD:1"
//!
//! [global]
//! media_dir = "/media/recordings"
//! schedule_file = "schedule-file"
//! hdhomerun_config = "/usr/bin/hdhomerun_config"
//!
//! [logging]
//! log_dir = "logs"
//! retention_days = 7
//!
//! [channelmap]
//! "5" = "8vsb:3, 4"
//! ```
//!
//! `tuners` can also be an array of tables with explicit priorities:
//!
//! ```toml
//! [[tuners]]
//! device_id = "1234ABCD"
//! tuner = 1
//! priority = 0
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hdhr_schedule::{
    ensure_distinct_tuners, parse_tuner_list, ChannelMap, ScheduleError, TunerDescriptor,
};
use serde::Deserialize;
use thiserror::Error;

use crate::tuner::StopSignal;

pub const DEFAULT_CONFIG_FILE: &str = "hdhr-recorder.toml";
pub const DEFAULT_MEDIA_DIR: &str = "media";
pub const DEFAULT_SCHEDULE_FILE: &str = "schedule-file";
pub const DEFAULT_CONTROL_PROGRAM: &str = "hdhomerun_config";
pub const DEFAULT_MISFIRE_GRACE_SECS: u64 = 60;
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub global: GlobalSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub tuners: Option<TunerSection>,
    #[serde(default)]
    pub channelmap: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GlobalSection {
    pub media_dir: Option<String>,
    pub schedule_file: Option<String>,
    pub hdhomerun_config: Option<String>,
    pub misfire_grace_secs: Option<u64>,
    pub stop_signal: Option<StopSignal>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    pub log_dir: Option<String>,
    pub retention_days: Option<u64>,
    pub level: Option<String>,
}

/// Either `"DEV:N, DEV:N"` or `[[tuners]]` tables.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TunerSection {
    List(String),
    Tables(Vec<TunerTable>),
}

#[derive(Debug, Deserialize)]
pub struct TunerTable {
    pub device_id: String,
    pub tuner: TunerIndex,
    pub priority: Option<i32>,
}

/// Tuner number, written either as `1` or `"1"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TunerIndex {
    Number(u32),
    Text(String),
}

impl TunerIndex {
    fn to_index_string(&self) -> String {
        match self {
            TunerIndex::Number(n) => n.to_string(),
            TunerIndex::Text(s) => s.trim().to_string(),
        }
    }
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// The configured tuners. At least one is required and each physical
    /// tuner may appear only once.
    pub fn tuners(&self) -> Result<Vec<TunerDescriptor>, ConfigError> {
        let tuners = match &self.tuners {
            None => return Err(ScheduleError::NoTuners.into()),
            Some(TunerSection::List(list)) => parse_tuner_list(list)?,
            Some(TunerSection::Tables(tables)) => tables
                .iter()
                .enumerate()
                .map(|(order, table)| {
                    let device_id = table.device_id.trim();
                    let index = table.tuner.to_index_string();
                    if device_id.is_empty() || index.is_empty() {
                        return Err(ScheduleError::TunerSpec(format!(
                            "{}:{}",
                            device_id, index
                        )));
                    }
                    Ok(TunerDescriptor::new(
                        table.priority.unwrap_or(order as i32),
                        device_id,
                        index,
                    ))
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        if tuners.is_empty() {
            return Err(ScheduleError::NoTuners.into());
        }
        ensure_distinct_tuners(&tuners)?;
        Ok(tuners)
    }

    pub fn channel_map(&self) -> Result<ChannelMap, ConfigError> {
        Ok(ChannelMap::from_entries(&self.channelmap)?)
    }

    pub fn media_dir(&self) -> PathBuf {
        PathBuf::from(self.global.media_dir.as_deref().unwrap_or(DEFAULT_MEDIA_DIR))
    }

    pub fn schedule_file(&self) -> PathBuf {
        PathBuf::from(self.global.schedule_file.as_deref().unwrap_or(DEFAULT_SCHEDULE_FILE))
    }

    pub fn control_program(&self) -> PathBuf {
        PathBuf::from(
            self.global
                .hdhomerun_config
                .as_deref()
                .unwrap_or(DEFAULT_CONTROL_PROGRAM),
        )
    }

    pub fn misfire_grace(&self) -> Duration {
        Duration::from_secs(
            self.global
                .misfire_grace_secs
                .unwrap_or(DEFAULT_MISFIRE_GRACE_SECS),
        )
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.global.stop_signal.unwrap_or_default()
    }
}
