//! Schedule handling for hdhr-recorder.
//!
//! This module provides:
//! - [`TriggerScheduler`]: installs time-based triggers
//! - [`CronScheduler`]: tokio implementation with misfire grace
//! - [`ScheduleTranslator`]: turns the schedule file into triggers

pub mod translator;
pub mod trigger;

pub use translator::{ScheduleTranslator, TranslateError, TranslateSummary};
pub use trigger::{CronScheduler, SchedulerError, Trigger, TriggerCallback, TriggerScheduler};
