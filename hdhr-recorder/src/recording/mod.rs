//! Recording jobs.
//!
//! This module provides:
//! - [`RecordingJob`]: tune, capture and release for one scheduled program
//! - [`RecordingContext`]: pool, control program and clock shared by all jobs
//! - [`RecordingReport`]: what one run did, for logging and tests

pub mod job;

pub use job::{
    recording_window, CommandFailure, RecordingContext, RecordingError, RecordingJob,
    RecordingOutcome, RecordingReport, RecordingState,
};
