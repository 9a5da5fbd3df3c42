//! Tuner management for the recorder.
//!
//! This module provides:
//! - [`TunerPool`]: priority pool of idle tuners
//! - [`TunerLease`]: guard returning a tuner to the pool on drop
//! - [`TunerControl`]: the operations driven through the control program
//! - [`HdHomeRunControl`]: `hdhomerun_config` implementation

pub mod control;
pub mod pool;

pub use control::{
    CaptureHandle, CommandOutcome, ControlError, HdHomeRunControl, StopSignal, TunerControl,
    TunerSetting,
};
pub use pool::{TunerLease, TunerPool};
