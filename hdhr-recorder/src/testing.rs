//! Test doubles shared across modules.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hdhr_schedule::TunerDescriptor;
use parking_lot::Mutex;

use crate::tuner::{CaptureHandle, CommandOutcome, ControlError, TunerControl, TunerSetting};

/// Records every control invocation.
#[derive(Default)]
pub struct FakeControl {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub set_status: Option<i32>,
    pub set_unavailable: bool,
    pub save_unavailable: bool,
    pub hang_on_set: bool,
}

impl FakeControl {
    pub fn ok() -> Self {
        Self {
            set_status: Some(0),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

fn spawn_error() -> ControlError {
    ControlError::Spawn {
        program: "hdhomerun_config".to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    }
}

#[async_trait]
impl TunerControl for FakeControl {
    async fn set(
        &self,
        tuner: &TunerDescriptor,
        setting: TunerSetting,
        value: &str,
    ) -> Result<CommandOutcome, ControlError> {
        if self.hang_on_set {
            futures::future::pending::<()>().await;
        }
        if self.set_unavailable {
            return Err(spawn_error());
        }
        self.calls.lock().push(format!(
            "{} set {}/{} {}",
            tuner.device_id,
            tuner.control_path(),
            setting,
            value
        ));
        Ok(CommandOutcome::new(self.set_status, "ERROR: invalid value"))
    }

    async fn save(
        &self,
        tuner: &TunerDescriptor,
        path: &Path,
    ) -> Result<Box<dyn CaptureHandle>, ControlError> {
        if self.save_unavailable {
            return Err(spawn_error());
        }
        self.calls.lock().push(format!(
            "{} save {} {}",
            tuner.device_id,
            tuner.control_path(),
            path.display()
        ));
        Ok(Box::new(FakeCapture {
            calls: Arc::clone(&self.calls),
            started: tokio::time::Instant::now(),
        }))
    }
}

struct FakeCapture {
    calls: Arc<Mutex<Vec<String>>>,
    started: tokio::time::Instant,
}

#[async_trait]
impl CaptureHandle for FakeCapture {
    async fn stop(self: Box<Self>) -> Result<CommandOutcome, ControlError> {
        let secs = self.started.elapsed().as_secs();
        self.calls.lock().push(format!("stop after {}s", secs));
        Ok(CommandOutcome::new(Some(0), "....................done\n"))
    }
}

