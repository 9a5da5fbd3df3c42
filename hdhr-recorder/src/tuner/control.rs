//! Driver for the external tuner control program.
//!
//! The device is controlled through `hdhomerun_config`:
//!
//! ```text
//! hdhomerun_config <device> set /tuner<N>/channel <physical>
//! hdhomerun_config <device> set /tuner<N>/program <program>
//! hdhomerun_config <device> save /tuner<N> <file>
//! hdhomerun_config <device> scan /tuner<N>
//! ```
//!
//! `save` streams until it is signalled. Every invocation reports a
//! [`CommandOutcome`] so callers can log failures without aborting.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use hdhr_schedule::TunerDescriptor;
use log::debug;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

/// Errors from running the control program.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The program could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The capture process could not be signalled.
    #[error("Failed to signal capture process: {0}")]
    Signal(String),

    /// Waiting for the process failed.
    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Exit status and combined stdout/stderr of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Exit code, `None` when terminated by a signal.
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutcome {
    pub fn new(status: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            status,
            output: output.into(),
        }
    }

    fn from_exit(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> Self {
        let mut output = String::from_utf8_lossy(stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(stderr));
        Self {
            status: status.code(),
            output,
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "exit status {}", code)?,
            None => f.write_str("terminated by signal")?,
        }
        let output = self.output.trim();
        if !output.is_empty() {
            write!(f, ": {}", output)?;
        }
        Ok(())
    }
}

/// Tuner variables that can be set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TunerSetting {
    Channel,
    Program,
}

impl TunerSetting {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunerSetting::Channel => "channel",
            TunerSetting::Program => "program",
        }
    }
}

impl fmt::Display for TunerSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal used to end a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopSignal {
    /// SIGINT; the control program flushes and reports its status.
    #[default]
    Interrupt,
    /// SIGKILL.
    Kill,
}

/// Operations the recorder needs from the tuner device.
#[async_trait]
pub trait TunerControl: Send + Sync {
    /// Set a tuner variable and wait for the command to finish.
    async fn set(
        &self,
        tuner: &TunerDescriptor,
        setting: TunerSetting,
        value: &str,
    ) -> Result<CommandOutcome, ControlError>;

    /// Start streaming the tuner to `path`.
    async fn save(
        &self,
        tuner: &TunerDescriptor,
        path: &Path,
    ) -> Result<Box<dyn CaptureHandle>, ControlError>;
}

/// A running capture.
#[async_trait]
pub trait CaptureHandle: Send {
    /// Signal the capture, wait for it to exit and return its output.
    async fn stop(self: Box<Self>) -> Result<CommandOutcome, ControlError>;
}

/// [`TunerControl`] backed by the `hdhomerun_config` program.
#[derive(Debug, Clone)]
pub struct HdHomeRunControl {
    program: PathBuf,
    stop_signal: StopSignal,
}

impl HdHomeRunControl {
    pub fn new(program: impl Into<PathBuf>, stop_signal: StopSignal) -> Self {
        Self {
            program: program.into(),
            stop_signal,
        }
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }

    fn command(&self, device_id: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(device_id).stdin(Stdio::null());
        cmd
    }

    /// Run a channel scan on one tuner and return its output.
    pub async fn scan(
        &self,
        device_id: &str,
        tuner_index: &str,
    ) -> Result<CommandOutcome, ControlError> {
        let output = self
            .command(device_id)
            .arg("scan")
            .arg(format!("/tuner{}", tuner_index))
            .output()
            .await
            .map_err(|source| ControlError::Spawn {
                program: self.program_name(),
                source,
            })?;
        Ok(CommandOutcome::from_exit(output.status, &output.stdout, &output.stderr))
    }
}

#[async_trait]
impl TunerControl for HdHomeRunControl {
    async fn set(
        &self,
        tuner: &TunerDescriptor,
        setting: TunerSetting,
        value: &str,
    ) -> Result<CommandOutcome, ControlError> {
        let variable = format!("{}/{}", tuner.control_path(), setting);
        debug!("{} {} set {} {}", self.program_name(), tuner.device_id, variable, value);

        let output = self
            .command(&tuner.device_id)
            .arg("set")
            .arg(&variable)
            .arg(value)
            .output()
            .await
            .map_err(|source| ControlError::Spawn {
                program: self.program_name(),
                source,
            })?;
        Ok(CommandOutcome::from_exit(output.status, &output.stdout, &output.stderr))
    }

    async fn save(
        &self,
        tuner: &TunerDescriptor,
        path: &Path,
    ) -> Result<Box<dyn CaptureHandle>, ControlError> {
        debug!(
            "{} {} save {} {}",
            self.program_name(),
            tuner.device_id,
            tuner.control_path(),
            path.display()
        );

        let mut child = self
            .command(&tuner.device_id)
            .arg("save")
            .arg(tuner.control_path())
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ControlError::Spawn {
                program: self.program_name(),
                source,
            })?;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(drain(stdout, Arc::clone(&buffer))));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(drain(stderr, Arc::clone(&buffer))));
        }

        Ok(Box::new(SaveProcess {
            program: self.program_name(),
            child,
            readers,
            buffer,
            stop_signal: self.stop_signal,
        }))
    }
}

/// Copy a pipe into the shared output buffer until EOF.
async fn drain<R: AsyncRead + Unpin>(mut reader: R, buffer: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buffer.lock().extend_from_slice(&chunk[..n]),
        }
    }
}

/// A running `save` process.
struct SaveProcess {
    program: String,
    child: Child,
    readers: Vec<JoinHandle<()>>,
    buffer: Arc<Mutex<Vec<u8>>>,
    stop_signal: StopSignal,
}

#[async_trait]
impl CaptureHandle for SaveProcess {
    async fn stop(mut self: Box<Self>) -> Result<CommandOutcome, ControlError> {
        signal_child(&mut self.child, self.stop_signal)?;

        let status = self.child.wait().await.map_err(|source| ControlError::Wait {
            program: self.program.clone(),
            source,
        })?;

        for reader in self.readers.drain(..) {
            let _ = reader.await;
        }

        let output = String::from_utf8_lossy(&self.buffer.lock()).into_owned();
        Ok(CommandOutcome::new(status.code(), output))
    }
}

#[cfg(unix)]
fn signal_child(child: &mut Child, stop_signal: StopSignal) -> Result<(), ControlError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // No pid means the process has already been reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let signal = match stop_signal {
        StopSignal::Interrupt => Signal::SIGINT,
        StopSignal::Kill => Signal::SIGKILL,
    };
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(ControlError::Signal(e.to_string())),
    }
}

#[cfg(not(unix))]
fn signal_child(child: &mut Child, _stop_signal: StopSignal) -> Result<(), ControlError> {
    child
        .start_kill()
        .map_err(|e| ControlError::Signal(e.to_string()))
}
