//! hdhr-recorder: unattended recording daemon for HDHomeRun network tuners.
//!
//! Reads a schedule file, tunes a free tuner when a program starts and
//! captures it into `<media_dir>/<program>/<date>.ts`. Send SIGHUP to make
//! it re-read the schedule file.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};

mod clock;
mod config;
mod logging;
mod recording;
mod reload;
mod scheduler;
mod service;
mod setup;
mod tuner;

#[cfg(test)]
mod testing;

use clock::SystemClock;
use config::{ConfigFile, DEFAULT_CONFIG_FILE, DEFAULT_LOG_DIR, DEFAULT_RETENTION_DAYS};
use recording::RecordingContext;
use reload::ReloadCoordinator;
use service::{Recorder, RecorderSettings};
use tuner::{HdHomeRunControl, TunerPool};

/// hdhr-recorder - Scheduled recording from HDHomeRun tuners
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file path
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Directory where log files are stored
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Number of days to keep log files
    #[arg(long)]
    log_retention_days: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a tuner and print a configuration file for the channels found
    Setup {
        /// Path to the hdhomerun_config program
        program: PathBuf,
        /// Device id, e.g. 1234ABCD
        device_id: String,
        /// Tuner number on the device
        tuner: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(Command::Setup {
        program,
        device_id,
        tuner,
    }) = &args.command
    {
        logging::init_console_logging(args.verbose)?;
        let rendered = setup::run(program, device_id, *tuner).await.map_err(|e| {
            error!("{}", e);
            e
        })?;
        print!("{}", rendered);
        return Ok(());
    }

    // Load config file: explicit path > default path if present
    let config_path = args.config.clone().or_else(|| {
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        default_path.exists().then_some(default_path)
    });
    let file_config = match &config_path {
        Some(path) => match ConfigFile::load(path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e.into());
            }
        },
        None => ConfigFile::default(),
    };

    // Command line takes precedence
    let log_dir = args.log_dir.clone().unwrap_or_else(|| {
        PathBuf::from(file_config.logging.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR))
    });
    let log_retention_days = args
        .log_retention_days
        .or(file_config.logging.retention_days)
        .unwrap_or(DEFAULT_RETENTION_DAYS);

    logging::init_logging(
        &log_dir,
        log_retention_days,
        args.verbose,
        file_config.logging.level.as_deref(),
    )
    .expect("Failed to initialize logging");

    info!(
        "Main process PID: {}, use this for sending SIGHUP for re-reading the schedule-file",
        std::process::id()
    );

    let tuners = file_config.tuners().map_err(|e| {
        error!("Invalid tuner configuration: {}", e);
        e
    })?;
    let channels = file_config.channel_map().map_err(|e| {
        error!("Invalid channel map: {}", e);
        e
    })?;
    let pool = Arc::new(TunerPool::new(tuners));
    for tuner in pool.idle_tuners() {
        info!("Tuner ({}) priority {}", tuner, tuner.priority);
    }
    info!(
        "{} tuner(s), {} virtual channel(s) configured",
        pool.capacity(),
        channels.len()
    );

    let coordinator = Arc::new(ReloadCoordinator::new());
    let _signals = reload::spawn_signal_listener(Arc::clone(&coordinator))?;

    let control = HdHomeRunControl::new(file_config.control_program(), file_config.stop_signal());
    let context = Arc::new(RecordingContext {
        pool,
        control: Arc::new(control),
        clock: Arc::new(SystemClock),
        shutdown: coordinator.shutdown_token(),
    });

    let settings = RecorderSettings {
        media_dir: file_config.media_dir(),
        schedule_file: file_config.schedule_file(),
        misfire_grace: file_config.misfire_grace(),
    };
    info!(
        "Recording into {}, schedule file {}",
        settings.media_dir.display(),
        settings.schedule_file.display()
    );

    let recorder = Recorder::new(settings, channels, context, coordinator);
    if let Err(e) = recorder.run().await {
        error!("{}", e);
        return Err(e.into());
    }

    info!("hdhr-recorder stopped");
    Ok(())
}
