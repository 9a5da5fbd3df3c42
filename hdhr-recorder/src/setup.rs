//! `setup` subcommand: scan a tuner and print a starting configuration.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use hdhr_schedule::scan::{parse_scan_output, ScannedProgram};
use log::{info, warn};
use thiserror::Error;

use crate::config::{DEFAULT_LOG_DIR, DEFAULT_MEDIA_DIR, DEFAULT_SCHEDULE_FILE};
use crate::tuner::{ControlError, HdHomeRunControl, StopSignal};

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{0} doesn't exist, aborting!")]
    Missing(PathBuf),

    #[error("{0} is not a regular file, aborting!")]
    NotAFile(PathBuf),

    #[error("{0} doesn't have execute permission set, aborting!")]
    NotExecutable(PathBuf),

    #[error(transparent)]
    Scan(#[from] ControlError),

    #[error("Couldn't find any channels, quitting!")]
    NoChannels,
}

/// Make sure `program` is an executable regular file.
pub fn check_program(program: &Path) -> Result<(), SetupError> {
    let metadata =
        std::fs::metadata(program).map_err(|_| SetupError::Missing(program.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(SetupError::NotAFile(program.to_path_buf()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(SetupError::NotExecutable(program.to_path_buf()));
        }
    }

    Ok(())
}

/// Scan `tuner` on `device_id` and render a config for the programs found.
pub async fn run(program: &Path, device_id: &str, tuner: u32) -> Result<String, SetupError> {
    check_program(program)?;

    info!("Scanning {} /tuner{}, this can take several minutes", device_id, tuner);
    let control = HdHomeRunControl::new(program, StopSignal::default());
    let outcome = control.scan(device_id, &tuner.to_string()).await?;
    if !outcome.success() {
        warn!("Scan finished with {}", outcome);
    }

    let programs = parse_scan_output(&outcome.output);
    if programs.is_empty() {
        return Err(SetupError::NoChannels);
    }
    info!("Found {} program(s)", programs.len());

    Ok(render_config(program, device_id, tuner, &programs))
}

/// Render a TOML config for a single tuner and the scanned programs.
///
/// Virtual channel `0` carries no real program and is left out.
pub fn render_config(
    program: &Path,
    device_id: &str,
    tuner: u32,
    programs: &[ScannedProgram],
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "tuners = {}", quote(&format!("{}:{}", device_id, tuner)));
    let _ = writeln!(out);
    let _ = writeln!(out, "[global]");
    let _ = writeln!(out, "media_dir = {}", quote(DEFAULT_MEDIA_DIR));
    let _ = writeln!(out, "schedule_file = {}", quote(DEFAULT_SCHEDULE_FILE));
    let _ = writeln!(out, "hdhomerun_config = {}", quote(&program.to_string_lossy()));
    let _ = writeln!(out);
    let _ = writeln!(out, "[logging]");
    let _ = writeln!(out, "log_dir = {}", quote(DEFAULT_LOG_DIR));
    let _ = writeln!(out);
    let _ = writeln!(out, "[channelmap]");
    let _ = writeln!(out, "# \"virtual-channel\" = \"physical-channel, program-number\"  # name");

    for scanned in programs.iter().filter(|p| p.virtual_channel != "0") {
        let key = quote(&scanned.virtual_channel);
        let target = scanned.target();
        let value = quote(&format!("{}, {}", target.physical_channel, target.program_number));
        let _ = writeln!(out, "{:<8} = {:<18} # {}", key, value, scanned.name);
    }

    out
}

fn quote(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use hdhr_schedule::TunerDescriptor;

    const SCAN: &str = "\
SCANNING: 57000000 (us-bcast:2)
LOCK: none (ss=45 snq=0 seq=0)
SCANNING: 195000000 (us-bcast:10)
LOCK: 8vsb (ss=90 snq=75 seq=100)
TSID: 0x0B9D
PROGRAM 1: 10.1 KGO-DT
PROGRAM 2: 10.2 Live Well
PROGRAM 5: 0 (encrypted)
SCANNING: 551000000 (us-cable:79)
LOCK: qam256 (ss=100 snq=100 seq=100)
PROGRAM 4: 79.4 Public Access
";

    #[test]
    fn test_render_config_parses_back() {
        let programs = parse_scan_output(SCAN);
        let program = Path::new("/usr/bin/hdhomerun_config");
        let rendered = render_config(program, "1234ABCD", 1, &programs);

        assert!(rendered.contains("# KGO-DT"));
        assert!(rendered.contains("# Live-Well"));
        assert!(!rendered.contains("encrypted"));

        let config = ConfigFile::parse(&rendered).unwrap();
        assert_eq!(config.tuners().unwrap(), vec![TunerDescriptor::new(0, "1234ABCD", "1")]);
        assert_eq!(config.control_program(), PathBuf::from("/usr/bin/hdhomerun_config"));
        assert_eq!(config.schedule_file(), PathBuf::from("schedule-file"));

        let channels = config.channel_map().unwrap();
        assert_eq!(channels.len(), 3);
        let target = channels.resolve("10.2").unwrap();
        assert_eq!(target.physical_channel, "8vsb:10");
        assert_eq!(target.program_number, "2");
        let target = channels.resolve("79.4").unwrap();
        assert_eq!(target.physical_channel, "qam256:79");
        assert_eq!(target.program_number, "4");
        assert!(channels.resolve("0").is_err());
    }

    #[test]
    fn test_render_quotes_odd_paths() {
        let programs = parse_scan_output(SCAN);
        let program = Path::new(r#"C:\tools\"hd" config.exe"#);
        let rendered = render_config(program, "1234ABCD", 0, &programs);

        let config = ConfigFile::parse(&rendered).unwrap();
        assert_eq!(config.control_program(), PathBuf::from(r#"C:\tools\"hd" config.exe"#));
    }

    #[test]
    fn test_check_program() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            check_program(&dir.path().join("missing")),
            Err(SetupError::Missing(_))
        ));
        assert!(matches!(check_program(dir.path()), Err(SetupError::NotAFile(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_check_program_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("hdhomerun_config");
        std::fs::write(&program, "#!/bin/sh\n").unwrap();

        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o644)).unwrap();
        assert!(matches!(check_program(&program), Err(SetupError::NotExecutable(_))));

        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert!(check_program(&program).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_scans_and_renders() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("hdhomerun_config");
        let script = format!(
            "#!/bin/sh\n\
             [ \"$1 $2 $3\" = \"1234ABCD scan /tuner1\" ] || exit 2\n\
             cat <<'EOF'\n{}EOF\n",
            SCAN
        );
        std::fs::write(&program, script).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let rendered = run(&program, "1234ABCD", 1).await.unwrap();
        let config = ConfigFile::parse(&rendered).unwrap();
        assert_eq!(config.channel_map().unwrap().len(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_without_channels() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("hdhomerun_config");
        std::fs::write(&program, "#!/bin/sh\necho 'SCANNING: 57000000 (us-bcast:2)'\n").unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(
            run(&program, "1234ABCD", 0).await,
            Err(SetupError::NoChannels)
        ));
    }
}
