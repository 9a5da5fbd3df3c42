//! Channel scan output parsing.
//!
//! The tuner control program reports a scan as a stream of lines:
//!
//! ```text
//! SCANNING: 57000000 (us-bcast:2)
//! LOCK: 8vsb (ss=100 snq=80 seq=100)
//! PROGRAM 3: 5.1 KTVU-HD
//! ```

use crate::types::ChannelTarget;

/// One program found during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedProgram {
    pub virtual_channel: String,
    pub modulation: String,
    pub channel: String,
    pub program_number: String,
    /// Program name with spaces replaced by `-`.
    pub name: String,
}

impl ScannedProgram {
    /// Tuning parameters in channel map form (`modulation:channel`, program).
    pub fn target(&self) -> ChannelTarget {
        ChannelTarget::new(format!("{}:{}", self.modulation, self.channel), &self.program_number)
    }
}

/// Extract the programs from scan output.
///
/// `PROGRAM` lines seen before any `SCANNING`/`LOCK` line are dropped.
pub fn parse_scan_output(output: &str) -> Vec<ScannedProgram> {
    let mut programs = Vec::new();
    let mut channel: Option<String> = None;
    let mut modulation: Option<String> = None;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("SCANNING: ") {
            channel = rest
                .split_whitespace()
                .nth(1)
                .map(|s| s.trim_matches(|c| c == '(' || c == ')'))
                .and_then(|s| s.split(':').nth(1))
                .map(str::to_string);
        } else if let Some(rest) = line.strip_prefix("LOCK: ") {
            modulation = rest.split_whitespace().next().map(str::to_string);
        } else if let Some(rest) = line.strip_prefix("PROGRAM ") {
            let mut parts = rest.splitn(3, char::is_whitespace);
            let program_number = parts.next().unwrap_or_default().trim_end_matches(':');
            let virtual_channel = parts.next().unwrap_or_default();
            let name = parts.next().unwrap_or_default().trim().replace(' ', "-");

            if program_number.is_empty() || virtual_channel.is_empty() {
                continue;
            }
            if let (Some(channel), Some(modulation)) = (&channel, &modulation) {
                programs.push(ScannedProgram {
                    virtual_channel: virtual_channel.to_string(),
                    modulation: modulation.clone(),
                    channel: channel.clone(),
                    program_number: program_number.to_string(),
                    name,
                });
            }
        }
    }

    programs
}
