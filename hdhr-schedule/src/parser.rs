//! Parsers for schedule lines, channel map values and tuner lists.
//!
//! # Schedule line format
//!
//! ```text
//! program-name  "YYYY-MM-DD HH:MM"  duration-minutes  virtual-channel  recurrence
//! ```
//!
//! Fields are split with shell quoting rules so program names may contain
//! spaces. Blank lines and lines starting with `#` are ignored.

use std::collections::HashSet;

use chrono::NaiveDateTime;

use crate::error::{LineError, ScheduleError};
use crate::types::{
    ChannelTarget, Recurrence, ScheduleEntry, TunerDescriptor, START_TIME_FORMAT,
};

/// Number of fields in a schedule line.
pub const FIELD_COUNT: usize = 5;

/// Split a line into words using POSIX shell quoting rules.
///
/// A `#` at the start of a word comments out the rest of the line.
pub fn tokenize(line: &str) -> Result<Vec<String>, LineError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '#' if !in_token => break,
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(LineError::Unbalanced),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(LineError::Unbalanced),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(LineError::Unbalanced),
                    }
                }
            }
            '\\' => {
                in_token = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err(LineError::Unbalanced),
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Returns true for lines that carry no entry: blank or `#` comments.
pub fn is_ignorable(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with('#')
}

/// Parse one schedule line.
///
/// Returns `Ok(None)` for blank and comment lines.
pub fn parse_schedule_line(line: &str) -> Result<Option<ScheduleEntry>, LineError> {
    if is_ignorable(line) {
        return Ok(None);
    }

    let mut tokens = tokenize(line)?;

    // Accept an unquoted start time: name date time duration channel days
    if tokens.len() == FIELD_COUNT + 1 {
        let joined = format!("{} {}", tokens[1], tokens[2]);
        if parse_start_time(&joined).is_ok() {
            tokens.splice(1..3, [joined]);
        }
    }

    if tokens.len() != FIELD_COUNT {
        return Err(LineError::FieldCount(tokens.len()));
    }

    let mut fields = tokens.into_iter();
    let mut next = || fields.next().unwrap_or_default();
    let program_name = next();
    let start = parse_start_time(&next())?;
    let duration = next();
    let duration_minutes = duration
        .trim()
        .parse::<u32>()
        .map_err(|_| LineError::Duration(duration.clone()))?;
    let virtual_channel = next().trim().to_string();
    let recurrence = Recurrence::parse(&next())?;

    Ok(Some(ScheduleEntry {
        program_name,
        start,
        duration_minutes,
        virtual_channel,
        recurrence,
    }))
}

/// Parse a `YYYY-MM-DD HH:MM` start time.
pub fn parse_start_time(value: &str) -> Result<NaiveDateTime, LineError> {
    NaiveDateTime::parse_from_str(value.trim(), START_TIME_FORMAT)
        .map_err(|_| LineError::StartTime(value.to_string()))
}

/// Parse a channel map value `physical, program[, ignored...]`.
pub fn parse_channel_value(channel: &str, value: &str) -> Result<ChannelTarget, ScheduleError> {
    let mut parts = value.split(',').map(str::trim);
    match (parts.next(), parts.next()) {
        (Some(physical), Some(program)) if !physical.is_empty() && !program.is_empty() => {
            Ok(ChannelTarget::new(physical, program))
        }
        _ => Err(ScheduleError::ChannelValue {
            channel: channel.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse a legacy tuner list `DEVICE:N, DEVICE:N`.
///
/// Priorities follow declaration order.
pub fn parse_tuner_list(value: &str) -> Result<Vec<TunerDescriptor>, ScheduleError> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(ScheduleError::NoTuners);
    }

    let tuners = compact
        .split(',')
        .enumerate()
        .map(|(index, spec)| {
            let mut parts = spec.split(':');
            match (parts.next(), parts.next()) {
                (Some(device), Some(tuner)) if !device.is_empty() && !tuner.is_empty() => {
                    Ok(TunerDescriptor::new(index as i32, device, tuner))
                }
                _ => Err(ScheduleError::TunerSpec(spec.to_string())),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    ensure_distinct_tuners(&tuners)?;
    Ok(tuners)
}

/// Reject a tuner list naming the same physical tuner twice.
///
/// Device ids are hexadecimal, so they compare case-insensitively.
pub fn ensure_distinct_tuners(tuners: &[TunerDescriptor]) -> Result<(), ScheduleError> {
    let mut seen = HashSet::new();
    for tuner in tuners {
        let key = (tuner.device_id.to_ascii_uppercase(), tuner.tuner_index.clone());
        if !seen.insert(key) {
            return Err(ScheduleError::DuplicateTuner(format!(
                "{}:{}",
                tuner.device_id, tuner.tuner_index
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::days::DaySet;
    use chrono::NaiveDate;

    #[test]
    fn test_tokenize_quoting() {
        assert_eq!(
            tokenize(r#""Evening News" '2024-01-01 18:00' 30 5 once"#).unwrap(),
            vec!["Evening News", "2024-01-01 18:00", "30", "5", "once"]
        );
        assert_eq!(tokenize(r#"a\ b "c \"d\"" e"#).unwrap(), vec!["a b", "c \"d\"", "e"]);
        assert_eq!(tokenize("a b # trailing comment").unwrap(), vec!["a", "b"]);
        assert_eq!(tokenize("a#b").unwrap(), vec!["a#b"]);
        assert_eq!(tokenize("\"open").unwrap_err(), LineError::Unbalanced);
        assert_eq!(tokenize("   ").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_parse_once_entry() {
        let entry = parse_schedule_line(r#""NewsHour" "2024-01-01 18:00" 30 5 once"#)
            .unwrap()
            .unwrap();
        assert_eq!(entry.program_name, "NewsHour");
        assert_eq!(
            entry.start,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(18, 0, 0).unwrap()
        );
        assert_eq!(entry.duration_minutes, 30);
        assert_eq!(entry.virtual_channel, "5");
        assert_eq!(entry.recurrence, Recurrence::Once);
    }

    #[test]
    fn test_parse_unquoted_start_time() {
        let entry = parse_schedule_line(r#""NewsHour" 2024-01-01 18:00 30 5 once"#)
            .unwrap()
            .unwrap();
        assert_eq!(entry.start.format(START_TIME_FORMAT).to_string(), "2024-01-01 18:00");
        assert_eq!(entry.virtual_channel, "5");
    }

    #[test]
    fn test_parse_recurring_entry() {
        let entry = parse_schedule_line("'Morning Show' '2024-03-04 07:30' 60 7.1 mon-fri")
            .unwrap()
            .unwrap();
        assert_eq!(entry.program_name, "Morning Show");
        assert_eq!(entry.recurrence, Recurrence::Weekly(DaySet::parse("mon-fri").unwrap()));
    }

    #[test]
    fn test_parse_ignorable_and_malformed() {
        assert_eq!(parse_schedule_line("").unwrap(), None);
        assert_eq!(parse_schedule_line("   # just a comment").unwrap(), None);
        assert_eq!(
            parse_schedule_line("bad line with too few fields"),
            Err(LineError::FieldCount(6))
        );
        assert_eq!(parse_schedule_line("bad line"), Err(LineError::FieldCount(2)));
        assert!(matches!(
            parse_schedule_line("Show 'tomorrow at six' 30 5 once"),
            Err(LineError::StartTime(_))
        ));
        assert!(matches!(
            parse_schedule_line("Show '2024-01-01 18:00' -5 5 once"),
            Err(LineError::Duration(_))
        ));
        assert!(matches!(
            parse_schedule_line("Show '2024-01-01 18:00' 30 5 someday"),
            Err(LineError::Recurrence(_))
        ));
    }

    #[test]
    fn test_parse_channel_value() {
        assert_eq!(
            parse_channel_value("5", " 8vsb:3 ,  4 ").unwrap(),
            ChannelTarget::new("8vsb:3", "4")
        );
        assert!(parse_channel_value("5", "8vsb:3").is_err());
        assert!(parse_channel_value("5", "8vsb:3,").is_err());
    }

    #[test]
    fn test_parse_tuner_list() {
        let tuners = parse_tuner_list("1234ABCD:0, 1234ABCD:1").unwrap();
        assert_eq!(tuners.len(), 2);
        assert_eq!(tuners[0], TunerDescriptor::new(0, "1234ABCD", "0"));
        assert_eq!(tuners[1], TunerDescriptor::new(1, "1234ABCD", "1"));

        assert_eq!(parse_tuner_list("  "), Err(ScheduleError::NoTuners));
        assert!(matches!(parse_tuner_list("1234ABCD"), Err(ScheduleError::TunerSpec(_))));
        assert!(matches!(parse_tuner_list("A:0,"), Err(ScheduleError::TunerSpec(_))));
    }

    #[test]
    fn test_parse_tuner_list_rejects_duplicates() {
        assert_eq!(
            parse_tuner_list("ABCD1234:0, ABCD1234:0"),
            Err(ScheduleError::DuplicateTuner("ABCD1234:0".to_string()))
        );
        assert_eq!(
            parse_tuner_list("ABCD1234:0, ABCD1234:1, abcd1234:1"),
            Err(ScheduleError::DuplicateTuner("abcd1234:1".to_string()))
        );
        // Same tuner number on another device is a different tuner
        assert_eq!(parse_tuner_list("ABCD1234:0, 1234ABCD:0").unwrap().len(), 2);
    }
}
