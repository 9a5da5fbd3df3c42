//! Day-of-week sets for recurring entries.
//!
//! Schedule files count days from Monday:
//!
//! - `*` for every day
//! - day names `mon`..`sun` or numbers `0`..`6` (0 = Monday)
//! - ranges `mon-fri`, comma lists `sat,sun`
//! - steps on `*` or ranges, `*/2`, `0-4/2`
//!
//! Cron counts from Sunday, so numbers and steps do not carry over as
//! written. [`DaySet`] resolves the field to concrete days and hands cron an
//! explicit name list; fire times come from [`cron::Schedule`].

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike, Weekday};

use crate::error::DaySetError;

const DAY_NAMES: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// A set of weekdays, stored as a bitmask with bit 0 = Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DaySet(u8);

impl DaySet {
    /// Every day of the week.
    pub const ALL: DaySet = DaySet(0x7F);

    /// Returns true if the set contains the given weekday.
    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Parse a day-of-week field.
    pub fn parse(spec: &str) -> Result<Self, DaySetError> {
        let spec = spec.trim();
        if spec.is_empty() {
            return Err(DaySetError::Empty);
        }

        let mut bits = 0u8;
        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(DaySetError::Empty);
            }

            let (range, step) = match part.split_once('/') {
                Some((range, step)) => {
                    let step: usize = step
                        .trim()
                        .parse()
                        .ok()
                        .filter(|s| *s > 0)
                        .ok_or_else(|| DaySetError::Step(part.to_string()))?;
                    (range.trim(), Some(step))
                }
                None => (part, None),
            };

            let (start, end) = if range == "*" {
                (0, 6)
            } else if let Some((first, last)) = range.split_once('-') {
                (parse_day(first)?, parse_day(last)?)
            } else {
                let day = parse_day(range)?;
                // `x/step` runs from x to the end of the week
                (day, if step.is_some() { 6 } else { day })
            };

            if start > end {
                return Err(DaySetError::Range(part.to_string()));
            }

            for index in (start..=end).step_by(step.unwrap_or(1)) {
                bits |= 1 << index;
            }
        }

        Ok(DaySet(bits))
    }

    /// Cron day-of-week field naming every day in the set, e.g. `MON,WED`.
    pub fn cron_field(&self) -> String {
        self.to_string().to_ascii_uppercase()
    }

    /// Cron schedule firing at `time_of_day` on every day in the set.
    pub fn schedule_at(&self, time_of_day: NaiveTime) -> Result<cron::Schedule, DaySetError> {
        let expression = format!(
            "{} {} {} * * {}",
            time_of_day.second(),
            time_of_day.minute(),
            time_of_day.hour(),
            self.cron_field()
        );
        cron::Schedule::from_str(&expression)
            .map_err(|e| DaySetError::Cron(format!("{}: {}", expression, e)))
    }
}

fn parse_day(token: &str) -> Result<usize, DaySetError> {
    let token = token.trim().to_ascii_lowercase();
    if let Some(index) = DAY_NAMES.iter().position(|name| *name == token) {
        return Ok(index);
    }
    match token.parse::<usize>() {
        Ok(index) if index < 7 => Ok(index),
        _ => Err(DaySetError::UnknownDay(token)),
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == DaySet::ALL {
            return f.write_str("*");
        }
        let names: Vec<&str> = DAY_NAMES
            .iter()
            .enumerate()
            .filter(|(index, _)| self.0 & (1 << index) != 0)
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}
