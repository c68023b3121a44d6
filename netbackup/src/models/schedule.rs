//! Recurring backup jobs and their cron translation.

use crate::utils::ScheduleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Weekday used by the `weekly` interval (0 = Sunday).
const WEEKLY_DAY: u8 = 0;

/// Time of day for a scheduled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    pub hour: u8,
    pub minute: u8,
}

impl FromStr for ScheduleTime {
    type Err = ScheduleError;

    /// Parses `HH:MM` (24h). A single-digit hour is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScheduleError::InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// How often a scheduled backup runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interval {
    Daily,
    Weekly,
    Monthly,
    /// Raw 5-field cron expression, used as-is
    Cron(String),
}

impl FromStr for Interval {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "daily" => Ok(Interval::Daily),
            "weekly" => Ok(Interval::Weekly),
            "monthly" => Ok(Interval::Monthly),
            other if is_cron_expression(other) => {
                Ok(Interval::Cron(other.split_whitespace().collect::<Vec<_>>().join(" ")))
            }
            _ => Err(ScheduleError::InvalidInterval(s.to_string())),
        }
    }
}

impl Interval {
    /// Translate to a cron expression. `time` is ignored for raw expressions.
    pub fn to_cron(&self, time: ScheduleTime) -> String {
        let ScheduleTime { hour, minute } = time;
        match self {
            Interval::Daily => format!("{minute} {hour} * * *"),
            Interval::Weekly => format!("{minute} {hour} * * {WEEKLY_DAY}"),
            Interval::Monthly => format!("{minute} {hour} 1 * *"),
            Interval::Cron(expr) => expr.clone(),
        }
    }
}

/// Five whitespace-separated fields of digits, `*`, `,`, `-`, `/` or
/// three-letter day/month names.
fn is_cron_expression(s: &str) -> bool {
    let fields: Vec<&str> = s.split_whitespace().collect();
    fields.len() == 5
        && fields.iter().all(|field| {
            field
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_alphabetic() || "*,-/".contains(c))
        })
}

/// A tagged job in the system crontab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub job_id: u64,
    pub cron_expression: String,
    pub source_path: String,
    pub option_string: String,
}
