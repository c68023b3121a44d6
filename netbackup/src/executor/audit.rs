//! Remote audit log: one JSON line per operation, one file per day.

use crate::models::Strategy;
use crate::remote::{quote, remote_join};
use chrono::{DateTime, Local, NaiveDate, SecondsFormat};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    /// Transfer succeeded but a follow-up step did not
    Warning,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    /// Host the run was started from
    pub host: String,
    pub operation: String,
    pub strategy: String,
    pub source: String,
    pub destination: String,
    pub outcome: Outcome,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(
        at: DateTime<Local>,
        operation: &str,
        strategy: Strategy,
        source: &str,
        destination: &str,
    ) -> Self {
        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Secs, false),
            host: local_hostname(),
            operation: operation.to_string(),
            strategy: strategy.to_string(),
            source: source.to_string(),
            destination: destination.to_string(),
            outcome: Outcome::Success,
            size_bytes: 0,
            detail: None,
        }
    }
}

pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn log_file_name(date: NaiveDate) -> String {
    format!("netbackup-{}.log", date.format("%Y-%m-%d"))
}

/// Shell command appending `entry` to the day's log under `log_dir`.
pub fn append_command(log_dir: &str, date: NaiveDate, entry: &AuditEntry) -> serde_json::Result<String> {
    let line = serde_json::to_string(entry)?;
    let file = remote_join(log_dir, &log_file_name(date));
    Ok(format!(
        "mkdir -p {} && printf '%s\\n' {} >> {}",
        quote(log_dir),
        quote(&line),
        quote(&file)
    ))
}

/// Shell command deleting this tool's log files older than `days` days.
pub fn retention_command(log_dir: &str, days: u32) -> String {
    format!(
        "find {} -maxdepth 1 -type f -name 'netbackup-*.log' -mtime +{} -delete",
        quote(log_dir),
        days
    )
}
