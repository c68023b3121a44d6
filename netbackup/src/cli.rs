//! Command-line surface.
//!
//! Parsing only checks shapes; [`Args::into_command`] applies the rules that
//! need configuration (default recipient, default schedule time) and fails
//! before any network action.

use crate::config::{Config, RunOptions};
use crate::models::{
    Interval, ResolutionRequest, ScheduleEntry, ScheduleTime, ServerRegistry, TransferSpec,
};
use crate::remote::quote;
use crate::utils::{ConfigError, Result};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "netbackup",
    version,
    about = "Back up to the first reachable server, waking it over the LAN if needed",
    long_about = None
)]
pub struct Args {
    /// Debug logging
    #[arg(short = 'd')]
    pub debug: bool,

    /// Encrypt before transfer (restore: decrypt after)
    #[arg(short = 'e')]
    pub encrypt: bool,

    /// Recipient key ID for encryption
    #[arg(short = 'k', value_name = "KEY_ID")]
    pub key: Option<String>,

    /// Select server by position in the configured list (1-based)
    #[arg(short = 'i', value_name = "ID", allow_negative_numbers = true, conflicts_with = "manual")]
    pub id: Option<i64>,

    /// Use this server address instead of discovery
    #[arg(short = 'm', value_name = "IP")]
    pub manual: Option<String>,

    /// List configured servers and exit
    #[arg(short = 'l')]
    pub list: bool,

    /// Restore SOURCE from the server into DESTINATION
    #[arg(short = 'r')]
    pub restore: bool,

    /// Incremental backup against the previous snapshot
    #[arg(short = 'I')]
    pub incremental: bool,

    /// Disable colored output
    #[arg(short = 'c')]
    pub no_color: bool,

    /// Disable progress output
    #[arg(short = 'P')]
    pub no_progress: bool,

    /// Schedule a recurring backup: daily, weekly, monthly or a cron expression
    #[arg(short = 'S', value_name = "INTERVAL")]
    pub schedule: Option<String>,

    /// Time of day for scheduled backups
    #[arg(short = 't', value_name = "HH:MM")]
    pub time: Option<String>,

    /// List scheduled backups and exit
    #[arg(long)]
    pub list_schedules: bool,

    /// Remove a scheduled backup by job ID
    #[arg(long, value_name = "ID")]
    pub remove_schedule: Option<u64>,

    /// SOURCE for backups, SOURCE DESTINATION for restores
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

/// What one invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListServers,
    ListSchedules,
    RemoveSchedule(u64),
    Schedule {
        source: String,
        cron: String,
        options: String,
    },
    Transfer {
        request: ResolutionRequest,
        spec: TransferSpec,
    },
}

impl Args {
    /// Config defaults with this invocation's flags applied.
    pub fn run_options(&self, config: &Config) -> RunOptions {
        let mut options = RunOptions::from_defaults(config);
        options.debug |= self.debug;
        options.encryption_enabled |= self.encrypt;
        options.incremental |= self.incremental;
        options.use_colors &= !self.no_color;
        options.show_progress &= !self.no_progress;
        if let Some(key) = self.key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            options.recipient = Some(key.to_string());
        }
        options
    }

    pub fn into_command(self, config: &Config, options: &RunOptions) -> Result<Command> {
        if self.list {
            return Ok(Command::ListServers);
        }
        if self.list_schedules {
            return Ok(Command::ListSchedules);
        }
        if let Some(id) = self.remove_schedule {
            return Ok(Command::RemoveSchedule(id));
        }

        if self.restore && self.schedule.is_some() {
            return Err(usage("restore cannot be combined with -S"));
        }

        let request = ResolutionRequest::from_selection(self.manual.clone(), self.id)?;
        let expected = if self.restore { 2 } else { 1 };
        if self.paths.len() != expected {
            return Err(usage(if self.restore {
                "restore needs SOURCE and DESTINATION"
            } else {
                "backup needs exactly one SOURCE"
            }));
        }

        if options.encryption_enabled && options.recipient.is_none() {
            return Err(ConfigError::MissingRecipient.into());
        }

        let spec = if self.restore {
            TransferSpec::restore(&self.paths[0], &self.paths[1])
        } else {
            TransferSpec::backup(&self.paths[0])
        };
        let spec = if options.encryption_enabled {
            spec.with_encryption(options.recipient.clone())
        } else {
            spec
        }
        .with_incremental(options.incremental);
        spec.validate()?;

        match &self.schedule {
            Some(interval) => {
                let interval: Interval = interval.parse()?;
                let time_text = self
                    .time
                    .clone()
                    .unwrap_or_else(|| config.scheduling.default_time.clone());
                let time: ScheduleTime = time_text.parse()?;
                Ok(Command::Schedule {
                    source: spec.source.display().to_string(),
                    cron: interval.to_cron(time),
                    options: self.scheduled_options(options),
                })
            }
            None => {
                if self.time.is_some() {
                    tracing::warn!("-t has no effect without -S");
                }
                Ok(Command::Transfer { request, spec })
            }
        }
    }

    /// Flags a scheduled run repeats, plus `-c -P` for unattended output.
    fn scheduled_options(&self, options: &RunOptions) -> String {
        let mut flags = Vec::new();
        if options.debug {
            flags.push("-d".to_string());
        }
        if options.encryption_enabled {
            flags.push("-e".to_string());
            if let Some(recipient) = &options.recipient {
                flags.push(format!("-k {}", quote(recipient)));
            }
        }
        if options.incremental {
            flags.push("-I".to_string());
        }
        if let Some(id) = self.id {
            flags.push(format!("-i {id}"));
        }
        if let Some(manual) = &self.manual {
            flags.push(format!("-m {}", quote(manual.trim())));
        }
        flags.push("-c".to_string());
        flags.push("-P".to_string());
        flags.join(" ")
    }
}

fn usage(message: &str) -> crate::utils::Error {
    ConfigError::Usage(message.to_string()).into()
}

/// `-l` output: ID, address, effective MAC and description per server.
pub fn format_server_list(registry: &ServerRegistry) -> String {
    if registry.is_empty() {
        return "No servers configured\n".to_string();
    }

    let mut out = format!("{:<4} {:<20} {:<20} {}\n", "ID", "ADDRESS", "MAC", "DESCRIPTION");
    for (id, entry) in registry.iter_with_ids() {
        let mac = match (entry.mac, registry.common_mac()) {
            (Some(mac), _) => mac.to_string(),
            (None, Some(common)) => format!("{common}*"),
            (None, None) => "-".to_string(),
        };
        out.push_str(&format!(
            "{:<4} {:<20} {:<20} {}\n",
            id, entry.address, mac, entry.description
        ));
    }
    if registry.common_mac().is_some() && registry.entries().iter().any(|e| e.mac.is_none()) {
        out.push_str("* common MAC fallback\n");
    }
    out
}

/// `--list-schedules` output.
pub fn format_schedule_list(entries: &[ScheduleEntry]) -> String {
    if entries.is_empty() {
        return "No scheduled backups\n".to_string();
    }

    let mut out = format!("{:<12} {:<20} {:<30} {}\n", "JOB ID", "SCHEDULE", "SOURCE", "OPTIONS");
    for entry in entries {
        out.push_str(&format!(
            "{:<12} {:<20} {:<30} {}\n",
            entry.job_id, entry.cron_expression, entry.source_path, entry.option_string
        ));
    }
    out
}
