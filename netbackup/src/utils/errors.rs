//! Error types for netbackup.
//!
//! Each layer has its own enum; [`Error`] wraps them so the binary can
//! report any failure with a single exit code.

use std::path::PathBuf;
use thiserror::Error;

/// Problems detected before any network or remote action is taken.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("Server entry {0} has an empty address")]
    EmptyAddress(usize),

    #[error("Encryption enabled but no recipient key id (use -k or encryption.default_recipient)")]
    MissingRecipient,

    #[error("Invalid server ID {id}: expected a value between 1 and {max}")]
    InvalidServerId { id: i64, max: usize },

    #[error("Invalid time format '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid arguments: {0}")]
    Usage(String),
}

/// Failures of the server discovery engine.
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Server {0} is unreachable")]
    ServerUnreachable(String),

    #[error("No reachable backup server found")]
    NoServerFound,

    #[error("No Wake-on-LAN tool available (install wakeonlan or etherwake)")]
    NoWakeToolAvailable,

    #[error("Wake-on-LAN failed: {0}")]
    WakeFailed(String),
}

/// Failures of a single backup or restore run.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Failed to create archive: {0}")]
    ArchiveFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Failed to extract archive: {0}")]
    ExtractFailed(String),

    #[error("Not an encrypted artifact: {0} (expected a .gpg name)")]
    InvalidArtifact(String),

    #[error("Backup root {root} is locked by another run ({owner})")]
    Locked { root: String, owner: String },

    #[error("Remote command failed: {0}")]
    RemoteCommand(String),

    #[error("Remote channel error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the recurring-job sub-commands.
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("No scheduled job with ID {0}")]
    ScheduleNotFound(u64),

    #[error("Invalid interval '{0}': use daily, weekly, monthly or a 5-field cron expression")]
    InvalidInterval(String),

    #[error("Invalid time format '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("Job table error: {0}")]
    Table(#[from] ToolError),

    #[error("Failed to encode job tag: {0}")]
    Tag(#[from] serde_json::Error),
}

/// Failures of the authenticated remote-command channel.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Cannot resolve host {0}")]
    Resolve(String),

    #[error("Connection to {host} failed: {source}")]
    Connect {
        host: String,
        source: std::io::Error,
    },

    #[error("Command on {host} timed out after {secs}s")]
    Timeout { host: String, secs: u64 },

    #[error("SSH authentication to {host} failed: {reason}")]
    Authentication { host: String, reason: String },

    #[error("Host key for {host} rejected: {reason}")]
    HostKey { host: String, reason: String },

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote task aborted: {0}")]
    Join(String),
}

/// Failures of external helper programs (rsync, gpg, crontab, wake tools).
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{tool} is not installed")]
    NotInstalled { tool: String },

    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        source: std::io::Error,
    },

    #[error("{tool} exited with code {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
