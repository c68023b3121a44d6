//! Configuration management for netbackup.
//!
//! Loads configuration from a TOML file. The file location can be
//! overridden with `NETBACKUP_CONFIG` (also read from a `.env` file).
//! Command-line flags are merged on top into [`RunOptions`].

use crate::models::schedule::ScheduleTime;
use crate::models::server::MacAddress;
use crate::utils::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/netbackup/config.toml";
pub const CONFIG_ENV_VAR: &str = "NETBACKUP_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub ssh_config: SshConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub server_ips: Vec<ServerIpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Wake-on-LAN MAC used for servers without their own
    #[serde(default)]
    pub common_mac: Option<String>,

    /// Ping timeout in seconds
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,

    /// SSH connect/command timeout in seconds
    #[serde(default = "default_ssh_timeout")]
    pub ssh_timeout: u64,

    /// Seconds to wait after sending a wake signal
    #[serde(default = "default_boot_wait")]
    pub boot_wait: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub encryption_enabled: bool,

    #[serde(default)]
    pub incremental: bool,

    #[serde(default = "default_true")]
    pub use_colors: bool,

    #[serde(default = "default_true")]
    pub show_progress: bool,

    /// Width of the boot-wait countdown bar in cells
    #[serde(default = "default_progress_width")]
    pub progress_width: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Root directory for backups on the server
    #[serde(default = "default_backup_root")]
    pub backup_root: String,

    /// Directory for audit logs on the server
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Audit logs older than this many days are pruned
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// GPG key id used when -k is not given
    #[serde(default)]
    pub default_recipient: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,

    /// Private key used for both the command channel and rsync
    #[serde(default = "default_key_path")]
    pub key_path: String,

    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Time of day (HH:MM) for scheduled runs when -t is not given
    #[serde(default = "default_schedule_time")]
    pub default_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerIpConfig {
    pub ip: String,

    #[serde(default)]
    pub desc: String,

    #[serde(default)]
    pub mac: Option<String>,
}

// Default values
fn default_ping_timeout() -> u64 {
    1
}

fn default_ssh_timeout() -> u64 {
    5
}

fn default_boot_wait() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_progress_width() -> usize {
    50
}

fn default_backup_root() -> String {
    "/backup".to_string()
}

fn default_log_dir() -> String {
    "/var/log/netbackup".to_string()
}

fn default_retention_days() -> u32 {
    30
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_key_path() -> String {
    "~/.ssh/id_ed25519".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_schedule_time() -> String {
    "02:00".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            common_mac: None,
            ping_timeout: default_ping_timeout(),
            ssh_timeout: default_ssh_timeout(),
            boot_wait: default_boot_wait(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            debug: false,
            encryption_enabled: false,
            incremental: false,
            use_colors: true,
            show_progress: true,
            progress_width: default_progress_width(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_root: default_backup_root(),
            log_dir: default_log_dir(),
            retention_days: default_retention_days(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            key_path: default_key_path(),
            port: default_ssh_port(),
        }
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            default_time: default_schedule_time(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `NETBACKUP_CONFIG` or the default path.
    ///
    /// A missing default file is not an error; an explicitly configured
    /// path that cannot be read is.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    tracing::debug!("No config file at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check the fields serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(mac) = self.network.common_mac.as_deref() {
            if !mac.trim().is_empty() {
                mac.parse::<MacAddress>()?;
            }
        }

        for (index, server) in self.server_ips.iter().enumerate() {
            if server.ip.trim().is_empty() {
                return Err(ConfigError::EmptyAddress(index + 1));
            }
            if let Some(mac) = server.mac.as_deref() {
                if !mac.trim().is_empty() {
                    mac.parse::<MacAddress>()?;
                }
            }
        }

        self.scheduling
            .default_time
            .parse::<ScheduleTime>()
            .map_err(|_| ConfigError::InvalidTime(self.scheduling.default_time.clone()))?;

        Ok(())
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.network.ping_timeout)
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_secs(self.network.ssh_timeout)
    }

    pub fn boot_wait(&self) -> Duration {
        Duration::from_secs(self.network.boot_wait)
    }

    /// SSH key path with a leading `~` expanded against `$HOME`
    pub fn key_path(&self) -> PathBuf {
        expand_home(&self.ssh_config.key_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Per-invocation feature switches: config defaults with CLI flags applied.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub debug: bool,
    pub encryption_enabled: bool,
    pub recipient: Option<String>,
    pub incremental: bool,
    pub use_colors: bool,
    pub show_progress: bool,
    pub progress_width: usize,
}

impl RunOptions {
    pub fn from_defaults(config: &Config) -> Self {
        let recipient = Some(config.encryption.default_recipient.trim().to_string())
            .filter(|r| !r.is_empty());
        Self {
            debug: config.defaults.debug,
            encryption_enabled: config.defaults.encryption_enabled,
            recipient,
            incremental: config.defaults.incremental,
            use_colors: config.defaults.use_colors,
            show_progress: config.defaults.show_progress,
            progress_width: config.defaults.progress_width,
        }
    }
}
