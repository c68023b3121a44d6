//! Requests flowing from the CLI through resolution into a transfer.

use crate::models::server::MacAddress;
use crate::utils::{ConfigError, Result, TransferError};
use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix of the single-file container built from directory sources.
pub const ARCHIVE_SUFFIX: &str = ".tar.zst";

/// Suffix of encrypted artifacts.
pub const ENCRYPTED_SUFFIX: &str = ".gpg";

/// How the target server is selected. Exactly one mode per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionRequest {
    /// Explicit address given with `-m`
    Manual(String),
    /// 1-based position in the registry given with `-i`
    ById(i64),
    /// First configured server that answers
    AutoDiscover,
}

impl ResolutionRequest {
    /// Combine the `-m` and `-i` flags into one request.
    pub fn from_selection(manual: Option<String>, id: Option<i64>) -> std::result::Result<Self, ConfigError> {
        match (manual, id) {
            (Some(_), Some(_)) => Err(ConfigError::Usage(
                "-m and -i are mutually exclusive".to_string(),
            )),
            (Some(address), None) => {
                let address = address.trim().to_string();
                if address.is_empty() {
                    return Err(ConfigError::Usage("-m requires a non-empty address".to_string()));
                }
                Ok(ResolutionRequest::Manual(address))
            }
            (None, Some(id)) => Ok(ResolutionRequest::ById(id)),
            (None, None) => Ok(ResolutionRequest::AutoDiscover),
        }
    }
}

/// A server that answered, ready for exactly one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub address: String,
    pub mac: Option<MacAddress>,
    pub verified_reachable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferMode {
    Backup,
    /// Restore into a local destination directory
    Restore { destination: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionSpec {
    pub recipient: String,
}

/// Which of the three mutually exclusive transfer paths a run takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Plain,
    Incremental,
    Encrypted,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Plain => "plain",
            Strategy::Incremental => "incremental",
            Strategy::Encrypted => "encrypted",
        };
        f.write_str(name)
    }
}

/// One backup or restore request.
///
/// For backups `source` is a local path. For restores it is relative to the
/// server's backup root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSpec {
    pub source: PathBuf,
    pub is_directory: bool,
    pub encryption: Option<EncryptionSpec>,
    pub incremental: bool,
    pub mode: TransferMode,
}

impl TransferSpec {
    pub fn backup(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let source = std::fs::canonicalize(&source).unwrap_or(source);
        Self {
            is_directory: source.is_dir(),
            source,
            encryption: None,
            incremental: false,
            mode: TransferMode::Backup,
        }
    }

    pub fn restore(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let is_directory = is_archive_artifact(&source);
        Self {
            source,
            is_directory,
            encryption: None,
            incremental: false,
            mode: TransferMode::Restore {
                destination: destination.into(),
            },
        }
    }

    /// Enable encryption. A missing recipient is kept as empty and rejected
    /// by [`TransferSpec::validate`].
    pub fn with_encryption(mut self, recipient: Option<String>) -> Self {
        self.encryption = Some(EncryptionSpec {
            recipient: recipient.unwrap_or_default().trim().to_string(),
        });
        self
    }

    pub fn with_incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    /// Checks that must pass before any network action.
    pub fn validate(&self) -> Result<()> {
        if let Some(encryption) = &self.encryption {
            if encryption.recipient.is_empty() {
                return Err(ConfigError::MissingRecipient.into());
            }
        }

        match &self.mode {
            TransferMode::Backup => {
                if !self.source.exists() {
                    return Err(TransferError::SourceNotFound(self.source.clone()).into());
                }
            }
            TransferMode::Restore { .. } => {
                if self.encryption.is_some()
                    && !self.source_name().ends_with(ENCRYPTED_SUFFIX)
                {
                    return Err(TransferError::InvalidArtifact(self.source_name()).into());
                }
            }
        }

        Ok(())
    }

    /// Encryption wins over incremental.
    pub fn strategy(&self) -> Strategy {
        if self.encryption.is_some() {
            Strategy::Encrypted
        } else if self.incremental {
            Strategy::Incremental
        } else {
            Strategy::Plain
        }
    }

    pub fn is_restore(&self) -> bool {
        matches!(self.mode, TransferMode::Restore { .. })
    }

    /// Last path component of the source, used to name remote artifacts.
    pub fn source_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "root".to_string())
    }
}

/// Whether an encrypted artifact name denotes a packed directory.
pub fn is_archive_artifact(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().ends_with(&format!("{ARCHIVE_SUFFIX}{ENCRYPTED_SUFFIX}")))
        .unwrap_or(false)
}
