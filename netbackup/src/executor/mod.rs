//! Transfer session - runs one backup or restore against a resolved server.
//!
//! Backup steps, in order:
//! - stage (encrypted runs only): pack directories, encrypt, drop the
//!   plaintext archive
//! - lock the backup root
//! - sync with the external tool
//! - repoint the `latest` marker (incremental runs only)
//! - verify the artifact exists remotely
//! - audit, prune old logs, release the lock
//!
//! Only staging, locking and the sync itself can fail a run. Everything
//! after the sync downgrades to a [`SessionWarning`].

pub mod audit;
pub mod lock;
pub mod staging;

use crate::config::Config;
use crate::fs::scan;
use crate::models::transfer::{ARCHIVE_SUFFIX, ENCRYPTED_SUFFIX};
use crate::models::{ResolvedEndpoint, Strategy, TransferMode, TransferSpec};
use crate::remote::{quote, remote_join, CommandOutput, RemoteShell};
use crate::tools::rsync::remote_spec;
use crate::tools::{Encryptor, SyncOptions, SyncTool};
use crate::utils::{Result, TransferError};
use audit::{AuditEntry, Outcome};
use chrono::{DateTime, Local};
use lock::RemoteLock;
use staging::{pack_directory, restored_name, unpack_archive, Staging};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Subdirectory of the backup root holding incremental sets.
pub const INCREMENTAL_DIR: &str = "incremental";

/// Marker symlink naming the newest snapshot of a set.
pub const LATEST_MARKER: &str = "latest";

const SNAPSHOT_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Server-side settings a session needs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub backup_root: String,
    pub log_dir: String,
    pub retention_days: u32,
    pub remote_user: String,
    pub command_timeout: Duration,
    pub show_progress: bool,
}

impl SessionSettings {
    pub fn from_config(config: &Config, show_progress: bool) -> Self {
        Self {
            backup_root: config.backup.backup_root.clone(),
            log_dir: config.backup.log_dir.clone(),
            retention_days: config.backup.retention_days,
            remote_user: config.ssh_config.user.clone(),
            command_timeout: config.ssh_timeout(),
            show_progress,
        }
    }
}

/// Non-fatal problems of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionWarning {
    #[error("verification failed: {0} not found")]
    VerificationFailed(String),

    #[error("audit log not written: {0}")]
    AuditWriteFailed(String),

    #[error("latest marker not updated: {0}")]
    MarkerUpdateFailed(String),
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub strategy: Strategy,
    pub source: String,
    pub destination: String,
    pub size_bytes: u64,
    pub warnings: Vec<SessionWarning>,
}

/// Where a backup lands on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BackupPlan {
    /// Directory the sync writes into
    target_dir: String,
    /// Path verification looks for
    artifact: String,
    /// Incremental set directory and the new snapshot's name
    snapshot: Option<(String, String)>,
}

impl BackupPlan {
    fn new(backup_root: &str, spec: &TransferSpec, at: DateTime<Local>) -> Self {
        let name = spec.source_name();
        match spec.strategy() {
            Strategy::Plain => Self {
                target_dir: backup_root.to_string(),
                artifact: remote_join(backup_root, &name),
                snapshot: None,
            },
            Strategy::Incremental => {
                let set_dir = remote_join(&remote_join(backup_root, INCREMENTAL_DIR), &name);
                let stamp = at.format(SNAPSHOT_FORMAT).to_string();
                let target_dir = remote_join(&set_dir, &stamp);
                Self {
                    artifact: remote_join(&target_dir, &name),
                    target_dir,
                    snapshot: Some((set_dir, stamp)),
                }
            }
            Strategy::Encrypted => {
                let suffix = if spec.is_directory {
                    format!("{ARCHIVE_SUFFIX}{ENCRYPTED_SUFFIX}")
                } else {
                    ENCRYPTED_SUFFIX.to_string()
                };
                Self {
                    target_dir: backup_root.to_string(),
                    artifact: remote_join(backup_root, &format!("{name}{suffix}")),
                    snapshot: None,
                }
            }
        }
    }
}

pub struct TransferSession<'a, S, T, E> {
    shell: &'a S,
    sync: &'a T,
    encryptor: &'a E,
    settings: SessionSettings,
}

impl<'a, S, T, E> TransferSession<'a, S, T, E>
where
    S: RemoteShell,
    T: SyncTool,
    E: Encryptor,
{
    pub fn new(shell: &'a S, sync: &'a T, encryptor: &'a E, settings: SessionSettings) -> Self {
        Self {
            shell,
            sync,
            encryptor,
            settings,
        }
    }

    pub async fn run(&self, endpoint: &ResolvedEndpoint, spec: &TransferSpec) -> Result<TransferReport> {
        spec.validate()?;

        if spec.incremental && spec.encryption.is_some() {
            tracing::warn!("Encryption and incremental both requested; running an encrypted transfer");
        }

        match &spec.mode {
            TransferMode::Backup => self.backup(&endpoint.address, spec).await,
            TransferMode::Restore { destination } => {
                self.restore(&endpoint.address, spec, destination).await
            }
        }
    }

    async fn backup(&self, host: &str, spec: &TransferSpec) -> Result<TransferReport> {
        let now = Local::now();
        let plan = BackupPlan::new(&self.settings.backup_root, spec, now);

        let mut report = TransferReport {
            strategy: spec.strategy(),
            source: spec.source.display().to_string(),
            destination: format!("{host}:{}", plan.artifact),
            size_bytes: source_size(&spec.source),
            warnings: Vec::new(),
        };

        tracing::info!(
            host = %host,
            source = %report.source,
            strategy = %report.strategy,
            "Starting backup"
        );

        let mut lock = None;
        let result = self.backup_steps(host, spec, &plan, &mut lock, &mut report).await;

        self.audit(host, "backup", now, &mut report, result.as_ref().err())
            .await;
        self.prune_logs(host).await;

        if let Some(lock) = lock {
            if let Err(e) = lock.release(self.shell, self.settings.command_timeout).await {
                tracing::warn!(host = %host, error = %e, "Failed to release backup root lock");
            }
        }

        result?;
        tracing::info!(destination = %report.destination, warnings = report.warnings.len(), "Backup finished");
        Ok(report)
    }

    async fn backup_steps(
        &self,
        host: &str,
        spec: &TransferSpec,
        plan: &BackupPlan,
        lock: &mut Option<RemoteLock>,
        report: &mut TransferReport,
    ) -> std::result::Result<(), TransferError> {
        // Dropped on every return below
        let staging = Staging::new()?;

        let local = match &spec.encryption {
            Some(encryption) => {
                self.stage_encrypted(spec, &encryption.recipient, &staging)
                    .await?
            }
            None => spec.source.clone(),
        };

        *lock = Some(
            RemoteLock::acquire(
                self.shell,
                host,
                &self.settings.backup_root,
                self.settings.command_timeout,
            )
            .await?,
        );

        self.remote(host, &format!("mkdir -p {}", quote(&plan.target_dir)))
            .await?;

        let link_dest = match &plan.snapshot {
            Some((set_dir, _)) => self.latest_snapshot(host, set_dir).await?,
            None => None,
        };
        match &link_dest {
            Some(previous) => tracing::info!(previous = %previous, "Hard-linking against previous snapshot"),
            None if plan.snapshot.is_some() => tracing::info!("No previous snapshot, running a full copy"),
            None => {}
        }

        let options = SyncOptions {
            link_dest,
            show_progress: self.settings.show_progress,
        };
        let destination = remote_spec(
            &self.settings.remote_user,
            host,
            &format!("{}/", plan.target_dir),
        );
        self.sync
            .sync(&local.to_string_lossy(), &destination, &options)
            .await
            .map_err(|e| TransferError::TransferFailed(e.to_string()))?;

        if let Some((set_dir, stamp)) = &plan.snapshot {
            if let Err(e) = self.repoint_latest(host, set_dir, stamp).await {
                tracing::warn!(host = %host, error = %e, "Failed to update latest marker");
                report
                    .warnings
                    .push(SessionWarning::MarkerUpdateFailed(e.to_string()));
            }
        }

        if !self.remote_exists(host, &plan.artifact).await {
            tracing::warn!(host = %host, artifact = %plan.artifact, "Backup verification failed");
            report
                .warnings
                .push(SessionWarning::VerificationFailed(plan.artifact.clone()));
        }

        Ok(())
    }

    /// Encrypt the source (packing directories first) into `staging`.
    async fn stage_encrypted(
        &self,
        spec: &TransferSpec,
        recipient: &str,
        staging: &Staging,
    ) -> std::result::Result<PathBuf, TransferError> {
        let input = if spec.is_directory {
            pack_directory(&spec.source, staging.path()).await?
        } else {
            spec.source.clone()
        };

        let encrypted = self
            .encryptor
            .encrypt(&input, recipient, staging.path())
            .await
            .map_err(|e| TransferError::EncryptionFailed(e.to_string()));

        // No plaintext archive stays on disk during the transfer
        if spec.is_directory {
            if let Err(e) = tokio::fs::remove_file(&input).await {
                match encrypted {
                    Ok(_) => return Err(e.into()),
                    Err(_) => tracing::warn!(archive = %input.display(), error = %e, "Could not remove plaintext archive"),
                }
            }
        }

        let encrypted = encrypted?;
        tracing::debug!(artifact = %encrypted.display(), "Staged encrypted artifact");
        Ok(encrypted)
    }

    /// Resolved path of the set's `latest` marker, if it points anywhere.
    async fn latest_snapshot(&self, host: &str, set_dir: &str) -> std::result::Result<Option<String>, TransferError> {
        let marker = quote(&remote_join(set_dir, LATEST_MARKER));
        let output = self
            .remote(host, &format!("if [ -d {marker} ]; then readlink -f {marker}; fi"))
            .await?;
        Ok(Some(output.stdout.trim().to_string()).filter(|p| !p.is_empty()))
    }

    /// Point `latest` at `stamp` through a rename, so readers never see a
    /// missing marker.
    async fn repoint_latest(&self, host: &str, set_dir: &str, stamp: &str) -> std::result::Result<(), TransferError> {
        let command = format!(
            "cd {} && ln -sfn {} .latest.tmp && mv -Tf .latest.tmp {LATEST_MARKER}",
            quote(set_dir),
            quote(stamp)
        );
        self.remote(host, &command).await?;
        tracing::debug!(host = %host, snapshot = %stamp, "Latest marker updated");
        Ok(())
    }

    async fn remote_exists(&self, host: &str, path: &str) -> bool {
        match self.remote(host, &format!("test -e {}", quote(path))).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(host = %host, path = %path, error = %e, "Remote existence check failed");
                false
            }
        }
    }

    async fn restore(&self, host: &str, spec: &TransferSpec, destination: &Path) -> Result<TransferReport> {
        let now = Local::now();
        let remote_path = self.restore_source(spec);
        let restored = destination.join(restored_name(&spec.source_name()));

        let mut report = TransferReport {
            strategy: spec.strategy(),
            source: format!("{host}:{remote_path}"),
            destination: restored.display().to_string(),
            size_bytes: 0,
            warnings: Vec::new(),
        };

        tracing::info!(
            host = %host,
            source = %report.source,
            destination = %destination.display(),
            strategy = %report.strategy,
            "Starting restore"
        );

        let result = self
            .restore_steps(host, spec, &remote_path, destination)
            .await;

        if result.is_ok() {
            if restored.exists() {
                report.size_bytes = source_size(&restored);
            } else {
                tracing::warn!(path = %restored.display(), "Restore verification failed");
                report
                    .warnings
                    .push(SessionWarning::VerificationFailed(report.destination.clone()));
            }
        }

        self.audit(host, "restore", now, &mut report, result.as_ref().err())
            .await;

        result?;
        tracing::info!(destination = %report.destination, warnings = report.warnings.len(), "Restore finished");
        Ok(report)
    }

    async fn restore_steps(
        &self,
        host: &str,
        spec: &TransferSpec,
        remote_path: &str,
        destination: &Path,
    ) -> std::result::Result<(), TransferError> {
        tokio::fs::create_dir_all(destination).await?;

        let options = SyncOptions {
            link_dest: None,
            show_progress: self.settings.show_progress,
        };
        let source = remote_spec(&self.settings.remote_user, host, remote_path);

        if spec.encryption.is_none() {
            return self
                .sync
                .sync(&source, &format!("{}/", destination.display()), &options)
                .await
                .map_err(|e| TransferError::TransferFailed(e.to_string()));
        }

        let staging = Staging::new()?;
        self.sync
            .sync(&source, &format!("{}/", staging.path().display()), &options)
            .await
            .map_err(|e| TransferError::TransferFailed(e.to_string()))?;

        let downloaded = staging.path().join(spec.source_name());
        if !downloaded.exists() {
            return Err(TransferError::TransferFailed(format!(
                "{} was not downloaded",
                spec.source_name()
            )));
        }

        let decrypted = self
            .encryptor
            .decrypt(&downloaded, staging.path())
            .await
            .map_err(|e| TransferError::DecryptionFailed(e.to_string()))?;

        if spec.is_directory {
            unpack_archive(&decrypted, destination).await?;
        } else {
            let name = decrypted
                .file_name()
                .ok_or_else(|| TransferError::DecryptionFailed("decrypted file has no name".to_string()))?;
            tokio::fs::copy(&decrypted, destination.join(name)).await?;
        }

        Ok(())
    }

    /// Remote path a restore reads from.
    fn restore_source(&self, spec: &TransferSpec) -> String {
        let relative = spec.source.to_string_lossy();
        if spec.strategy() == Strategy::Incremental {
            let set_dir = remote_join(&remote_join(&self.settings.backup_root, INCREMENTAL_DIR), &relative);
            remote_join(&remote_join(&set_dir, LATEST_MARKER), &spec.source_name())
        } else {
            remote_join(&self.settings.backup_root, &relative)
        }
    }

    /// Append the audit entry. Failures never change the run's outcome.
    async fn audit(
        &self,
        host: &str,
        operation: &str,
        at: DateTime<Local>,
        report: &mut TransferReport,
        error: Option<&TransferError>,
    ) {
        let mut entry = AuditEntry::new(at, operation, report.strategy, &report.source, &report.destination);
        entry.size_bytes = report.size_bytes;
        (entry.outcome, entry.detail) = match error {
            Some(e) => (Outcome::Failed, Some(e.to_string())),
            None if !report.warnings.is_empty() => (
                Outcome::Warning,
                Some(
                    report
                        .warnings
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
            ),
            None => (Outcome::Success, None),
        };

        let written = match audit::append_command(&self.settings.log_dir, at.date_naive(), &entry) {
            Ok(command) => self.remote(host, &command).await.map(|_| ()),
            Err(e) => Err(TransferError::RemoteCommand(e.to_string())),
        };

        if let Err(e) = written {
            tracing::warn!(host = %host, error = %e, "Failed to write audit log");
            report
                .warnings
                .push(SessionWarning::AuditWriteFailed(e.to_string()));
        }
    }

    async fn prune_logs(&self, host: &str) {
        let command = audit::retention_command(&self.settings.log_dir, self.settings.retention_days);
        if let Err(e) = self.remote(host, &command).await {
            tracing::debug!(host = %host, error = %e, "Log retention skipped");
        }
    }

    /// Run a remote command; a non-zero exit is an error.
    async fn remote(&self, host: &str, command: &str) -> std::result::Result<CommandOutput, TransferError> {
        let output = self
            .shell
            .exec(host, command, self.settings.command_timeout)
            .await?;
        if output.success() {
            Ok(output)
        } else {
            Err(TransferError::RemoteCommand(format!(
                "`{command}` exited with code {}",
                output.exit_code
            )))
        }
    }
}

fn source_size(path: &Path) -> u64 {
    match scan(path) {
        Ok(stats) => stats.bytes,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Could not compute size");
            0
        }
    }
}
