//! Advisory lock on a server's backup root.
//!
//! `mkdir` is atomic on POSIX file systems, so the lock is a directory with
//! the owner's token inside. Only the owner removes it.

use crate::remote::{quote, remote_join, RemoteShell};
use crate::utils::TransferError;
use std::time::Duration;

pub const LOCK_NAME: &str = ".netbackup.lock";

/// Exit code the acquire script uses for "already held".
const HELD: i32 = 3;

#[derive(Debug)]
pub struct RemoteLock {
    host: String,
    path: String,
    token: String,
}

impl RemoteLock {
    pub async fn acquire<S: RemoteShell>(
        shell: &S,
        host: &str,
        backup_root: &str,
        timeout: Duration,
    ) -> Result<Self, TransferError> {
        let path = remote_join(backup_root, LOCK_NAME);
        let token = owner_token();
        let owner_file = remote_join(&path, "owner");

        let script = format!(
            "mkdir -p {root} || exit 2; mkdir {lock} 2>/dev/null || {{ cat {owner} 2>/dev/null; exit {HELD}; }}; printf '%s' {token} > {owner}",
            root = quote(backup_root),
            lock = quote(&path),
            owner = quote(&owner_file),
            token = quote(&token),
        );

        let output = shell.exec(host, &script, timeout).await?;
        match output.exit_code {
            0 => {
                tracing::debug!(host = %host, lock = %path, "Acquired backup root lock");
                Ok(Self {
                    host: host.to_string(),
                    path,
                    token,
                })
            }
            HELD => Err(TransferError::Locked {
                root: backup_root.to_string(),
                owner: Some(output.stdout.trim())
                    .filter(|o| !o.is_empty())
                    .unwrap_or("unknown owner")
                    .to_string(),
            }),
            code => Err(TransferError::RemoteCommand(format!(
                "cannot create lock {path} (exit code {code})"
            ))),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Remove the lock if this run still owns it.
    pub async fn release<S: RemoteShell>(self, shell: &S, timeout: Duration) -> Result<(), TransferError> {
        let owner_file = remote_join(&self.path, "owner");
        let script = format!(
            "[ \"$(cat {owner} 2>/dev/null)\" = {token} ] && rm -rf {lock}",
            owner = quote(&owner_file),
            token = quote(&self.token),
            lock = quote(&self.path),
        );

        let output = shell.exec(&self.host, &script, timeout).await?;
        if output.success() {
            tracing::debug!(host = %self.host, lock = %self.path, "Released backup root lock");
            Ok(())
        } else {
            Err(TransferError::RemoteCommand(format!(
                "lock {} is no longer owned by this run",
                self.path
            )))
        }
    }
}

fn owner_token() -> String {
    format!("{}@{}", uuid::Uuid::new_v4(), super::audit::local_hostname())
}
