//! Authenticated remote-command channel to backup servers.
//!
//! All remote state (snapshots, the `latest` marker, audit logs, the lock)
//! is changed through [`RemoteShell::exec`].

pub mod ssh;

use crate::utils::RemoteError;
use std::time::Duration;

pub use ssh::SshShell;

/// Exit code and standard output of a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a shell command on a host over an authenticated channel.
#[allow(async_fn_in_trait)]
pub trait RemoteShell {
    async fn exec(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, RemoteError>;
}

/// Quote a single argument for the remote POSIX shell.
pub fn quote(arg: &str) -> String {
    shell_words::quote(arg).into_owned()
}

/// Join remote path components with exactly one `/` between them.
pub fn remote_join(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if base.is_empty() {
        format!("/{child}")
    } else {
        format!("{base}/{child}")
    }
}
