//! File synchronization through `rsync` over SSH.

use super::{check_status, run_tool, ToolIo};
use crate::remote::SshShell;
use crate::utils::ToolError;
use std::time::Duration;
use tokio::process::Command;

const RSYNC: &str = "rsync";

/// Per-call rsync switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Remote directory to hard-link unchanged files against
    pub link_dest: Option<String>,
    pub show_progress: bool,
}

/// Copies `src` to `dst`; either side may be an `user@host:path` spec.
#[allow(async_fn_in_trait)]
pub trait SyncTool {
    async fn sync(&self, src: &str, dst: &str, options: &SyncOptions) -> Result<(), ToolError>;
}

/// `rsync -a` with the remote shell pinned to the configured key and port.
#[derive(Debug, Clone)]
pub struct Rsync {
    ssh_command: String,
}

impl Rsync {
    pub fn new(shell: &SshShell, connect_timeout: Duration) -> Self {
        let ssh_command = format!(
            "ssh -i {} -p {} -o BatchMode=yes -o ConnectTimeout={} -o StrictHostKeyChecking=accept-new",
            shell_words::quote(&shell.key_path().to_string_lossy()),
            shell.port(),
            connect_timeout.as_secs().max(1)
        );
        Self { ssh_command }
    }

    fn args(&self, src: &str, dst: &str, options: &SyncOptions) -> Vec<String> {
        let mut args = vec![
            "-a".to_string(),
            "--partial".to_string(),
            "-e".to_string(),
            self.ssh_command.clone(),
        ];
        if let Some(base) = &options.link_dest {
            args.push(format!("--link-dest={base}"));
        }
        if options.show_progress {
            args.push("--info=progress2".to_string());
        }
        args.push(src.to_string());
        args.push(dst.to_string());
        args
    }
}

impl SyncTool for Rsync {
    async fn sync(&self, src: &str, dst: &str, options: &SyncOptions) -> Result<(), ToolError> {
        let mut cmd = Command::new(RSYNC);
        cmd.args(self.args(src, dst, options));

        tracing::debug!(src, dst, link_dest = ?options.link_dest, "Starting rsync");

        let io = ToolIo {
            inherit_stdout: options.show_progress,
            ..Default::default()
        };
        let output = run_tool(RSYNC, cmd, io).await?;
        check_status(RSYNC, output)?;

        tracing::debug!(src, dst, "rsync completed");
        Ok(())
    }
}

/// `user@host:path`, bracketing IPv6 literals.
pub fn remote_spec(user: &str, host: &str, path: &str) -> String {
    if host.contains(':') {
        format!("{user}@[{host}]:{path}")
    } else {
        format!("{user}@{host}:{path}")
    }
}
