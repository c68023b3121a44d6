//! Host liveness checks.
//!
//! `is_reachable` is a best-effort ICMP round trip and only decides whether
//! a wake attempt is worthwhile. `can_accept_command` runs a trivial command
//! over the authenticated channel and is the signal a server is accepted on.

use crate::remote::RemoteShell;
use crate::tools::{run_tool, ToolIo};
use std::time::Duration;
use tokio::process::Command;

#[allow(async_fn_in_trait)]
pub trait LivenessProbe {
    async fn is_reachable(&self, address: &str) -> bool;
    async fn can_accept_command(&self, address: &str) -> bool;
}

/// `ping` for reachability, an `echo` over the remote shell for commands.
pub struct NetworkProbe<S> {
    shell: S,
    ping_timeout: Duration,
    ssh_timeout: Duration,
}

impl<S: RemoteShell> NetworkProbe<S> {
    pub fn new(shell: S, ping_timeout: Duration, ssh_timeout: Duration) -> Self {
        Self {
            shell,
            ping_timeout,
            ssh_timeout,
        }
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    fn ping_command(&self, address: &str) -> Command {
        let mut cmd = Command::new(if address.contains(':') { "ping6" } else { "ping" });
        cmd.arg("-c")
            .arg("1")
            .arg("-W")
            .arg(self.ping_timeout.as_secs().max(1).to_string())
            .arg(address);
        cmd
    }
}

impl<S: RemoteShell> LivenessProbe for NetworkProbe<S> {
    async fn is_reachable(&self, address: &str) -> bool {
        let io = ToolIo {
            // ping's own -W bounds the reply wait; this bounds name resolution
            timeout: Some(self.ping_timeout + Duration::from_secs(2)),
            ..Default::default()
        };

        match run_tool("ping", self.ping_command(address), io).await {
            Ok(output) => {
                let reachable = output.status.success();
                tracing::debug!(host = %address, reachable, "Ping probe finished");
                reachable
            }
            Err(e) => {
                tracing::debug!(host = %address, error = %e, "Ping probe could not run");
                false
            }
        }
    }

    async fn can_accept_command(&self, address: &str) -> bool {
        match self.shell.exec(address, "echo ok", self.ssh_timeout).await {
            Ok(output) if output.success() && output.stdout.trim() == "ok" => {
                tracing::debug!(host = %address, "Remote command probe succeeded");
                true
            }
            Ok(output) => {
                tracing::debug!(host = %address, exit_code = output.exit_code, "Remote command probe rejected");
                false
            }
            Err(e) => {
                tracing::debug!(host = %address, error = %e, "Remote command probe failed");
                false
            }
        }
    }
}
