//! Adapters for the external programs netbackup drives.
//!
//! Each adapter exposes a narrow trait so the core never parses free-form
//! tool output beyond exit status and a few well-defined fields.

pub mod crontab;
pub mod gpg;
pub mod rsync;
pub mod wol;

use crate::utils::ToolError;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub use crontab::{Crontab, JobTable};
pub use gpg::{Encryptor, Gpg};
pub use rsync::{Rsync, SyncOptions, SyncTool};
pub use wol::WakeTool;

/// How a tool's standard streams are wired.
#[derive(Debug, Default)]
pub(crate) struct ToolIo {
    /// Bytes written to the tool's stdin
    pub stdin: Option<Vec<u8>>,
    /// Let stdout reach the terminal (progress output)
    pub inherit_stdout: bool,
    pub timeout: Option<Duration>,
}

/// Spawn `cmd` and collect its output. Does not check the exit status.
pub(crate) async fn run_tool(tool: &str, mut cmd: Command, io: ToolIo) -> Result<Output, ToolError> {
    cmd.stdout(if io.inherit_stdout {
        Stdio::inherit()
    } else {
        Stdio::piped()
    })
    .stderr(Stdio::piped())
    .stdin(if io.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .kill_on_drop(true);

    let spawn_error = |source: std::io::Error| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ToolError::NotInstalled {
                tool: tool.to_string(),
            }
        } else {
            ToolError::Spawn {
                tool: tool.to_string(),
                source,
            }
        }
    };

    let mut child = cmd.spawn().map_err(spawn_error)?;

    if let Some(input) = io.stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(&input).await.map_err(spawn_error)?;
            // Dropping the pipe closes stdin
        }
    }

    let wait = child.wait_with_output();
    let output = match io.timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| ToolError::Timeout {
                tool: tool.to_string(),
                secs: limit.as_secs(),
            })?,
        None => wait.await,
    }
    .map_err(spawn_error)?;

    Ok(output)
}

/// Turn a non-zero exit into [`ToolError::Failed`].
pub(crate) fn check_status(tool: &str, output: Output) -> Result<Output, ToolError> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(ToolError::Failed {
            tool: tool.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
