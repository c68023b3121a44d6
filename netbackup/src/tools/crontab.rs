//! The user's crontab as a readable and replaceable job table.

use super::{check_status, run_tool, ToolIo};
use crate::utils::ToolError;
use tokio::process::Command;

const CRONTAB: &str = "crontab";

#[allow(async_fn_in_trait)]
pub trait JobTable {
    /// Current table contents; an absent table reads as empty.
    async fn read(&self) -> Result<String, ToolError>;

    /// Replace the whole table in one step.
    async fn install(&self, table: &str) -> Result<(), ToolError>;
}

#[derive(Debug, Clone, Default)]
pub struct Crontab;

impl JobTable for Crontab {
    async fn read(&self) -> Result<String, ToolError> {
        let mut cmd = Command::new(CRONTAB);
        cmd.arg("-l");
        let output = run_tool(CRONTAB, cmd, ToolIo::default()).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.to_lowercase().contains("no crontab") {
                return Ok(String::new());
            }
        }

        let output = check_status(CRONTAB, output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn install(&self, table: &str) -> Result<(), ToolError> {
        let mut cmd = Command::new(CRONTAB);
        cmd.arg("-");
        let io = ToolIo {
            stdin: Some(table.as_bytes().to_vec()),
            ..Default::default()
        };
        let output = run_tool(CRONTAB, cmd, io).await?;
        check_status(CRONTAB, output)?;
        Ok(())
    }
}
