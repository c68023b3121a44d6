//! Wake-on-LAN through whichever wake tool is installed.

use super::{check_status, run_tool, ToolIo};
use crate::models::MacAddress;
use crate::services::wake::WakeSignal;
use crate::utils::ResolutionError;
use std::path::PathBuf;
use tokio::process::Command;

/// Supported wake programs, in order of preference.
pub const WAKE_TOOLS: [&str; 2] = ["wakeonlan", "etherwake"];

/// The wake program found on `PATH`, if any.
#[derive(Debug, Clone, Default)]
pub struct WakeTool {
    program: Option<(String, PathBuf)>,
}

impl WakeTool {
    pub fn detect() -> Self {
        let program = WAKE_TOOLS.iter().find_map(|name| {
            which::which(name)
                .ok()
                .map(|path| (name.to_string(), path))
        });

        match &program {
            Some((name, path)) => tracing::debug!(tool = %name, path = %path.display(), "Wake tool detected"),
            None => tracing::debug!("No wake tool found on PATH"),
        }

        Self { program }
    }

    pub fn name(&self) -> Option<&str> {
        self.program.as_ref().map(|(name, _)| name.as_str())
    }
}

impl WakeSignal for WakeTool {
    async fn send_wake(&self, mac: MacAddress) -> Result<(), ResolutionError> {
        let (name, path) = self
            .program
            .as_ref()
            .ok_or(ResolutionError::NoWakeToolAvailable)?;

        let mut cmd = Command::new(path);
        cmd.arg(mac.to_string());

        let output = run_tool(name, cmd, ToolIo::default())
            .await
            .map_err(|e| ResolutionError::WakeFailed(e.to_string()))?;
        check_status(name, output).map_err(|e| ResolutionError::WakeFailed(e.to_string()))?;
        Ok(())
    }
}
