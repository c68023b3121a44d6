//! Recording fakes for the collaborator traits, shared by unit tests.

use crate::models::MacAddress;
use crate::remote::{CommandOutput, RemoteShell};
use crate::services::probe::LivenessProbe;
use crate::services::wake::WakeSignal;
use crate::tools::{Encryptor, JobTable, SyncOptions, SyncTool};
use crate::utils::{RemoteError, ResolutionError, ToolError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeCall {
    Reachable(String),
    Command(String),
}

/// Probe answering from fixed sets of hosts.
#[derive(Default)]
pub struct FakeProbe {
    pub reachable: HashSet<String>,
    /// Hosts that fail their first reachability check only
    pub wakes_up: HashSet<String>,
    pub accepts_commands: HashSet<String>,
    pub calls: Mutex<Vec<ProbeCall>>,
}

impl FakeProbe {
    pub fn reachable(mut self, host: &str) -> Self {
        self.reachable.insert(host.to_string());
        self
    }

    pub fn wakes_up(mut self, host: &str) -> Self {
        self.wakes_up.insert(host.to_string());
        self
    }

    pub fn accepts_commands(mut self, host: &str) -> Self {
        self.accepts_commands.insert(host.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ProbeCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl LivenessProbe for FakeProbe {
    async fn is_reachable(&self, address: &str) -> bool {
        let mut calls = self.calls.lock().unwrap();
        let earlier = calls
            .iter()
            .filter(|c| **c == ProbeCall::Reachable(address.to_string()))
            .count();
        calls.push(ProbeCall::Reachable(address.to_string()));
        self.reachable.contains(address) || (self.wakes_up.contains(address) && earlier > 0)
    }

    async fn can_accept_command(&self, address: &str) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push(ProbeCall::Command(address.to_string()));
        self.accepts_commands.contains(address)
    }
}

/// Wake sender recording every MAC it was asked to wake.
#[derive(Default)]
pub struct FakeWake {
    pub unavailable: bool,
    pub sent: Mutex<Vec<MacAddress>>,
}

impl FakeWake {
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<MacAddress> {
        self.sent.lock().unwrap().clone()
    }
}

impl WakeSignal for FakeWake {
    async fn send_wake(&self, mac: MacAddress) -> Result<(), ResolutionError> {
        if self.unavailable {
            return Err(ResolutionError::NoWakeToolAvailable);
        }
        self.sent.lock().unwrap().push(mac);
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq)]
enum RuleMatch {
    Contains,
    Prefix,
}

/// Remote shell answering by substring or prefix rules; unmatched commands
/// succeed with empty output.
#[derive(Default)]
pub struct FakeShell {
    rules: Vec<(RuleMatch, String, Result<CommandOutput, String>)>,
    pub commands: Mutex<Vec<(String, String)>>,
}

impl FakeShell {
    /// Commands containing `pattern` exit with `exit_code` and print `stdout`.
    pub fn on(self, pattern: &str, exit_code: i32, stdout: &str) -> Self {
        self.rule(RuleMatch::Contains, pattern, exit_code, stdout)
    }

    /// Commands starting with `prefix` exit with `exit_code` and print
    /// `stdout`. Unlike [`FakeShell::on`], commands that merely quote the
    /// prefix (such as audit lines) are not matched.
    pub fn on_prefix(self, prefix: &str, exit_code: i32, stdout: &str) -> Self {
        self.rule(RuleMatch::Prefix, prefix, exit_code, stdout)
    }

    fn rule(mut self, kind: RuleMatch, pattern: &str, exit_code: i32, stdout: &str) -> Self {
        self.rules.push((
            kind,
            pattern.to_string(),
            Ok(CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
            }),
        ));
        self
    }

    /// Commands containing `pattern` fail at the channel level.
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.rules.push((
            RuleMatch::Contains,
            pattern.to_string(),
            Err("channel closed".to_string()),
        ));
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.commands().iter().any(|c| c.contains(pattern))
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }
}

impl RemoteShell for FakeShell {
    async fn exec(
        &self,
        host: &str,
        command: &str,
        _timeout: Duration,
    ) -> Result<CommandOutput, RemoteError> {
        self.commands
            .lock()
            .unwrap()
            .push((host.to_string(), command.to_string()));

        for (kind, pattern, response) in &self.rules {
            let matched = match kind {
                RuleMatch::Contains => command.contains(pattern.as_str()),
                RuleMatch::Prefix => command.starts_with(pattern.as_str()),
            };
            if matched {
                return response.clone().map_err(RemoteError::Join);
            }
        }

        Ok(CommandOutput {
            exit_code: 0,
            stdout: String::new(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SyncCall {
    pub src: String,
    pub dst: String,
    pub options: SyncOptions,
    /// Names in the local source's parent directory at call time
    pub siblings: Vec<String>,
}

/// Sync tool recording calls. Sources listed in `downloads` are written
/// into a local destination directory, imitating a download.
#[derive(Default)]
pub struct FakeSync {
    pub fail: bool,
    pub downloads: HashMap<String, Vec<u8>>,
    pub calls: Mutex<Vec<SyncCall>>,
}

impl FakeSync {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn download(mut self, remote_suffix: &str, content: &[u8]) -> Self {
        self.downloads
            .insert(remote_suffix.to_string(), content.to_vec());
        self
    }

    pub fn calls(&self) -> Vec<SyncCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl SyncTool for FakeSync {
    async fn sync(&self, src: &str, dst: &str, options: &SyncOptions) -> Result<(), ToolError> {
        let siblings = Path::new(src)
            .parent()
            .and_then(|p| std::fs::read_dir(p).ok())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();

        self.calls.lock().unwrap().push(SyncCall {
            src: src.to_string(),
            dst: dst.to_string(),
            options: options.clone(),
            siblings,
        });

        if self.fail {
            return Err(ToolError::Failed {
                tool: "rsync".to_string(),
                code: Some(23),
                stderr: "partial transfer".to_string(),
            });
        }

        for (suffix, content) in &self.downloads {
            if src.ends_with(suffix.as_str()) {
                let name = suffix.rsplit('/').next().unwrap_or(suffix);
                std::fs::write(Path::new(dst).join(name), content).unwrap();
            }
        }

        Ok(())
    }
}

/// "Encrypts" by prefixing `ENC:` so tests can inspect the payload.
#[derive(Default)]
pub struct FakeEncryptor {
    pub fail_encrypt: bool,
    /// Delete the input before answering, like a tool that consumes it
    pub consume_input: bool,
    pub fail_decrypt: bool,
    pub encrypted: Mutex<Vec<(PathBuf, String)>>,
}

impl Encryptor for FakeEncryptor {
    async fn encrypt(
        &self,
        input: &Path,
        recipient: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, ToolError> {
        if self.consume_input {
            std::fs::remove_file(input).unwrap();
        }
        if self.fail_encrypt {
            return Err(ToolError::Failed {
                tool: "gpg".to_string(),
                code: Some(2),
                stderr: "public key not found".to_string(),
            });
        }
        let output = crate::tools::gpg::encrypted_path(input, output_dir);
        let mut data = b"ENC:".to_vec();
        data.extend(std::fs::read(input).unwrap());
        std::fs::write(&output, data).unwrap();
        self.encrypted
            .lock()
            .unwrap()
            .push((input.to_path_buf(), recipient.to_string()));
        Ok(output)
    }

    async fn decrypt(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ToolError> {
        if self.fail_decrypt {
            return Err(ToolError::Failed {
                tool: "gpg".to_string(),
                code: Some(2),
                stderr: "decryption failed: No secret key".to_string(),
            });
        }
        let output = crate::tools::gpg::decrypted_path(input, output_dir);
        let data = std::fs::read(input).unwrap();
        let plain = data.strip_prefix(b"ENC:").unwrap_or(&data);
        std::fs::write(&output, plain).unwrap();
        Ok(output)
    }
}

/// In-memory job table.
#[derive(Default)]
pub struct FakeJobTable {
    pub table: Mutex<String>,
    pub installs: Mutex<usize>,
}

impl FakeJobTable {
    pub fn with(table: &str) -> Self {
        Self {
            table: Mutex::new(table.to_string()),
            installs: Mutex::new(0),
        }
    }

    pub fn table(&self) -> String {
        self.table.lock().unwrap().clone()
    }

    pub fn installs(&self) -> usize {
        *self.installs.lock().unwrap()
    }
}

impl JobTable for FakeJobTable {
    async fn read(&self) -> Result<String, ToolError> {
        Ok(self.table())
    }

    async fn install(&self, table: &str) -> Result<(), ToolError> {
        *self.table.lock().unwrap() = table.to_string();
        *self.installs.lock().unwrap() += 1;
        Ok(())
    }
}
