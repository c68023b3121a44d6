//! `ssh2`-backed remote shell using public-key authentication.
//!
//! Server host keys follow the same trust-on-first-use policy as the rsync
//! channel (`StrictHostKeyChecking=accept-new`): an unknown host is
//! recorded in `known_hosts`, a changed key is refused.

use super::{CommandOutput, RemoteShell};
use crate::config::Config;
use crate::utils::RemoteError;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection settings for the backup servers' SSH daemons.
#[derive(Debug, Clone)]
pub struct SshShell {
    user: String,
    key_path: PathBuf,
    port: u16,
    known_hosts: Option<PathBuf>,
}

impl SshShell {
    pub fn new(user: impl Into<String>, key_path: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            user: user.into(),
            key_path: key_path.into(),
            port,
            known_hosts: std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".ssh").join("known_hosts")),
        }
    }

    /// Use `path` instead of `~/.ssh/known_hosts`.
    pub fn with_known_hosts(mut self, path: impl Into<PathBuf>) -> Self {
        self.known_hosts = Some(path.into());
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.ssh_config.user.clone(),
            config.key_path(),
            config.ssh_config.port,
        )
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn known_hosts(&self) -> Option<&Path> {
        self.known_hosts.as_deref()
    }
}

/// Name a host is recorded under in `known_hosts`.
fn known_hosts_name(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{host}]:{port}")
    }
}

/// Accept a known or new host key; refuse a changed one.
fn verify_host_key(sess: &ssh2::Session, shell: &SshShell, host: &str) -> Result<(), RemoteError> {
    let Some(path) = shell.known_hosts.as_deref() else {
        tracing::warn!(host, "No known_hosts file location, host key not checked");
        return Ok(());
    };
    let (key, key_type) = sess
        .host_key()
        .map(|(key, key_type)| (key.to_vec(), key_type))
        .ok_or_else(|| RemoteError::HostKey {
            host: host.to_string(),
            reason: "server sent no host key".to_string(),
        })?;

    let mut known = sess.known_hosts()?;
    if path.exists() {
        known.read_file(path, ssh2::KnownHostFileKind::OpenSSH)?;
    }

    match known.check_port(host, shell.port, &key) {
        ssh2::CheckResult::Match => Ok(()),
        ssh2::CheckResult::NotFound => {
            let name = known_hosts_name(host, shell.port);
            known.add(&name, &key, "added by netbackup", key_type.into())?;
            let saved = path
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .map_err(RemoteError::from)
                .and_then(|()| Ok(known.write_file(path, ssh2::KnownHostFileKind::OpenSSH)?));
            match saved {
                Ok(()) => tracing::info!(host = %name, file = %path.display(), "Recorded new host key"),
                Err(e) => tracing::warn!(host = %name, error = %e, "Could not record new host key"),
            }
            Ok(())
        }
        ssh2::CheckResult::Mismatch => Err(RemoteError::HostKey {
            host: host.to_string(),
            reason: format!("key differs from {}", path.display()),
        }),
        ssh2::CheckResult::Failure => Err(RemoteError::HostKey {
            host: host.to_string(),
            reason: "known_hosts lookup failed".to_string(),
        }),
    }
}

impl RemoteShell for SshShell {
    async fn exec(
        &self,
        host: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, RemoteError> {
        let shell = self.clone();
        let host_owned = host.to_string();
        let command = command.to_string();

        // ssh2 is blocking; keep it off the runtime thread
        let task = tokio::task::spawn_blocking(move || {
            exec_blocking(&shell, &host_owned, &command, timeout)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(RemoteError::Join(e.to_string())),
            Err(_) => Err(RemoteError::Timeout {
                host: host.to_string(),
                secs: timeout.as_secs(),
            }),
        }
    }
}

fn exec_blocking(
    shell: &SshShell,
    host: &str,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, RemoteError> {
    let addr = (host, shell.port)
        .to_socket_addrs()
        .map_err(|_| RemoteError::Resolve(host.to_string()))?
        .next()
        .ok_or_else(|| RemoteError::Resolve(host.to_string()))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|source| RemoteError::Connect {
        host: host.to_string(),
        source,
    })?;

    let mut sess = ssh2::Session::new()?;
    sess.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    sess.set_tcp_stream(tcp);
    sess.handshake()?;
    verify_host_key(&sess, shell, host)?;

    sess.userauth_pubkey_file(&shell.user, None, &shell.key_path, None)
        .map_err(|e| RemoteError::Authentication {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

    if !sess.authenticated() {
        return Err(RemoteError::Authentication {
            host: host.to_string(),
            reason: "key rejected".to_string(),
        });
    }

    let mut channel = sess.channel_session()?;
    channel.exec(command)?;

    let mut stdout = String::new();
    channel.read_to_string(&mut stdout)?;
    channel.wait_close()?;
    let exit_code = channel.exit_status()?;

    tracing::debug!(host, command, exit_code, "Remote command finished");

    Ok(CommandOutput { exit_code, stdout })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.ssh_config.user = "backup".into();
        config.ssh_config.key_path = "/keys/id".into();
        config.ssh_config.port = 2200;

        let shell = SshShell::from_config(&config);
        assert_eq!(shell.user(), "backup");
        assert_eq!(shell.key_path(), Path::new("/keys/id"));
        assert_eq!(shell.port(), 2200);
    }

    #[test]
    fn test_known_hosts_name() {
        assert_eq!(known_hosts_name("backup1", 22), "backup1");
        assert_eq!(known_hosts_name("10.0.0.5", 2200), "[10.0.0.5]:2200");
    }

    #[test]
    fn test_known_hosts_override() {
        let shell = SshShell::new("backup", "/keys/id", 22).with_known_hosts("/tmp/kh");
        assert_eq!(shell.known_hosts(), Some(Path::new("/tmp/kh")));
    }

    #[tokio::test]
    async fn test_closed_port_is_connect_error() {
        // Port 1 on loopback is not expected to run sshd
        let shell = SshShell::new("nobody", "/nonexistent/key", 1);
        let result = shell
            .exec("127.0.0.1", "true", Duration::from_secs(2))
            .await;
        assert!(matches!(
            result,
            Err(RemoteError::Connect { .. }) | Err(RemoteError::Timeout { .. })
        ));
    }
}
