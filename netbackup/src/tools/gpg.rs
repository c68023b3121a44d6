//! Public-key encryption through `gpg`.

use super::{check_status, run_tool, ToolIo};
use crate::models::transfer::ENCRYPTED_SUFFIX;
use crate::utils::ToolError;
use std::path::{Path, PathBuf};
use tokio::process::Command;

const GPG: &str = "gpg";

/// Both operations write into `output_dir` and return the written path.
#[allow(async_fn_in_trait)]
pub trait Encryptor {
    /// `dir/name` -> `output_dir/name.gpg`
    async fn encrypt(
        &self,
        input: &Path,
        recipient: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, ToolError>;

    /// `dir/name.gpg` -> `output_dir/name`
    async fn decrypt(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ToolError>;
}

#[derive(Debug, Clone, Default)]
pub struct Gpg;

impl Encryptor for Gpg {
    async fn encrypt(
        &self,
        input: &Path,
        recipient: &str,
        output_dir: &Path,
    ) -> Result<PathBuf, ToolError> {
        let output_path = encrypted_path(input, output_dir);

        let mut cmd = Command::new(GPG);
        cmd.args(["--batch", "--yes", "--trust-model", "always", "--recipient", recipient, "--output"])
            .arg(&output_path)
            .arg("--encrypt")
            .arg(input);

        let output = run_tool(GPG, cmd, ToolIo::default()).await?;
        check_status(GPG, output)?;
        Ok(output_path)
    }

    async fn decrypt(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, ToolError> {
        let output_path = decrypted_path(input, output_dir);

        let mut cmd = Command::new(GPG);
        cmd.args(["--batch", "--yes", "--output"])
            .arg(&output_path)
            .arg("--decrypt")
            .arg(input);

        let output = run_tool(GPG, cmd, ToolIo::default()).await?;
        check_status(GPG, output)?;
        Ok(output_path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string())
}

/// Where the encrypted copy of `input` goes.
pub fn encrypted_path(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}{ENCRYPTED_SUFFIX}", file_name(input)))
}

/// Where the plaintext of `input` goes. Names without `.gpg` get `.out`.
pub fn decrypted_path(input: &Path, output_dir: &Path) -> PathBuf {
    let name = file_name(input);
    match name.strip_suffix(ENCRYPTED_SUFFIX) {
        Some(stem) if !stem.is_empty() => output_dir.join(stem),
        _ => output_dir.join(format!("{name}.out")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths() {
        let staging = Path::new("/tmp/stage");
        assert_eq!(
            encrypted_path(Path::new("/home/me/docs.tar.zst"), staging),
            PathBuf::from("/tmp/stage/docs.tar.zst.gpg")
        );
        assert_eq!(
            decrypted_path(Path::new("/tmp/dl/docs.tar.zst.gpg"), staging),
            PathBuf::from("/tmp/stage/docs.tar.zst")
        );
        assert_eq!(
            decrypted_path(Path::new("/tmp/dl/notes"), staging),
            PathBuf::from("/tmp/stage/notes.out")
        );
        assert_eq!(
            decrypted_path(Path::new("/tmp/dl/.gpg"), staging),
            PathBuf::from("/tmp/stage/.gpg.out")
        );
    }
}
