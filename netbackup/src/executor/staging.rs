//! Scoped local staging for archives and encrypted artifacts.
//!
//! The staging directory is removed when [`Staging`] drops, so every exit
//! path of a transfer cleans up after itself.

use crate::models::transfer::ARCHIVE_SUFFIX;
use crate::utils::TransferError;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ZSTD_LEVEL: i32 = 3;

pub struct Staging {
    dir: TempDir,
}

impl Staging {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("netbackup-").tempdir()?;
        tracing::debug!(path = %dir.path().display(), "Created staging directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Pack `source` into `<output_dir>/<name>.tar.zst`. Entries are rooted at
/// the directory's own name so unpacking recreates it.
pub async fn pack_directory(source: &Path, output_dir: &Path) -> Result<PathBuf, TransferError> {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    let archive = output_dir.join(format!("{name}{ARCHIVE_SUFFIX}"));

    let source = source.to_path_buf();
    let target = archive.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let file = File::create(&target)?;
        let encoder = zstd::Encoder::new(file, ZSTD_LEVEL)?;
        let mut builder = tar::Builder::new(encoder);
        builder.follow_symlinks(false);
        builder.append_dir_all(&name, &source)?;
        builder.into_inner()?.finish()?;
        Ok(())
    })
    .await
    .map_err(|e| TransferError::ArchiveFailed(e.to_string()))?
    .map_err(|e| TransferError::ArchiveFailed(e.to_string()))?;

    tracing::debug!(archive = %archive.display(), "Packed directory");
    Ok(archive)
}

/// Unpack a `.tar.zst` archive into `destination`.
pub async fn unpack_archive(archive: &Path, destination: &Path) -> Result<(), TransferError> {
    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let decoder = zstd::Decoder::new(File::open(&archive)?)?;
        tar::Archive::new(decoder).unpack(&destination)
    })
    .await
    .map_err(|e| TransferError::ExtractFailed(e.to_string()))?
    .map_err(|e| TransferError::ExtractFailed(e.to_string()))
}

/// Name a restored artifact ends up under once decrypted and unpacked:
/// `docs.tar.zst.gpg` restores as `docs`, `notes.txt.gpg` as `notes.txt`.
pub fn restored_name(artifact: &str) -> &str {
    let name = artifact
        .strip_suffix(crate::models::transfer::ENCRYPTED_SUFFIX)
        .unwrap_or(artifact);
    name.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_staging_removed_on_drop() {
        let staging = Staging::new().unwrap();
        let path = staging.path().to_path_buf();
        fs::write(path.join("artifact"), b"x").unwrap();
        assert!(path.exists());
        drop(staging);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_pack_and_unpack_directory() {
        let source_root = TempDir::new().unwrap();
        let source = source_root.path().join("docs");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.txt"), b"alpha").unwrap();
        fs::write(source.join("sub/b.txt"), b"beta").unwrap();

        let staging = Staging::new().unwrap();
        let archive = pack_directory(&source, staging.path()).await.unwrap();
        assert_eq!(archive.file_name().unwrap(), "docs.tar.zst");

        let out = TempDir::new().unwrap();
        unpack_archive(&archive, out.path()).await.unwrap();
        assert_eq!(fs::read(out.path().join("docs/a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(out.path().join("docs/sub/b.txt")).unwrap(), b"beta");
    }

    #[tokio::test]
    async fn test_pack_missing_source_fails() {
        let staging = Staging::new().unwrap();
        let result = pack_directory(Path::new("/definitely/not/here"), staging.path()).await;
        assert!(matches!(result, Err(TransferError::ArchiveFailed(_))));
    }

    #[tokio::test]
    async fn test_unpack_garbage_fails() {
        let staging = Staging::new().unwrap();
        let bogus = staging.path().join("docs.tar.zst");
        fs::write(&bogus, b"not an archive").unwrap();
        let result = unpack_archive(&bogus, staging.path()).await;
        assert!(matches!(result, Err(TransferError::ExtractFailed(_))));
    }

    #[test]
    fn test_restored_name() {
        assert_eq!(restored_name("docs.tar.zst.gpg"), "docs");
        assert_eq!(restored_name("notes.txt.gpg"), "notes.txt");
        assert_eq!(restored_name("plain"), "plain");
    }
}
