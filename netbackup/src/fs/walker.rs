//! Size accounting for backup sources and restored trees.
//!
//! Symbolic links are counted but never followed, matching what `rsync -a`
//! and the tar packer transfer.

use std::path::Path;
use walkdir::WalkDir;

/// Totals for everything under one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Regular files and symlinks
    pub files: u64,
    pub directories: u64,
    /// Sum of regular file lengths
    pub bytes: u64,
}

/// Walk `root` (a file or a directory) and total its contents.
pub fn scan(root: &Path) -> std::io::Result<SourceStats> {
    let mut stats = SourceStats::default();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            stats.directories += 1;
            continue;
        }

        stats.files += 1;
        if file_type.is_file() {
            stats.bytes += entry.metadata()?.len();
        }
    }

    Ok(stats)
}
