//! Package archive creation (`<version>.tar.gz`)
//!
//! The archive holds the *contents* of the source directory, not the
//! directory itself, and skips top-level dot-entries the way a shell `*`
//! glob does.

use crate::core::error::DeployError;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Builder;
use tracing::debug;
use walkdir::WalkDir;

/// Result of a successful archive run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Location of the written archive
    pub path: PathBuf,
    /// Number of entries (files, directories, links) stored
    pub entries: usize,
    /// Compressed size in bytes
    pub bytes: u64,
}

/// Archive file name for a version
pub fn archive_file_name(version: &str) -> String {
    format!("{}.tar.gz", version)
}

/// Create a gzip-compressed tarball of `source_dir`'s contents at `dest`
///
/// Blocking; callers on the async runtime should wrap it in
/// `spawn_blocking`.
pub fn create_archive(source_dir: &Path, dest: &Path) -> Result<ArchiveSummary, DeployError> {
    let archive_err = |message: String| DeployError::ArchiveFailed {
        path: source_dir.to_path_buf(),
        message,
    };

    if !source_dir.is_dir() {
        return Err(archive_err("not a directory".to_string()));
    }

    let file = File::create(dest).map_err(|e| DeployError::StagingFailed {
        path: dest.to_path_buf(),
        message: e.to_string(),
    })?;
    // Resolved after creation so it can be skipped if it lives inside the tree
    let dest_canonical = fs::canonicalize(dest).ok();

    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut top_level: Vec<PathBuf> = fs::read_dir(source_dir)
        .map_err(|e| archive_err(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .collect();
    top_level.sort();

    let mut entries = 0;
    for root in top_level {
        let walker = WalkDir::new(&root)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name();
        for item in walker {
            let item = item.map_err(|e| archive_err(e.to_string()))?;

            if item.file_type().is_file()
                && dest_canonical.is_some()
                && fs::canonicalize(item.path()).ok() == dest_canonical
            {
                continue;
            }

            let name = item
                .path()
                .strip_prefix(source_dir)
                .map_err(|e| archive_err(e.to_string()))?;

            builder
                .append_path_with_name(item.path(), name)
                .map_err(|e| archive_err(format!("{}: {}", name.display(), e)))?;
            entries += 1;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| archive_err(e.to_string()))?;
    let file = encoder.finish().map_err(|e| archive_err(e.to_string()))?;
    let bytes = file.metadata().map(|m| m.len()).unwrap_or_default();

    debug!(path = %dest.display(), entries, bytes, "archive written");

    Ok(ArchiveSummary {
        path: dest.to_path_buf(),
        entries,
        bytes,
    })
}
