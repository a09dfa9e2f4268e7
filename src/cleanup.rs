//! Recursive folder cleanup.
//!
//! Every file under a target folder is sized and then deleted. Files that
//! cannot be removed (in use, permission denied) are counted and left alone.
//! Directories emptied along the way are pruned, but the target folder itself
//! is always kept.

use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use walkdir::WalkDir;

/// Result of clearing one target folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderReport {
    pub path: PathBuf,
    /// False when the folder itself could not be listed.
    pub accessible: bool,
    pub files_found: u64,
    pub files_deleted: u64,
    pub files_failed: u64,
    pub bytes_freed: u64,
    pub dirs_removed: u64,
    /// Subpaths the walk could not enter.
    pub skipped_entries: u64,
}

/// Aggregate over every target folder of one cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub folders: Vec<FolderReport>,
}

impl CleanupReport {
    pub fn files_found(&self) -> u64 {
        self.folders.iter().map(|f| f.files_found).sum()
    }

    pub fn files_deleted(&self) -> u64 {
        self.folders.iter().map(|f| f.files_deleted).sum()
    }

    pub fn files_failed(&self) -> u64 {
        self.folders.iter().map(|f| f.files_failed).sum()
    }

    pub fn bytes_freed(&self) -> u64 {
        self.folders.iter().map(|f| f.bytes_freed).sum()
    }

    pub fn inaccessible(&self) -> impl Iterator<Item = &FolderReport> {
        self.folders.iter().filter(|f| !f.accessible)
    }

    pub fn all_inaccessible(&self) -> bool {
        !self.folders.is_empty() && self.folders.iter().all(|f| !f.accessible)
    }
}

/// Clears each folder in turn. Blocking; run it off the async runtime.
pub fn clean_folders(folders: &[PathBuf]) -> CleanupReport {
    CleanupReport {
        folders: folders.iter().map(|f| clear_directory(f)).collect(),
    }
}

/// Deletes the contents of `root`, keeping `root` itself.
pub fn clear_directory(root: &Path) -> FolderReport {
    let mut report = FolderReport {
        path: root.to_path_buf(),
        ..FolderReport::default()
    };

    if let Err(e) = fs::read_dir(root) {
        debug!(path = %root.display(), error = %e, "cleanup target not accessible");
        return report;
    }
    report.accessible = true;

    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                trace!(error = %e, "skipping unreadable entry");
                report.skipped_entries += 1;
                continue;
            }
        };

        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
            continue;
        }

        let size = if entry.file_type().is_file() {
            entry.metadata().map(|m| m.len()).unwrap_or(0)
        } else {
            0
        };
        report.files_found += 1;
        match fs::remove_file(entry.path()) {
            Ok(()) => {
                report.files_deleted += 1;
                report.bytes_freed += size;
            }
            Err(e) => {
                trace!(path = %entry.path().display(), error = %e, "file left in place");
                report.files_failed += 1;
            }
        }
    }

    dirs.sort_by_key(|d| Reverse(d.components().count()));
    for dir in dirs {
        if fs::remove_dir(&dir).is_ok() {
            report.dirs_removed += 1;
        }
    }

    debug!(
        path = %root.display(),
        found = report.files_found,
        deleted = report.files_deleted,
        failed = report.files_failed,
        bytes = report.bytes_freed,
        "folder cleared"
    );
    report
}

/// Size and file count of everything under `root`, without touching it.
pub fn measure(root: &Path) -> (u64, u64) {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .fold((0, 0), |(bytes, files), e| {
            (bytes + e.metadata().map(|m| m.len()).unwrap_or(0), files + 1)
        })
}
