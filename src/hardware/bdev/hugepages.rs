//! Stale Hugepage Cleanup
//!
//! Engine processes that exit uncleanly leave their hugepage backing files
//! behind, pinning memory the next prepare wants to allocate.

use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Removes hugepage files left behind by the engine
#[derive(Debug, Clone)]
pub struct HugepageCleaner {
    dir: PathBuf,
    prefix: String,
}

impl HugepageCleaner {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove regular files matching the prefix and owned by `uid`.
    ///
    /// Returns the number of files removed.
    pub fn clean(&self, uid: u32) -> Result<u32> {
        let pattern = format!(
            "{}/{}*",
            glob::Pattern::escape(&self.dir.to_string_lossy()),
            glob::Pattern::escape(&self.prefix)
        );

        let paths = glob::glob(&pattern)
            .map_err(|e| Error::Configuration(format!("bad hugepage pattern {}: {}", pattern, e)))?;

        let mut removed = 0;
        for path in paths {
            let path = path.map_err(|e| Error::Io(e.into_error()))?;
            if remove_if_owned(&path, uid)? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Removed {} stale hugepage files from {}", removed, self.dir.display());
        }
        Ok(removed)
    }
}

/// Remove `path` if it is a regular file owned by `uid`.
///
/// A file that vanished after the glob matched it counts as not removed.
fn remove_if_owned(path: &Path, uid: u32) -> Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if !meta.is_file() || meta.uid() != uid {
        return Ok(false);
    }

    debug!("removing stale hugepage file {}", path.display());
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
