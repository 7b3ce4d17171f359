use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{io_error_at, Result};
use crate::storage::SnapshotStorage;

/// Stores the blob in a single file, replaced through temp file + rename.
#[derive(Debug, Clone)]
pub struct FileSnapshotStorage {
    path: PathBuf,
}

impl FileSnapshotStorage {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl SnapshotStorage for FileSnapshotStorage {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(io_error_at("read cache file", &self.path, error)),
        }
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent)
            .map_err(|error| io_error_at("create cache directory", parent, error))?;

        // The temp file lives next to the target so the rename stays on one filesystem.
        let mut temp = NamedTempFile::new_in(parent)
            .map_err(|error| io_error_at("create temp file in", parent, error))?;
        temp.write_all(bytes)
            .map_err(|error| io_error_at("write temp file", temp.path(), error))?;
        temp.as_file()
            .sync_all()
            .map_err(|error| io_error_at("sync temp file", temp.path(), error))?;

        temp.persist(&self.path)
            .map_err(|error| io_error_at("finalize cache file", &self.path, error.error))?;

        tracing::debug!(
            "wrote model cache to {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }

    fn remove(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(io_error_at("remove cache file", &self.path, error)),
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
