use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::error::{CacheError, Result};
use crate::storage::SnapshotStorage;

/// In-memory slot, for hosts without a writable cache directory and for tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotStorage {
    blob: Mutex<Option<Vec<u8>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemorySnapshotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail until switched back off.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Replaces the stored bytes directly, bypassing the cache.
    pub fn set_raw(&self, bytes: Vec<u8>) {
        *self.blob.lock() = Some(bytes);
    }

    pub fn raw(&self) -> Option<Vec<u8>> {
        self.blob.lock().clone()
    }
}

impl SnapshotStorage for MemorySnapshotStorage {
    fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.blob.lock().clone())
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )));
        }
        *self.blob.lock() = Some(bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self) -> Result<bool> {
        Ok(self.blob.lock().take().is_some())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
