//! Durable slot holding the persisted snapshot blob.

mod file;
mod memory;

pub use file::FileSnapshotStorage;
pub use memory::MemorySnapshotStorage;

use crate::error::Result;

/// A single blob slot with atomic replace semantics.
///
/// `write_atomic` must either fully replace the blob or leave the previous
/// one untouched; readers never observe a partial write.
pub trait SnapshotStorage: Send + Sync {
    /// Reads the blob, or `None` when nothing has been saved yet.
    fn read(&self) -> Result<Option<Vec<u8>>>;
    fn write_atomic(&self, bytes: &[u8]) -> Result<()>;
    /// Removes the blob. Returns whether one existed.
    fn remove(&self) -> Result<bool>;
    /// Human-readable location for logs and diagnostics.
    fn describe(&self) -> String;
}
