//! Process-wide persisted snapshot cache for an immutable-by-replacement model.
//!
//! This crate provides:
//! - A single cache slot holding the latest loaded or saved model snapshot
//! - Debounced, coalescing saves executed by one background writer thread
//! - Compressed, versioned persistence with atomic replace
//! - An explicit service registry for locating the process-wide instance

pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod flush;
pub mod model;
pub mod persistence;
pub mod registry;
pub mod stats;
pub mod storage;
pub mod time;

// Re-export main types
pub use cache::{CacheLoad, GlobalModelCache, SaveReport, SnapshotCache};
pub use config::{CacheConfig, DEFAULT_CACHE_DIR_NAME, DEFAULT_CACHE_FILE_NAME};
pub use diagnostics::{
    CacheDiagnostic, Diagnostics, RecordingDiagnostics, Severity, TracingDiagnostics,
};
pub use error::{CacheError, Result};
pub use model::{CacheModel, ModelHolder, SharedModel};
pub use persistence::{CacheHeader, CACHE_FORMAT_VERSION};
pub use registry::{global_model_cache, install_global_model_cache, ServiceRegistry};
pub use stats::CacheStatsSnapshot;
pub use storage::{FileSnapshotStorage, MemorySnapshotStorage, SnapshotStorage};
