//! SnapshotCache - the process-wide model snapshot cache.


use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::CacheConfig;
use crate::diagnostics::{CacheDiagnostic, Diagnostics};
use crate::error::{CacheError, Result};
use crate::flush::{FlushDecision, FlushRequest, FlushSignal, FlushWorkerHandle};
use crate::model::{CacheModel, ModelHolder};
use crate::persistence::{
    decode_snapshot, encode_snapshot, read_header, CacheHeader, CACHE_FORMAT_VERSION,
};
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::storage::{FileSnapshotStorage, SnapshotStorage};
use crate::time::unix_now_secs;

/// Result of [`GlobalModelCache::load_cache`].
#[derive(Debug)]
pub enum CacheLoad<M> {
    Present(Arc<M>),
    /// No usable snapshot: nothing saved yet, or the saved one was unreadable.
    Absent,
}

impl<M> CacheLoad<M> {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn snapshot(&self) -> Option<&Arc<M>> {
        match self {
            Self::Present(snapshot) => Some(snapshot),
            Self::Absent => None,
        }
    }

    pub fn into_option(self) -> Option<Arc<M>> {
        match self {
            Self::Present(snapshot) => Some(snapshot),
            Self::Absent => None,
        }
    }
}

impl<M> Clone for CacheLoad<M> {
    fn clone(&self) -> Self {
        match self {
            Self::Present(snapshot) => Self::Present(snapshot.clone()),
            Self::Absent => Self::Absent,
        }
    }
}

/// The service interface hosts look up through the registry.
pub trait GlobalModelCache<M>: Send + Sync {
    /// Returns the cached snapshot, reading it from storage on first use.
    fn load_cache(&self) -> CacheLoad<M>;
    /// Requests a background save of the holder's current model.
    fn schedule_cache_save(&self);
}

/// What a completed save wrote.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SaveReport {
    pub header: CacheHeader,
    pub bytes: usize,
}

/// State shared between the cache handle and its writer thread.
struct SharedCache<M> {
    storage: Arc<dyn SnapshotStorage>,
    holder: Arc<dyn ModelHolder<M>>,
    diagnostics: Arc<dyn Diagnostics>,
    model_version: u32,
    compression_level: i32,
    /// The snapshot last loaded or saved.
    current: RwLock<Option<Arc<M>>>,
    /// Serializes cold loads so storage is decoded at most once.
    /// Taken before `write_lane` when both are needed.
    load_lane: Mutex<()>,
    /// Held by every path that writes or removes the persisted blob, or
    /// installs a loaded snapshot.
    write_lane: Mutex<()>,
    generation: AtomicU64,
    /// Set once `generation` accounts for the blob already in storage.
    generation_seeded: AtomicBool,
    /// The persisted blob failed to decode; cleared by a save or `invalidate`.
    known_bad: AtomicBool,
    flush_signal: Arc<FlushSignal>,
    stats: CacheStats,
}

impl<M: CacheModel> SharedCache<M> {
    fn memory_hit(&self) -> Option<Arc<M>> {
        let snapshot = self.current.read().clone()?;
        CacheStats::bump(&self.stats.memory_hits);
        Some(snapshot)
    }

    fn load(&self) -> CacheLoad<M> {
        if let Some(snapshot) = self.memory_hit() {
            return CacheLoad::Present(snapshot);
        }

        let _load_lane = self.load_lane.lock();
        if let Some(snapshot) = self.memory_hit() {
            return CacheLoad::Present(snapshot);
        }
        if self.known_bad.load(Ordering::SeqCst) {
            return CacheLoad::Absent;
        }

        let started = Instant::now();
        let (header, model) = match self.read_persisted() {
            Ok(Some(loaded)) => loaded,
            Ok(None) => {
                tracing::debug!("no model cache at {}", self.storage.describe());
                return CacheLoad::Absent;
            }
            Err(error) => {
                // Read errors may be transient; a blob that fails to decode will not change.
                if !matches!(error, CacheError::Io(_)) {
                    self.known_bad.store(true, Ordering::SeqCst);
                }
                CacheStats::bump(&self.stats.load_failures);
                self.diagnostics.report(CacheDiagnostic::from_load_error(
                    self.storage.describe(),
                    &error,
                ));
                return CacheLoad::Absent;
            }
        };
        CacheStats::bump(&self.stats.storage_loads);

        let model = Arc::new(model);
        let snapshot = {
            let _write_lane = self.write_lane.lock();
            self.generation.fetch_max(header.generation, Ordering::SeqCst);
            self.generation_seeded.store(true, Ordering::SeqCst);
            // A save may have finished while we were decoding; its snapshot is newer.
            self.current.write().get_or_insert_with(|| model).clone()
        };

        tracing::debug!(
            "loaded model cache from {} (generation={}, saved_at={}, load_ms={})",
            self.storage.describe(),
            header.generation,
            header.saved_at,
            started.elapsed().as_millis()
        );
        CacheLoad::Present(snapshot)
    }

    fn read_persisted(&self) -> Result<Option<(CacheHeader, M)>> {
        let Some(bytes) = self.storage.read()? else {
            return Ok(None);
        };
        let _span = tracing::debug_span!("model_cache_decode", bytes = bytes.len()).entered();
        decode_snapshot(&bytes, self.model_version).map(Some)
    }

    /// Captures the holder's model and persists it.
    ///
    /// Returns `Ok(None)` when the holder has no model yet.
    fn save(&self) -> Result<Option<SaveReport>> {
        let _write_lane = self.write_lane.lock();
        let Some(model) = self.holder.current() else {
            tracing::debug!("model cache save skipped: no model available");
            return Ok(None);
        };

        let generation = self.next_generation();
        let header = CacheHeader::new(self.model_version, generation, unix_now_secs());
        let bytes = encode_snapshot(&header, model.as_ref(), self.compression_level)?;
        self.storage.write_atomic(&bytes)?;

        self.generation.store(generation, Ordering::SeqCst);
        self.known_bad.store(false, Ordering::SeqCst);
        *self.current.write() = Some(model);
        self.stats.record_save(header.saved_at, bytes.len());

        tracing::debug!(
            "saved model cache to {} (generation={}, {} bytes)",
            self.storage.describe(),
            generation,
            bytes.len()
        );
        Ok(Some(SaveReport {
            header,
            bytes: bytes.len(),
        }))
    }

    /// Generation for the next save. Callers hold the write lane.
    ///
    /// The first save without a prior load continues from the header of
    /// whatever blob is already in storage.
    fn next_generation(&self) -> u64 {
        if !self.generation_seeded.swap(true, Ordering::SeqCst) {
            let existing = self
                .storage
                .read()
                .ok()
                .flatten()
                .and_then(|bytes| read_header(&bytes).ok())
                .filter(|header| header.format_version == CACHE_FORMAT_VERSION);
            if let Some(header) = existing {
                self.generation.fetch_max(header.generation, Ordering::SeqCst);
            }
        }
        self.generation.load(Ordering::SeqCst) + 1
    }

    /// Save path used by the writer thread: failures become diagnostics.
    fn save_in_background(&self) {
        if let Err(error) = self.save() {
            CacheStats::bump(&self.stats.save_failures);
            self.diagnostics.report(CacheDiagnostic::from_save_error(
                self.storage.describe(),
                &error,
            ));
        }
    }
}

/// Process-wide snapshot cache backed by one storage slot.
///
/// Safe to share between threads. Dropping it stops the writer thread,
/// writing a pending save first when `flush_on_shutdown` is set.
pub struct SnapshotCache<M: CacheModel> {
    shared: Arc<SharedCache<M>>,
    flush_worker: Mutex<Option<FlushWorkerHandle>>,
}

impl<M: CacheModel> std::fmt::Debug for SnapshotCache<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache")
            .field("location", &self.shared.storage.describe())
            .field("model_version", &self.shared.model_version)
            .field("stats", &self.shared.stats.snapshot())
            .finish()
    }
}

impl<M: CacheModel> SnapshotCache<M> {
    /// Opens the cache on the file named by `config`.
    pub fn open(
        config: &CacheConfig,
        holder: Arc<dyn ModelHolder<M>>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self> {
        let path = config.cache_path()?;
        let storage = Arc::new(FileSnapshotStorage::new(path));
        Self::with_storage(config, storage, holder, diagnostics)
    }

    /// Opens the cache on an arbitrary storage slot.
    pub fn with_storage(
        config: &CacheConfig,
        storage: Arc<dyn SnapshotStorage>,
        holder: Arc<dyn ModelHolder<M>>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Result<Self> {
        config.validate()?;
        let flush_signal = Arc::new(FlushSignal::new(
            config.save_delay(),
            config.max_save_delay(),
        ));
        let shared = Arc::new(SharedCache {
            storage,
            holder,
            diagnostics,
            model_version: config.model_version,
            compression_level: config.compression_level,
            current: RwLock::new(None),
            load_lane: Mutex::new(()),
            write_lane: Mutex::new(()),
            generation: AtomicU64::new(0),
            generation_seeded: AtomicBool::new(false),
            known_bad: AtomicBool::new(false),
            flush_signal,
            stats: CacheStats::default(),
        });

        let flush_worker = spawn_flush_worker(shared.clone(), config.flush_on_shutdown)?;

        tracing::debug!(
            "model cache opened at {} (model_version={}, save_delay_ms={})",
            shared.storage.describe(),
            config.model_version,
            config.save_delay_ms
        );

        Ok(Self {
            shared,
            flush_worker: Mutex::new(Some(flush_worker)),
        })
    }

    pub fn load_cache(&self) -> CacheLoad<M> {
        self.shared.load()
    }

    pub fn schedule_cache_save(&self) {
        CacheStats::bump(&self.shared.stats.saves_requested);
        match self.shared.flush_signal.request() {
            FlushRequest::Scheduled => {}
            FlushRequest::Coalesced => CacheStats::bump(&self.shared.stats.saves_coalesced),
            FlushRequest::Closed => {
                tracing::debug!("model cache save ignored: writer shut down");
            }
        }
    }

    /// Saves the holder's current model on the calling thread.
    ///
    /// Unlike [`SnapshotCache::schedule_cache_save`] this reports failures to
    /// the caller. Returns `Ok(None)` when the holder has no model.
    pub fn save_now(&self) -> Result<Option<SaveReport>> {
        let result = self.shared.save();
        if result.is_err() {
            CacheStats::bump(&self.shared.stats.save_failures);
        }
        result
    }

    /// Drops the persisted and in-memory snapshot so the next load is absent.
    pub fn invalidate(&self) -> Result<()> {
        self.shared.flush_signal.cancel_pending();
        // Waits out any cold load so it cannot reinstall the removed snapshot.
        let _load_lane = self.shared.load_lane.lock();
        let _write_lane = self.shared.write_lane.lock();
        let removed = self.shared.storage.remove()?;
        *self.shared.current.write() = None;
        self.shared.known_bad.store(false, Ordering::SeqCst);
        tracing::debug!(
            "model cache invalidated at {} (removed={})",
            self.shared.storage.describe(),
            removed
        );
        Ok(())
    }

    /// Waits until no save is pending or running. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.flush_signal.wait_idle(timeout)
    }

    /// Stops the writer thread. Later save requests are ignored.
    pub fn shutdown(&self) {
        let worker = self.flush_worker.lock().take();
        drop(worker);
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn location(&self) -> String {
        self.shared.storage.describe()
    }
}

impl<M: CacheModel> GlobalModelCache<M> for SnapshotCache<M> {
    fn load_cache(&self) -> CacheLoad<M> {
        SnapshotCache::load_cache(self)
    }

    fn schedule_cache_save(&self) {
        SnapshotCache::schedule_cache_save(self)
    }
}

fn spawn_flush_worker<M: CacheModel>(
    shared: Arc<SharedCache<M>>,
    flush_on_shutdown: bool,
) -> Result<FlushWorkerHandle> {
    let signal = shared.flush_signal.clone();
    let join_handle = thread::Builder::new()
        .name("model-cache-writer".to_string())
        .spawn(move || loop {
            match shared.flush_signal.wait_for_flush() {
                FlushDecision::Flush => {
                    shared.save_in_background();
                    shared.flush_signal.finish_flush();
                }
                FlushDecision::Shutdown { pending } => {
                    if pending && flush_on_shutdown {
                        shared.save_in_background();
                    } else if pending {
                        tracing::debug!("model cache pending save dropped at shutdown");
                    }
                    shared.flush_signal.finish_flush();
                    break;
                }
            }
        })
        .map_err(|error| {
            CacheError::Internal(format!("failed to spawn model cache writer: {error}"))
        })?;

    Ok(FlushWorkerHandle::new(signal, join_handle))
}
