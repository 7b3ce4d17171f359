//! The model seam: what the cache snapshots and where it gets it from.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Any value the cache can persist.
pub trait CacheModel: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheModel for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Supplies the model state a save should persist.
///
/// Implementations must hand out an immutable view; the cache serializes it
/// on the writer thread while the host may already be replacing it.
pub trait ModelHolder<M>: Send + Sync {
    /// The current model, or `None` when no model has been built yet.
    fn current(&self) -> Option<Arc<M>>;
}

/// A model holder with replace-on-write semantics.
#[derive(Debug)]
pub struct SharedModel<M> {
    current: RwLock<Option<Arc<M>>>,
    revision: AtomicU64,
}

impl<M> Default for SharedModel<M> {
    fn default() -> Self {
        Self {
            current: RwLock::new(None),
            revision: AtomicU64::new(0),
        }
    }
}

impl<M> SharedModel<M> {
    pub fn new(initial: M) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(initial))),
            revision: AtomicU64::new(1),
        }
    }

    /// Replaces the current model and returns the new revision.
    pub fn replace(&self, model: M) -> u64 {
        self.replace_arc(Arc::new(model))
    }

    pub fn replace_arc(&self, model: Arc<M>) -> u64 {
        let mut current = self.current.write();
        *current = Some(model);
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of replacements made so far.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

impl<M: Clone> SharedModel<M> {
    /// Clones the current model, applies `edit`, and installs the result.
    ///
    /// Returns `None` when there is no model to edit.
    pub fn update(&self, edit: impl FnOnce(&mut M)) -> Option<u64> {
        let mut current = self.current.write();
        let mut next = current.as_deref()?.clone();
        edit(&mut next);
        *current = Some(Arc::new(next));
        Some(self.revision.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl<M: Send + Sync> ModelHolder<M> for SharedModel<M> {
    fn current(&self) -> Option<Arc<M>> {
        self.current.read().clone()
    }
}
