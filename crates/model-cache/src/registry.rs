//! Explicit service registry used to locate the process-wide cache.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{GlobalModelCache, SnapshotCache};
use crate::config::CacheConfig;
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::model::{CacheModel, ModelHolder};

/// Type-keyed set of shared services, owned by the host application.
///
/// Services are registered as `Arc<T>` and looked up by `T`, which may be a
/// trait object type such as `dyn GlobalModelCache<M>`.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.read().len())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, returning the one it replaced.
    pub fn register<T>(&self, service: Arc<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .write()
            .insert(TypeId::of::<T>(), Box::new(service))
            .and_then(|previous| previous.downcast::<Arc<T>>().ok())
            .map(|previous| *previous)
    }

    pub fn get<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|service| service.downcast_ref::<Arc<T>>())
            .cloned()
    }

    pub fn unregister<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.services
            .write()
            .remove(&TypeId::of::<T>())
            .and_then(|service| service.downcast::<Arc<T>>().ok())
            .map(|service| *service)
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

/// Looks up the process-wide model cache.
///
/// `None` means caching is unavailable (disabled, or not installed in this
/// mode) and callers should carry on without it.
pub fn global_model_cache<M: CacheModel>(
    registry: &ServiceRegistry,
) -> Option<Arc<dyn GlobalModelCache<M>>> {
    registry.get::<dyn GlobalModelCache<M>>()
}

/// Opens the file-backed cache described by `config` and registers it.
///
/// Returns `Ok(None)` without registering anything when the cache is disabled.
pub fn install_global_model_cache<M: CacheModel>(
    registry: &ServiceRegistry,
    config: &CacheConfig,
    holder: Arc<dyn ModelHolder<M>>,
    diagnostics: Arc<dyn Diagnostics>,
) -> Result<Option<Arc<SnapshotCache<M>>>> {
    if !config.enabled {
        tracing::debug!("model cache disabled by config");
        return Ok(None);
    }
    let cache = Arc::new(SnapshotCache::open(config, holder, diagnostics)?);
    registry.register::<dyn GlobalModelCache<M>>(cache.clone());
    Ok(Some(cache))
}
