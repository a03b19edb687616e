//! Thread-safe handle to a texture cache.
//!
//! [`LruTextureCache`] itself is single-threaded. Hosts that touch the cache
//! from several threads share one [`SharedTextureCache`], which serializes
//! every operation behind a single mutex.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::CacheConfig;
use crate::dispose::Disposable;
use crate::error::CacheError;
use crate::lru::{CacheStats, LruTextureCache};

/// Clonable, mutex-guarded texture cache
///
/// References to cached values cannot outlive the lock, so lookups either
/// run a closure against the value ([`with`](Self::with)) or clone it
/// ([`get_cloned`](Self::get_cloned)).
pub struct SharedTextureCache<T: Disposable> {
    inner: Arc<Mutex<LruTextureCache<T>>>,
}

impl<T: Disposable> Clone for SharedTextureCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Disposable> SharedTextureCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self::from_cache(LruTextureCache::with_config(config))
    }

    /// Share an existing cache
    pub fn from_cache(cache: LruTextureCache<T>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    // Unlinking always precedes disposal, so a cache whose lock was poisoned
    // by a panicking dispose is still consistent.
    fn lock(&self) -> MutexGuard<'_, LruTextureCache<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a value and run `f` on it while the lock is held.
    ///
    /// Counts a hit or a miss and refreshes recency like
    /// [`LruTextureCache::get`].
    pub fn with<R>(&self, key: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let mut cache = self.lock();
        cache.get(key).map(f)
    }

    /// Like [`with`](Self::with), but returns `None` immediately if another
    /// thread holds the lock.
    ///
    /// Use [`has`](Self::has) to distinguish "busy" from "not cached".
    pub fn try_with<R>(&self, key: &str, f: impl FnOnce(&T) -> R) -> Option<R> {
        let mut cache = match self.inner.try_lock() {
            Ok(cache) => cache,
            Err(std::sync::TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(std::sync::TryLockError::WouldBlock) => return None,
        };
        cache.get(key).map(f)
    }

    pub fn set(
        &self,
        key: impl Into<String>,
        value: T,
        memory_size: Option<usize>,
    ) -> Result<(), CacheError<T::Error>> {
        self.lock().set(key, value, memory_size)
    }

    /// Run `f` on the cached value, producing and caching it first on a miss.
    ///
    /// The producer runs while the lock is held.
    pub fn with_or_insert<F, E, R>(
        &self,
        key: &str,
        produce: F,
        f: impl FnOnce(&T) -> R,
    ) -> Result<R, E>
    where
        F: FnOnce() -> Result<(T, Option<usize>), E>,
        E: From<CacheError<T::Error>>,
    {
        let mut cache = self.lock();
        cache.get_or_insert_with(key, produce).map(f)
    }

    pub fn has(&self, key: &str) -> bool {
        self.lock().has(key)
    }

    pub fn delete(&self, key: &str) -> Result<bool, CacheError<T::Error>> {
        self.lock().delete(key)
    }

    pub fn clear(&self) -> Result<(), CacheError<T::Error>> {
        self.lock().clear()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn reset_stats(&self) {
        self.lock().reset_stats()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.lock().memory_usage()
    }

    pub fn set_max_size(&self, max_size: usize) -> Result<(), CacheError<T::Error>> {
        self.lock().set_max_size(max_size)
    }

    pub fn set_max_memory(&self, max_memory: usize) -> Result<(), CacheError<T::Error>> {
        self.lock().set_max_memory(max_memory)
    }
}

impl<T: Disposable + Clone> SharedTextureCache<T> {
    /// Look up and clone a value
    pub fn get_cloned(&self, key: &str) -> Option<T> {
        self.lock().get(key).cloned()
    }
}

impl<T: Disposable> Default for SharedTextureCache<T> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
