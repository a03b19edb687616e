//! Texture cache with LRU eviction
//!
//! Bounds both the number of live textures and the memory they are charged
//! for. Entries live in a `Vec` arena linked into a doubly linked recency
//! list by index; a `HashMap` maps keys to arena indices. Removal uses
//! `swap_remove` and patches the links of the node that moved, so the arena
//! never holds dead slots and every operation stays O(1).

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::CacheConfig;
use crate::dispose::Disposable;
use crate::error::{CacheError, DisposeFailures};

/// Null link in the recency list.
const NIL: usize = usize::MAX;

struct Node<T> {
    key: String,
    value: T,
    memory_size: usize,
    prev: usize,
    next: usize,
}

/// Snapshot of cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently cached
    pub size: usize,

    /// Maximum number of entries
    pub max_size: usize,

    /// Number of successful lookups
    pub hits: u64,

    /// Number of failed lookups
    pub misses: u64,

    /// `hits / (hits + misses)`, or 0.0 before the first lookup
    pub hit_rate: f64,

    /// Bytes currently charged to cached entries
    pub memory_usage: usize,

    /// Memory limit in bytes (0 = unlimited)
    pub max_memory: usize,

    /// Number of entries evicted to make room
    pub evictions: u64,
}

impl CacheStats {
    /// Memory utilization (0.0 to 1.0), or 0.0 when memory is unlimited
    pub fn memory_utilization(&self) -> f64 {
        if self.max_memory == 0 {
            0.0
        } else {
            self.memory_usage as f64 / self.max_memory as f64
        }
    }
}

/// Capacity- and memory-bounded LRU cache of disposable resources.
///
/// The cache owns every stored value and releases it exactly once through
/// [`Disposable::dispose`] when it is evicted, replaced, deleted or cleared.
/// Values still cached when the cache is dropped are released as well.
///
/// The cache is single-threaded; wrap it in a
/// [`SharedTextureCache`](crate::SharedTextureCache) to use it from several
/// threads.
///
/// # Example
///
/// ```
/// use cad_viewer_cache::{CacheConfig, LruTextureCache};
///
/// let mut cache: LruTextureCache<Vec<u8>> =
///     LruTextureCache::with_config(CacheConfig::new(2, 0));
///
/// cache.set("hatch:ansi31", vec![0u8; 64], None).unwrap();
/// cache.set("hatch:brick", vec![0u8; 64], None).unwrap();
/// assert!(cache.get("hatch:ansi31").is_some());
///
/// // "hatch:brick" is now least recently used and makes room for the new entry
/// cache.set("hatch:dots", vec![0u8; 64], None).unwrap();
/// assert!(!cache.has("hatch:brick"));
///
/// let stats = cache.stats();
/// assert_eq!(stats.size, 2);
/// assert_eq!(stats.hit_rate, 1.0);
/// ```
pub struct LruTextureCache<T: Disposable> {
    map: HashMap<String, usize>,
    arena: Vec<Node<T>>,
    /// Most recently used
    head: usize,
    /// Least recently used
    tail: usize,

    max_size: usize,
    max_memory: usize,
    default_texture_memory: usize,
    total_memory: usize,

    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T: Disposable> LruTextureCache<T> {
    /// Create a cache with the default configuration
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a cache from a configuration.
    ///
    /// A `max_size` of zero is treated as one; use
    /// [`CacheConfig::validate`] to reject such configurations up front.
    pub fn with_config(config: CacheConfig) -> Self {
        let max_size = config.max_size.max(1);
        Self {
            map: HashMap::with_capacity(max_size.min(1024)),
            arena: Vec::with_capacity(max_size.min(1024)),
            head: NIL,
            tail: NIL,
            max_size,
            max_memory: config.max_memory,
            default_texture_memory: config.default_texture_memory,
            total_memory: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Create a cache with explicit entry and byte limits
    pub fn with_limits(max_size: usize, max_memory: usize) -> Self {
        Self::with_config(CacheConfig::new(max_size, max_memory))
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Memory limit in bytes (0 = unlimited)
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    pub fn default_texture_memory(&self) -> usize {
        self.default_texture_memory
    }

    /// Bytes currently charged to cached entries
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Look up a value, marking it most recently used.
    ///
    /// Counts a hit or a miss.
    pub fn get(&mut self, key: &str) -> Option<&T> {
        match self.map.get(key).copied() {
            Some(idx) => {
                self.hits += 1;
                self.move_to_head(idx);
                trace!(key, "Texture cache hit");
                Some(&self.arena[idx].value)
            }
            None => {
                self.misses += 1;
                trace!(key, "Texture cache miss");
                None
            }
        }
    }

    /// Look up a value without changing recency or statistics
    pub fn peek(&self, key: &str) -> Option<&T> {
        self.map.get(key).map(|&idx| &self.arena[idx].value)
    }

    /// Check for a key without changing recency or statistics
    pub fn has(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Store a value, taking ownership of it.
    ///
    /// `memory_size` defaults to the configured default texture memory.
    ///
    /// If the key is already cached, the old value is replaced and disposed;
    /// no other entry is evicted. Otherwise least recently used entries are
    /// evicted until the new entry fits, then it is inserted as most recently
    /// used. A single entry larger than the memory limit is still inserted
    /// once the cache has been emptied.
    ///
    /// # Errors
    ///
    /// Returns the first dispose failure after the insertion has completed.
    pub fn set(
        &mut self,
        key: impl Into<String>,
        value: T,
        memory_size: Option<usize>,
    ) -> Result<(), CacheError<T::Error>> {
        let key = key.into();
        let memory_size = memory_size.unwrap_or(self.default_texture_memory);

        if let Some(idx) = self.map.get(&key).copied() {
            return self.replace(idx, key, value, memory_size);
        }

        let (_, failures) = self.insert(key, value, memory_size);
        failures.into_result()
    }

    /// Return the cached value for `key`, producing and caching it on a miss.
    ///
    /// `produce` returns the new value and its optional memory size. A hit or
    /// miss is counted exactly as for [`get`](Self::get). If `produce` fails
    /// its error is returned and the cache is left untouched.
    ///
    /// # Errors
    ///
    /// Producer errors, and dispose failures from evictions made to fit the
    /// new value (converted into `E`). The new value is cached in that case.
    pub fn get_or_insert_with<F, E>(&mut self, key: &str, produce: F) -> Result<&T, E>
    where
        F: FnOnce() -> Result<(T, Option<usize>), E>,
        E: From<CacheError<T::Error>>,
    {
        let idx = match self.map.get(key).copied() {
            Some(idx) => {
                self.hits += 1;
                self.move_to_head(idx);
                trace!(key, "Texture cache hit");
                idx
            }
            None => {
                self.misses += 1;
                trace!(key, "Texture cache miss, producing value");
                let (value, memory_size) = produce()?;
                let memory_size = memory_size.unwrap_or(self.default_texture_memory);
                let (idx, failures) = self.insert(key.to_owned(), value, memory_size);
                failures.into_result()?;
                idx
            }
        };

        Ok(&self.arena[idx].value)
    }

    /// Remove and dispose a value.
    ///
    /// Returns `Ok(false)` if the key was not cached.
    pub fn delete(&mut self, key: &str) -> Result<bool, CacheError<T::Error>> {
        let Some(idx) = self.map.get(key).copied() else {
            return Ok(false);
        };

        let node = self.detach(idx);
        let mut failures = DisposeFailures::new();
        release(node, &mut failures);
        failures.into_result().map(|()| true)
    }

    /// Dispose every cached value and reset memory usage.
    ///
    /// Hit and miss counters are preserved; see [`reset_stats`](Self::reset_stats).
    pub fn clear(&mut self) -> Result<(), CacheError<T::Error>> {
        let count = self.arena.len();
        let mut failures = DisposeFailures::new();
        self.drain(&mut failures);
        debug!(count, "Texture cache cleared");
        failures.into_result()
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            size: self.arena.len(),
            max_size: self.max_size,
            hits: self.hits,
            misses: self.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
            memory_usage: self.total_memory,
            max_memory: self.max_memory,
            evictions: self.evictions,
        }
    }

    /// Zero the hit, miss and eviction counters
    pub fn reset_stats(&mut self) {
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
    }

    /// Change the entry limit, evicting least recently used entries if the
    /// cache now holds too many. Zero is treated as one.
    pub fn set_max_size(&mut self, max_size: usize) -> Result<(), CacheError<T::Error>> {
        self.max_size = max_size.max(1);
        debug!(max_size = self.max_size, "Texture cache entry limit changed");

        let mut failures = DisposeFailures::new();
        while self.arena.len() > self.max_size {
            if !self.evict_lru(&mut failures) {
                break;
            }
        }
        failures.into_result()
    }

    /// Change the memory limit (0 = unlimited), evicting least recently used
    /// entries until usage fits.
    pub fn set_max_memory(&mut self, max_memory: usize) -> Result<(), CacheError<T::Error>> {
        self.max_memory = max_memory;
        debug!(max_memory, "Texture cache memory limit changed");

        let mut failures = DisposeFailures::new();
        if self.max_memory > 0 {
            while self.total_memory > self.max_memory {
                if !self.evict_lru(&mut failures) {
                    break;
                }
            }
        }
        failures.into_result()
    }

    /// Iterate over cached keys from most to least recently used
    pub fn keys(&self) -> Keys<'_, T> {
        Keys {
            arena: &self.arena,
            current: self.head,
            remaining: self.arena.len(),
        }
    }

    /// Replace the value of an existing entry in place.
    fn replace(
        &mut self,
        idx: usize,
        key: String,
        value: T,
        memory_size: usize,
    ) -> Result<(), CacheError<T::Error>> {
        let node = &mut self.arena[idx];
        let old_value = std::mem::replace(&mut node.value, value);
        self.total_memory = self
            .total_memory
            .saturating_sub(node.memory_size)
            .saturating_add(memory_size);
        node.memory_size = memory_size;
        self.move_to_head(idx);
        trace!(key = %key, memory_size, "Texture cache entry replaced");

        let mut failures = DisposeFailures::new();
        if let Err(source) = old_value.dispose() {
            failures.record(key, source);
        }
        failures.into_result()
    }

    /// Make room for `memory_size` more bytes and insert a new entry at the
    /// head. Returns the arena index of the new entry.
    fn insert(
        &mut self,
        key: String,
        value: T,
        memory_size: usize,
    ) -> (usize, DisposeFailures<T::Error>) {
        let mut failures = DisposeFailures::new();

        while self.arena.len() >= self.max_size {
            if !self.evict_lru(&mut failures) {
                break;
            }
        }

        if self.max_memory > 0 {
            while self.total_memory.saturating_add(memory_size) > self.max_memory {
                if !self.evict_lru(&mut failures) {
                    break;
                }
            }
            if memory_size > self.max_memory {
                debug!(
                    key = %key,
                    memory_size,
                    max_memory = self.max_memory,
                    "Texture exceeds cache memory limit on its own"
                );
            }
        }

        let idx = self.arena.len();
        self.arena.push(Node {
            key: key.clone(),
            value,
            memory_size,
            prev: NIL,
            next: NIL,
        });
        self.push_head(idx);
        self.map.insert(key, idx);
        self.total_memory = self.total_memory.saturating_add(memory_size);

        (idx, failures)
    }

    /// Evict the least recently used entry. Returns false if the cache is empty.
    fn evict_lru(&mut self, failures: &mut DisposeFailures<T::Error>) -> bool {
        if self.tail == NIL {
            return false;
        }

        let node = self.detach(self.tail);
        self.evictions += 1;
        debug!(
            key = %node.key,
            memory_size = node.memory_size,
            memory_usage = self.total_memory,
            "Evicted texture from cache"
        );
        release(node, failures);
        true
    }

    /// Unlink the node at `idx` from the list and map and take it out of the
    /// arena. The caller is responsible for disposing its value.
    fn detach(&mut self, idx: usize) -> Node<T> {
        self.unlink(idx);
        let node = self.arena.swap_remove(idx);
        self.map.remove(&node.key);
        self.total_memory = self.total_memory.saturating_sub(node.memory_size);

        // The former last node now sits at `idx`; point its neighbours at it
        if idx < self.arena.len() {
            let (prev, next) = (self.arena[idx].prev, self.arena[idx].next);
            if prev != NIL {
                self.arena[prev].next = idx;
            } else {
                self.head = idx;
            }
            if next != NIL {
                self.arena[next].prev = idx;
            } else {
                self.tail = idx;
            }
            if let Some(slot) = self.map.get_mut(&self.arena[idx].key) {
                *slot = idx;
            }
        }

        node
    }

    /// Empty the cache, disposing every value after all bookkeeping is reset.
    fn drain(&mut self, failures: &mut DisposeFailures<T::Error>) {
        let arena = std::mem::take(&mut self.arena);
        self.map.clear();
        self.head = NIL;
        self.tail = NIL;
        self.total_memory = 0;

        for node in arena {
            release(node, failures);
        }
    }

    fn unlink(&mut self, idx: usize) {
        let prev = self.arena[idx].prev;
        let next = self.arena[idx].next;

        if prev != NIL {
            self.arena[prev].next = next;
        } else {
            self.head = next;
        }

        if next != NIL {
            self.arena[next].prev = prev;
        } else {
            self.tail = prev;
        }

        self.arena[idx].prev = NIL;
        self.arena[idx].next = NIL;
    }

    fn push_head(&mut self, idx: usize) {
        self.arena[idx].prev = NIL;
        self.arena[idx].next = self.head;

        if self.head != NIL {
            self.arena[self.head].prev = idx;
        }
        self.head = idx;

        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn move_to_head(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.unlink(idx);
        self.push_head(idx);
    }
}

fn release<T: Disposable>(node: Node<T>, failures: &mut DisposeFailures<T::Error>) {
    if let Err(source) = node.value.dispose() {
        failures.record(node.key, source);
    }
}

impl<T: Disposable> Default for LruTextureCache<T> {
    /// Create a cache with 100 entries and a 50MB memory limit
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Disposable> Drop for LruTextureCache<T> {
    fn drop(&mut self) {
        // Failures were already logged by `record`
        let mut failures = DisposeFailures::new();
        self.drain(&mut failures);
    }
}

impl<T: Disposable> fmt::Debug for LruTextureCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruTextureCache")
            .field("len", &self.arena.len())
            .field("max_size", &self.max_size)
            .field("memory_usage", &self.total_memory)
            .field("max_memory", &self.max_memory)
            .finish()
    }
}

/// Iterator over cached keys, most recently used first.
pub struct Keys<'a, T> {
    arena: &'a [Node<T>],
    current: usize,
    remaining: usize,
}

impl<'a, T> Iterator for Keys<'a, T> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == NIL {
            return None;
        }
        let node = &self.arena[self.current];
        self.current = node.next;
        self.remaining -= 1;
        Some(node.key.as_str())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T> ExactSizeIterator for Keys<'_, T> {}
