//! Statement caching for compiled queries.
//!
//! Compiled statements are cached keyed by a hash of the query's structure
//! (entity, compile-affecting options, criteria), so repeated compilations of
//! the same query shape reuse the compiled plan.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::{Hash, Hasher};
use std::time::Instant;

/// A cached compiled statement.
#[derive(Debug, Clone)]
pub struct CachedStatement<T> {
    /// The compiled payload.
    pub value: T,
    /// When this entry was last accessed.
    pub last_used: Instant,
    /// Number of times this statement has been served.
    pub hit_count: u64,
}

/// LRU-style cache for compiled statements.
///
/// Keyed by a `u64` hash that callers compute from their query structure.
/// When the cache exceeds `max_size`, the least-recently-used entry is evicted.
///
/// # Example
///
/// ```
/// use strata_query::cache::StatementCache;
///
/// let mut cache = StatementCache::new(100);
///
/// let sql = cache.get_or_insert(12345, || "SELECT users.id FROM users".to_string());
/// assert_eq!(sql, "SELECT users.id FROM users");
///
/// // Second call returns cached version
/// let called = std::cell::Cell::new(false);
/// let sql2 = cache.get_or_insert(12345, || {
///     called.set(true);
///     "SELECT users.id FROM users".to_string()
/// });
/// assert_eq!(sql2, "SELECT users.id FROM users");
/// assert!(!called.get());
/// ```
#[derive(Debug)]
pub struct StatementCache<T> {
    cache: HashMap<u64, CachedStatement<T>>,
    max_size: usize,
    misses: u64,
}

impl<T> StatementCache<T> {
    /// Create a new cache with the given maximum number of entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: HashMap::with_capacity(max_size.min(256)),
            max_size,
            misses: 0,
        }
    }

    /// Get a cached statement or build and insert it.
    ///
    /// The `builder` closure is only called on cache miss.
    pub fn get_or_insert(&mut self, key: u64, builder: impl FnOnce() -> T) -> &T {
        match self.get_or_try_insert(key, || Ok::<T, std::convert::Infallible>(builder())) {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    /// Like [`get_or_insert`](Self::get_or_insert) for fallible builders.
    ///
    /// Nothing is cached when the builder fails. An entry already present
    /// under `key` is kept and the builder is not called.
    pub fn get_or_try_insert<E>(
        &mut self,
        key: u64,
        builder: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        if !self.cache.contains_key(&key) && self.cache.len() >= self.max_size {
            self.evict_lru();
        }
        let entry = match self.cache.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(slot) => {
                let value = builder()?;
                self.misses += 1;
                slot.insert(CachedStatement {
                    value,
                    last_used: Instant::now(),
                    hit_count: 0,
                })
            }
        };
        entry.last_used = Instant::now();
        entry.hit_count += 1;
        Ok(&entry.value)
    }

    /// Cached statement for `key`, marking it as used.
    pub fn get(&mut self, key: u64) -> Option<&T> {
        let entry = self.cache.get_mut(&key)?;
        entry.last_used = Instant::now();
        entry.hit_count += 1;
        Some(&entry.value)
    }

    /// Check if a statement is cached.
    pub fn contains(&self, key: u64) -> bool {
        self.cache.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Number of builder invocations so far.
    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Clear all cached statements.
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Evict the least-recently-used entry.
    fn evict_lru(&mut self) {
        if let Some((&lru_key, _)) = self.cache.iter().min_by_key(|(_, entry)| entry.last_used) {
            tracing::trace!(key = lru_key, "Evicting cached statement");
            self.cache.remove(&lru_key);
        }
    }
}

/// Compute a hash key for caching from any hashable value.
pub fn cache_key(value: &impl Hash) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

impl<T> Default for StatementCache<T> {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hit() {
        let mut cache = StatementCache::new(10);
        let sql = cache
            .get_or_insert(1, || "SELECT 1".to_string())
            .to_string();
        assert_eq!(sql, "SELECT 1");

        let called = std::cell::Cell::new(false);
        let sql2 = cache
            .get_or_insert(1, || {
                called.set(true);
                "SELECT 1".to_string()
            })
            .to_string();
        assert_eq!(sql2, "SELECT 1");
        assert!(!called.get());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_failed_build_is_not_cached() {
        let mut cache: StatementCache<String> = StatementCache::new(10);
        let result = cache.get_or_try_insert(7, || Err::<String, &str>("boom"));
        assert_eq!(result, Err("boom"));
        assert!(!cache.contains(7));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_and_first_insert_wins() {
        let mut cache = StatementCache::new(10);
        assert_eq!(cache.get(3), None);
        cache.get_or_insert(3, || "SELECT 3".to_string());
        let kept = cache.get_or_insert(3, || "SELECT three".to_string());
        assert_eq!(kept, "SELECT 3");
        assert_eq!(cache.get(3).map(String::as_str), Some("SELECT 3"));
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_lru_ordering() {
        let mut cache = StatementCache::new(2);
        cache.get_or_insert(1, || "SELECT 1".to_string());
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.get_or_insert(2, || "SELECT 2".to_string());
        std::thread::sleep(std::time::Duration::from_millis(2));

        // Access key 1 to make it recently used
        cache.get_or_insert(1, || "SELECT 1".to_string());
        std::thread::sleep(std::time::Duration::from_millis(2));

        // Eviction should remove key 2 (now LRU)
        cache.get_or_insert(3, || "SELECT 3".to_string());

        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_key_function() {
        let key1 = cache_key(&("User", 1u64));
        let key2 = cache_key(&("User", 1u64));
        let key3 = cache_key(&("User", 2u64));
        assert_eq!(key1, key2);
        assert_ne!(key1, key3);
    }
}
