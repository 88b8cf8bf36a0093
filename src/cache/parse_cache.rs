use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::record::Record;

/// Default cache capacity (number of parsed lines)
pub const DEFAULT_CAPACITY: usize = 100;

/// LRU cache of parsed records keyed by absolute 1-based line number
///
/// Parse failures are cached like successes so a malformed line is parsed
/// once no matter how often navigation passes over it.
pub struct ParseCache {
    cache: LruCache<usize, Arc<Record>>,
    hits: u64,
    misses: u64,
}

impl ParseCache {
    /// Create a new parse cache with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(non_zero(capacity)),
            hits: 0,
            misses: 0,
        }
    }

    /// Create a parse cache with default capacity (100 records)
    pub fn default_capacity() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Return the cached record for `line`, or parse `raw` and cache it.
    ///
    /// A hit refreshes the entry's recency and never calls `parse_fn`.
    pub fn get_or_parse<F>(&mut self, line: usize, raw: &str, parse_fn: F) -> Arc<Record>
    where
        F: FnOnce(&str) -> Record,
    {
        if let Some(record) = self.cache.get(&line) {
            let record = Arc::clone(record);
            self.hits += 1;
            return record;
        }

        self.misses += 1;
        let record = Arc::new(parse_fn(raw));
        self.cache.put(line, Arc::clone(&record));
        record
    }

    /// Cached record for `line`, promoting it.
    ///
    /// Counts a hit when found. A miss is not counted here: callers follow
    /// up with `get_or_parse`, which records it.
    pub fn get(&mut self, line: usize) -> Option<Arc<Record>> {
        let record = self.cache.get(&line).map(Arc::clone)?;
        self.hits += 1;
        Some(record)
    }

    /// Check if a line is in the cache
    pub fn contains(&self, line: usize) -> bool {
        self.cache.contains(&line)
    }

    /// Peek at a record without updating LRU order
    pub fn peek(&self, line: usize) -> Option<&Arc<Record>> {
        self.cache.peek(&line)
    }

    /// Invalidate a specific line
    pub fn invalidate(&mut self, line: usize) {
        self.cache.pop(&line);
    }

    /// Invalidate every cached line in `start..=end`
    ///
    /// Used after a file write so stale parses are never served.
    pub fn invalidate_range(&mut self, start: usize, end: usize) {
        let keys_to_remove: Vec<usize> = self
            .cache
            .iter()
            .map(|(k, _)| *k)
            .filter(|k| (start..=end).contains(k))
            .collect();

        for key in keys_to_remove {
            self.cache.pop(&key);
        }
    }

    /// Clear all cached records
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Change the capacity. Shrinking evicts the oldest entries immediately.
    pub fn resize(&mut self, capacity: usize) {
        self.cache.resize(non_zero(capacity));
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let lookups = self.hits + self.misses;
        CacheStats {
            size: self.cache.len(),
            max_size: self.cache.cap().get(),
            hits: self.hits,
            misses: self.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                self.hits as f64 / lookups as f64
            },
        }
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::default_capacity()
    }
}

fn non_zero(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    /// Number of entries currently in cache
    pub size: usize,
    /// Maximum cache capacity
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// `hits / (hits + misses)`, 0.0 before the first lookup
    pub hit_rate: f64,
}
