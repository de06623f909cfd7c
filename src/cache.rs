//! Bounded, access-ordered cache of executed queries
//!
//! Keyed by the query signature, bounded at [`MAX_QUERY_CACHE_SIZE`]
//! entries. Hits move the entry to the most-recently-used position, so a
//! re-accessed query is protected from eviction. Mutations invalidate either
//! the whole cache (metadata changed in place) or only the entries whose
//! kind filter could match the mutated container.

use crate::container::ContainerKind;
use crate::query::ContainerQuery;
use lru::LruCache;
use std::num::NonZeroUsize;

/// The maximum amount of query results we should cache
pub const MAX_QUERY_CACHE_SIZE: usize = 1000;

/// Hit/miss counters, observable for tests and diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

pub struct QueryCache {
    cache: LruCache<ContainerQuery, Vec<String>>,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_capacity(MAX_QUERY_CACHE_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        QueryCache {
            cache: LruCache::new(NonZeroUsize::new(capacity).expect("capacity must be non-zero")),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a cached result, promoting the entry to most-recently-used
    pub fn get(&mut self, query: &ContainerQuery) -> Option<Vec<String>> {
        match self.cache.get(query) {
            Some(result) => {
                self.hits += 1;
                Some(result.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store an executed result, evicting the least-recently-used entry if
    /// the cache is full
    pub fn put(&mut self, query: ContainerQuery, result: Vec<String>) {
        self.cache.put(query, result);
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Drop only the entries whose kind filter is unset or equal to `kind`;
    /// entries scoped to a disjoint kind remain valid
    pub fn invalidate_kind(&mut self, kind: ContainerKind) {
        let stale: Vec<ContainerQuery> = self
            .cache
            .iter()
            .filter(|(query, _)| query.kind().is_none() || query.kind() == Some(kind))
            .map(|(query, _)| query.clone())
            .collect();
        for query in stale {
            self.cache.pop(&query);
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            len: self.cache.len(),
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryBuilder;

    fn query_for(name: &str) -> ContainerQuery {
        QueryBuilder::new().constraint("name", name).build()
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let mut cache = QueryCache::new();
        let query = query_for("a");

        assert!(cache.get(&query).is_none());
        cache.put(query.clone(), vec!["a1".to_string()]);
        assert_eq!(cache.get(&query), Some(vec!["a1".to_string()]));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.len, 1);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = QueryCache::with_capacity(2);
        cache.put(query_for("a"), vec![]);
        cache.put(query_for("b"), vec![]);
        cache.put(query_for("c"), vec![]); // evicts "a"

        assert!(cache.get(&query_for("a")).is_none());
        assert!(cache.get(&query_for("b")).is_some());
        assert!(cache.get(&query_for("c")).is_some());
    }

    #[test]
    fn test_reaccess_protects_from_eviction() {
        let mut cache = QueryCache::with_capacity(2);
        cache.put(query_for("a"), vec![]);
        cache.put(query_for("b"), vec![]);

        // Touch "a" so "b" becomes the eviction candidate. Pure FIFO would
        // have dropped "a" here.
        cache.get(&query_for("a"));
        cache.put(query_for("c"), vec![]);

        assert!(cache.get(&query_for("a")).is_some());
        assert!(cache.get(&query_for("b")).is_none());
    }

    #[test]
    fn test_invalidate_by_kind() {
        let mut cache = QueryCache::new();
        let unscoped = query_for("x");
        let instance_scoped = QueryBuilder::new()
            .kind(ContainerKind::Instance)
            .constraint("name", "x")
            .build();
        let definition_scoped = QueryBuilder::new()
            .kind(ContainerKind::Definition)
            .constraint("name", "x")
            .build();

        cache.put(unscoped.clone(), vec![]);
        cache.put(instance_scoped.clone(), vec![]);
        cache.put(definition_scoped.clone(), vec![]);

        cache.invalidate_kind(ContainerKind::Instance);

        // Unscoped entries could match anything and must go; the
        // definition-scoped entry is disjoint and survives.
        assert!(cache.get(&unscoped).is_none());
        assert!(cache.get(&instance_scoped).is_none());
        assert!(cache.get(&definition_scoped).is_some());
    }

    #[test]
    fn test_clear() {
        let mut cache = QueryCache::new();
        cache.put(query_for("a"), vec![]);
        cache.put(query_for("b"), vec![]);
        cache.clear();
        assert!(cache.is_empty());
    }
}
