//! In-memory result cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use fedq_proto::Query;
use parking_lot::RwLock;

use super::storage::DEFAULT_LIFETIME;
use super::{CacheBackend, CacheConnector};
use crate::connector::QueryResult;
use crate::error::CacheError;

struct CachedResult {
    created_at: Instant,
    result: QueryResult,
}

/// Results held in a map keyed by canonical query string.
///
/// Uses the same freshness rule as the storage cache. Stale results are
/// dropped on every write. With a size bound, the oldest entry is evicted to
/// make room.
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedResult>>,
    lifetime: Option<Duration>,
    max_entries: Option<usize>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            lifetime: Some(DEFAULT_LIFETIME),
            max_entries: None,
        }
    }

    /// Set the freshness window. `None` means entries never go stale.
    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_fresh(&self, cached: &CachedResult) -> bool {
        self.lifetime
            .map_or(true, |lifetime| cached.created_at.elapsed() < lifetime)
    }

    fn evict_oldest(entries: &mut HashMap<String, CachedResult>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, v)| v.created_at)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            entries.remove(&key);
        }
    }
}

impl CacheBackend for MemoryCache {
    fn is_cached(&self, query: &Query) -> bool {
        self.entries
            .read()
            .get(&query.canonical())
            .is_some_and(|cached| self.is_fresh(cached))
    }

    fn read(&self, query: &Query) -> Result<QueryResult, CacheError> {
        let key = query.canonical();
        self.entries
            .read()
            .get(&key)
            .map(|cached| cached.result.clone())
            .ok_or_else(|| CacheError::Corrupt(format!("no cached result for [{}]", key)))
    }

    fn write(&self, query: &Query, result: &QueryResult) -> Result<(), CacheError> {
        let key = query.canonical();
        let mut entries = self.entries.write();
        entries.retain(|_, cached| self.is_fresh(cached));

        if let Some(max) = self.max_entries {
            while entries.len() >= max && !entries.contains_key(&key) && !entries.is_empty() {
                Self::evict_oldest(&mut entries);
            }
            if max == 0 {
                return Ok(());
            }
        }

        entries.insert(
            key,
            CachedResult {
                created_at: Instant::now(),
                result: result.clone(),
            },
        );
        Ok(())
    }

    fn clear_query(&self, query: &Query) -> Result<(), CacheError> {
        self.entries.write().remove(&query.canonical());
        Ok(())
    }

    fn clear_cache(&self) -> Result<(), CacheError> {
        self.entries.write().clear();
        Ok(())
    }
}

/// Cache decorator holding results in memory.
pub type MemoryCacheConnector = CacheConnector<MemoryCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use fedq_proto::Entry;

    fn result(n: i64) -> QueryResult {
        QueryResult::Entries(vec![Entry::from([("n", n)])])
    }

    #[test]
    fn test_memory_cache_lifecycle() {
        let cache = MemoryCache::new().with_lifetime(Some(Duration::from_millis(30)));
        let query = Query::new().with_limit(1);

        assert!(!cache.is_cached(&query));
        cache.write(&query, &result(1)).unwrap();
        assert!(cache.is_cached(&query));
        assert_eq!(cache.read(&query).unwrap(), result(1));

        std::thread::sleep(Duration::from_millis(60));
        assert!(!cache.is_cached(&query));

        cache.write(&query, &result(2)).unwrap();
        cache.clear_query(&query).unwrap();
        assert!(!cache.is_cached(&query));
        assert!(cache.read(&query).is_err());
    }

    #[test]
    fn test_write_drops_stale_results() {
        let cache = MemoryCache::new().with_lifetime(Some(Duration::from_millis(20)));
        cache.write(&Query::new().with_limit(1), &result(1)).unwrap();
        cache.write(&Query::new().with_limit(2), &result(2)).unwrap();
        assert_eq!(cache.len(), 2);

        std::thread::sleep(Duration::from_millis(50));
        cache.write(&Query::new().with_limit(3), &result(3)).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.is_cached(&Query::new().with_limit(3)));
    }

    #[test]
    fn test_memory_cache_evicts_oldest() {
        let cache = MemoryCache::new().with_max_entries(2);
        let queries: Vec<Query> = (1..=3).map(|n| Query::new().with_limit(n)).collect();

        for (i, query) in queries.iter().enumerate() {
            cache.write(query, &result(i as i64)).unwrap();
            std::thread::sleep(Duration::from_millis(2));
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.is_cached(&queries[0]));
        assert!(cache.is_cached(&queries[1]));
        assert!(cache.is_cached(&queries[2]));

        cache.clear_cache().unwrap();
        assert!(cache.is_empty());
    }
}
