//! Result caching.
//!
//! [`CacheConnector`] memoizes its child's results in a [`CacheBackend`],
//! keyed by the canonical rendering of the query. Backend failures are never
//! fatal: they are logged and the child answers instead.

mod codec;
mod memory;
mod storage;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use fedq_proto::{Action, Query};
use tracing::{debug, warn};

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::{CacheError, Error};

pub use codec::{BinaryCodec, Codec, JsonCodec};
pub use memory::{MemoryCache, MemoryCacheConnector};
pub use storage::{cache_file_name, StorageCache, StorageCacheConnector, DEFAULT_LIFETIME};

/// Where cached results live.
pub trait CacheBackend: Send + Sync {
    /// Whether a fresh result is stored for `query`.
    fn is_cached(&self, query: &Query) -> bool;

    fn read(&self, query: &Query) -> Result<QueryResult, CacheError>;

    fn write(&self, query: &Query, result: &QueryResult) -> Result<(), CacheError>;

    fn clear_query(&self, query: &Query) -> Result<(), CacheError>;

    fn clear_cache(&self) -> Result<(), CacheError>;

    /// Whether `result` may be stored. Everything is by default.
    fn is_cachable(&self, _query: &Query, _result: &QueryResult) -> bool {
        true
    }
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    write_failures: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get the number of results that could not be stored.
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

/// Memoizes its child's results.
///
/// A fresh, readable cached result is returned without querying the child.
/// Otherwise the child answers, and READ results are stored if the backend
/// accepts them.
pub struct CacheConnector<B> {
    child: SharedConnector,
    backend: B,
    stats: CacheStats,
}

impl<B: CacheBackend> CacheConnector<B> {
    pub fn new(child: SharedConnector, backend: B) -> Self {
        Self {
            child,
            backend,
            stats: CacheStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn is_cached(&self, query: &Query) -> bool {
        self.backend.is_cached(query)
    }

    pub fn clear_query(&self, query: &Query) -> Result<(), Error> {
        Ok(self.backend.clear_query(query)?)
    }

    pub fn clear_cache(&self) -> Result<(), Error> {
        Ok(self.backend.clear_cache()?)
    }
}

impl<B: CacheBackend> Connector for CacheConnector<B> {
    fn name(&self) -> &str {
        self.child.name()
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        if self.backend.is_cached(query) {
            match self.backend.read(query) {
                Ok(result) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(connector = self.name(), query = %query, "Cache hit");
                    return Ok(result);
                }
                Err(e) => {
                    warn!(connector = self.name(), query = %query, error = %e, "Cache read failed, querying child");
                }
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        debug!(connector = self.name(), query = %query, "Cache miss");
        let result = self.child.query(query)?;

        if query.action == Action::Read && self.backend.is_cachable(query, &result) {
            if let Err(e) = self.backend.write(query, &result) {
                self.stats.write_failures.fetch_add(1, Ordering::Relaxed);
                warn!(connector = self.name(), query = %query, error = %e, "Cache write failed");
            }
        }
        Ok(result)
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        self.child.attributes(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntriesConnector;
    use fedq_proto::{Entry, Predicate};
    use std::fs;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Counts the queries that reach it.
    struct Counting {
        inner: EntriesConnector,
        calls: AtomicUsize,
    }

    impl Connector for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn query(&self, query: &Query) -> Result<QueryResult, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.query(query)
        }

        fn attributes(&self, object: &str) -> BTreeSet<String> {
            self.inner.attributes(object)
        }
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            inner: EntriesConnector::new(vec![
                Entry::from([("a", 1), ("b", 2)]),
                Entry::from([("a", 10), ("b", 20)]),
            ]),
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_second_query_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let child = counting();
        let cache = CacheConnector::new(child.clone(), StorageCache::json(dir.path()));
        let query = Query::new().with_filter(Predicate::le("a", 1));

        assert!(!cache.is_cached(&query));
        let first = cache.query(&query).unwrap();
        assert!(cache.is_cached(&query));
        let second = cache.query(&query).unwrap();

        assert_eq!(first, second);
        assert_eq!(child.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert!((cache.stats().hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_child() {
        let dir = TempDir::new().unwrap();
        let child = counting();
        let cache = CacheConnector::new(child.clone(), StorageCache::binary(dir.path()));
        let query = Query::new();

        cache.query(&query).unwrap();
        fs::write(cache.backend().path_for(&query), b"garbage").unwrap();

        let result = cache.query(&query).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(child.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().hits(), 0);
        // The fresh result replaced the corrupt file.
        assert_eq!(cache.backend().read(&query).unwrap(), result);
    }

    #[test]
    fn test_write_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let cache = CacheConnector::new(counting(), StorageCache::json(blocker.join("sub")));
        let result = cache.query(&Query::new()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(cache.stats().write_failures(), 1);
    }

    #[test]
    fn test_only_reads_are_stored() {
        let cache = CacheConnector::new(counting(), MemoryCache::new());
        let delete = Query::new().with_action(Action::Delete);
        assert!(cache.query(&delete).is_err());
        assert!(cache.backend().is_empty());

        cache.query(&Query::new()).unwrap();
        assert_eq!(cache.backend().len(), 1);
    }

    struct NoEmpty;

    impl CacheBackend for NoEmpty {
        fn is_cached(&self, _query: &Query) -> bool {
            false
        }
        fn read(&self, _query: &Query) -> Result<QueryResult, CacheError> {
            Err(CacheError::Corrupt("empty".into()))
        }
        fn write(&self, _query: &Query, result: &QueryResult) -> Result<(), CacheError> {
            assert!(!result.is_empty());
            Ok(())
        }
        fn clear_query(&self, _query: &Query) -> Result<(), CacheError> {
            Ok(())
        }
        fn clear_cache(&self) -> Result<(), CacheError> {
            Ok(())
        }
        fn is_cachable(&self, _query: &Query, result: &QueryResult) -> bool {
            !result.is_empty()
        }
    }

    #[test]
    fn test_is_cachable_override() {
        let cache = CacheConnector::new(counting(), NoEmpty);
        let none = Query::new().with_filter(Predicate::gt("a", 1000));
        assert!(cache.query(&none).unwrap().is_empty());
        assert_eq!(cache.query(&Query::new()).unwrap().len(), 2);
    }
}
