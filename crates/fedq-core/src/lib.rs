//! fedq core - connectors, relational operators and result caching.
//!
//! A query plan is a tree of [`Connector`]s: leaves adapt data sources,
//! inner nodes rewrite the query on the way down and post-process entries on
//! the way up.
//!
//! ```
//! use std::sync::Arc;
//! use fedq_core::ops::SortByConnector;
//! use fedq_core::proto::{Entry, Predicate, Query};
//! use fedq_core::{Connector, EntriesConnector, SharedConnector};
//!
//! let people: SharedConnector = Arc::new(EntriesConnector::new(vec![
//!     Entry::from([("name", "ada"), ("lang", "en")]),
//!     Entry::from([("name", "bob"), ("lang", "fr")]),
//! ]));
//! let sorted = SortByConnector::new(people, &["name"], true);
//! let result = sorted
//!     .query_entries(&Query::new().with_attributes(["name"]).with_filter(Predicate::ne("lang", "de")))
//!     .unwrap();
//! assert_eq!(result[0], Entry::from([("name", "bob")]));
//! ```

pub mod cache;
pub mod config;
pub mod connector;
pub mod entries;
pub mod error;
pub mod fanout;
pub mod ops;
pub mod registry;

pub use cache::{
    BinaryCodec, CacheBackend, CacheConnector, CacheStats, Codec, JsonCodec, MemoryCache,
    MemoryCacheConnector, StorageCache, StorageCacheConnector,
};
pub use config::{CacheConfig, CacheKind, Config, ConnectorSpec};
pub use connector::{attributes_of, reshape_entries, Connector, Group, QueryResult, SharedConnector};
pub use entries::{entries_from_json, EntriesConnector};
pub use error::{CacheError, Error};
pub use fanout::{fetch_all, EnrichConnector, Fetcher};
pub use registry::{storage_cache, ConnectorRegistry};

/// Re-export protocol types.
pub use fedq_proto as proto;
