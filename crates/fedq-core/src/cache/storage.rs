//! Filesystem result cache.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fedq_proto::Query;
use tracing::trace;

use super::codec::{BinaryCodec, Codec, JsonCodec};
use super::{CacheBackend, CacheConnector};
use crate::connector::QueryResult;
use crate::error::CacheError;

/// Default freshness window: three days.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Longest escaped name kept as is; longer names are hashed.
const MAX_NAME_LEN: usize = 200;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// File name (without extension) under which a canonical query is stored.
///
/// `/`, `\`, `%` and NUL are percent-escaped so that distinct queries map to
/// distinct names. Names longer than 200 bytes are replaced by their BLAKE3
/// digest.
pub fn cache_file_name(canonical: &str) -> String {
    let mut name = String::with_capacity(canonical.len());
    for c in canonical.chars() {
        match c {
            '/' | '\\' | '%' | '\0' => {
                let _ = write!(name, "%{:02X}", c as u32);
            }
            c => name.push(c),
        }
    }

    if name.len() > MAX_NAME_LEN {
        format!("blake3-{}", hex::encode(blake3::hash(canonical.as_bytes()).as_bytes()))
    } else {
        name
    }
}

/// One file per canonical query in a directory; freshness from the file's
/// modification time.
#[derive(Clone)]
pub struct StorageCache {
    base_dir: PathBuf,
    lifetime: Option<Duration>,
    codec: Arc<dyn Codec>,
}

impl StorageCache {
    pub fn new(base_dir: impl Into<PathBuf>, codec: impl Codec + 'static) -> Self {
        Self {
            base_dir: base_dir.into(),
            lifetime: Some(DEFAULT_LIFETIME),
            codec: Arc::new(codec),
        }
    }

    pub fn json(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir, JsonCodec)
    }

    pub fn binary(base_dir: impl Into<PathBuf>) -> Self {
        Self::new(base_dir, BinaryCodec)
    }

    /// Set the freshness window. `None` means entries never go stale.
    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime
    }

    /// Path of the file caching `query`.
    pub fn path_for(&self, query: &Query) -> PathBuf {
        let name = cache_file_name(&query.canonical());
        self.base_dir.join(format!("{}{}", name, self.codec.extension()))
    }

    fn is_fresh(&self, modified: SystemTime) -> bool {
        match self.lifetime {
            None => true,
            // A modification time in the future counts as just written.
            Some(lifetime) => SystemTime::now()
                .duration_since(modified)
                .map_or(true, |age| age < lifetime),
        }
    }
}

impl CacheBackend for StorageCache {
    fn is_cached(&self, query: &Query) -> bool {
        let path = self.path_for(query);
        match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => self.is_fresh(modified),
            Err(_) => false,
        }
    }

    fn read(&self, query: &Query) -> Result<QueryResult, CacheError> {
        let path = self.path_for(query);
        let data = fs::read(&path).map_err(|e| CacheError::io(&path, e))?;
        trace!(path = %path.display(), bytes = data.len(), "Read cache file");
        self.codec.decode(&data)
    }

    fn write(&self, query: &Query, result: &QueryResult) -> Result<(), CacheError> {
        let data = self.codec.encode(result)?;
        fs::create_dir_all(&self.base_dir).map_err(|e| CacheError::io(&self.base_dir, e))?;

        let path = self.path_for(query);
        let tmp = self.base_dir.join(format!(
            ".tmp-{}-{}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp, &data).map_err(|e| CacheError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(CacheError::io(&path, e));
        }
        trace!(path = %path.display(), bytes = data.len(), "Wrote cache file");
        Ok(())
    }

    fn clear_query(&self, query: &Query) -> Result<(), CacheError> {
        let path = self.path_for(query);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    fn clear_cache(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.base_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.base_dir, e)),
        }
    }
}

/// Cache decorator persisting results on the filesystem.
pub type StorageCacheConnector = CacheConnector<StorageCache>;
