//! Pipeline configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_LIFETIME;
use crate::error::Error;

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".fedq").join("cache"))
        .unwrap_or_else(|| std::env::temp_dir().join("fedq-cache"))
}

fn default_lifetime_secs() -> Option<u64> {
    Some(DEFAULT_LIFETIME.as_secs())
}

/// Result cache settings shared by every cached connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Root directory; each connector caches under `<base_dir>/<name>`.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Freshness window in seconds. `null` means never stale.
    #[serde(default = "default_lifetime_secs")]
    pub lifetime_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            lifetime_secs: default_lifetime_secs(),
        }
    }
}

impl CacheConfig {
    /// Set the base directory.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Set the lifetime. `None` means never stale.
    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime_secs = lifetime.map(|d| d.as_secs());
        self
    }

    pub fn lifetime(&self) -> Option<Duration> {
        self.lifetime_secs.map(Duration::from_secs)
    }

    /// Cache directory of the connector called `name`.
    pub fn dir_for(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }
}

/// Serialization used by a connector's result cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Json,
    Binary,
}

/// One named connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorSpec {
    /// Registered connector type.
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific arguments.
    #[serde(default)]
    pub args: serde_json::Value,

    /// Wrap the connector in a storage cache.
    #[serde(default)]
    pub cache: Option<CacheKind>,
}

impl ConnectorSpec {
    pub fn new(kind: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            args,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: CacheKind) -> Self {
        self.cache = Some(cache);
        self
    }

    /// String argument `key`, if present.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }
}

/// Top-level configuration, usually read from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub connectors: BTreeMap<String, ConnectorSpec>,

    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file. Relative paths in it are resolved against
    /// the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_json_str(&text)?;
        config.root = path.parent().map(Path::to_path_buf);
        if config.cache.base_dir.is_relative() {
            config.cache.base_dir = config.resolve(&config.cache.base_dir);
        }
        Ok(config)
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_connector(mut self, name: impl Into<String>, spec: ConnectorSpec) -> Self {
        self.connectors.insert(name.into(), spec);
        self
    }

    /// Resolve `path` against the configuration directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}
