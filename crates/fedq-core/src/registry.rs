//! Named connector construction.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{CacheConnector, StorageCache};
use crate::config::{CacheKind, Config, ConnectorSpec};
use crate::connector::SharedConnector;
use crate::entries::{entries_from_json, EntriesConnector};
use crate::error::Error;

/// Builds a connector from its configured name, spec and the whole config.
pub type Constructor =
    Box<dyn Fn(&str, &ConnectorSpec, &Config) -> Result<SharedConnector, Error> + Send + Sync>;

/// Maps connector types to constructors.
pub struct ConnectorRegistry {
    constructors: HashMap<String, Constructor>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ConnectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry knowing the `entries` and `json_file` types.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("entries", |name, spec, _config| {
            let document = spec
                .args
                .get("entries")
                .cloned()
                .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
            let mut connector = EntriesConnector::new(entries_from_json(document, "")?).with_name(name);
            if let Some(object) = spec.str_arg("object") {
                connector = connector.with_object(object);
            }
            Ok(Arc::new(connector) as SharedConnector)
        });
        registry.register("json_file", |name, spec, config| {
            let path = spec
                .str_arg("path")
                .ok_or_else(|| Error::Config(format!("connector {:?}: missing \"path\" argument", name)))?;
            let pointer = spec.str_arg("pointer").unwrap_or("");
            let mut connector =
                EntriesConnector::from_json_file(config.resolve(path), pointer)?.with_name(name);
            if let Some(object) = spec.str_arg("object") {
                connector = connector.with_object(object);
            }
            Ok(Arc::new(connector) as SharedConnector)
        });
        registry
    }

    /// Register (or replace) the constructor of a connector type.
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&str, &ConnectorSpec, &Config) -> Result<SharedConnector, Error> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Box::new(constructor));
    }

    /// Registered types, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Instantiate the connector configured under `name`, wrapped in a
    /// storage cache if its spec asks for one.
    pub fn build(&self, config: &Config, name: &str) -> Result<SharedConnector, Error> {
        let spec = config.connectors.get(name).ok_or_else(|| {
            let known: Vec<&str> = config.connectors.keys().map(String::as_str).collect();
            Error::Config(format!("unknown connector {:?} (configured: {})", name, known.join(", ")))
        })?;
        let constructor = self.constructors.get(&spec.kind).ok_or_else(|| {
            Error::Config(format!(
                "connector {:?}: unknown type {:?} (known: {})",
                name,
                spec.kind,
                self.kinds().join(", ")
            ))
        })?;

        debug!(connector = name, kind = %spec.kind, "Building connector");
        let connector = constructor(name, spec, config)?;

        match storage_cache(config, name)? {
            Some(cache) => {
                info!(
                    connector = name,
                    dir = %cache.base_dir().display(),
                    "Caching results"
                );
                Ok(Arc::new(CacheConnector::new(connector, cache)) as SharedConnector)
            }
            None => Ok(connector),
        }
    }
}

/// The storage cache configured for `name`, if any.
pub fn storage_cache(config: &Config, name: &str) -> Result<Option<StorageCache>, Error> {
    let spec = config
        .connectors
        .get(name)
        .ok_or_else(|| Error::Config(format!("unknown connector {:?}", name)))?;
    let dir = config.cache.dir_for(name);
    let cache = match spec.cache {
        Some(CacheKind::Json) => StorageCache::json(dir),
        Some(CacheKind::Binary) => StorageCache::binary(dir),
        None => return Ok(None),
    };
    Ok(Some(cache.with_lifetime(config.cache.lifetime())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBackend;
    use crate::config::CacheConfig;
    use crate::connector::Connector;
    use fedq_proto::{Entry, Predicate, Query};
    use serde_json::json;
    use tempfile::TempDir;

    fn inline() -> ConnectorSpec {
        ConnectorSpec::new("entries", json!({"entries": [{"a": 1}, {"a": 10}]}))
    }

    #[test]
    fn test_build_inline_entries() {
        let config = Config::default().with_connector("nums", inline());
        let connector = ConnectorRegistry::with_builtins().build(&config, "nums").unwrap();

        assert_eq!(connector.name(), "nums");
        let result = connector
            .query_entries(&Query::new().with_filter(Predicate::gt("a", 1)))
            .unwrap();
        assert_eq!(result, vec![Entry::from([("a", 10)])]);
    }

    #[test]
    fn test_build_json_file_with_cache() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("data.json"), r#"{"items": [{"x": "y"}]}"#).unwrap();

        let mut config = Config::default()
            .with_cache(CacheConfig::default().with_base_dir(dir.path().join("cache")))
            .with_connector(
                "files",
                ConnectorSpec::new("json_file", json!({"path": "data.json", "pointer": "/items"}))
                    .with_cache(CacheKind::Json),
            );
        config.root = Some(dir.path().to_path_buf());

        let connector = ConnectorRegistry::with_builtins().build(&config, "files").unwrap();
        let result = connector.query_entries(&Query::new()).unwrap();
        assert_eq!(result, vec![Entry::from([("x", "y")])]);

        let cache = storage_cache(&config, "files").unwrap().unwrap();
        assert_eq!(cache.base_dir(), dir.path().join("cache").join("files"));
        assert!(cache.is_cached(&Query::new()));
    }

    #[test]
    fn test_unknown_names_are_config_errors() {
        let config = Config::default()
            .with_connector("odd", ConnectorSpec::new("ldap", json!({})))
            .with_connector("nopath", ConnectorSpec::new("json_file", json!({})));
        let registry = ConnectorRegistry::with_builtins();

        for name in ["missing", "odd", "nopath"] {
            let err = registry.build(&config, name).err().unwrap();
            assert!(matches!(err, Error::Config(_)), "{}: {}", name, err);
        }
    }

    #[test]
    fn test_register_custom_type() {
        let mut registry = ConnectorRegistry::new();
        registry.register("constant", |name, _spec, _config| {
            Ok(Arc::new(EntriesConnector::new(vec![Entry::from([("k", 1)])]).with_name(name)) as SharedConnector)
        });
        assert_eq!(registry.kinds(), vec!["constant"]);

        let config = Config::default().with_connector("c", ConnectorSpec::new("constant", json!(null)));
        let connector = registry.build(&config, "c").unwrap();
        assert_eq!(connector.query_entries(&Query::new()).unwrap().len(), 1);
    }
}
