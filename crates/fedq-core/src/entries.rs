//! Leaf connectors over materialized entries.

use std::collections::BTreeSet;
use std::path::Path;

use fedq_proto::{Action, Entry, Query};
use tracing::{debug, trace};

use crate::connector::{attributes_of, Connector, QueryResult};
use crate::error::Error;

/// Wraps a list of entries held in memory.
///
/// Answers READ queries through the default reshape. When an object name is
/// set, queries on any other (non-empty) object fail with `InvalidObject`.
#[derive(Debug, Clone)]
pub struct EntriesConnector {
    name: String,
    object: Option<String>,
    keys: BTreeSet<String>,
    entries: Vec<Entry>,
}

impl EntriesConnector {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            name: "entries".to_string(),
            object: None,
            keys: attributes_of(&entries),
            entries,
        }
    }

    /// Parse a JSON document holding a list of objects.
    ///
    /// `pointer` (RFC 6901, e.g. `/data/items`) selects the list inside the
    /// document; an empty pointer selects the root.
    pub fn from_json_str(json: &str, pointer: &str) -> Result<Self, Error> {
        let document: serde_json::Value = serde_json::from_str(json)?;
        Ok(Self::new(entries_from_json(document, pointer)?))
    }

    /// Load a JSON file holding a list of objects.
    pub fn from_json_file(path: impl AsRef<Path>, pointer: &str) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "Loading entries from JSON file");
        Self::from_json_str(&json, pointer)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restrict the connector to a single object name.
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

impl Connector for EntriesConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = %self.name, query = %query, "Handling query");

        if query.action != Action::Read {
            return Err(Error::unsupported_action(&self.name, query));
        }
        if let Some(object) = &self.object {
            if !query.object.is_empty() && query.object != *object {
                return Err(Error::InvalidObject {
                    connector: self.name.clone(),
                    object: query.object.clone(),
                    query: query.canonical(),
                });
            }
        }

        let entries = self.reshape(query, self.entries.clone());
        trace!(connector = %self.name, entries = entries.len(), "Returning entries");
        Ok(QueryResult::Entries(entries))
    }

    fn attributes(&self, _object: &str) -> BTreeSet<String> {
        self.keys.clone()
    }
}

/// Extract the entry list selected by `pointer` from a JSON document.
pub fn entries_from_json(document: serde_json::Value, pointer: &str) -> Result<Vec<Entry>, Error> {
    let mut document = document;
    let selected = document
        .pointer_mut(pointer)
        .map(serde_json::Value::take)
        .ok_or_else(|| {
            fedq_proto::Error::InvalidData(format!("JSON pointer {:?} matches nothing", pointer))
        })?;

    match selected {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| -> Result<Entry, Error> {
                match item {
                    serde_json::Value::Object(map) => Ok(map
                        .into_iter()
                        .map(|(k, v)| (k, fedq_proto::Value::from(v)))
                        .collect()),
                    other => Err(fedq_proto::Error::InvalidData(format!(
                        "item {} is not an object: {}",
                        i, other
                    ))
                    .into()),
                }
            })
            .collect(),
        other => Err(fedq_proto::Error::InvalidData(format!(
            "expected a list of objects, got {}",
            json_kind(&other)
        ))
        .into()),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedq_proto::{Predicate, Value};

    #[test]
    fn test_entries_connector_read() {
        let connector = EntriesConnector::new(vec![
            Entry::from([("a", 1), ("b", 2)]),
            Entry::from([("a", 3), ("c", 4)]),
        ]);
        assert_eq!(
            connector.attributes(""),
            ["a", "b", "c"].iter().map(|s| s.to_string()).collect()
        );

        let result = connector
            .query_entries(&Query::new().with_attributes(["a", "c"]).with_filter(Predicate::gt("a", 1)))
            .unwrap();
        assert_eq!(result, vec![Entry::from([("a", 3), ("c", 4)])]);
    }

    #[test]
    fn test_entries_connector_rejects_writes() {
        let connector = EntriesConnector::new(vec![]);
        let err = connector
            .query(&Query::new().with_action(Action::Delete))
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAction { action: Action::Delete, .. }));
    }

    #[test]
    fn test_entries_connector_invalid_object() {
        let connector = EntriesConnector::new(vec![]).with_object("people");
        assert!(connector.query(&Query::read("people")).is_ok());
        assert!(connector.query(&Query::new()).is_ok());
        let err = connector.query(&Query::read("cars")).unwrap_err();
        assert!(matches!(err, Error::InvalidObject { .. }));
    }

    #[test]
    fn test_from_json_with_pointer() {
        let json = r#"{"data": {"items": [{"id": 1, "tags": ["x"]}, {"id": 2.5, "nested": {"k": null}}]}}"#;
        let connector = EntriesConnector::from_json_str(json, "/data/items").unwrap();
        assert_eq!(connector.entries().len(), 2);
        assert_eq!(connector.entries()[0].get("tags"), Some(&Value::from(vec!["x"])));
        assert_eq!(connector.entries()[1].get("id"), Some(&Value::Float(2.5)));
    }

    #[test]
    fn test_from_json_rejects_non_list() {
        assert!(EntriesConnector::from_json_str(r#"{"a": 1}"#, "").is_err());
        assert!(EntriesConnector::from_json_str(r#"[1, 2]"#, "").is_err());
        assert!(EntriesConnector::from_json_str(r#"[]"#, "/missing").is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, r#"[{"a": 1}, {"a": 2}]"#).unwrap();
        let connector = EntriesConnector::from_json_file(&path, "").unwrap();
        assert_eq!(connector.entries().len(), 2);
    }
}
