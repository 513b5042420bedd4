//! Entries: the records flowing between connectors.

use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::value::Value;

/// Raised when an attribute is read from an entry that does not carry it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing key: {0}")]
pub struct MissingKey(pub String);

/// A record: a finite mapping from attribute name to value.
///
/// Keys are kept sorted so that serialization and iteration are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entry {
    fields: BTreeMap<String, Value>,
}

impl Entry {
    /// Create an empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by attribute name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a value, reporting a [`MissingKey`] if absent.
    pub fn try_get(&self, key: &str) -> Result<&Value, MissingKey> {
        self.fields
            .get(key)
            .ok_or_else(|| MissingKey(key.to_string()))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    /// Set an attribute, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(key.into(), value.into())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Attribute names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn key_set(&self) -> BTreeSet<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Union of two entries. On key collision `other` wins.
    pub fn merge(&self, other: &Entry) -> Entry {
        let mut merged = self.clone();
        merged.extend(other.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Keep exactly `attributes`, failing on the first one that is absent.
    pub fn project<S: AsRef<str>>(&self, attributes: &[S]) -> Result<Entry, MissingKey> {
        attributes
            .iter()
            .map(|a| {
                let a = a.as_ref();
                self.try_get(a).map(|v| (a.to_string(), v.clone()))
            })
            .collect()
    }

    /// Keep exactly `attributes`, filling absent ones with null.
    pub fn project_or_null<S: AsRef<str>>(&self, attributes: &[S]) -> Entry {
        attributes
            .iter()
            .map(|a| {
                let a = a.as_ref();
                (a.to_string(), self.get(a).cloned().unwrap_or_default())
            })
            .collect()
    }

    /// Entry with every attribute in `keys` set to null.
    pub fn nulls<'a>(keys: impl IntoIterator<Item = &'a String>) -> Entry {
        keys.into_iter().map(|k| (k.clone(), Value::Null)).collect()
    }

    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Entry {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Entry {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> Extend<(K, V)> for Entry {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.fields.insert(k.into(), v.into());
        }
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> From<[(K, V); N]> for Entry {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<BTreeMap<String, Value>> for Entry {
    fn from(fields: BTreeMap<String, Value>) -> Self {
        Entry { fields }
    }
}

impl IntoIterator for Entry {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl<'a> IntoIterator for &'a Entry {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_right_wins() {
        let left = Entry::from([("a", 1), ("b", 2)]);
        let right = Entry::from([("b", 20), ("c", 30)]);
        let merged = left.merge(&right);
        assert_eq!(merged, Entry::from([("a", 1), ("b", 20), ("c", 30)]));
    }

    #[test]
    fn test_project_missing_key() {
        let e = Entry::from([("a", 1)]);
        assert_eq!(e.project(&["a"]).unwrap(), Entry::from([("a", 1)]));
        assert_eq!(e.project(&["a", "z"]), Err(MissingKey("z".into())));
    }

    #[test]
    fn test_project_or_null() {
        let e = Entry::from([("a", 1), ("b", 2)]);
        let projected = e.project_or_null(&["a", "z"]);
        assert_eq!(projected.get("a"), Some(&Value::Int(1)));
        assert_eq!(projected.get("z"), Some(&Value::Null));
        assert!(!projected.contains_key("b"));
    }

    #[test]
    fn test_serde_is_plain_object() {
        let e = Entry::new().with("name", "x").with("n", 3);
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"n":3,"name":"x"}"#);
        let back: Entry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
