//! Filtering and mapping inside list-of-entries attributes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use fedq_proto::{Entry, MissingKey, Query, Value};
use tracing::debug;

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Test applied to one value of a sub-entry.
pub type ValueTest = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Transformation applied to one value of a sub-entry.
pub type ValueMap = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Keeps the sub-entries of a list attribute that pass every per-attribute
/// test. A sub-entry lacking a tested attribute passes that test. The outer
/// entry is always kept.
#[derive(Clone)]
pub struct ForEachFilter {
    attribute: String,
    tests: BTreeMap<String, ValueTest>,
}

impl ForEachFilter {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            tests: BTreeMap::new(),
        }
    }

    pub fn with_test(
        mut self,
        attribute: impl Into<String>,
        test: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.tests.insert(attribute.into(), Arc::new(test));
        self
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    fn matches(&self, sub_entry: &Entry) -> bool {
        self.tests
            .iter()
            .all(|(key, test)| sub_entry.get(key).map_or(true, |v| test(v)))
    }

    /// Drop non-matching sub-entries in place. Items that are not entries,
    /// and attributes that are absent or not lists, are left alone.
    pub fn apply(&self, entry: &mut Entry) {
        if let Some(Value::List(items)) = entry.get_mut(&self.attribute) {
            items.retain(|item| match item {
                Value::Map(sub_entry) => self.matches(sub_entry),
                _ => true,
            });
        }
    }
}

/// Rewrite every sub-entry of `attribute` through `mapping`; keys without a
/// mapping keep their value.
pub fn for_each_sub_entry(
    mut entry: Entry,
    attribute: &str,
    mapping: &BTreeMap<String, ValueMap>,
) -> Result<Entry, MissingKey> {
    entry.try_get(attribute)?;
    if let Some(Value::List(items)) = entry.get_mut(attribute) {
        for item in items.iter_mut() {
            if let Value::Map(sub_entry) = item {
                *sub_entry = std::mem::take(sub_entry)
                    .into_iter()
                    .map(|(k, v)| {
                        let v = match mapping.get(&k) {
                            Some(map) => map(&v),
                            None => v,
                        };
                        (k, v)
                    })
                    .collect();
            }
        }
    }
    Ok(entry)
}

/// Applies a [`ForEachFilter`] and a sub-entry mapping to its child's
/// entries.
pub struct ForEachConnector {
    child: SharedConnector,
    filter: ForEachFilter,
    mapping: BTreeMap<String, ValueMap>,
}

impl ForEachConnector {
    pub fn new(child: SharedConnector, filter: ForEachFilter) -> Self {
        Self {
            child,
            filter,
            mapping: BTreeMap::new(),
        }
    }

    pub fn with_map(
        mut self,
        attribute: impl Into<String>,
        map: impl Fn(&Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.mapping.insert(attribute.into(), Arc::new(map));
        self
    }

    fn rewrite(&self, mut entry: Entry) -> Entry {
        self.filter.apply(&mut entry);
        if self.mapping.is_empty() {
            return entry;
        }
        match for_each_sub_entry(entry.clone(), self.filter.attribute(), &self.mapping) {
            Ok(mapped) => mapped,
            Err(_) => entry,
        }
    }
}

impl Connector for ForEachConnector {
    fn name(&self) -> &str {
        "for_each"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        // Filters on the rewritten list must see the rewritten values.
        let local = query
            .filters
            .as_ref()
            .is_some_and(|p| p.attributes().contains(self.filter.attribute()));
        debug!(connector = self.name(), query = %query, local_filter = local, "Handling query");

        if !local {
            let entries = self.child.query_entries(query)?;
            return Ok(QueryResult::Entries(entries.into_iter().map(|e| self.rewrite(e)).collect()));
        }

        let mut child_query = query.clone();
        child_query.filters = None;
        child_query.offset = None;
        child_query.limit = None;
        if !child_query.selects_all() && !child_query.attributes.iter().any(|a| a == self.filter.attribute()) {
            child_query.attributes.push(self.filter.attribute().to_string());
        }
        let entries: Vec<Entry> = self
            .child
            .query_entries(&child_query)?
            .into_iter()
            .map(|e| self.rewrite(e))
            .collect();
        Ok(QueryResult::Entries(self.reshape(query, entries)))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        self.child.attributes(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntriesConnector;
    use fedq_proto::Predicate;

    fn paper(title: &str, authors: &[(&str, i64)]) -> Entry {
        let authors: Vec<Value> = authors
            .iter()
            .map(|(name, rank)| Value::Map(Entry::from([("name", Value::from(*name)), ("rank", Value::Int(*rank))])))
            .collect();
        Entry::from([("title", Value::from(title)), ("authors", Value::List(authors))])
    }

    fn names(entry: &Entry) -> Vec<String> {
        match entry.get("authors") {
            Some(Value::List(items)) => items
                .iter()
                .filter_map(|i| match i {
                    Value::Map(e) => e.get("name").and_then(|v| v.as_str()).map(str::to_string),
                    _ => None,
                })
                .collect(),
            _ => vec![],
        }
    }

    fn first_author_only() -> ForEachFilter {
        ForEachFilter::new("authors").with_test("rank", |v| v.as_i64() == Some(1))
    }

    #[test]
    fn test_filter_keeps_matching_sub_entries() {
        let mut entry = paper("p", &[("ada", 1), ("bob", 2)]);
        first_author_only().apply(&mut entry);
        assert_eq!(names(&entry), vec!["ada"]);

        // sub-entries without the tested attribute pass
        let mut entry = Entry::from([(
            "authors",
            Value::from(vec![Value::Map(Entry::from([("name", "eve")]))]),
        )]);
        first_author_only().apply(&mut entry);
        assert_eq!(names(&entry), vec!["eve"]);

        let mut untouched = Entry::from([("title", "q")]);
        first_author_only().apply(&mut untouched);
        assert_eq!(untouched, Entry::from([("title", "q")]));
    }

    #[test]
    fn test_for_each_sub_entry_maps_values() {
        let mapping: BTreeMap<String, ValueMap> = BTreeMap::from([(
            "name".to_string(),
            Arc::new(|v: &Value| Value::from(v.as_str().unwrap_or_default().to_uppercase())) as ValueMap,
        )]);
        let entry = for_each_sub_entry(paper("p", &[("ada", 1), ("bob", 2)]), "authors", &mapping).unwrap();
        assert_eq!(names(&entry), vec!["ADA", "BOB"]);

        let err = for_each_sub_entry(Entry::new(), "authors", &mapping).unwrap_err();
        assert_eq!(err, MissingKey("authors".into()));
    }

    #[test]
    fn test_connector_rewrites_child_entries() {
        let child: SharedConnector = Arc::new(EntriesConnector::new(vec![
            paper("p1", &[("ada", 2), ("bob", 1)]),
            paper("p2", &[("eve", 2)]),
        ]));
        let connector = ForEachConnector::new(child, first_author_only())
            .with_map("name", |v| Value::from(format!("dr {}", v.as_str().unwrap_or_default())));

        let result = connector
            .query_entries(&Query::new().with_attributes(["title", "authors"]))
            .unwrap();
        assert_eq!(names(&result[0]), vec!["dr bob"]);
        assert!(names(&result[1]).is_empty());

        // the filter sees rewritten lists, so p2 is dropped
        let result = connector
            .query_entries(
                &Query::new()
                    .with_attributes(["title"])
                    .with_filter(Predicate::ne("authors", Value::List(vec![]))),
            )
            .unwrap();
        assert_eq!(result, vec![Entry::from([("title", "p1")])]);
    }
}
