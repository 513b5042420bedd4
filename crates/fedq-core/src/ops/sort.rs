//! Stable sorting.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use fedq_proto::{Entry, OrderDirection, OrderSpec, Query, Value};
use tracing::debug;

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

fn compare_by(a: &Entry, b: &Entry, order_by: &[OrderSpec]) -> Ordering {
    static NULL: Value = Value::Null;

    for spec in order_by {
        let a_val = a.get(&spec.field).unwrap_or(&NULL);
        let b_val = b.get(&spec.field).unwrap_or(&NULL);

        let cmp = a_val.total_cmp(b_val);
        let cmp = match spec.direction {
            OrderDirection::Asc => cmp,
            OrderDirection::Desc => cmp.reverse(),
        };

        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

/// Sort entries according to order specifications. The sort is stable:
/// entries with equal keys keep their input order, in both directions.
/// Missing attributes sort as null.
pub fn sort_entries(entries: &mut [Entry], order_by: &[OrderSpec]) {
    if order_by.is_empty() {
        return;
    }
    entries.sort_by(|a, b| compare_by(a, b, order_by));
}

/// Sort by the tuple of `attributes`, ascending or descending.
pub fn sort_by<S: AsRef<str>>(mut entries: Vec<Entry>, attributes: &[S], descending: bool) -> Vec<Entry> {
    let order_by = order_specs(attributes, descending);
    sort_entries(&mut entries, &order_by);
    entries
}

fn order_specs<S: AsRef<str>>(attributes: &[S], descending: bool) -> Vec<OrderSpec> {
    attributes
        .iter()
        .map(|a| {
            if descending {
                OrderSpec::desc(a.as_ref())
            } else {
                OrderSpec::asc(a.as_ref())
            }
        })
        .collect()
}

/// Sorts its child's entries. Paging is applied after sorting.
pub struct SortByConnector {
    child: SharedConnector,
    order_by: Vec<OrderSpec>,
}

impl SortByConnector {
    pub fn new<S: AsRef<str>>(child: SharedConnector, attributes: &[S], descending: bool) -> Self {
        Self {
            child,
            order_by: order_specs(attributes, descending),
        }
    }

    /// Sort with per-attribute directions.
    pub fn with_order(child: SharedConnector, order_by: Vec<OrderSpec>) -> Self {
        Self { child, order_by }
    }
}

impl Connector for SortByConnector {
    fn name(&self) -> &str {
        "sort_by"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, "Handling query");

        let mut child_query = query.clone();
        child_query.offset = None;
        child_query.limit = None;

        let mut entries = self.child.query_entries(&child_query)?;
        sort_entries(&mut entries, &self.order_by);
        Ok(QueryResult::Entries(
            entries
                .into_iter()
                .skip(query.offset.unwrap_or(0))
                .take(query.limit.unwrap_or(usize::MAX))
                .collect(),
        ))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        self.child.attributes(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntriesConnector;
    use std::sync::Arc;

    fn ids(entries: &[Entry]) -> Vec<i64> {
        entries
            .iter()
            .filter_map(|e| e.get("id").and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn test_sort_is_stable() {
        let entries = vec![
            Entry::from([("a", 1), ("id", 1)]),
            Entry::from([("a", 1), ("id", 2)]),
        ];
        assert_eq!(ids(&sort_by(entries.clone(), &["a"], false)), vec![1, 2]);
        assert_eq!(ids(&sort_by(entries, &["a"], true)), vec![1, 2]);
    }

    #[test]
    fn test_sort_multiple_attributes() {
        let entries = vec![
            Entry::from([("a", 2), ("b", 1), ("id", 1)]),
            Entry::from([("a", 1), ("b", 2), ("id", 2)]),
            Entry::from([("a", 1), ("b", 1), ("id", 3)]),
            Entry::from([("b", 0), ("id", 4)]),
        ];
        assert_eq!(ids(&sort_by(entries.clone(), &["a", "b"], false)), vec![4, 3, 2, 1]);
        assert_eq!(ids(&sort_by(entries, &["a", "b"], true)), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_sort_mixed_directions() {
        let mut entries = vec![
            Entry::from([("a", 1), ("b", 1), ("id", 1)]),
            Entry::from([("a", 1), ("b", 2), ("id", 2)]),
            Entry::from([("a", 0), ("b", 1), ("id", 3)]),
        ];
        sort_entries(&mut entries, &[OrderSpec::asc("a"), OrderSpec::desc("b")]);
        assert_eq!(ids(&entries), vec![3, 2, 1]);
    }

    #[test]
    fn test_sort_connector_pages_after_sort() {
        let child: SharedConnector = Arc::new(EntriesConnector::new(
            [3, 1, 2].iter().map(|&i| Entry::from([("id", i)])).collect(),
        ));
        let connector = SortByConnector::new(child, &["id"], true);
        let result = connector.query_entries(&Query::new().with_limit(2)).unwrap();
        assert_eq!(ids(&result), vec![3, 2]);
    }
}
