//! Deduplication.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use fedq_proto::{Entry, GroupKey, Query, Value};
use tracing::debug;

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Keep the first entry seen for each distinct `attributes` key, in input
/// order.
pub fn unique<S: AsRef<str>>(entries: Vec<Entry>, attributes: &[S]) -> Vec<Entry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(GroupKey::for_entry(entry, attributes)))
        .collect()
}

/// Drops entries whose key repeats an earlier one.
///
/// Paging is applied after deduplication.
pub struct UniqueConnector {
    child: SharedConnector,
    attributes: Vec<String>,
}

impl UniqueConnector {
    pub fn new<I, S>(child: SharedConnector, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            child,
            attributes: attributes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Connector for UniqueConnector {
    fn name(&self) -> &str {
        "unique"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, attributes = ?self.attributes, "Handling query");

        let mut child_query = query.clone();
        child_query.offset = None;
        child_query.limit = None;

        let entries = unique(self.child.query_entries(&child_query)?, &self.attributes);
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

/// Distinct values of `attribute` in `connector`, in first-seen order.
pub fn distinct_values(connector: &SharedConnector, attribute: &str) -> Result<Vec<Value>, Error> {
    let unique = UniqueConnector::new(Arc::clone(connector), [attribute]);
    let entries = unique.query_entries(&Query::new().with_attributes([attribute]))?;
    Ok(entries
        .into_iter()
        .map(|mut e| e.remove(attribute).unwrap_or_default())
        .collect())
}
