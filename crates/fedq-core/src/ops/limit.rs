//! Result size bound.

use std::collections::BTreeSet;

use fedq_proto::{Entry, Query};
use tracing::debug;

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// First `limit` entries.
pub fn limit(mut entries: Vec<Entry>, limit: usize) -> Vec<Entry> {
    entries.truncate(limit);
    entries
}

/// Caps the number of entries returned by its child.
///
/// The bound is pushed down as the query limit (the tighter of the two wins)
/// and enforced again on the way back up.
pub struct LimitConnector {
    child: SharedConnector,
    limit: usize,
}

impl LimitConnector {
    pub fn new(child: SharedConnector, limit: usize) -> Self {
        Self { child, limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Connector for LimitConnector {
    fn name(&self) -> &str {
        "limit"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, limit = self.limit, "Handling query");

        let mut child_query = query.clone();
        child_query.limit = Some(query.limit.map_or(self.limit, |l| l.min(self.limit)));
        let entries = self.child.query_entries(&child_query)?;
        Ok(QueryResult::Entries(limit(entries, self.limit)))
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

    fn child() -> SharedConnector {
        Arc::new(EntriesConnector::new((0..10).map(|i| Entry::from([("i", i)])).collect()))
    }

    #[test]
    fn test_limit_connector() {
        let connector = LimitConnector::new(child(), 3);
        assert_eq!(connector.query_entries(&Query::new()).unwrap().len(), 3);
        assert_eq!(connector.query_entries(&Query::new().with_limit(2)).unwrap().len(), 2);
        assert_eq!(connector.query_entries(&Query::new().with_limit(5)).unwrap().len(), 3);
    }

    #[test]
    fn test_limit_with_offset() {
        let connector = LimitConnector::new(child(), 2);
        let result = connector.query_entries(&Query::new().with_offset(8)).unwrap();
        assert_eq!(result, vec![Entry::from([("i", 8)]), Entry::from([("i", 9)])]);
    }

    #[test]
    fn test_limit_fn() {
        let entries: Vec<Entry> = (0..3).map(|i| Entry::from([("i", i)])).collect();
        assert_eq!(limit(entries.clone(), 10), entries);
        assert!(limit(entries, 0).is_empty());
    }
}
