//! Entry counting.

use std::collections::BTreeSet;

use fedq_proto::{Action, Query};
use tracing::debug;

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Answers with the number of entries its child returns.
pub struct CountConnector {
    child: SharedConnector,
}

impl CountConnector {
    pub fn new(child: SharedConnector) -> Self {
        Self { child }
    }
}

impl Connector for CountConnector {
    fn name(&self) -> &str {
        "count"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, "Handling query");

        if query.action != Action::Read {
            return Err(Error::unsupported_action(self.name(), query));
        }
        let n = self.child.query_entries(query)?.len();
        Ok(QueryResult::Count(n))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        self.child.attributes(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntriesConnector;
    use fedq_proto::{Entry, Predicate};
    use std::sync::Arc;

    #[test]
    fn test_count() {
        let child: SharedConnector = Arc::new(EntriesConnector::new(
            (0..5).map(|i| Entry::from([("i", i)])).collect(),
        ));
        let connector = CountConnector::new(child);
        assert_eq!(connector.query(&Query::new()).unwrap(), QueryResult::Count(5));
        assert_eq!(
            connector
                .query(&Query::new().with_filter(Predicate::lt("i", 2)))
                .unwrap()
                .as_count(),
            Some(2)
        );
    }

    #[test]
    fn test_count_result_is_not_entries() {
        let child: SharedConnector = Arc::new(EntriesConnector::new(vec![]));
        let connector = CountConnector::new(child);
        assert!(connector.query_entries(&Query::new()).is_err());
    }
}
