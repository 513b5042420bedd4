//! Concatenation of several children.

use std::collections::BTreeSet;

use fedq_proto::{Action, Entry, Query};
use tracing::debug;

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Concatenate entry lists in order. Duplicates are kept; combine with
/// `Unique` to drop them.
pub fn union(lists: Vec<Vec<Entry>>) -> Vec<Entry> {
    lists.into_iter().flatten().collect()
}

/// Sends the same query to every child and concatenates the results.
pub struct UnionConnector {
    children: Vec<SharedConnector>,
}

impl UnionConnector {
    pub fn new(children: Vec<SharedConnector>) -> Self {
        Self { children }
    }
}

impl Connector for UnionConnector {
    fn name(&self) -> &str {
        "union"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, children = self.children.len(), "Handling query");

        if query.action != Action::Read {
            return Err(Error::unsupported_action(self.name(), query));
        }
        let lists = self
            .children
            .iter()
            .map(|child| child.query_entries(query))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult::Entries(union(lists)))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        self.children
            .iter()
            .flat_map(|child| child.attributes(object))
            .collect()
    }
}
