//! Projection.

use std::collections::BTreeSet;

use fedq_proto::{Entry, Query};
use tracing::debug;

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Project `entries` to exactly `attributes`.
///
/// Unlike the default reshape, a missing attribute is an error rather than a
/// null.
pub fn select<S: AsRef<str>>(entries: Vec<Entry>, attributes: &[S]) -> Result<Vec<Entry>, Error> {
    entries
        .iter()
        .map(|entry| {
            entry.project(attributes).map_err(|missing| Error::MissingAttribute {
                connector: "select".to_string(),
                attribute: missing.0,
            })
        })
        .collect()
}

/// Restricts its child to a fixed set of attributes.
pub struct SelectConnector {
    child: SharedConnector,
    attributes: Vec<String>,
}

impl SelectConnector {
    pub fn new<I, S>(child: SharedConnector, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selected: Vec<String> = Vec::new();
        for attribute in attributes {
            let attribute = attribute.into();
            if !selected.contains(&attribute) {
                selected.push(attribute);
            }
        }
        Self {
            child,
            attributes: selected,
        }
    }

    /// Attributes forwarded to the child: the requested ones this connector
    /// exposes, or all of them when the request does not narrow the set.
    fn forwarded(&self, query: &Query) -> Vec<String> {
        let narrowed: Vec<String> = query
            .attributes
            .iter()
            .filter(|a| self.attributes.contains(a))
            .cloned()
            .collect();
        if narrowed.is_empty() {
            self.attributes.clone()
        } else {
            narrowed
        }
    }
}

impl Connector for SelectConnector {
    fn name(&self) -> &str {
        "select"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, "Handling query");

        let attributes = self.forwarded(query);
        let mut child_query = query.clone();
        child_query.attributes = attributes.clone();
        let entries = self.child.query_entries(&child_query)?;
        Ok(QueryResult::Entries(select(entries, &attributes)?))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        let selected: BTreeSet<String> = self.attributes.iter().cloned().collect();
        let available = self.child.attributes(object);
        if available.is_empty() {
            selected
        } else {
            selected.intersection(&available).cloned().collect()
        }
    }
}
