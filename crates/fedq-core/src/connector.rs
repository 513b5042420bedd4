//! The connector contract shared by sources and operators.

use std::collections::BTreeSet;
use std::sync::Arc;

use fedq_proto::{Entry, Query, Value};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A group produced by `GroupBy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    /// Group key: a scalar for one attribute, a list for several.
    pub key: Value,
    /// Member entries in input order.
    pub entries: Vec<Entry>,
}

/// What a connector returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryResult {
    Entries(Vec<Entry>),
    Count(usize),
    Groups(Vec<Group>),
}

impl QueryResult {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryResult::Entries(_) => "entries",
            QueryResult::Count(_) => "count",
            QueryResult::Groups(_) => "groups",
        }
    }

    /// Unwrap the entry list, failing if `connector` produced another kind.
    pub fn into_entries(self, connector: &str) -> Result<Vec<Entry>, Error> {
        match self {
            QueryResult::Entries(entries) => Ok(entries),
            other => Err(Error::UnexpectedResult {
                connector: connector.to_string(),
                expected: "entries",
                found: other.kind(),
            }),
        }
    }

    pub fn as_entries(&self) -> Option<&[Entry]> {
        match self {
            QueryResult::Entries(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            QueryResult::Count(n) => Some(*n),
            _ => None,
        }
    }

    /// Number of entries, groups, or the count itself.
    pub fn len(&self) -> usize {
        match self {
            QueryResult::Entries(entries) => entries.len(),
            QueryResult::Count(n) => *n,
            QueryResult::Groups(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Entry>> for QueryResult {
    fn from(entries: Vec<Entry>) -> Self {
        QueryResult::Entries(entries)
    }
}

/// A node of a query plan.
///
/// Leaves adapt a data source; inner nodes wrap one or more children, may
/// rewrite the query before forwarding it, and post-process what comes back.
pub trait Connector: Send + Sync {
    /// Name used in logs, errors and cache directories.
    fn name(&self) -> &str;

    /// Answer a query.
    fn query(&self, query: &Query) -> Result<QueryResult, Error>;

    /// Attributes this connector can produce for `object`.
    ///
    /// An empty set means "unknown", not "none".
    fn attributes(&self, object: &str) -> BTreeSet<String>;

    /// Default WHERE, SELECT, OFFSET, LIMIT post-processing.
    fn reshape(&self, query: &Query, entries: Vec<Entry>) -> Vec<Entry> {
        reshape_entries(query, entries, &self.attributes(&query.object))
    }

    /// Run a query that must produce entries.
    fn query_entries(&self, query: &Query) -> Result<Vec<Entry>, Error> {
        self.query(query)?.into_entries(self.name())
    }
}

/// Connector trees share children by reference counting.
pub type SharedConnector = Arc<dyn Connector>;

/// Apply WHERE, then SELECT, then OFFSET, then LIMIT.
///
/// SELECT keeps the requested attributes that `available` knows about (every
/// available attribute when none are requested) and fills the ones an entry
/// lacks with null. An empty `available` set is unknown, so requested
/// attributes are kept as-is and an unrestricted query keeps entries whole.
pub fn reshape_entries(query: &Query, entries: Vec<Entry>, available: &BTreeSet<String>) -> Vec<Entry> {
    let projection: Option<Vec<String>> = match (query.selects_all(), available.is_empty()) {
        (true, true) => None,
        (true, false) => Some(available.iter().cloned().collect()),
        (false, true) => Some(query.attributes.clone()),
        (false, false) => Some(
            query
                .attributes
                .iter()
                .filter(|a| available.contains(*a))
                .cloned()
                .collect(),
        ),
    };

    entries
        .into_iter()
        .filter(|entry| query.filters.as_ref().map_or(true, |p| p.matches(entry)))
        .map(|entry| match &projection {
            Some(attributes) => entry.project_or_null(attributes),
            None => entry,
        })
        .skip(query.offset.unwrap_or(0))
        .take(query.limit.unwrap_or(usize::MAX))
        .collect()
}

/// Union of the keys of every entry.
pub fn attributes_of(entries: &[Entry]) -> BTreeSet<String> {
    entries.iter().flat_map(|e| e.keys().map(str::to_string)).collect()
}
