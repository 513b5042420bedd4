//! Row filtering: `Where` and text search.

use std::collections::BTreeSet;
use std::sync::Arc;

use fedq_proto::{Entry, Predicate, Query, Value};
use tracing::{debug, trace};

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Keep-if function applied to each entry.
pub type KeepIf = Arc<dyn Fn(&Entry) -> bool + Send + Sync>;

/// Keep the entries for which `keep_if` holds, in order.
pub fn filter_entries(entries: Vec<Entry>, keep_if: impl Fn(&Entry) -> bool) -> Vec<Entry> {
    entries.into_iter().filter(|e| keep_if(e)).collect()
}

/// Filters its child's entries with an arbitrary function.
///
/// The child is queried without paging so that OFFSET and LIMIT count only
/// entries that pass the filter; paging is then applied here.
pub struct WhereConnector {
    child: SharedConnector,
    keep_if: KeepIf,
}

impl WhereConnector {
    pub fn new(child: SharedConnector, keep_if: impl Fn(&Entry) -> bool + Send + Sync + 'static) -> Self {
        Self {
            child,
            keep_if: Arc::new(keep_if),
        }
    }

    /// Filter with a predicate.
    pub fn with_predicate(child: SharedConnector, predicate: Predicate) -> Self {
        Self::new(child, move |entry| predicate.matches(entry))
    }
}

impl Connector for WhereConnector {
    fn name(&self) -> &str {
        "where"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, "Handling query");

        let mut child_query = query.clone();
        child_query.offset = None;
        child_query.limit = None;

        let entries = self.child.query_entries(&child_query)?;
        let fetched = entries.len();
        let kept: Vec<Entry> = filter_entries(entries, |e| (self.keep_if)(e))
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        trace!(connector = self.name(), fetched, kept = kept.len(), "Filtered entries");
        Ok(QueryResult::Entries(kept))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        self.child.attributes(object)
    }
}

/// How a search value is compared to an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Values are equal.
    Equals,
    /// The search value is contained in the attribute value (substring or
    /// list element).
    Contains,
    /// Case-insensitive string equality.
    LowerCaseEquals,
    /// Case-insensitive substring.
    LowerCaseContains,
    /// The search value occurs as whole words, ignoring case.
    Words,
}

impl MatchMode {
    pub fn matches(&self, needle: &Value, value: &Value) -> bool {
        match self {
            MatchMode::Equals => needle.loose_eq(value),
            MatchMode::Contains => value.contains(needle),
            MatchMode::LowerCaseEquals => match (needle.as_str(), value.as_str()) {
                (Some(n), Some(v)) => n.to_lowercase() == v.to_lowercase(),
                _ => false,
            },
            MatchMode::LowerCaseContains => match (needle.as_str(), value.as_str()) {
                (Some(n), Some(v)) => v.to_lowercase().contains(&n.to_lowercase()),
                _ => false,
            },
            MatchMode::Words => match (needle.as_str(), value.as_str()) {
                (Some(n), Some(v)) => contains_words(n, v),
                _ => false,
            },
        }
    }
}

/// Whether the words of `phrase` occur consecutively in `text`, ignoring case
/// and punctuation.
fn contains_words(phrase: &str, text: &str) -> bool {
    let words = |s: &str| -> Vec<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect()
    };
    let needle = words(phrase);
    if needle.is_empty() {
        return false;
    }
    words(text).windows(needle.len()).any(|window| window == needle.as_slice())
}

/// Keeps entries where any search value matches any of the listed
/// attributes. Absent attributes never match.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    values: Vec<Value>,
    attributes: Vec<String>,
    mode: MatchMode,
}

impl SearchFilter {
    pub fn new<V, A>(values: V, attributes: A, mode: MatchMode) -> Self
    where
        V: IntoIterator,
        V::Item: Into<Value>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            values: values.into_iter().map(Into::into).collect(),
            attributes: attributes.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        self.values.iter().any(|needle| {
            self.attributes.iter().any(|attribute| {
                entry
                    .get(attribute)
                    .map(|value| self.mode.matches(needle, value))
                    .unwrap_or(false)
            })
        })
    }
}

/// Keep the entries matched by a [`SearchFilter`].
pub fn search(entries: Vec<Entry>, filter: &SearchFilter) -> Vec<Entry> {
    filter_entries(entries, |e| filter.matches(e))
}
