//! List flattening.

use std::collections::{BTreeMap, BTreeSet};

use fedq_proto::{Entry, Query, Value};
use tracing::{debug, trace};

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Emit one single-attribute entry per list element (or per scalar) of every
/// mapped attribute, renamed through `mapping`. Unmapped attributes are
/// skipped.
pub fn unnest(entries: Vec<Entry>, mapping: &BTreeMap<String, String>) -> Vec<Entry> {
    let mut out = Vec::new();
    for entry in entries {
        for (key, values) in entry {
            let Some(target) = mapping.get(&key) else {
                continue;
            };
            match values {
                Value::List(items) => {
                    out.extend(items.into_iter().map(|v| Entry::new().with(target.clone(), v)));
                }
                scalar => out.push(Entry::new().with(target.clone(), scalar)),
            }
        }
    }
    out
}

/// Flattens list attributes of its child into one entry per element.
///
/// The child is asked for the mapped source attributes only; filters,
/// projection and paging apply to the flattened entries.
pub struct UnnestConnector {
    child: SharedConnector,
    mapping: BTreeMap<String, String>,
}

impl UnnestConnector {
    pub fn new<I, K, V>(child: SharedConnector, mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            child,
            mapping: mapping
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Connector for UnnestConnector {
    fn name(&self) -> &str {
        "unnest"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, "Handling query");

        let child_query = Query::new()
            .with_action(query.action)
            .with_object(query.object.clone())
            .with_attributes(self.mapping.keys().cloned());
        let entries = unnest(self.child.query_entries(&child_query)?, &self.mapping);
        trace!(connector = self.name(), entries = entries.len(), "Unnested entries");

        Ok(QueryResult::Entries(self.reshape(query, entries)))
    }

    fn attributes(&self, _object: &str) -> BTreeSet<String> {
        self.mapping.values().cloned().collect()
    }
}
