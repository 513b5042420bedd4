//! Attribute renaming.

use std::collections::{BTreeMap, BTreeSet};

use fedq_proto::{Entry, Query};
use tracing::debug;

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Rename the keys of `entry`. All keys are renamed at once, so swaps work;
/// if a renamed key collides with a key that was not renamed, the renamed one
/// wins.
pub fn rename_entry(entry: Entry, mapping: &BTreeMap<String, String>) -> Entry {
    let (renamed, kept): (Vec<_>, Vec<_>) = entry
        .into_iter()
        .partition(|(key, _)| mapping.contains_key(key));

    let mut out: Entry = kept.into_iter().collect();
    out.extend(renamed.into_iter().map(|(key, value)| {
        let target = mapping.get(&key).cloned().unwrap_or(key);
        (target, value)
    }));
    out
}

pub fn rename_entries(entries: Vec<Entry>, mapping: &BTreeMap<String, String>) -> Vec<Entry> {
    entries.into_iter().map(|e| rename_entry(e, mapping)).collect()
}

/// Rewrite the attribute references of a query: projection, filter and sort
/// keys. Names absent from `mapping` are kept.
pub fn rename_query(query: &Query, mapping: &BTreeMap<String, String>) -> Query {
    let mut renamed = query.clone();
    let rename = |name: &String| mapping.get(name).cloned().unwrap_or_else(|| name.clone());

    renamed.attributes = Vec::new();
    for attribute in query.attributes.iter().map(rename) {
        if !renamed.attributes.contains(&attribute) {
            renamed.attributes.push(attribute);
        }
    }
    if let Some(filters) = renamed.filters.as_mut() {
        filters.rename_attributes(mapping);
    }
    renamed.sort_by = Vec::new();
    for mut order in query.sort_by.iter().cloned() {
        order.field = rename(&order.field);
        renamed = renamed.with_order(order);
    }
    renamed
}

/// Exposes its child's attributes under new names.
///
/// `mapping` goes from child names to exposed names. Queries are rewritten
/// with the inverse mapping before reaching the child, and returned entries
/// with `mapping`.
pub struct RenameConnector {
    child: SharedConnector,
    to_outer: BTreeMap<String, String>,
    to_child: BTreeMap<String, String>,
}

impl RenameConnector {
    /// Build a rename. The mapping must be invertible; use [`Self::checked`]
    /// to verify it.
    pub fn new<I, K, V>(child: SharedConnector, mapping: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let to_outer: BTreeMap<String, String> = mapping
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let to_child = to_outer.iter().map(|(k, v)| (v.clone(), k.clone())).collect();
        Self {
            child,
            to_outer,
            to_child,
        }
    }

    /// Like [`Self::new`] but fails with `AmbiguousRename` if two attributes
    /// map to the same name.
    pub fn checked<I, K, V>(child: SharedConnector, mapping: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let connector = Self::new(child, mapping);
        if connector.to_child.len() != connector.to_outer.len() {
            let mut by_target: BTreeMap<&String, Vec<String>> = BTreeMap::new();
            for (source, target) in &connector.to_outer {
                by_target.entry(target).or_default().push(source.clone());
            }
            if let Some((target, sources)) = by_target.into_iter().find(|(_, s)| s.len() > 1) {
                return Err(Error::AmbiguousRename {
                    target: target.clone(),
                    sources,
                });
            }
        }
        Ok(connector)
    }
}

impl Connector for RenameConnector {
    fn name(&self) -> &str {
        "rename"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        let child_query = rename_query(query, &self.to_child);
        debug!(connector = self.name(), query = %query, child_query = %child_query, "Handling query");

        let entries = self.child.query_entries(&child_query)?;
        Ok(QueryResult::Entries(rename_entries(entries, &self.to_outer)))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        self.child
            .attributes(object)
            .into_iter()
            .map(|a| self.to_outer.get(&a).cloned().unwrap_or(a))
            .collect()
    }
}
