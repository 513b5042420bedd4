//! Grouping.

use std::collections::{BTreeSet, HashMap};

use fedq_proto::{Entry, GroupKey, Query};
use tracing::debug;

use crate::connector::{Connector, Group, QueryResult, SharedConnector};
use crate::error::Error;

/// Partition entries by their `attributes` key.
///
/// Groups come out in order of first appearance, entries keep their relative
/// order inside each group, and absent attributes count as null. With a
/// single attribute the group key is that attribute's value; otherwise it is
/// the list of values.
pub fn group_by<S: AsRef<str>>(entries: Vec<Entry>, attributes: &[S]) -> Vec<Group> {
    let mut index: HashMap<GroupKey, usize> = HashMap::new();
    let mut groups: Vec<(GroupKey, Vec<Entry>)> = Vec::new();

    for entry in entries {
        let key = GroupKey::for_entry(&entry, attributes);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(entry),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![entry]));
            }
        }
    }

    groups
        .into_iter()
        .map(|(key, entries)| Group {
            key: key.to_value(),
            entries,
        })
        .collect()
}

/// Groups its child's entries.
pub struct GroupByConnector {
    child: SharedConnector,
    attributes: Vec<String>,
}

impl GroupByConnector {
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

impl Connector for GroupByConnector {
    fn name(&self) -> &str {
        "group_by"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, attributes = ?self.attributes, "Handling query");

        let entries = self.child.query_entries(query)?;
        Ok(QueryResult::Groups(group_by(entries, &self.attributes)))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        self.child.attributes(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntriesConnector;
    use fedq_proto::Value;
    use std::sync::Arc;

    fn rows() -> Vec<Entry> {
        vec![
            Entry::from([("k", Value::from("x")), ("id", Value::Int(1))]),
            Entry::from([("k", Value::from("y")), ("id", Value::Int(2))]),
            Entry::from([("k", Value::from("x")), ("id", Value::Int(3))]),
            Entry::from([("k", Value::from(vec![1])), ("id", Value::Int(4))]),
            Entry::from([("id", Value::Int(5))]),
        ]
    }

    #[test]
    fn test_group_by_partitions_input() {
        let groups = group_by(rows(), &["k"]);
        let keys: Vec<Value> = groups.iter().map(|g| g.key.clone()).collect();
        assert_eq!(
            keys,
            vec![Value::from("x"), Value::from("y"), Value::from(vec![1]), Value::Null]
        );
        assert_eq!(groups[0].entries, vec![rows()[0].clone(), rows()[2].clone()]);

        let total: usize = groups.iter().map(|g| g.entries.len()).sum();
        assert_eq!(total, rows().len());
    }

    #[test]
    fn test_group_by_tuple_key() {
        let entries = vec![
            Entry::from([("a", 1), ("b", 2)]),
            Entry::from([("a", 1), ("b", 2)]),
            Entry::from([("a", 1), ("b", 3)]),
        ];
        let groups = group_by(entries, &["a", "b"]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, Value::from(vec![1, 2]));
        assert_eq!(groups[0].entries.len(), 2);
    }

    #[test]
    fn test_group_by_connector() {
        let child: SharedConnector = Arc::new(EntriesConnector::new(rows()));
        let connector = GroupByConnector::new(child, ["k"]);
        match connector.query(&Query::new()).unwrap() {
            QueryResult::Groups(groups) => assert_eq!(groups.len(), 4),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
