//! Nested-loop joins.
//!
//! All joins compare every left row with every right row, O(|L|·|R|).
//! Joined rows are merged with [`Entry::merge`]: the right row's attributes
//! win on conflict. Rows without a counterpart in outer joins are padded with
//! null for every attribute seen on the other side.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use fedq_proto::{Action, Entry, MissingKey, Query, Value};
use tracing::{debug, trace};

use crate::connector::{attributes_of, Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Join flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinMode {
    /// Matching pairs only.
    Inner,
    /// Every left row, with right attributes null when unmatched.
    Left,
    /// Every right row, with left attributes null when unmatched.
    Right,
    /// Left join plus the unmatched right rows.
    FullOuter,
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JoinMode::Inner => "INNER JOIN",
            JoinMode::Left => "LEFT JOIN",
            JoinMode::Right => "RIGHT JOIN",
            JoinMode::FullOuter => "FULL OUTER JOIN",
        })
    }
}

/// Join condition over a (left, right) pair of rows. Reading an absent
/// attribute is reported as [`MissingKey`] and fails the join.
pub type JoinPredicate = Arc<dyn Fn(&Entry, &Entry) -> Result<bool, MissingKey> + Send + Sync>;

fn describe(entry: &Entry) -> String {
    serde_json::to_string(entry).unwrap_or_else(|_| format!("{:?}", entry))
}

fn check<F>(connector: &str, f: &F, left: &Entry, right: &Entry) -> Result<bool, Error>
where
    F: Fn(&Entry, &Entry) -> Result<bool, MissingKey> + ?Sized,
{
    f(left, right).map_err(|missing| Error::JoinPredicate {
        connector: connector.to_string(),
        left: describe(left),
        right: describe(right),
        message: missing.to_string(),
    })
}

fn null_fill(row: &Entry, keys: &BTreeSet<String>) -> Entry {
    let mut filled = row.clone();
    for key in keys {
        if !filled.contains_key(key) {
            filled.insert(key.clone(), Value::Null);
        }
    }
    filled
}

/// Core nested loop: for each outer row, scan inner rows and emit merged
/// pairs; unmatched outer rows are padded when `keep_unmatched` is set.
fn nested_loop(
    outer: &[Entry],
    inner: &[Entry],
    joined: &dyn Fn(&Entry, &Entry) -> Result<bool, Error>,
    merge: &dyn Fn(&Entry, &Entry) -> Entry,
    match_once: bool,
    keep_unmatched: bool,
) -> Result<Vec<Entry>, Error> {
    let padding = if keep_unmatched {
        attributes_of(inner)
    } else {
        BTreeSet::new()
    };

    let mut rows = Vec::new();
    for o in outer {
        let mut matched = false;
        for i in inner {
            if joined(o, i)? {
                matched = true;
                rows.push(merge(o, i));
                if match_once {
                    break;
                }
            }
        }
        if !matched && keep_unmatched {
            rows.push(null_fill(o, &padding));
        }
    }
    Ok(rows)
}

/// Join `left` and `right` on `f` under `mode`.
///
/// With `match_once` a row pairs with its first match only; otherwise it pairs
/// with every match.
pub fn join_if<F>(
    left: &[Entry],
    right: &[Entry],
    f: &F,
    mode: JoinMode,
    match_once: bool,
) -> Result<Vec<Entry>, Error>
where
    F: Fn(&Entry, &Entry) -> Result<bool, MissingKey> + ?Sized,
{
    join_if_named("join_if", left, right, f, mode, match_once)
}

fn join_if_named<F>(
    connector: &str,
    left: &[Entry],
    right: &[Entry],
    f: &F,
    mode: JoinMode,
    match_once: bool,
) -> Result<Vec<Entry>, Error>
where
    F: Fn(&Entry, &Entry) -> Result<bool, MissingKey> + ?Sized,
{
    let left_right = |l: &Entry, r: &Entry| check(connector, f, l, r);
    let merge_lr = |l: &Entry, r: &Entry| l.merge(r);

    match mode {
        JoinMode::Inner => nested_loop(left, right, &left_right, &merge_lr, match_once, false),
        JoinMode::Left => nested_loop(left, right, &left_right, &merge_lr, match_once, true),
        JoinMode::Right => nested_loop(
            right,
            left,
            &|r: &Entry, l: &Entry| check(connector, f, l, r),
            &|r: &Entry, l: &Entry| l.merge(r),
            match_once,
            true,
        ),
        JoinMode::FullOuter => {
            let mut rows = nested_loop(left, right, &left_right, &merge_lr, match_once, true)?;
            let padding = attributes_of(left);
            for r in right {
                let mut matched = false;
                for l in left {
                    if left_right(l, r)? {
                        matched = true;
                        break;
                    }
                }
                if !matched {
                    rows.push(null_fill(r, &padding));
                }
            }
            Ok(rows)
        }
    }
}

pub fn inner_join_if<F>(left: &[Entry], right: &[Entry], f: &F) -> Result<Vec<Entry>, Error>
where
    F: Fn(&Entry, &Entry) -> Result<bool, MissingKey> + ?Sized,
{
    join_if(left, right, f, JoinMode::Inner, true)
}

pub fn left_join_if<F>(left: &[Entry], right: &[Entry], f: &F) -> Result<Vec<Entry>, Error>
where
    F: Fn(&Entry, &Entry) -> Result<bool, MissingKey> + ?Sized,
{
    join_if(left, right, f, JoinMode::Left, true)
}

pub fn right_join_if<F>(left: &[Entry], right: &[Entry], f: &F) -> Result<Vec<Entry>, Error>
where
    F: Fn(&Entry, &Entry) -> Result<bool, MissingKey> + ?Sized,
{
    join_if(left, right, f, JoinMode::Right, true)
}

pub fn full_outer_join_if<F>(left: &[Entry], right: &[Entry], f: &F) -> Result<Vec<Entry>, Error>
where
    F: Fn(&Entry, &Entry) -> Result<bool, MissingKey> + ?Sized,
{
    join_if(left, right, f, JoinMode::FullOuter, true)
}

/// Two rows join naturally when they share at least one attribute and agree
/// on every shared attribute.
pub fn are_naturally_joined(left: &Entry, right: &Entry) -> bool {
    let mut shared = false;
    for (key, value) in left {
        if let Some(other) = right.get(key) {
            if !value.loose_eq(other) {
                return false;
            }
            shared = true;
        }
    }
    shared
}

/// Equi-join on the shared attributes; every matching pair is emitted.
pub fn natural_join(left: &[Entry], right: &[Entry]) -> Vec<Entry> {
    let mut rows = Vec::new();
    for l in left {
        for r in right {
            if are_naturally_joined(l, r) {
                rows.push(l.merge(r));
            }
        }
    }
    rows
}

/// Fetch both sides of a join with a bare READ on the query object.
///
/// The join condition may read any attribute, so neither projection, filter
/// nor paging can be pushed to the children.
fn fetch_sides(
    name: &str,
    left: &SharedConnector,
    right: &SharedConnector,
    query: &Query,
) -> Result<(Vec<Entry>, Vec<Entry>), Error> {
    if query.action != Action::Read {
        return Err(Error::unsupported_action(name, query));
    }
    let child_query = Query::read(query.object.clone());
    let l = left.query_entries(&child_query)?;
    let r = right.query_entries(&child_query)?;
    trace!(connector = name, left = l.len(), right = r.len(), "Fetched join inputs");
    Ok((l, r))
}

/// Joins two children with an arbitrary condition.
pub struct JoinIfConnector {
    left: SharedConnector,
    right: SharedConnector,
    predicate: JoinPredicate,
    mode: JoinMode,
    match_once: bool,
}

impl JoinIfConnector {
    pub fn new(
        left: SharedConnector,
        right: SharedConnector,
        predicate: impl Fn(&Entry, &Entry) -> Result<bool, MissingKey> + Send + Sync + 'static,
        mode: JoinMode,
    ) -> Self {
        Self {
            left,
            right,
            predicate: Arc::new(predicate),
            mode,
            match_once: true,
        }
    }

    /// Pair each row with every match instead of the first one only.
    pub fn with_match_once(mut self, match_once: bool) -> Self {
        self.match_once = match_once;
        self
    }

    pub fn mode(&self) -> JoinMode {
        self.mode
    }
}

impl Connector for JoinIfConnector {
    fn name(&self) -> &str {
        "join_if"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), mode = %self.mode, query = %query, "Handling query");

        let (left, right) = fetch_sides(self.name(), &self.left, &self.right, query)?;
        let rows = join_if_named(
            self.name(),
            &left,
            &right,
            self.predicate.as_ref(),
            self.mode,
            self.match_once,
        )?;
        Ok(QueryResult::Entries(self.reshape(query, rows)))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        let mut attributes = self.left.attributes(object);
        attributes.extend(self.right.attributes(object));
        attributes
    }
}

/// Joins two children on their shared attributes.
pub struct NaturalJoinConnector {
    left: SharedConnector,
    right: SharedConnector,
}

impl NaturalJoinConnector {
    pub fn new(left: SharedConnector, right: SharedConnector) -> Self {
        Self { left, right }
    }
}

impl Connector for NaturalJoinConnector {
    fn name(&self) -> &str {
        "natural_join"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        debug!(connector = self.name(), query = %query, "Handling query");

        let (left, right) = fetch_sides(self.name(), &self.left, &self.right, query)?;
        Ok(QueryResult::Entries(self.reshape(query, natural_join(&left, &right))))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        let mut attributes = self.left.attributes(object);
        attributes.extend(self.right.attributes(object));
        attributes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::EntriesConnector;

    fn left_rows() -> Vec<Entry> {
        vec![
            Entry::from([("k1", "left"), ("k12", "only1")]),
            Entry::from([("k1", "match1"), ("k12", "match")]),
        ]
    }

    fn right_rows() -> Vec<Entry> {
        vec![
            Entry::from([("k2", "right"), ("k12", "only2")]),
            Entry::from([("k2", "match2"), ("k12", "match")]),
        ]
    }

    fn same_k12(l: &Entry, r: &Entry) -> Result<bool, MissingKey> {
        Ok(l.try_get("k12")?.loose_eq(r.try_get("k12")?))
    }

    fn row(pairs: &[(&str, Option<&str>)]) -> Entry {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::from(*v)))
            .collect()
    }

    #[test]
    fn test_inner_join() {
        let rows = inner_join_if(&left_rows(), &right_rows(), &same_k12).unwrap();
        assert_eq!(
            rows,
            vec![row(&[("k1", Some("match1")), ("k12", Some("match")), ("k2", Some("match2"))])]
        );
    }

    #[test]
    fn test_left_join() {
        let rows = left_join_if(&left_rows(), &right_rows(), &same_k12).unwrap();
        assert_eq!(
            rows,
            vec![
                row(&[("k1", Some("left")), ("k12", Some("only1")), ("k2", None)]),
                row(&[("k1", Some("match1")), ("k12", Some("match")), ("k2", Some("match2"))]),
            ]
        );
    }

    #[test]
    fn test_right_join() {
        let rows = right_join_if(&left_rows(), &right_rows(), &same_k12).unwrap();
        assert_eq!(
            rows,
            vec![
                row(&[("k1", None), ("k12", Some("only2")), ("k2", Some("right"))]),
                row(&[("k1", Some("match1")), ("k12", Some("match")), ("k2", Some("match2"))]),
            ]
        );
    }

    #[test]
    fn test_full_outer_join() {
        let rows = full_outer_join_if(&left_rows(), &right_rows(), &same_k12).unwrap();
        assert_eq!(
            rows,
            vec![
                row(&[("k1", Some("left")), ("k12", Some("only1")), ("k2", None)]),
                row(&[("k1", Some("match1")), ("k12", Some("match")), ("k2", Some("match2"))]),
                row(&[("k1", None), ("k12", Some("only2")), ("k2", Some("right"))]),
            ]
        );
    }

    #[test]
    fn test_left_join_with_empty_right() {
        let rows = left_join_if(&left_rows(), &[], &same_k12).unwrap();
        assert_eq!(rows, left_rows());
    }

    #[test]
    fn test_match_once() {
        let left = vec![Entry::from([("k", 1)])];
        let right = vec![
            Entry::from([("k", 1), ("v", 1)]),
            Entry::from([("k", 1), ("v", 2)]),
        ];
        let same_k = |l: &Entry, r: &Entry| -> Result<bool, MissingKey> {
            Ok(l.try_get("k")?.loose_eq(r.try_get("k")?))
        };

        let once = join_if(&left, &right, &same_k, JoinMode::Inner, true).unwrap();
        assert_eq!(once, vec![Entry::from([("k", 1), ("v", 1)])]);

        let all = join_if(&left, &right, &same_k, JoinMode::Inner, false).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_join_predicate_missing_key() {
        let left = vec![Entry::from([("x", 1)])];
        let err = inner_join_if(&left, &right_rows(), &same_k12).unwrap_err();
        assert!(matches!(err, Error::JoinPredicate { .. }));
    }

    #[test]
    fn test_join_sizes_are_ordered() {
        let modes = [JoinMode::Inner, JoinMode::Left, JoinMode::FullOuter];
        let sizes: Vec<usize> = modes
            .iter()
            .map(|&mode| {
                join_if(&left_rows(), &right_rows(), &same_k12, mode, true)
                    .unwrap()
                    .len()
            })
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_join_if_connector() {
        for (mode, expected) in [
            (JoinMode::Inner, 1),
            (JoinMode::Left, 2),
            (JoinMode::Right, 2),
            (JoinMode::FullOuter, 3),
        ] {
            let connector = JoinIfConnector::new(
                Arc::new(EntriesConnector::new(left_rows())),
                Arc::new(EntriesConnector::new(right_rows())),
                same_k12,
                mode,
            );
            let rows = connector.query_entries(&Query::new()).unwrap();
            assert_eq!(rows.len(), expected, "{}", mode);
        }
    }

    fn researchers() -> Vec<Entry> {
        vec![
            Entry::from([("institution_id", Value::Int(5)), ("name", Value::from("Name5"))]),
            Entry::from([("institution_id", Value::Int(5)), ("name", Value::from("Name5_"))]),
            Entry::from([("institution_id", Value::Int(2)), ("name", Value::from("Name2"))]),
            Entry::from([("institution_id", Value::Int(4)), ("name", Value::from("Name4"))]),
        ]
    }

    fn institutions() -> Vec<Entry> {
        (1..=5)
            .map(|i| {
                Entry::from([
                    ("institution_id", Value::Int(i)),
                    ("institution", Value::from(format!("Institut{}", i))),
                ])
            })
            .collect()
    }

    #[test]
    fn test_natural_join() {
        let rows = natural_join(&researchers(), &institutions());
        let names: Vec<(&str, &str)> = rows
            .iter()
            .filter_map(|e| {
                Some((e.get("name")?.as_str()?, e.get("institution")?.as_str()?))
            })
            .collect();
        assert_eq!(
            names,
            vec![
                ("Name5", "Institut5"),
                ("Name5_", "Institut5"),
                ("Name2", "Institut2"),
                ("Name4", "Institut4"),
            ]
        );
    }

    #[test]
    fn test_natural_join_disjoint_schemas() {
        let left = vec![Entry::from([("a", 1)])];
        let right = vec![Entry::from([("b", 2)])];
        assert!(natural_join(&left, &right).is_empty());
    }

    #[test]
    fn test_natural_join_connector_projects_after_join() {
        let connector = NaturalJoinConnector::new(
            Arc::new(EntriesConnector::new(researchers())),
            Arc::new(EntriesConnector::new(institutions())),
        );
        let rows = connector
            .query_entries(&Query::new().with_attributes(["name", "institution"]))
            .unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|e| e.len() == 2));
    }
}
