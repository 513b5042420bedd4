//! Hashable, totally ordered keys built from values.
//!
//! Values can hold floats, lists and nested entries, none of which are usable
//! as map keys directly. [`GroupKey`] normalizes them recursively: lists become
//! tuples, entries become sorted `(key, value)` tuples and floats are compared
//! by bit pattern after normalization.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::entry::Entry;
use crate::value::Value;

/// A float usable in `Eq`/`Hash`/`Ord` contexts.
///
/// Integral floats are folded into [`GroupKey::Int`] before reaching this
/// type, and `-0.0` is normalized to `0.0`, so numerically equal values hash
/// equally.
#[derive(Debug, Clone, Copy)]
pub struct FloatKey(f64);

impl FloatKey {
    fn new(f: f64) -> Self {
        FloatKey(if f == 0.0 { 0.0 } else { f })
    }

    pub fn get(&self) -> f64 {
        self.0
    }
}

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatKey {}

impl Hash for FloatKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Canonical, hashable form of a value (or tuple of values).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(FloatKey),
    Str(String),
    Tuple(Vec<GroupKey>),
    Map(Vec<(String, GroupKey)>),
}

impl GroupKey {
    /// Normalize a single value.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => GroupKey::Null,
            Value::Bool(b) => GroupKey::Bool(*b),
            Value::Int(i) => GroupKey::Int(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    GroupKey::Int(*f as i64)
                } else {
                    GroupKey::Float(FloatKey::new(*f))
                }
            }
            Value::String(s) => GroupKey::Str(s.clone()),
            Value::List(items) => GroupKey::Tuple(items.iter().map(GroupKey::from_value).collect()),
            Value::Map(entry) => GroupKey::Map(
                entry
                    .iter()
                    .map(|(k, v)| (k.clone(), GroupKey::from_value(v)))
                    .collect(),
            ),
        }
    }

    /// Key of `entry` over `attributes`. Absent attributes count as null, and
    /// a single attribute collapses to a scalar key.
    pub fn for_entry<S: AsRef<str>>(entry: &Entry, attributes: &[S]) -> Self {
        let mut parts: Vec<GroupKey> = attributes
            .iter()
            .map(|a| {
                entry
                    .get(a.as_ref())
                    .map(GroupKey::from_value)
                    .unwrap_or(GroupKey::Null)
            })
            .collect();
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            GroupKey::Tuple(parts)
        }
    }

    /// Convert back to a value (tuples become lists, maps become entries).
    pub fn to_value(&self) -> Value {
        match self {
            GroupKey::Null => Value::Null,
            GroupKey::Bool(b) => Value::Bool(*b),
            GroupKey::Int(i) => Value::Int(*i),
            GroupKey::Float(f) => Value::Float(f.get()),
            GroupKey::Str(s) => Value::String(s.clone()),
            GroupKey::Tuple(items) => Value::List(items.iter().map(GroupKey::to_value).collect()),
            GroupKey::Map(pairs) => Value::Map(
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
        }
    }
}

impl From<&Value> for GroupKey {
    fn from(value: &Value) -> Self {
        GroupKey::from_value(value)
    }
}
