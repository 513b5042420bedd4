//! Derived attributes.
//!
//! A [`LambdasConnector`] adds attributes computed from other attributes of
//! the same entry. Each derived attribute knows which attributes it reads,
//! either declared up front or discovered by probing: the function is run on a
//! scratch entry, and every attribute it reports missing is added as null until
//! it stops asking for more. A typed accessor that finds such a null gets a
//! placeholder of the type it asked for, so later reads are still reached.
//!
//! Probing only sees the attributes read on the path taken with null inputs.
//! Functions that branch on their inputs should declare their dependencies.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use fedq_proto::{Entry, MissingKey, Query, Value};
use thiserror::Error;
use tracing::{debug, trace};

use crate::connector::{Connector, QueryResult, SharedConnector};
use crate::error::Error;

/// Upper bound on probing rounds for a single function.
const MAX_PROBES: usize = 1024;

/// Failure of a derived attribute function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LambdaError {
    /// The function read an absent attribute. The derived value becomes null.
    #[error(transparent)]
    MissingKey(#[from] MissingKey),

    /// A typed accessor found a null. The derived value becomes null.
    #[error("{key} is null, expected {kind}")]
    NullInput { key: String, kind: InputKind },

    /// Any other failure. Fails the query.
    #[error("{0}")]
    Failed(String),
}

/// Type requested by a typed accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Int,
    Float,
}

impl InputKind {
    fn placeholder(self) -> Value {
        match self {
            InputKind::Int => Value::Int(1),
            InputKind::Float => Value::Float(1.0),
        }
    }
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputKind::Int => f.write_str("int"),
            InputKind::Float => f.write_str("number"),
        }
    }
}

impl LambdaError {
    pub fn failed(message: impl Into<String>) -> Self {
        LambdaError::Failed(message.into())
    }
}

/// Read an integer attribute.
pub fn int_attr(entry: &Entry, key: &str) -> Result<i64, LambdaError> {
    let value = non_null(entry, key, InputKind::Int)?;
    value
        .as_i64()
        .ok_or_else(|| LambdaError::Failed(format!("{} is {}, not an int", key, value.type_name())))
}

/// Read a numeric attribute as f64.
pub fn float_attr(entry: &Entry, key: &str) -> Result<f64, LambdaError> {
    let value = non_null(entry, key, InputKind::Float)?;
    value
        .as_f64()
        .ok_or_else(|| LambdaError::Failed(format!("{} is {}, not a number", key, value.type_name())))
}

fn non_null<'a>(entry: &'a Entry, key: &str, kind: InputKind) -> Result<&'a Value, LambdaError> {
    match entry.try_get(key)? {
        Value::Null => Err(LambdaError::NullInput {
            key: key.to_string(),
            kind,
        }),
        value => Ok(value),
    }
}

pub type LambdaFn = Arc<dyn Fn(&Entry) -> Result<Value, LambdaError> + Send + Sync>;

/// A derived attribute: its function and, optionally, declared dependencies.
#[derive(Clone)]
pub struct Lambda {
    func: LambdaFn,
    dependencies: Option<BTreeSet<String>>,
}

impl Lambda {
    /// Dependencies will be discovered by probing.
    pub fn new(func: impl Fn(&Entry) -> Result<Value, LambdaError> + Send + Sync + 'static) -> Self {
        Self {
            func: Arc::new(func),
            dependencies: None,
        }
    }

    /// Dependencies are given explicitly; no probing takes place.
    pub fn with_dependencies<I, S>(
        func: impl Fn(&Entry) -> Result<Value, LambdaError> + Send + Sync + 'static,
        dependencies: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            func: Arc::new(func),
            dependencies: Some(dependencies.into_iter().map(Into::into).collect()),
        }
    }

    pub fn call(&self, entry: &Entry) -> Result<Value, LambdaError> {
        (self.func)(entry)
    }
}

/// Discover the attributes `func` reads by running it on a scratch entry.
///
/// Probing stops when the function succeeds or fails for a reason other than
/// a missing attribute or a null input.
pub fn find_dependencies(attribute: &str, lambda: &Lambda) -> Result<BTreeSet<String>, Error> {
    let mut scratch = Entry::new();
    for _ in 0..MAX_PROBES {
        match lambda.call(&scratch) {
            Err(LambdaError::MissingKey(MissingKey(key))) => {
                if scratch.contains_key(&key) {
                    return Err(Error::DependencyCycle(vec![attribute.to_string(), key]));
                }
                scratch.insert(key, Value::Null);
            }
            Err(LambdaError::NullInput { key, kind }) => {
                let placeholder = kind.placeholder();
                if scratch.get(&key) == Some(&placeholder) {
                    return Ok(scratch.key_set());
                }
                scratch.insert(key, placeholder);
            }
            Ok(_) | Err(LambdaError::Failed(_)) => return Ok(scratch.key_set()),
        }
    }
    Err(Error::DependencyCycle(vec![attribute.to_string()]))
}

/// Order derived attributes so that each comes after the derived attributes
/// it reads. Self-reads refer to the child's value and are not edges.
fn evaluation_order(dependencies: &BTreeMap<String, BTreeSet<String>>) -> Result<Vec<String>, Error> {
    let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (attribute, deps) in dependencies {
        let inner: Vec<&str> = deps
            .iter()
            .map(String::as_str)
            .filter(|d| *d != attribute.as_str() && dependencies.contains_key(*d))
            .collect();
        pending.insert(attribute, inner.len());
        for dep in inner {
            dependents.entry(dep).or_default().push(attribute);
        }
    }

    let mut ready: VecDeque<&str> = pending
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(a, _)| *a)
        .collect();
    let mut order = Vec::with_capacity(dependencies.len());

    while let Some(attribute) = ready.pop_front() {
        order.push(attribute.to_string());
        for dependent in dependents.get(attribute).into_iter().flatten() {
            if let Some(n) = pending.get_mut(dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.push_back(dependent);
                }
            }
        }
    }

    if order.len() < dependencies.len() {
        let cycle = pending
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(a, _)| a.to_string())
            .collect();
        return Err(Error::DependencyCycle(cycle));
    }
    Ok(order)
}

/// Adds derived attributes to its child's entries.
pub struct LambdasConnector {
    child: SharedConnector,
    lambdas: BTreeMap<String, Lambda>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    order: Vec<String>,
}

impl LambdasConnector {
    /// Build the connector, probing undeclared dependencies.
    ///
    /// Fails with `DependencyCycle` if derived attributes depend on each
    /// other in a cycle.
    pub fn new<I, K>(child: SharedConnector, lambdas: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (K, Lambda)>,
        K: Into<String>,
    {
        let lambdas: BTreeMap<String, Lambda> =
            lambdas.into_iter().map(|(k, l)| (k.into(), l)).collect();

        let mut dependencies = BTreeMap::new();
        for (attribute, lambda) in &lambdas {
            let deps = match &lambda.dependencies {
                Some(declared) => declared.clone(),
                None => find_dependencies(attribute, lambda)?,
            };
            trace!(attribute = %attribute, dependencies = ?deps, "Derived attribute dependencies");
            dependencies.insert(attribute.clone(), deps);
        }
        let order = evaluation_order(&dependencies)?;

        Ok(Self {
            child,
            lambdas,
            dependencies,
            order,
        })
    }

    pub fn dependencies(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.dependencies
    }

    /// Transitive closure of `attributes` over the dependency map. The input
    /// attributes are part of the result.
    pub fn needed_attributes<'a>(&self, attributes: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
        let mut needed = BTreeSet::new();
        let mut stack: Vec<String> = attributes.into_iter().cloned().collect();
        while let Some(attribute) = stack.pop() {
            if !needed.insert(attribute.clone()) {
                continue;
            }
            if let Some(deps) = self.dependencies.get(&attribute) {
                stack.extend(deps.iter().filter(|d| !needed.contains(*d)).cloned());
            }
        }
        needed
    }

    /// Compute the derived attributes listed in `selected` (all when `None`)
    /// on every entry, in dependency order.
    pub fn apply(&self, entries: Vec<Entry>, selected: Option<&BTreeSet<String>>) -> Result<Vec<Entry>, Error> {
        let order: Vec<(&String, &Lambda)> = self
            .order
            .iter()
            .filter(|a| selected.map_or(true, |s| s.contains(*a)))
            .filter_map(|a| self.lambdas.get(a).map(|l| (a, l)))
            .collect();

        entries
            .into_iter()
            .map(|mut entry| {
                for (attribute, lambda) in &order {
                    let value = match lambda.call(&entry) {
                        Ok(value) => value,
                        Err(LambdaError::MissingKey(_) | LambdaError::NullInput { .. }) => Value::Null,
                        Err(LambdaError::Failed(message)) => {
                            return Err(Error::Lambda {
                                attribute: attribute.to_string(),
                                message,
                            })
                        }
                    };
                    entry.insert(attribute.as_str(), value);
                }
                Ok(entry)
            })
            .collect()
    }
}

impl Connector for LambdasConnector {
    fn name(&self) -> &str {
        "lambdas"
    }

    fn query(&self, query: &Query) -> Result<QueryResult, Error> {
        let filter_attributes = query
            .filters
            .as_ref()
            .map(|p| p.attributes())
            .unwrap_or_default();
        let local_filter = filter_attributes
            .iter()
            .any(|a| self.lambdas.contains_key(a));

        let mut child_query = query.clone();
        let selected = if query.selects_all() {
            None
        } else {
            let needed = self.needed_attributes(query.attributes.iter().chain(&filter_attributes));
            let child_attributes = self.child.attributes(&query.object);
            child_query.attributes = needed
                .iter()
                .filter(|a| match self.dependencies.get(*a) {
                    Some(deps) => child_attributes.contains(*a) || deps.contains(*a),
                    None => true,
                })
                .cloned()
                .collect();
            Some(needed)
        };
        if local_filter {
            child_query.filters = None;
            child_query.offset = None;
            child_query.limit = None;
        }
        debug!(
            connector = self.name(),
            query = %query,
            child_query = %child_query,
            local_filter,
            "Handling query"
        );

        let entries = self.child.query_entries(&child_query)?;
        let entries = self.apply(entries, selected.as_ref())?;

        let entries = if local_filter {
            self.reshape(query, entries)
        } else {
            let projection = Query {
                attributes: query.attributes.clone(),
                ..Query::default()
            };
            self.reshape(&projection, entries)
        };
        Ok(QueryResult::Entries(entries))
    }

    fn attributes(&self, object: &str) -> BTreeSet<String> {
        let mut attributes = self.child.attributes(object);
        attributes.extend(self.lambdas.keys().cloned());
        attributes
    }
}
