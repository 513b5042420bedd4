//! Query description sent down a connector tree.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::predicate::{write_attribute, Predicate};

/// What a query asks a connector to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Action {
    Create,
    #[default]
    Read,
    Update,
    Delete,
}

impl Action {
    /// Keyword used in the canonical rendering.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Action::Create => "INSERT",
            Action::Read => "SELECT",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderDirection {
    /// Ascending order.
    Asc,
    /// Descending order.
    Desc,
}

/// Order specification for sorting results.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Field to order by.
    pub field: String,
    /// Sort direction.
    pub direction: OrderDirection,
}

impl OrderSpec {
    /// Create an ascending order spec.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    /// Create a descending order spec.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }
}

/// A declarative request: action, object, projection, filter, paging and
/// ordering.
///
/// An empty `attributes` list selects every attribute the connector knows for
/// `object`. Cloning is a deep copy, so operators rewrite a clone rather than
/// the caller's query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    pub action: Action,
    pub object: String,
    pub attributes: Vec<String>,
    pub filters: Option<Predicate>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub sort_by: Vec<OrderSpec>,
}

impl Query {
    /// A READ query on the default object.
    pub fn new() -> Self {
        Self::default()
    }

    /// A READ query on `object`.
    pub fn read(object: impl Into<String>) -> Self {
        Self::new().with_object(object)
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = action;
        self
    }

    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = object.into();
        self
    }

    /// Set the projected attributes, dropping duplicates but keeping the
    /// first-seen order.
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.clear();
        for attribute in attributes {
            let attribute = attribute.into();
            if !self.attributes.contains(&attribute) {
                self.attributes.push(attribute);
            }
        }
        self
    }

    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filters = Some(filter);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Add an ordering; ordering twice on the same field replaces its
    /// direction in place.
    pub fn with_order(mut self, order: OrderSpec) -> Self {
        match self.sort_by.iter_mut().find(|o| o.field == order.field) {
            Some(existing) => existing.direction = order.direction,
            None => self.sort_by.push(order),
        }
        self
    }

    /// Whether the query leaves the projection to the connector.
    pub fn selects_all(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn attribute_set(&self) -> BTreeSet<String> {
        self.attributes.iter().cloned().collect()
    }

    /// Deterministic rendering used as cache key.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

/// Canonical rendering: attributes are sorted, so two queries that differ only
/// in attribute order render the same.
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action.as_sql())?;

        let attributes = self.attribute_set();
        if attributes.is_empty() {
            f.write_str(" *")?;
        } else {
            for (i, attribute) in attributes.iter().enumerate() {
                f.write_str(if i == 0 { " " } else { ", " })?;
                write_attribute(f, attribute)?;
            }
        }

        if !self.object.is_empty() {
            f.write_str(" FROM ")?;
            write_attribute(f, &self.object)?;
        }
        if let Some(filters) = &self.filters {
            write!(f, " WHERE {}", filters)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        for (i, order) in self.sort_by.iter().enumerate() {
            f.write_str(if i == 0 { " SORT BY " } else { ", " })?;
            write_attribute(f, &order.field)?;
            f.write_str(match order.direction {
                OrderDirection::Asc => " ASC",
                OrderDirection::Desc => " DESC",
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = Query::read("User")
            .with_attributes(["id", "name", "id"])
            .with_filter(Predicate::eq("status", "active"))
            .with_order(OrderSpec::asc("name"))
            .with_limit(10);

        assert_eq!(query.action, Action::Read);
        assert_eq!(query.object, "User");
        assert_eq!(query.attributes, vec!["id", "name"]);
        assert!(query.filters.is_some());
        assert_eq!(query.sort_by.len(), 1);
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn test_order_replaces_direction() {
        let query = Query::new()
            .with_order(OrderSpec::asc("a"))
            .with_order(OrderSpec::asc("b"))
            .with_order(OrderSpec::desc("a"));
        assert_eq!(query.sort_by, vec![OrderSpec::desc("a"), OrderSpec::asc("b")]);
    }

    #[test]
    fn test_canonical_rendering() {
        let query = Query::read("people")
            .with_attributes(["c", "a"])
            .with_filter(Predicate::le("a", 100).and(Predicate::gt("b", 20)))
            .with_offset(5)
            .with_limit(0)
            .with_order(OrderSpec::desc("a"));

        assert_eq!(
            query.canonical(),
            "SELECT a, c FROM people WHERE (a <= 100) && (b > 20) LIMIT 0 OFFSET 5 SORT BY a DESC"
        );
        assert_eq!(Query::new().canonical(), "SELECT *");
        assert_eq!(
            Query::new().with_action(Action::Create).canonical(),
            "INSERT *"
        );
    }

    #[test]
    fn test_canonical_ignores_attribute_order() {
        let q1 = Query::new().with_attributes(["b", "a"]);
        let q2 = Query::new().with_attributes(["a", "b"]);
        assert_eq!(q1.canonical(), q2.canonical());
    }

    #[test]
    fn test_canonical_distinguishes_odd_attribute_names() {
        let q1 = Query::new().with_attributes(["a, b"]);
        let q2 = Query::new().with_attributes(["a", "b"]);
        assert_ne!(q1.canonical(), q2.canonical());
    }

    #[test]
    fn test_canonical_quotes_object() {
        let tricky = Query::read("t LIMIT 5");
        let limited = Query::read("t").with_limit(5);
        assert_eq!(tricky.canonical(), "SELECT * FROM `t LIMIT 5`");
        assert_ne!(tricky.canonical(), limited.canonical());
    }

    #[test]
    fn test_clone_is_deep() {
        let q1 = Query::new().with_filter(Predicate::eq("a", 1));
        let mut q2 = q1.clone();
        if let Some(f) = q2.filters.as_mut() {
            f.rename_attributes(&[("a".to_string(), "b".to_string())].into_iter().collect());
        }
        assert_eq!(q1.filters, Some(Predicate::eq("a", 1)));
        assert_eq!(q2.filters, Some(Predicate::eq("b", 1)));
    }
}
