//! fedq data model.
//!
//! This crate defines the types that flow through a fedq connector tree.
//!
//! # Modules
//!
//! - [`value`] - Loosely-typed attribute values
//! - [`entry`] - Entries (records) mapping attribute names to values
//! - [`query`] - Queries: action, object, projection, filter, paging, ordering
//! - [`predicate`] - Filter predicates and their evaluation
//! - [`key`] - Hashable normalization of values for grouping and dedup
//! - [`error`] - Data-model error types
//!
//! # Predicate grammar
//!
//! Predicates render to, and parse from, a small textual grammar that is
//! also part of the canonical query string:
//!
//! ```
//! use fedq_proto::Predicate;
//!
//! let p = Predicate::le("a", 100).and(Predicate::gt("b", 20));
//! assert_eq!(p.to_string(), "(a <= 100) && (b > 20)");
//! assert_eq!("a <= 100 AND b > 20".parse::<Predicate>().unwrap(), p);
//! ```

pub mod entry;
pub mod error;
pub mod key;
mod parse;
pub mod predicate;
pub mod query;
pub mod value;

pub use entry::{Entry, MissingKey};
pub use error::Error;
pub use key::GroupKey;
pub use predicate::{Operand, Operator, Predicate};
pub use query::{Action, OrderDirection, OrderSpec, Query};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_with_parsed_filter() {
        let filter: Predicate = "a <= 100 && b > 20".parse().unwrap();
        let query = Query::read("rows")
            .with_attributes(["a", "c", "d"])
            .with_filter(filter);

        let rendered = query.canonical();
        assert_eq!(
            rendered,
            "SELECT a, c, d FROM rows WHERE (a <= 100) && (b > 20)"
        );
    }

    #[test]
    fn test_query_serde_roundtrip() {
        let query = Query::read("rows")
            .with_attributes(["a"])
            .with_filter(Predicate::eq("a", Value::Null))
            .with_order(OrderSpec::desc("a"))
            .with_limit(3);

        let json = serde_json::to_string(&query).unwrap();
        let back: Query = serde_json::from_str(&json).unwrap();
        assert_eq!(back, query);
        assert_eq!(back.canonical(), query.canonical());
    }
}
