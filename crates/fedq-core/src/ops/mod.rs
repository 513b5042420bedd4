//! Relational operators.
//!
//! Each operator comes in two forms: a function over entry lists, and a
//! connector that wraps a child connector and applies the function to its
//! results.

mod count;
mod filter;
mod for_each;
mod group_by;
mod join;
mod lambdas;
mod limit;
mod rename;
mod select;
mod sort;
mod union;
mod unique;
mod unnest;

pub use count::CountConnector;
pub use filter::{filter_entries, search, KeepIf, MatchMode, SearchFilter, WhereConnector};
pub use for_each::{for_each_sub_entry, ForEachConnector, ForEachFilter, ValueMap, ValueTest};
pub use group_by::{group_by, GroupByConnector};
pub use join::{
    are_naturally_joined, full_outer_join_if, inner_join_if, join_if, left_join_if, natural_join,
    right_join_if, JoinIfConnector, JoinMode, JoinPredicate, NaturalJoinConnector,
};
pub use lambdas::{
    find_dependencies, float_attr, int_attr, InputKind, Lambda, LambdaError, LambdaFn,
    LambdasConnector,
};
pub use limit::{limit, LimitConnector};
pub use rename::{rename_entries, rename_entry, rename_query, RenameConnector};
pub use select::{select, SelectConnector};
pub use sort::{sort_by, sort_entries, SortByConnector};
pub use union::{union, UnionConnector};
pub use unique::{distinct_values, unique, UniqueConnector};
pub use unnest::{unnest, UnnestConnector};
