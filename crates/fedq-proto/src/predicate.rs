//! Filter predicates evaluated against entries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entry::Entry;
use crate::value::Value;

/// Binary predicate operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// Logical conjunction.
    And,
    /// Logical disjunction.
    Or,
    /// Logical exclusive or.
    Xor,
    /// Left operand is a member of the right operand.
    In,
    /// Left operand contains the right operand.
    Contains,
}

impl Operator {
    /// Symbol used by the canonical predicate grammar.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Xor => "^",
            Operator::In => "IN",
            Operator::Contains => "CONTAINS",
        }
    }

    /// Whether both operands are boolean-producing predicates.
    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::And | Operator::Or | Operator::Xor)
    }

    /// Apply the operator to two resolved operand values.
    pub fn apply(&self, left: &Value, right: &Value) -> bool {
        use std::cmp::Ordering::*;

        match self {
            Operator::Eq => left.loose_eq(right),
            Operator::Ne => !left.loose_eq(right),
            Operator::Lt => left.partial_compare(right) == Some(Less),
            Operator::Le => matches!(left.partial_compare(right), Some(Less | Equal)),
            Operator::Gt => left.partial_compare(right) == Some(Greater),
            Operator::Ge => matches!(left.partial_compare(right), Some(Greater | Equal)),
            Operator::And => left.is_truthy() && right.is_truthy(),
            Operator::Or => left.is_truthy() || right.is_truthy(),
            Operator::Xor => left.is_truthy() != right.is_truthy(),
            Operator::In => right.contains(left),
            Operator::Contains => left.contains(right),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One side of a binary predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Value of an entry attribute.
    Attribute(String),
    /// Constant value.
    Literal(Value),
    /// Nested predicate, evaluating to a boolean.
    Predicate(Box<Predicate>),
}

impl Operand {
    pub fn attr(name: impl Into<String>) -> Self {
        Operand::Attribute(name.into())
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Operand::Literal(value.into())
    }

    /// Resolve the operand against an entry; `None` if it names an absent
    /// attribute.
    fn resolve(&self, entry: &Entry) -> Option<Value> {
        match self {
            Operand::Attribute(name) => entry.get(name).cloned(),
            Operand::Literal(value) => Some(value.clone()),
            Operand::Predicate(p) => Some(Value::Bool(p.matches(entry))),
        }
    }

    fn collect_attributes(&self, out: &mut BTreeSet<String>) {
        match self {
            Operand::Attribute(name) => {
                out.insert(name.clone());
            }
            Operand::Literal(_) => {}
            Operand::Predicate(p) => p.collect_attributes(out),
        }
    }

    fn rename(&mut self, mapping: &BTreeMap<String, String>) {
        match self {
            Operand::Attribute(name) => {
                if let Some(renamed) = mapping.get(name) {
                    *name = renamed.clone();
                }
            }
            Operand::Literal(_) => {}
            Operand::Predicate(p) => p.rename_attributes(mapping),
        }
    }
}

impl From<Predicate> for Operand {
    fn from(p: Predicate) -> Self {
        Operand::Predicate(Box::new(p))
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Attribute(name) => write_attribute(f, name),
            Operand::Literal(value) => write!(f, "{}", value),
            Operand::Predicate(p) => write!(f, "({})", p),
        }
    }
}

/// A boolean expression tree evaluated against an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Truthiness of a single attribute.
    Leaf(String),
    /// `left operator right`.
    Binary {
        left: Operand,
        operator: Operator,
        right: Operand,
    },
}

impl Predicate {
    /// Leaf predicate on an attribute.
    pub fn attribute(name: impl Into<String>) -> Self {
        Predicate::Leaf(name.into())
    }

    pub fn binary(left: Operand, operator: Operator, right: Operand) -> Self {
        Predicate::Binary {
            left,
            operator,
            right,
        }
    }

    /// `attribute <op> literal`.
    pub fn compare(attribute: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self::binary(Operand::attr(attribute), operator, Operand::lit(value))
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Operator::Eq, value)
    }

    pub fn ne(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Operator::Ne, value)
    }

    pub fn lt(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Operator::Lt, value)
    }

    pub fn le(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Operator::Le, value)
    }

    pub fn gt(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Operator::Gt, value)
    }

    pub fn ge(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Operator::Ge, value)
    }

    /// `attribute IN values`.
    pub fn is_in(attribute: impl Into<String>, values: impl Into<Value>) -> Self {
        Self::compare(attribute, Operator::In, values)
    }

    /// `attribute CONTAINS value`.
    pub fn contains(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(attribute, Operator::Contains, value)
    }

    pub fn and(self, other: Predicate) -> Self {
        Self::binary(self.into(), Operator::And, other.into())
    }

    pub fn or(self, other: Predicate) -> Self {
        Self::binary(self.into(), Operator::Or, other.into())
    }

    pub fn xor(self, other: Predicate) -> Self {
        Self::binary(self.into(), Operator::Xor, other.into())
    }

    /// Evaluate the predicate against an entry.
    ///
    /// Absent attributes make the predicate false, except for an equality
    /// against a literal null: an absent attribute is treated as null there.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Predicate::Leaf(name) => entry.get(name).map(Value::is_truthy).unwrap_or(false),
            Predicate::Binary {
                left,
                operator,
                right,
            } => match (left.resolve(entry), right.resolve(entry)) {
                (Some(l), Some(r)) => operator.apply(&l, &r),
                (None, Some(other)) | (Some(other), None) => {
                    *operator == Operator::Eq && other.is_null() && is_null_literal(left, right)
                }
                (None, None) => false,
            },
        }
    }

    /// Every attribute name the predicate reads.
    pub fn attributes(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_attributes(&mut out);
        out
    }

    /// Rewrite attribute references in place; unmapped names are kept.
    pub fn rename_attributes(&mut self, mapping: &BTreeMap<String, String>) {
        match self {
            Predicate::Leaf(name) => {
                if let Some(renamed) = mapping.get(name) {
                    *name = renamed.clone();
                }
            }
            Predicate::Binary { left, right, .. } => {
                left.rename(mapping);
                right.rename(mapping);
            }
        }
    }

    /// Copy of the predicate with attribute references rewritten.
    pub fn renamed(&self, mapping: &BTreeMap<String, String>) -> Predicate {
        let mut p = self.clone();
        p.rename_attributes(mapping);
        p
    }

    fn collect_attributes(&self, out: &mut BTreeSet<String>) {
        match self {
            Predicate::Leaf(name) => {
                out.insert(name.clone());
            }
            Predicate::Binary { left, right, .. } => {
                left.collect_attributes(out);
                right.collect_attributes(out);
            }
        }
    }
}

// The present side is null and came from a literal, not a null-valued attribute
// on the other side of an absent one.
fn is_null_literal(left: &Operand, right: &Operand) -> bool {
    matches!(left, Operand::Literal(Value::Null)) || matches!(right, Operand::Literal(Value::Null))
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Leaf(name) => write_attribute(f, name),
            Predicate::Binary {
                left,
                operator,
                right,
            } => write!(f, "{} {} {}", left, operator, right),
        }
    }
}

const KEYWORDS: &[&str] = &["AND", "OR", "XOR", "IN", "CONTAINS", "TRUE", "FALSE", "NULL"];

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | ':' | '$' | '@')
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if is_ident_start(c) => chars.all(is_ident_char) && !is_keyword(name),
        _ => false,
    }
}

/// Render an attribute name, quoting it with backticks when it is not a
/// plain identifier.
pub(crate) fn write_attribute(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_plain_identifier(name) {
        f.write_str(name)
    } else {
        write!(f, "`{}`", name.replace('`', "``"))
    }
}
