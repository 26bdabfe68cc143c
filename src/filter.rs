use std::collections::BTreeMap;

use crate::{CellValue, ColumnId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
    Equals,
    NotEqual,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompareOp {
    Equals,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl CompareOp {
    fn eval(self, ord: core::cmp::Ordering) -> bool {
        use core::cmp::Ordering::*;
        match self {
            Self::Equals => ord == Equal,
            Self::NotEqual => ord != Equal,
            Self::GreaterThan => ord == Greater,
            Self::GreaterThanOrEqual => ord != Less,
            Self::LessThan => ord == Less,
            Self::LessThanOrEqual => ord != Greater,
        }
    }
}

/// One column's filter. Multiple active filters combine with AND.
///
/// Type mismatches (e.g. a text cell against a numeric filter) filter the
/// row out rather than erroring. A malformed range (`low > high`) is treated
/// as always-pass.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterPredicate {
    Text { op: TextOp, value: String },
    Number { op: CompareOp, value: f64 },
    NumberInRange { low: f64, high: f64 },
    Timestamp { op: CompareOp, value: i64 },
    TimestampInRange { low: i64, high: i64 },
    /// Value's display form must be in the set. An empty set filters nothing.
    InSet(Vec<String>),
    Bool(bool),
}

impl FilterPredicate {
    pub fn matches(&self, cell: &CellValue) -> bool {
        match self {
            Self::Text { op, value } => {
                let hay = cell.display().to_lowercase();
                let needle = value.to_lowercase();
                match op {
                    TextOp::Contains => hay.contains(&needle),
                    TextOp::StartsWith => hay.starts_with(&needle),
                    TextOp::EndsWith => hay.ends_with(&needle),
                    TextOp::Equals => hay == needle,
                    TextOp::NotEqual => hay != needle,
                }
            }
            Self::Number { op, value } => match cell.as_number() {
                Some(n) => op.eval(n.partial_cmp(value).unwrap_or(core::cmp::Ordering::Less)),
                None => false,
            },
            Self::NumberInRange { low, high } => {
                if low > high {
                    return true;
                }
                match cell.as_number() {
                    Some(n) => n >= *low && n <= *high,
                    None => false,
                }
            }
            Self::Timestamp { op, value } => match cell.as_timestamp() {
                Some(t) => op.eval(t.cmp(value)),
                None => false,
            },
            Self::TimestampInRange { low, high } => {
                if low > high {
                    return true;
                }
                match cell.as_timestamp() {
                    Some(t) => t >= *low && t <= *high,
                    None => false,
                }
            }
            Self::InSet(allowed) => {
                if allowed.is_empty() {
                    return true;
                }
                let s = cell.display();
                allowed.iter().any(|a| a == &s)
            }
            Self::Bool(expected) => match cell.as_bool() {
                Some(b) => b == *expected,
                None => false,
            },
        }
    }
}

/// Active filters, one predicate per column, AND-combined.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterModel {
    entries: BTreeMap<ColumnId, FilterPredicate>,
}

impl FilterModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<ColumnId>, predicate: FilterPredicate) -> Self {
        self.entries.insert(column.into(), predicate);
        self
    }

    pub fn set(&mut self, column: impl Into<ColumnId>, predicate: FilterPredicate) {
        self.entries.insert(column.into(), predicate);
    }

    pub fn remove(&mut self, column: &str) -> Option<FilterPredicate> {
        self.entries.remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&FilterPredicate> {
        self.entries.get(column)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnId, &FilterPredicate)> {
        self.entries.iter()
    }
}
