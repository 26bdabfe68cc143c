use core::cmp::Ordering;

/// A single cell value.
///
/// Records are untyped at the API boundary; the pipeline compares, filters and
/// aggregates values based on the variant actually present in each cell.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellValue {
    Null,
    Number(f64),
    /// Milliseconds since the Unix epoch. Date filters operate on this variant.
    Timestamp(i64),
    Text(String),
    Bool(bool),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Treats NaN like a missing value: it must rank last, same as `Null`.
    pub(crate) fn is_missing(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Default display form, used for painting, group keys and set filters.
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Self::Timestamp(t) => format!("{t}"),
            Self::Text(s) => s.clone(),
            Self::Bool(b) => format!("{b}"),
        }
    }

    /// Rank used when comparing values of different variants.
    fn class_rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Timestamp(_) => 1,
            Self::Text(_) => 2,
            Self::Bool(_) => 3,
            Self::Null => 4,
        }
    }

    /// Total ordering for sorting. Missing values (`Null`, NaN) rank last;
    /// text compares case-insensitively; mixed variants order by class.
    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => {
                let a = a.to_lowercase();
                let b = b.to_lowercase();
                a.cmp(&b)
            }
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (a, b) => a.class_rank().cmp(&b.class_rank()),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Stable identity of a displayable row.
///
/// Record identities come from the host (extractor callback or the default
/// `"id"` field), falling back to the record's position. Group and detail
/// identities are synthesized by the pipeline and are deterministic for a
/// given grouping configuration, so expansion state survives reruns.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RowId {
    Int(i64),
    Text(String),
    /// Positional fallback when no identity can be derived from the record.
    Index(usize),
    /// Synthetic group node, keyed by the full group path.
    Group(String),
    /// Synthetic detail node inserted after an expanded master row.
    Detail(Box<RowId>),
}

impl RowId {
    /// Derives an identity from a cell value, if the value is usable as a key.
    pub fn from_cell(value: &CellValue) -> Option<RowId> {
        match value {
            CellValue::Number(n) if n.is_finite() && n.fract() == 0.0 => {
                Some(RowId::Int(*n as i64))
            }
            CellValue::Number(n) if n.is_finite() => Some(RowId::Text(format!("{n}"))),
            CellValue::Text(s) => Some(RowId::Text(s.clone())),
            CellValue::Timestamp(t) => Some(RowId::Int(*t)),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Which band a column is pinned to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PinSide {
    #[default]
    None,
    Left,
    Right,
}

/// Half-open range of display indexes eligible for painting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize, // exclusive
}

impl VisibleRange {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Signals the core raises towards the host. The host owns the actual
/// editing surface; the core only reports the intent.
#[derive(Clone, Debug, PartialEq)]
pub enum GridEvent {
    EditRequested { row: usize, column: String },
}
