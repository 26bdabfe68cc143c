use core::cmp::Ordering;

use crate::{CellValue, ColumnId, RowRecord, SortDirection};

/// One entry of the sort model, in tie-break priority order.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SortKey {
    pub column: ColumnId,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<ColumnId>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(column: impl Into<ColumnId>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }
}

/// Ordered list of sort keys. Keys referencing unknown columns are dropped
/// during resolution, before this comparator ever sees them.
pub type SortModel = Vec<SortKey>;

/// Compares two cell values under one sort direction.
///
/// Missing values (absent field, `Null`, NaN) rank last regardless of
/// direction, so reversing the direction reverses order only modulo them.
pub(crate) fn compare_values(a: &CellValue, b: &CellValue, direction: SortDirection) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }
    let ord = a.compare(b);
    match direction {
        SortDirection::Ascending => ord,
        SortDirection::Descending => ord.reverse(),
    }
}

/// Multi-key comparator over resolved `(field, direction)` pairs. Ties fall
/// through to the next key; a full tie is `Equal` and the caller's stable
/// sort preserves the original order.
pub(crate) fn compare_records(
    a: &RowRecord,
    b: &RowRecord,
    keys: &[(String, SortDirection)],
) -> Ordering {
    for (field, direction) in keys {
        let va = a.value_of(field);
        let vb = b.value_of(field);
        let ord = compare_values(&va, &vb, *direction);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}
