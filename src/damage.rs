use std::collections::BTreeSet;

use crate::{ColumnId, VisibleRange};

/// Tracks which rows/columns/cells went stale since the last paint.
///
/// The `full` flag is mutually exclusive with the finer-grained sets:
/// raising it clears them, and while it is raised finer marks are absorbed.
#[derive(Debug, Default)]
pub struct DamageTracker {
    full: bool,
    rows: BTreeSet<usize>,
    columns: BTreeSet<ColumnId>,
    cells: BTreeSet<(usize, ColumnId)>,
}

/// Drained damage state consumed by one paint pass.
#[derive(Clone, Debug, Default)]
pub struct DamageSnapshot {
    pub full: bool,
    pub rows: BTreeSet<usize>,
    pub columns: BTreeSet<ColumnId>,
    pub cells: BTreeSet<(usize, ColumnId)>,
}

impl DamageSnapshot {
    pub fn is_clean(&self) -> bool {
        !self.full && self.rows.is_empty() && self.columns.is_empty() && self.cells.is_empty()
    }

    /// Display indexes of rows needing repaint, including rows reached via
    /// cell-level damage.
    pub fn dirty_rows(&self) -> BTreeSet<usize> {
        let mut rows = self.rows.clone();
        rows.extend(self.cells.iter().map(|(row, _)| *row));
        rows
    }

    /// Whether this damage forces a full repaint of the visible band:
    /// either the full flag, column-level damage, or row damage covering
    /// every visible row.
    pub fn forces_full(&self, visible: &VisibleRange) -> bool {
        if self.full || !self.columns.is_empty() {
            return true;
        }
        if visible.is_empty() {
            return false;
        }
        let rows = self.dirty_rows();
        (visible.start..visible.end).all(|i| rows.contains(&i))
    }
}

impl DamageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_row(&mut self, display_index: usize) {
        if self.full {
            return;
        }
        self.rows.insert(display_index);
    }

    pub fn mark_column(&mut self, column: impl Into<ColumnId>) {
        if self.full {
            return;
        }
        self.columns.insert(column.into());
    }

    pub fn mark_cell(&mut self, display_index: usize, column: impl Into<ColumnId>) {
        if self.full {
            return;
        }
        self.cells.insert((display_index, column.into()));
    }

    pub fn mark_full(&mut self) {
        self.full = true;
        self.rows.clear();
        self.columns.clear();
        self.cells.clear();
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn is_clean(&self) -> bool {
        !self.full && self.rows.is_empty() && self.columns.is_empty() && self.cells.is_empty()
    }

    pub fn is_row_dirty(&self, display_index: usize) -> bool {
        self.full
            || self.rows.contains(&display_index)
            || self.cells.iter().any(|(row, _)| *row == display_index)
    }

    /// Drains all pending damage for a paint pass, leaving the tracker clean.
    pub fn take(&mut self) -> DamageSnapshot {
        let snapshot = DamageSnapshot {
            full: self.full,
            rows: core::mem::take(&mut self.rows),
            columns: core::mem::take(&mut self.columns),
            cells: core::mem::take(&mut self.cells),
        };
        self.full = false;
        snapshot
    }
}
