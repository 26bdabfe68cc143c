//! A headless data-grid engine.
//!
//! This crate focuses on the core algorithms needed to drive a spreadsheet-like
//! grid over large row sets at interactive frame rates: a row-model pipeline
//! (filter, stable multi-key sort, hierarchical grouping with bubbled
//! aggregates, pivoting, flattening into a display list), a cumulative height
//! index for fast offset ↔ row lookup, damage-tracked partial repaint, and a
//! scroll blit optimizer that reuses already-painted pixels.
//!
//! It is UI-agnostic. A host layer is expected to provide:
//! - a [`Surface`] to paint on (fills, text, polylines, pixel copies)
//! - viewport size and scroll offsets
//! - pointer events and a per-frame tick with the current time in ms
//!
//! [`Grid`] ties the pieces together behind a single facade; each piece is
//! also usable on its own.
#![forbid(unsafe_code)]

#[macro_use]
mod macros;

mod batch;
mod blit;
mod column;
mod damage;
mod filter;
mod grid;
mod group;
mod heights;
mod model;
mod node;
mod record;
mod render;
mod scheduler;
mod sort;
mod state;
mod surface;
mod types;

#[cfg(test)]
mod tests;

pub use batch::{DEFAULT_FLUSH_INTERVAL_MS, MIN_FLUSH_INTERVAL_MS, UpdateBatcher};
pub use blit::BlitPlan;
pub use column::{AggFunc, AggReducer, CellFormatFn, CellRenderer, ColumnId, ColumnSpec};
pub use damage::{DamageSnapshot, DamageTracker};
pub use filter::{CompareOp, FilterModel, FilterPredicate, TextOp};
pub use grid::Grid;
pub use group::{GroupBucket, GroupChildren};
pub use model::{
    GridTransaction, IsMasterFn, PivotMode, RowIdExtractor, RowModel, TransactionResult,
};
pub use node::{GroupInfo, NodeData, RowNode};
pub use record::RowRecord;
pub use render::{ColumnX, HitTarget, PaintMode, PaintStats, Renderer};
pub use scheduler::FrameScheduler;
pub use sort::{SortKey, SortModel};
pub use state::{ColumnState, GridState};
pub use surface::{Color, RectPx, Surface};
pub use types::{CellValue, GridEvent, PinSide, RowId, SortDirection, VisibleRange};
