use std::sync::Arc;

use crate::{CellValue, PinSide, RowRecord};

pub type ColumnId = String;

/// A custom aggregation reducer: leaf cell values in, one aggregate out.
pub type AggReducer = Arc<dyn Fn(&[CellValue]) -> CellValue + Send + Sync>;

/// Per-column aggregation applied when the column participates as a value
/// column under grouping or pivoting.
#[derive(Clone)]
pub enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    Custom(AggReducer),
}

impl AggFunc {
    /// Reduces the leaf values of one bucket to a single aggregate.
    ///
    /// Built-in numeric reducers skip non-numeric values; an empty numeric
    /// set aggregates to `Null` (except `Count`, which is always defined).
    pub fn apply(&self, values: &[CellValue]) -> CellValue {
        match self {
            Self::Count => CellValue::Number(values.len() as f64),
            Self::Custom(f) => f(values),
            Self::Sum => {
                let mut sum = 0.0;
                let mut any = false;
                for v in values {
                    if let Some(n) = v.as_number() {
                        sum += n;
                        any = true;
                    }
                }
                if any { CellValue::Number(sum) } else { CellValue::Null }
            }
            Self::Avg => {
                let mut sum = 0.0;
                let mut n = 0usize;
                for v in values {
                    if let Some(x) = v.as_number() {
                        sum += x;
                        n += 1;
                    }
                }
                if n > 0 {
                    CellValue::Number(sum / n as f64)
                } else {
                    CellValue::Null
                }
            }
            Self::Min => values
                .iter()
                .filter(|v| !v.is_missing())
                .min_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or(CellValue::Null),
            Self::Max => values
                .iter()
                .filter(|v| !v.is_missing())
                .max_by(|a, b| a.compare(b))
                .cloned()
                .unwrap_or(CellValue::Null),
        }
    }
}

impl core::fmt::Debug for AggFunc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Sum => f.write_str("Sum"),
            Self::Avg => f.write_str("Avg"),
            Self::Min => f.write_str("Min"),
            Self::Max => f.write_str("Max"),
            Self::Count => f.write_str("Count"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A host formatting hook for custom cell rendering: value + full record in,
/// display text out. The core stays strategy-agnostic and just draws the
/// returned text.
pub type CellFormatFn = Arc<dyn Fn(&CellValue, &RowRecord) -> String + Send + Sync>;

/// Per-column drawing strategy.
#[derive(Clone, Default)]
pub enum CellRenderer {
    /// Plain (truncated) text.
    #[default]
    Text,
    /// Sparkline over a comma-separated list of numbers (or a single number).
    MiniChart,
    /// Checkbox glyph driven by the cell's boolean value.
    Checkbox,
    /// Host strategy: draws the text produced by the format callback.
    Custom(CellFormatFn),
}

impl core::fmt::Debug for CellRenderer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Text => f.write_str("Text"),
            Self::MiniChart => f.write_str("MiniChart"),
            Self::Checkbox => f.write_str("Checkbox"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Column definition supplied by the host (or synthesized by pivoting).
#[derive(Clone, Debug)]
pub struct ColumnSpec {
    pub id: ColumnId,
    /// Field looked up in each record.
    pub field: String,
    pub header: String,
    pub width: f32,
    pub min_width: f32,
    pub max_width: f32,
    pub pin: PinSide,
    pub sortable: bool,
    pub hidden: bool,
    /// Participates in row grouping when grouping is active.
    pub row_group: bool,
    /// Participates in pivoting when pivot mode is on.
    pub pivot: bool,
    /// Aggregation applied when this is a value column under grouping/pivot.
    pub agg: Option<AggFunc>,
    pub renderer: CellRenderer,
    /// Dedicated selection column: paints a checkbox and toggles only the
    /// clicked row.
    pub selection: bool,
    /// Set on synthetic pivot result columns: the pivot key this column
    /// cross-tabulates.
    pub pivot_key: Option<String>,
}

impl ColumnSpec {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            field: id.clone(),
            header: id.clone(),
            id,
            width: 120.0,
            min_width: 24.0,
            max_width: 2000.0,
            pin: PinSide::None,
            sortable: true,
            hidden: false,
            row_group: false,
            pivot: false,
            agg: None,
            renderer: CellRenderer::Text,
            selection: false,
            pivot_key: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn with_width(mut self, width: f32) -> Self {
        self.width = width.clamp(self.min_width, self.max_width);
        self
    }

    pub fn with_width_bounds(mut self, min: f32, max: f32) -> Self {
        self.min_width = min;
        self.max_width = max;
        self.width = self.width.clamp(min, max);
        self
    }

    pub fn with_pin(mut self, pin: PinSide) -> Self {
        self.pin = pin;
        self
    }

    pub fn with_sortable(mut self, sortable: bool) -> Self {
        self.sortable = sortable;
        self
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_row_group(mut self, row_group: bool) -> Self {
        self.row_group = row_group;
        self
    }

    pub fn with_pivot(mut self, pivot: bool) -> Self {
        self.pivot = pivot;
        self
    }

    pub fn with_agg(mut self, agg: AggFunc) -> Self {
        self.agg = Some(agg);
        self
    }

    pub fn with_renderer(mut self, renderer: CellRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn as_selection_column(mut self) -> Self {
        self.selection = true;
        self.sortable = false;
        self
    }
}
