use crate::{ColumnId, FilterModel, PinSide, SortModel};

/// Per-column layout state captured in a snapshot. Order in the containing
/// vector is the column display order.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnState {
    pub id: ColumnId,
    pub width: f32,
    pub pin: PinSide,
    pub hidden: bool,
}

/// A serializable snapshot of host-restorable grid state: sort model,
/// filter model and column order/width/pin/visibility.
///
/// The grid owns no on-disk format; the host persists this however it
/// likes. With `feature = "serde"`, this type (and everything it contains)
/// implements `Serialize`/`Deserialize`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridState {
    pub sort: SortModel,
    pub filter: FilterModel,
    pub columns: Vec<ColumnState>,
}
