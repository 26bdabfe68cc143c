use std::collections::HashMap;
use std::sync::Arc;

use crate::group::{GroupBucket, GroupChildren, build_group_tree, collect_pivot_keys};
use crate::heights::HeightIndex;
use crate::node::{GroupInfo, NodeData, NodeRegistry, RowNode};
use crate::sort::compare_records;
use crate::{
    CellValue, ColumnId, ColumnSpec, FilterModel, RowId, RowRecord, SortDirection, SortModel,
};

/// Host hook deriving a stable identity from a record.
pub type RowIdExtractor = Arc<dyn Fn(&RowRecord) -> Option<RowId> + Send + Sync>;

/// Host hook marking master rows (rows that expand into a detail row).
pub type IsMasterFn = Arc<dyn Fn(&RowRecord) -> bool + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PivotMode {
    #[default]
    Off,
    On,
}

/// A bulk change applied atomically: adds append, updates and removes match
/// by identity. Unknown identities are counted as zero matches, never errors.
#[derive(Clone, Debug, Default)]
pub struct GridTransaction {
    pub add: Vec<RowRecord>,
    pub update: Vec<RowRecord>,
    pub remove: Vec<RowId>,
}

impl GridTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_add(mut self, record: RowRecord) -> Self {
        self.add.push(record);
        self
    }

    pub fn with_update(mut self, record: RowRecord) -> Self {
        self.update.push(record);
        self
    }

    pub fn with_remove(mut self, id: RowId) -> Self {
        self.remove.push(id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.add.len() + self.update.len() + self.remove.len()
    }
}

/// How many items of a transaction actually matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionResult {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// The row model: owns the column catalog and row collection, and runs the
/// sort → filter → group/pivot → flatten pipeline into a display list of
/// identity-stable row nodes.
///
/// Every mutation reruns the pipeline synchronously; the node registry is
/// reconciled in place so selection and expansion survive reruns.
pub struct RowModel {
    columns: Vec<ColumnSpec>,
    pivot_catalog: Vec<ColumnSpec>,
    rows: Vec<RowRecord>,
    row_ids: Vec<RowId>,
    id_to_row: HashMap<RowId, usize>,

    sort_model: SortModel,
    filter_model: FilterModel,
    group_columns: Vec<ColumnId>,
    pivot_columns: Vec<ColumnId>,
    pivot_mode: PivotMode,

    id_extractor: Option<RowIdExtractor>,
    is_master: Option<IsMasterFn>,

    registry: NodeRegistry,
    display: Vec<RowId>,
    heights: HeightIndex,
    default_row_height: u32,
    detail_row_height: u32,
    transaction_count: u64,
}

impl Default for RowModel {
    fn default() -> Self {
        Self::new()
    }
}

impl RowModel {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            pivot_catalog: Vec::new(),
            rows: Vec::new(),
            row_ids: Vec::new(),
            id_to_row: HashMap::new(),
            sort_model: Vec::new(),
            filter_model: FilterModel::new(),
            group_columns: Vec::new(),
            pivot_columns: Vec::new(),
            pivot_mode: PivotMode::Off,
            id_extractor: None,
            is_master: None,
            registry: NodeRegistry::new(),
            display: Vec::new(),
            heights: HeightIndex::default(),
            default_row_height: 24,
            detail_row_height: 160,
            transaction_count: 0,
        }
    }

    // --- configuration ---------------------------------------------------

    pub fn set_row_id_extractor(
        &mut self,
        f: Option<impl Fn(&RowRecord) -> Option<RowId> + Send + Sync + 'static>,
    ) {
        self.id_extractor = f.map(|f| Arc::new(f) as _);
        self.rebuild_ids();
        self.refresh();
    }

    pub fn set_is_master(
        &mut self,
        f: Option<impl Fn(&RowRecord) -> bool + Send + Sync + 'static>,
    ) {
        self.is_master = f.map(|f| Arc::new(f) as _);
        self.refresh();
    }

    pub fn set_default_row_height(&mut self, height: u32) {
        self.default_row_height = height.max(1);
        self.refresh();
    }

    pub fn default_row_height(&self) -> u32 {
        self.default_row_height
    }

    pub fn set_detail_row_height(&mut self, height: u32) {
        self.detail_row_height = height.max(1);
    }

    // --- columns ----------------------------------------------------------

    pub fn set_columns(&mut self, columns: Vec<ColumnSpec>) {
        gdebug!(count = columns.len(), "set_columns");
        self.columns = columns;
        self.refresh();
    }

    /// The host-supplied column catalog.
    pub fn host_columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn host_columns_mut(&mut self) -> &mut Vec<ColumnSpec> {
        &mut self.columns
    }

    /// Columns the renderer should display: the synthetic pivot catalog when
    /// pivoting is active, the host catalog otherwise.
    pub fn effective_columns(&self) -> &[ColumnSpec] {
        if self.pivot_active() {
            &self.pivot_catalog
        } else {
            &self.columns
        }
    }

    pub fn column(&self, id: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .chain(self.pivot_catalog.iter())
            .find(|c| c.id == id)
    }

    // --- rows & transactions ----------------------------------------------

    pub fn set_rows(&mut self, rows: Vec<RowRecord>) {
        gdebug!(count = rows.len(), "set_rows");
        self.rows = rows;
        self.rebuild_ids();
        self.refresh();
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Identity of the record at a source (pre-pipeline) index.
    pub fn row_id_at(&self, index: usize) -> Option<&RowId> {
        self.row_ids.get(index)
    }

    pub fn apply_transaction(&mut self, tx: GridTransaction) -> TransactionResult {
        let mut result = TransactionResult::default();

        for record in &tx.update {
            let Some(id) = self.extract_id(record) else {
                continue;
            };
            if let Some(&index) = self.id_to_row.get(&id) {
                self.rows[index] = record.clone();
                result.updated += 1;
            }
        }

        let mut remove_indexes: Vec<usize> = tx
            .remove
            .iter()
            .filter_map(|id| self.id_to_row.get(id).copied())
            .collect();
        remove_indexes.sort_unstable();
        remove_indexes.dedup();
        for &index in remove_indexes.iter().rev() {
            self.rows.remove(index);
            result.removed += 1;
        }

        result.added = tx.add.len();
        self.rows.extend(tx.add);

        gdebug!(
            added = result.added,
            updated = result.updated,
            removed = result.removed,
            "apply_transaction"
        );
        self.transaction_count += 1;
        self.rebuild_ids();
        self.refresh();
        result
    }

    pub fn transaction_count(&self) -> u64 {
        self.transaction_count
    }

    /// Merges a partial record into the row with the given identity without
    /// re-running sort/filter/group. Returns the row's display index when it
    /// is currently displayed.
    ///
    /// If the patched field affects order, group membership or filter
    /// inclusion, the displayed state is stale until the next transaction.
    /// That trade-off keeps high-frequency point updates O(1).
    pub fn patch_row(&mut self, id: &RowId, patch: &RowRecord) -> Option<usize> {
        let index = *self.id_to_row.get(id)?;
        self.rows[index].merge(patch);
        gtrace!(row = index, "patch_row");
        self.registry
            .get(id)
            .filter(|n| self.display.get(n.display_index) == Some(id))
            .map(|n| n.display_index)
    }

    // --- pipeline inputs ----------------------------------------------------

    pub fn set_sort_model(&mut self, sort: SortModel) {
        self.sort_model = sort;
        self.refresh();
    }

    pub fn sort_model(&self) -> &SortModel {
        &self.sort_model
    }

    pub fn set_filter_model(&mut self, filter: FilterModel) {
        self.filter_model = filter;
        self.refresh();
    }

    pub fn filter_model(&self) -> &FilterModel {
        &self.filter_model
    }

    pub fn set_group_columns(&mut self, group_columns: Vec<ColumnId>) {
        self.group_columns = group_columns;
        self.refresh();
    }

    pub fn group_columns(&self) -> &[ColumnId] {
        &self.group_columns
    }

    pub fn set_pivot(&mut self, pivot_columns: Vec<ColumnId>, mode: PivotMode) {
        self.pivot_columns = pivot_columns;
        self.pivot_mode = mode;
        self.refresh();
    }

    pub fn pivot_mode(&self) -> PivotMode {
        self.pivot_mode
    }

    fn pivot_active(&self) -> bool {
        self.pivot_mode == PivotMode::On && !self.resolved_pivot_fields().is_empty()
    }

    // --- expansion & selection ---------------------------------------------

    /// Expands or collapses a node. No-op for unknown identities and for
    /// nodes that are neither groups nor master rows. Returns whether the
    /// display list changed.
    pub fn set_expanded(&mut self, id: &RowId, expanded: bool) -> bool {
        let Some(node) = self.registry.get_mut(id) else {
            return false;
        };
        if !node.expandable() || node.expanded == expanded {
            return false;
        }
        node.expanded = expanded;
        gtrace!(expanded, "set_expanded");
        self.refresh();
        true
    }

    pub fn toggle_expanded(&mut self, id: &RowId) -> bool {
        let Some(node) = self.registry.get(id) else {
            return false;
        };
        let next = !node.expanded;
        self.set_expanded(id, next)
    }

    pub fn is_expanded(&self, id: &RowId) -> bool {
        self.registry.is_expanded(id)
    }

    /// Selects exactly this node, clearing every other selection.
    pub fn select_only(&mut self, id: &RowId) {
        self.registry.for_each_mut(|node| node.selected = false);
        if let Some(node) = self.registry.get_mut(id) {
            node.selected = true;
        }
    }

    /// Toggles this node's selection, leaving others untouched.
    pub fn toggle_selected(&mut self, id: &RowId) -> bool {
        match self.registry.get_mut(id) {
            Some(node) => {
                node.selected = !node.selected;
                node.selected
            }
            None => false,
        }
    }

    /// Selects every displayed record row.
    pub fn select_all(&mut self) {
        let ids: Vec<RowId> = self
            .display
            .iter()
            .filter(|id| {
                self.registry
                    .get(id)
                    .map(|n| matches!(n.data, NodeData::Record(_)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        for id in ids {
            if let Some(node) = self.registry.get_mut(&id) {
                node.selected = true;
            }
        }
    }

    pub fn clear_selection(&mut self) {
        self.registry.for_each_mut(|node| node.selected = false);
    }

    pub fn is_selected(&self, id: &RowId) -> bool {
        self.registry.get(id).map(|n| n.selected).unwrap_or(false)
    }

    /// Identities of selected nodes, in display order.
    pub fn selected_ids(&self) -> Vec<RowId> {
        self.display
            .iter()
            .filter(|id| self.is_selected(id))
            .cloned()
            .collect()
    }

    // --- display queries ----------------------------------------------------

    pub fn display_len(&self) -> usize {
        self.display.len()
    }

    pub fn display_ids(&self) -> &[RowId] {
        &self.display
    }

    pub fn node_at(&self, display_index: usize) -> Option<&RowNode> {
        self.display
            .get(display_index)
            .and_then(|id| self.registry.get(id))
    }

    pub fn node_by_id(&self, id: &RowId) -> Option<&RowNode> {
        self.registry.get(id)
    }

    pub fn display_index_of(&self, id: &RowId) -> Option<usize> {
        self.registry
            .get(id)
            .map(|n| n.display_index)
            .filter(|&i| self.display.get(i) == Some(id))
    }

    pub fn record(&self, node: &RowNode) -> Option<&RowRecord> {
        match node.data {
            NodeData::Record(i) => self.rows.get(i),
            _ => None,
        }
    }

    /// Resolves the painted value of one cell.
    pub fn cell_value(&self, node: &RowNode, column: &ColumnSpec) -> CellValue {
        if column.selection {
            return CellValue::Bool(node.selected);
        }
        match &node.data {
            NodeData::Record(i) => self
                .rows
                .get(*i)
                .map(|r| r.value_of(&column.field))
                .unwrap_or(CellValue::Null),
            NodeData::Group(info) => match &column.pivot_key {
                Some(key) => info
                    .pivot
                    .get(key)
                    .and_then(|m| m.get(&column.field))
                    .cloned()
                    .unwrap_or(CellValue::Null),
                None => info
                    .aggregates
                    .get(&column.field)
                    .cloned()
                    .unwrap_or(CellValue::Null),
            },
            NodeData::Detail => CellValue::Null,
        }
    }

    // --- height index ---------------------------------------------------------

    pub fn total_height(&self) -> u64 {
        self.heights.total()
    }

    pub fn row_height(&self, display_index: usize) -> Option<u32> {
        self.heights.height_of(display_index)
    }

    /// Top edge offset of a displayed row.
    pub fn row_offset(&self, display_index: usize) -> u64 {
        self.heights.offset_of(display_index)
    }

    /// Display index of the row containing a vertical offset.
    pub fn row_at_offset(&self, offset: u64) -> Option<usize> {
        self.heights.index_at(offset)
    }

    /// Overrides one displayed row's height (point update of the index).
    pub fn set_row_height(&mut self, id: &RowId, height: u32) {
        let Some(display_index) = self.display_index_of(id) else {
            return;
        };
        if let Some(node) = self.registry.get_mut(id) {
            node.height = Some(height);
        }
        self.heights.set_height(display_index, height);
    }

    // --- pipeline ----------------------------------------------------------

    fn extract_id(&self, record: &RowRecord) -> Option<RowId> {
        if let Some(f) = &self.id_extractor {
            if let Some(id) = f(record) {
                return Some(id);
            }
        }
        record.get("id").and_then(RowId::from_cell)
    }

    fn rebuild_ids(&mut self) {
        self.row_ids.clear();
        self.id_to_row.clear();
        self.row_ids.reserve(self.rows.len());
        for i in 0..self.rows.len() {
            let id = self
                .extract_id(&self.rows[i])
                .unwrap_or(RowId::Index(i));
            self.id_to_row.insert(id.clone(), i);
            self.row_ids.push(id);
        }
    }

    fn passes_filters(&self, record: &RowRecord) -> bool {
        for (column_id, predicate) in self.filter_model.iter() {
            // Unknown column ids are ignored: resilience over strictness.
            let Some(column) = self.columns.iter().find(|c| &c.id == column_id) else {
                continue;
            };
            if !predicate.matches(&record.value_of(&column.field)) {
                return false;
            }
        }
        true
    }

    fn resolved_sort_keys(&self) -> Vec<(String, SortDirection)> {
        self.sort_model
            .iter()
            .filter_map(|key| {
                self.columns
                    .iter()
                    .find(|c| c.id == key.column && c.sortable)
                    .map(|c| (c.field.clone(), key.direction))
            })
            .collect()
    }

    fn resolved_group_fields(&self) -> Vec<(ColumnId, String)> {
        let explicit: Vec<&ColumnSpec> = self
            .group_columns
            .iter()
            .filter_map(|id| self.columns.iter().find(|c| &c.id == id))
            .collect();
        let chosen: Vec<&ColumnSpec> = if explicit.is_empty() {
            self.columns.iter().filter(|c| c.row_group).collect()
        } else {
            explicit
        };
        chosen
            .into_iter()
            .map(|c| (c.id.clone(), c.field.clone()))
            .collect()
    }

    fn resolved_pivot_fields(&self) -> Vec<String> {
        let explicit: Vec<String> = self
            .pivot_columns
            .iter()
            .filter_map(|id| self.columns.iter().find(|c| &c.id == id))
            .map(|c| c.field.clone())
            .collect();
        if explicit.is_empty() {
            self.columns
                .iter()
                .filter(|c| c.pivot)
                .map(|c| c.field.clone())
                .collect()
        } else {
            explicit
        }
    }

    fn value_columns(&self) -> Vec<(String, crate::AggFunc)> {
        self.columns
            .iter()
            .filter_map(|c| c.agg.clone().map(|agg| (c.field.clone(), agg)))
            .collect()
    }

    /// Full pipeline rerun: filter → sort → group/pivot → flatten, then
    /// registry reconciliation and height index rebuild.
    fn refresh(&mut self) {
        let mut order: Vec<usize> = (0..self.rows.len())
            .filter(|&i| self.passes_filters(&self.rows[i]))
            .collect();

        let sort_keys = self.resolved_sort_keys();
        if !sort_keys.is_empty() {
            // Stable sort: equal keys keep their original relative order.
            let rows = &self.rows;
            order.sort_by(|&a, &b| compare_records(&rows[a], &rows[b], &sort_keys));
        }

        self.registry.begin_rerun();
        let mut display: Vec<RowId> = Vec::new();

        let group_fields = self.resolved_group_fields();
        self.pivot_catalog.clear();
        if group_fields.is_empty() {
            for &row in &order {
                self.emit_record(row, 0, &mut display);
            }
        } else {
            let pivot_fields = if self.pivot_mode == PivotMode::On {
                self.resolved_pivot_fields()
            } else {
                Vec::new()
            };
            let tree = build_group_tree(
                &self.rows,
                &order,
                &group_fields,
                &self.value_columns(),
                &pivot_fields,
            );
            if !pivot_fields.is_empty() {
                let keys = collect_pivot_keys(&tree);
                self.pivot_catalog = self.generate_pivot_columns(&keys);
            }
            self.flatten_buckets(&tree, "", 0, &mut display);
        }

        self.display = display;

        // Record nodes whose rows still exist survive even when filtered out,
        // so selection state round-trips through a filter change.
        let id_map = &self.id_to_row;
        self.registry.finish_rerun(|id| match id {
            RowId::Detail(inner) => id_map.contains_key(inner.as_ref()),
            other => id_map.contains_key(other),
        });

        let default_height = self.default_row_height;
        let heights: Vec<u32> = self
            .display
            .iter()
            .map(|id| {
                self.registry
                    .get(id)
                    .and_then(|n| n.height)
                    .unwrap_or(default_height)
            })
            .collect();
        self.heights = HeightIndex::from_heights(heights);

        gtrace!(
            rows = self.rows.len(),
            displayed = self.display.len(),
            nodes = self.registry.len(),
            "refresh"
        );
    }

    fn emit_record(&mut self, row: usize, level: usize, display: &mut Vec<RowId>) {
        let id = self.row_ids[row].clone();
        let master = self
            .is_master
            .as_ref()
            .map(|f| f(&self.rows[row]))
            .unwrap_or(false);
        let expanded = self.registry.is_expanded(&id);
        self.registry.reconcile(
            id.clone(),
            level,
            NodeData::Record(row),
            master,
            row,
            display.len(),
            None,
        );
        display.push(id.clone());

        if master && expanded {
            let detail_id = RowId::Detail(Box::new(id));
            self.registry.reconcile(
                detail_id.clone(),
                level,
                NodeData::Detail,
                false,
                row,
                display.len(),
                Some(self.detail_row_height),
            );
            display.push(detail_id);
        }
    }

    fn flatten_buckets(
        &mut self,
        buckets: &[GroupBucket],
        parent_path: &str,
        level: usize,
        display: &mut Vec<RowId>,
    ) {
        for bucket in buckets {
            let path = if parent_path.is_empty() {
                format!("{}={}", bucket.column, bucket.key_text)
            } else {
                format!("{parent_path}/{}={}", bucket.column, bucket.key_text)
            };
            let id = RowId::Group(path.clone());
            let expanded = self.registry.is_expanded(&id);
            self.registry.reconcile(
                id.clone(),
                level,
                NodeData::Group(GroupInfo::from_bucket(bucket)),
                false,
                0,
                display.len(),
                None,
            );
            display.push(id);

            if expanded {
                match &bucket.children {
                    GroupChildren::Buckets(nested) => {
                        self.flatten_buckets(nested, &path, level + 1, display);
                    }
                    GroupChildren::Records(records) => {
                        for &row in records {
                            self.emit_record(row, level + 1, display);
                        }
                    }
                }
            }
        }
    }

    /// One synthetic column per (pivot key × value column) pair.
    fn generate_pivot_columns(&self, keys: &[String]) -> Vec<ColumnSpec> {
        let mut out = Vec::new();
        for key in keys {
            for col in self.columns.iter().filter(|c| c.agg.is_some() && !c.hidden) {
                let mut spec = ColumnSpec::new(format!("{key}::{}", col.id))
                    .with_field(col.field.clone())
                    .with_header(format!("{key} {}", col.header))
                    .with_width(col.width);
                spec.agg = col.agg.clone();
                spec.pivot_key = Some(key.clone());
                out.push(spec);
            }
        }
        out
    }
}

impl core::fmt::Debug for RowModel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RowModel")
            .field("columns", &self.columns.len())
            .field("rows", &self.rows.len())
            .field("displayed", &self.display.len())
            .field("sort_model", &self.sort_model)
            .field("group_columns", &self.group_columns)
            .field("pivot_mode", &self.pivot_mode)
            .finish_non_exhaustive()
    }
}
