use crate::render::{HitTarget, PaintMode, PaintStats, Renderer};
use crate::state::{ColumnState, GridState};
use crate::{
    ColumnSpec, DamageTracker, FilterModel, FrameScheduler, GridEvent, GridTransaction, PivotMode,
    RowId, RowModel, RowNode, RowRecord, SortModel, Surface, TransactionResult, UpdateBatcher,
    VisibleRange,
};

/// One grid instance: row model, damage tracker, renderer, scheduler and
/// live-update batcher wired together behind the host-facing API.
///
/// Single-threaded and frame-driven: all mutation runs synchronously on the
/// caller, invalidations coalesce into at most one pending paint, and the
/// batch flush deadline is a single replaceable timer. Both die with the
/// instance; there is nothing else to tear down.
pub struct Grid {
    model: RowModel,
    damage: DamageTracker,
    renderer: Renderer,
    scheduler: FrameScheduler,
    batcher: UpdateBatcher,
    events: Vec<GridEvent>,
}

impl Default for Grid {
    fn default() -> Self {
        Self::new()
    }
}

impl Grid {
    pub fn new() -> Self {
        Self {
            model: RowModel::new(),
            damage: DamageTracker::new(),
            renderer: Renderer::new(),
            scheduler: FrameScheduler::new(),
            batcher: UpdateBatcher::default(),
            events: Vec::new(),
        }
    }

    pub fn model(&self) -> &RowModel {
        &self.model
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn damage(&self) -> &DamageTracker {
        &self.damage
    }

    pub fn paint_pending(&self) -> bool {
        self.scheduler.paint_pending()
    }

    // --- mutation API -------------------------------------------------------

    pub fn set_columns(&mut self, columns: Vec<ColumnSpec>) {
        self.model.set_columns(columns);
        self.invalidate_all();
    }

    pub fn set_rows(&mut self, rows: Vec<RowRecord>) {
        self.model.set_rows(rows);
        self.invalidate_all();
    }

    pub fn apply_transaction(&mut self, tx: GridTransaction) -> TransactionResult {
        let result = self.model.apply_transaction(tx);
        self.invalidate_all();
        result
    }

    pub fn set_sort_model(&mut self, sort: SortModel) {
        self.model.set_sort_model(sort);
        self.invalidate_all();
    }

    pub fn set_filter_model(&mut self, filter: FilterModel) {
        self.model.set_filter_model(filter);
        self.invalidate_all();
    }

    pub fn set_group_columns(&mut self, group_columns: Vec<String>) {
        self.model.set_group_columns(group_columns);
        self.invalidate_all();
    }

    pub fn set_pivot(&mut self, pivot_columns: Vec<String>, mode: PivotMode) {
        self.model.set_pivot(pivot_columns, mode);
        self.invalidate_all();
    }

    pub fn set_expanded(&mut self, id: &RowId, expanded: bool) -> bool {
        let changed = self.model.set_expanded(id, expanded);
        if changed {
            self.invalidate_all();
        }
        changed
    }

    pub fn set_row_id_extractor(
        &mut self,
        f: Option<impl Fn(&RowRecord) -> Option<RowId> + Send + Sync + 'static>,
    ) {
        self.model.set_row_id_extractor(f);
        self.invalidate_all();
    }

    pub fn set_is_master(
        &mut self,
        f: Option<impl Fn(&RowRecord) -> bool + Send + Sync + 'static>,
    ) {
        self.model.set_is_master(f);
        self.invalidate_all();
    }

    pub fn set_default_row_height(&mut self, height: u32) {
        self.model.set_default_row_height(height);
        self.invalidate_all();
    }

    pub fn set_detail_row_height(&mut self, height: u32) {
        self.model.set_detail_row_height(height);
    }

    // --- selection ------------------------------------------------------------

    pub fn select_only(&mut self, id: &RowId) {
        let previous: Vec<usize> = self
            .model
            .selected_ids()
            .iter()
            .filter_map(|sid| self.model.display_index_of(sid))
            .collect();
        self.model.select_only(id);
        for row in previous {
            self.damage.mark_row(row);
        }
        if let Some(row) = self.model.display_index_of(id) {
            self.damage.mark_row(row);
        }
        self.renderer.note_external_damage();
        self.scheduler.request_paint();
    }

    pub fn toggle_selected(&mut self, id: &RowId) -> bool {
        let selected = self.model.toggle_selected(id);
        if let Some(row) = self.model.display_index_of(id) {
            self.damage.mark_row(row);
        }
        self.renderer.note_external_damage();
        self.scheduler.request_paint();
        selected
    }

    pub fn select_all(&mut self) {
        self.model.select_all();
        self.invalidate_all();
    }

    pub fn deselect_all(&mut self) {
        self.model.clear_selection();
        self.invalidate_all();
    }

    // --- render control -----------------------------------------------------

    pub fn invalidate_row(&mut self, display_index: usize) {
        self.damage.mark_row(display_index);
        self.renderer.note_external_damage();
        self.scheduler.request_paint();
    }

    pub fn invalidate_cell(&mut self, display_index: usize, column: impl Into<String>) {
        self.damage.mark_cell(display_index, column);
        self.renderer.note_external_damage();
        self.scheduler.request_paint();
    }

    pub fn invalidate_all(&mut self) {
        self.damage.mark_full();
        self.renderer.note_external_damage();
        self.scheduler.request_paint();
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.renderer.set_viewport(width, height);
        self.invalidate_all();
    }

    pub fn set_scroll(&mut self, x: f32, y: u64) {
        self.renderer
            .set_scroll(&self.model, &mut self.damage, x, y);
        self.scheduler.request_paint();
    }

    pub fn visible_range(&self) -> VisibleRange {
        self.renderer.visible_range(&self.model)
    }

    /// The coalesced per-frame entry point: flushes a due batch, then
    /// executes at most one pending paint.
    pub fn on_frame(&mut self, now_ms: u64, surface: &mut dyn Surface) -> PaintStats {
        if self.scheduler.take_due_flush(now_ms) {
            self.flush_updates();
        }
        if !self.scheduler.take_paint() {
            return PaintStats {
                mode: PaintMode::Skipped,
                rows_painted: 0,
            };
        }
        let stats = self
            .renderer
            .paint(&self.model, &mut self.damage, surface, false);
        if stats.mode == PaintMode::Skipped && !self.damage.is_clean() {
            // Zero-sized surface: keep the request alive for the next frame.
            self.scheduler.request_paint();
        }
        stats
    }

    /// Forced synchronous paint, bypassing coalescing. Primarily for tests.
    pub fn paint_now(&mut self, surface: &mut dyn Surface) -> PaintStats {
        self.scheduler.take_paint();
        self.renderer
            .paint(&self.model, &mut self.damage, surface, true)
    }

    // --- pointer input --------------------------------------------------------

    pub fn hit_test(&mut self, x: f32, y: f32) -> Option<HitTarget> {
        self.renderer.hit_test(&self.model, x, y)
    }

    pub fn pointer_down(&mut self, x: f32, y: f32, toggle_modifier: bool) {
        self.renderer
            .pointer_down(&mut self.model, &mut self.damage, x, y, toggle_modifier);
        self.scheduler.request_paint();
    }

    pub fn double_click(&mut self, x: f32, y: f32) -> Option<GridEvent> {
        let event = self.renderer.double_click(&self.model, x, y)?;
        self.events.push(event.clone());
        Some(event)
    }

    /// Drains events raised towards the host since the last call.
    pub fn take_events(&mut self) -> Vec<GridEvent> {
        core::mem::take(&mut self.events)
    }

    // --- live updates -----------------------------------------------------------

    pub fn set_batch_interval_ms(&mut self, interval_ms: u64) {
        self.batcher.set_interval_ms(interval_ms);
    }

    pub fn pending_update_len(&self) -> usize {
        self.batcher.pending_len()
    }

    /// Queues an incoming record; the flush deadline is armed when the
    /// buffer transitions from empty.
    pub fn push_update(&mut self, record: RowRecord, now_ms: u64) {
        if self.batcher.push(record) {
            self.scheduler
                .schedule_flush(now_ms.saturating_add(self.batcher.interval_ms()));
        }
    }

    /// O(1) point update: merges partial fields into the identified record
    /// and marks only that row dirty. Sort/filter/group are not re-run, so
    /// order-affecting changes stay stale until the next transaction.
    pub fn update_by_id(&mut self, id: &RowId, patch: &RowRecord) -> bool {
        match self.model.patch_row(id, patch) {
            Some(row) => {
                self.damage.mark_row(row);
                self.renderer.note_external_damage();
                self.scheduler.request_paint();
                true
            }
            None => false,
        }
    }

    pub fn remove_by_id(&mut self, id: RowId) -> TransactionResult {
        self.apply_transaction(GridTransaction::new().with_remove(id))
    }

    /// Applies the buffered additions as one transaction, marks the new
    /// rows' display positions dirty and requests exactly one paint. Also
    /// serves as the immediate-flush path (cancels the pending deadline).
    pub fn flush_updates(&mut self) -> TransactionResult {
        self.scheduler.cancel_flush();
        let records = self.batcher.drain();
        let added = records.len();
        gdebug!(added, "flush_updates");

        let result = self.model.apply_transaction(GridTransaction {
            add: records,
            ..GridTransaction::default()
        });

        let total = self.model.row_count();
        for source in total.saturating_sub(added)..total {
            let Some(id) = self.model.row_id_at(source).cloned() else {
                continue;
            };
            if let Some(row) = self.model.display_index_of(&id) {
                self.damage.mark_row(row);
            }
        }
        self.renderer.note_external_damage();
        self.scheduler.request_paint();
        result
    }

    // --- persisted state -----------------------------------------------------

    /// Captures the host-restorable snapshot: sort, filter and column
    /// order/width/pin/visibility.
    pub fn capture_state(&self) -> GridState {
        GridState {
            sort: self.model.sort_model().clone(),
            filter: self.model.filter_model().clone(),
            columns: self
                .model
                .host_columns()
                .iter()
                .map(|c| ColumnState {
                    id: c.id.clone(),
                    width: c.width,
                    pin: c.pin,
                    hidden: c.hidden,
                })
                .collect(),
        }
    }

    /// Restores a snapshot. Columns unknown to the current catalog are
    /// ignored; catalog columns missing from the snapshot keep their spec
    /// and sort behind the restored ones.
    pub fn restore_state(&mut self, state: &GridState) {
        let mut remaining = self.model.host_columns().to_vec();
        let mut reordered = Vec::with_capacity(remaining.len());
        for cs in &state.columns {
            let Some(pos) = remaining.iter().position(|c| c.id == cs.id) else {
                gwarn!(column = cs.id.as_str(), "restore skipped unknown column");
                continue;
            };
            let mut col = remaining.remove(pos);
            col.width = cs.width.clamp(col.min_width, col.max_width);
            col.pin = cs.pin;
            col.hidden = cs.hidden;
            reordered.push(col);
        }
        reordered.extend(remaining);

        self.model.set_columns(reordered);
        self.model.set_sort_model(state.sort.clone());
        self.model.set_filter_model(state.filter.clone());
        self.invalidate_all();
    }

    // --- queries ----------------------------------------------------------------

    pub fn display_len(&self) -> usize {
        self.model.display_len()
    }

    pub fn node_at(&self, display_index: usize) -> Option<&RowNode> {
        self.model.node_at(display_index)
    }

    pub fn node_by_id(&self, id: &RowId) -> Option<&RowNode> {
        self.model.node_by_id(id)
    }

    pub fn selected_ids(&self) -> Vec<RowId> {
        self.model.selected_ids()
    }
}

impl core::fmt::Debug for Grid {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Grid")
            .field("model", &self.model)
            .field("paint_pending", &self.scheduler.paint_pending())
            .field("pending_updates", &self.batcher.pending_len())
            .finish_non_exhaustive()
    }
}
