use crate::blit::{self, BlitPlan};
use crate::node::NodeData;
use crate::{
    CellRenderer, CellValue, Color, ColumnId, DamageTracker, GridEvent, PinSide, RectPx, RowModel,
    RowNode, Surface, VisibleRange,
};

const ROW_BG: Color = Color::rgb(0xff, 0xff, 0xff);
const ROW_ALT_BG: Color = Color::rgb(0xf6, 0xf7, 0xf9);
const SELECTED_BG: Color = Color::rgb(0xcc, 0xe2, 0xfb);
const GROUP_BG: Color = Color::rgb(0xec, 0xee, 0xf1);
const DETAIL_BG: Color = Color::rgb(0xfb, 0xfb, 0xfc);
const TEXT_COLOR: Color = Color::rgb(0x20, 0x24, 0x28);
const MUTED_TEXT: Color = Color::rgb(0x6b, 0x72, 0x7a);
const CHART_COLOR: Color = Color::rgb(0x2f, 0x81, 0xf7);
const CHECK_BORDER: Color = Color::rgb(0x8a, 0x91, 0x99);
const CHECK_FILL: Color = Color::rgb(0x2f, 0x81, 0xf7);

const CELL_PAD: f32 = 4.0;
const INDENT_PX: f32 = 16.0;
const GLYPH_W: f32 = 14.0;
const ELLIPSIS: char = '…';

/// Cached x-position of one displayable column, valid for one frame.
#[derive(Clone, Debug)]
pub struct ColumnX {
    pub id: ColumnId,
    /// Index into `RowModel::effective_columns`.
    pub index: usize,
    pub x: f32,
    pub width: f32,
    pub pin: PinSide,
}

/// What a pointer position resolves to.
#[derive(Clone, Debug, PartialEq)]
pub struct HitTarget {
    pub row: usize,
    pub column: Option<ColumnId>,
    pub on_expand_glyph: bool,
    pub on_selection_column: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaintMode {
    /// Zero-sized surface or nothing to do.
    Skipped,
    Partial,
    Full,
    /// Previous frame's pixels were shifted; only the exposed strip was drawn.
    Blit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaintStats {
    pub mode: PaintMode,
    pub rows_painted: usize,
}

/// Damage-tracked virtualized renderer.
///
/// Paints only the visible band of the display list onto the host surface,
/// repaints only damaged row rectangles when the damage set is a strict
/// subset of the visible rows, and reuses previous-frame pixels on a pure
/// vertical scroll.
#[derive(Debug)]
pub struct Renderer {
    viewport_w: f32,
    viewport_h: f32,
    scroll_x: f32,
    scroll_y: u64,
    /// Extra rows painted above/below the viewport to absorb scroll jitter.
    buffer_rows: usize,

    layout: Vec<ColumnX>,
    /// Horizontal extent of the scrolling (non-pinned) band.
    band_left: f32,
    band_right: f32,

    /// Scroll position at the end of the last completed paint.
    last_painted: Option<(f32, u64)>,
    /// True while every pending invalidation since the last paint came from
    /// scrolling only; gates the blit fast path.
    scroll_only_damage: bool,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            viewport_w: 0.0,
            viewport_h: 0.0,
            scroll_x: 0.0,
            scroll_y: 0,
            buffer_rows: 5,
            layout: Vec::new(),
            band_left: 0.0,
            band_right: 0.0,
            last_painted: None,
            scroll_only_damage: false,
        }
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport_w = width.max(0.0);
        self.viewport_h = height.max(0.0);
    }

    pub fn viewport(&self) -> (f32, f32) {
        (self.viewport_w, self.viewport_h)
    }

    pub fn set_buffer_rows(&mut self, buffer_rows: usize) {
        self.buffer_rows = buffer_rows;
    }

    pub fn scroll(&self) -> (f32, u64) {
        (self.scroll_x, self.scroll_y)
    }

    /// Updates scroll offsets and marks the visible band stale. When no
    /// other damage was pending, the delta stays eligible for pixel reuse.
    pub fn set_scroll(&mut self, model: &RowModel, damage: &mut DamageTracker, x: f32, y: u64) {
        let max_y = model
            .total_height()
            .saturating_sub(self.viewport_h.ceil() as u64);
        let y = y.min(max_y);
        let x = x.max(0.0);
        if x == self.scroll_x && y == self.scroll_y {
            return;
        }
        gtrace!(x, y, "set_scroll");
        self.scroll_only_damage = damage.is_clean() || self.scroll_only_damage;
        self.scroll_x = x;
        self.scroll_y = y;
        damage.mark_full();
    }

    /// Call when damage is raised by anything other than scrolling; the
    /// pending frame can no longer be blitted.
    pub fn note_external_damage(&mut self) {
        self.scroll_only_damage = false;
    }

    /// Visible display-index band: rows intersecting the viewport, padded by
    /// `buffer_rows` on both sides, clamped to the display list.
    pub fn visible_range(&self, model: &RowModel) -> VisibleRange {
        let len = model.display_len();
        if len == 0 || self.viewport_h <= 0.0 {
            return VisibleRange { start: 0, end: 0 };
        }
        let total = model.total_height();
        if self.scroll_y >= total {
            return VisibleRange {
                start: len,
                end: len,
            };
        }
        let first = model.row_at_offset(self.scroll_y).unwrap_or(0);
        let bottom_offset = self
            .scroll_y
            .saturating_add(self.viewport_h.ceil() as u64)
            .saturating_sub(1)
            .min(total.saturating_sub(1));
        let last = model.row_at_offset(bottom_offset).unwrap_or(len - 1);
        VisibleRange {
            start: first.saturating_sub(self.buffer_rows),
            end: (last + 1 + self.buffer_rows).min(len),
        }
    }

    /// Recomputes per-column x offsets: pinned-left anchored at 0,
    /// pinned-right anchored at the right edge, center columns shifted by
    /// the horizontal scroll and clipped to the band in between.
    pub fn rebuild_column_layout(&mut self, model: &RowModel) {
        self.layout.clear();
        let columns = model.effective_columns();

        let mut left_x = 0.0;
        for (index, col) in columns.iter().enumerate() {
            if col.hidden || col.pin != PinSide::Left {
                continue;
            }
            self.layout.push(ColumnX {
                id: col.id.clone(),
                index,
                x: left_x,
                width: col.width,
                pin: PinSide::Left,
            });
            left_x += col.width;
        }

        let right_total: f32 = columns
            .iter()
            .filter(|c| !c.hidden && c.pin == PinSide::Right)
            .map(|c| c.width)
            .sum();
        let mut right_x = self.viewport_w - right_total;
        for (index, col) in columns.iter().enumerate() {
            if col.hidden || col.pin != PinSide::Right {
                continue;
            }
            self.layout.push(ColumnX {
                id: col.id.clone(),
                index,
                x: right_x,
                width: col.width,
                pin: PinSide::Right,
            });
            right_x += col.width;
        }

        self.band_left = left_x;
        self.band_right = (self.viewport_w - right_total).max(left_x);

        let mut center_x = left_x - self.scroll_x;
        for (index, col) in columns.iter().enumerate() {
            if col.hidden || col.pin != PinSide::None {
                continue;
            }
            self.layout.push(ColumnX {
                id: col.id.clone(),
                index,
                x: center_x,
                width: col.width,
                pin: PinSide::None,
            });
            center_x += col.width;
        }
    }

    pub fn column_layout(&self) -> &[ColumnX] {
        &self.layout
    }

    // --- painting -----------------------------------------------------------

    /// One paint pass. Consumes pending damage and draws the minimal set of
    /// row rectangles; a zero-sized surface skips the pass and leaves the
    /// damage pending.
    pub fn paint(
        &mut self,
        model: &RowModel,
        damage: &mut DamageTracker,
        surface: &mut dyn Surface,
        forced: bool,
    ) -> PaintStats {
        let (w, h) = surface.size();
        if w <= 0.0 || h <= 0.0 {
            gtrace!("paint skipped: zero-sized surface");
            return PaintStats {
                mode: PaintMode::Skipped,
                rows_painted: 0,
            };
        }
        self.viewport_w = w;
        self.viewport_h = h;

        if damage.is_clean() && !forced {
            return PaintStats {
                mode: PaintMode::Skipped,
                rows_painted: 0,
            };
        }
        let snapshot = damage.take();

        self.rebuild_column_layout(model);
        let visible = self.visible_range(model);

        let stats = if !forced && !snapshot.forces_full(&visible) {
            let dirty = snapshot.dirty_rows();
            let mut painted = 0usize;
            for &row in dirty.iter() {
                if visible.contains(row) {
                    self.clear_row(model, surface, row);
                    self.paint_row(model, surface, row);
                    painted += 1;
                }
            }
            PaintStats {
                mode: PaintMode::Partial,
                rows_painted: painted,
            }
        } else if let Some(plan) = self.blit_plan(forced) {
            self.paint_blit(model, surface, &visible, plan)
        } else {
            self.paint_full(model, surface, &visible)
        };

        self.last_painted = Some((self.scroll_x, self.scroll_y));
        self.scroll_only_damage = false;
        gtrace!(
            rows = stats.rows_painted,
            mode = ?stats.mode,
            "paint"
        );
        stats
    }

    fn blit_plan(&self, forced: bool) -> Option<BlitPlan> {
        if forced || !self.scroll_only_damage {
            return None;
        }
        let (last_x, last_y) = self.last_painted?;
        let plan = blit::evaluate(
            self.scroll_x - last_x,
            self.scroll_y as i64 - last_y as i64,
            self.viewport_h,
        );
        match plan {
            BlitPlan::Repaint => None,
            reuse => Some(reuse),
        }
    }

    fn paint_full(
        &mut self,
        model: &RowModel,
        surface: &mut dyn Surface,
        visible: &VisibleRange,
    ) -> PaintStats {
        surface.fill_rect(
            RectPx::new(0.0, 0.0, self.viewport_w, self.viewport_h),
            ROW_BG,
        );
        let mut painted = 0usize;
        for row in visible.start..visible.end {
            self.paint_row(model, surface, row);
            painted += 1;
        }
        PaintStats {
            mode: PaintMode::Full,
            rows_painted: painted,
        }
    }

    fn paint_blit(
        &mut self,
        model: &RowModel,
        surface: &mut dyn Surface,
        visible: &VisibleRange,
        plan: BlitPlan,
    ) -> PaintStats {
        let BlitPlan::Reuse { dy, exposed_h } = plan else {
            return self.paint_full(model, surface, visible);
        };

        // Shift the surviving band, then repaint only the exposed strip.
        let surviving_h = self.viewport_h - exposed_h;
        let (src_y, strip_top) = if dy < 0.0 {
            // Content moved up: strip exposed at the bottom.
            (exposed_h, self.viewport_h - exposed_h)
        } else {
            (0.0, 0.0)
        };
        surface.copy_area(
            RectPx::new(0.0, src_y, self.viewport_w, surviving_h),
            0.0,
            dy,
        );
        let strip = RectPx::new(0.0, strip_top, self.viewport_w, exposed_h);
        surface.fill_rect(strip, ROW_BG);

        let strip_abs_top = self.scroll_y.saturating_add(strip.y as u64);
        let strip_abs_bottom = strip_abs_top.saturating_add(exposed_h.ceil() as u64);
        let mut painted = 0usize;
        for row in visible.start..visible.end {
            let top = model.row_offset(row);
            let bottom = top.saturating_add(model.row_height(row).unwrap_or(0) as u64);
            if bottom > strip_abs_top && top < strip_abs_bottom {
                self.paint_row(model, surface, row);
                painted += 1;
            }
        }
        PaintStats {
            mode: PaintMode::Blit,
            rows_painted: painted,
        }
    }

    fn row_rect(&self, model: &RowModel, row: usize) -> Option<RectPx> {
        let h = model.row_height(row)? as f32;
        let y = model.row_offset(row) as i64 - self.scroll_y as i64;
        Some(RectPx::new(0.0, y as f32, self.viewport_w, h))
    }

    fn clear_row(&self, model: &RowModel, surface: &mut dyn Surface, row: usize) {
        if let Some(rect) = self.row_rect(model, row) {
            surface.fill_rect(rect, ROW_BG);
        }
    }

    fn paint_row(&self, model: &RowModel, surface: &mut dyn Surface, row: usize) {
        let Some(node) = model.node_at(row) else {
            return;
        };
        let Some(rect) = self.row_rect(model, row) else {
            return;
        };

        let bg = if node.selected {
            SELECTED_BG
        } else if node.is_group() {
            GROUP_BG
        } else if node.is_detail() {
            DETAIL_BG
        } else if row % 2 == 1 {
            ROW_ALT_BG
        } else {
            ROW_BG
        };
        surface.fill_rect(rect, bg);

        match &node.data {
            NodeData::Detail => {
                // The host owns detail content; the core paints the panel only.
                surface.fill_rect(
                    RectPx::new(rect.x, rect.y, rect.w, 1.0),
                    CHECK_BORDER,
                );
            }
            NodeData::Group(_) => {
                self.paint_group_row(model, surface, node, &rect);
            }
            NodeData::Record(_) => {
                if node.master {
                    self.paint_expand_glyph(surface, node, &rect);
                }
                for colx in &self.layout {
                    self.paint_cell(model, surface, node, colx, &rect);
                }
            }
        }
    }

    fn glyph_rect(&self, node: &RowNode, rect: &RectPx) -> RectPx {
        let x = self.band_left + node.level as f32 * INDENT_PX;
        RectPx::new(x, rect.y, GLYPH_W, rect.h)
    }

    fn paint_expand_glyph(&self, surface: &mut dyn Surface, node: &RowNode, rect: &RectPx) {
        let g = self.glyph_rect(node, rect);
        let glyph = if node.expanded { "▾" } else { "▸" };
        surface.draw_text(g.x, g.y + rect.h * 0.7, glyph, MUTED_TEXT);
    }

    fn paint_group_row(
        &self,
        model: &RowModel,
        surface: &mut dyn Surface,
        node: &RowNode,
        rect: &RectPx,
    ) {
        let Some(info) = node.group() else {
            return;
        };
        self.paint_expand_glyph(surface, node, rect);

        let header = model
            .column(&info.column)
            .map(|c| c.header.clone())
            .unwrap_or_else(|| info.column.clone());
        let label = format!("{header}: {} ({})", info.key_text, info.leaf_count);
        let label_x = self.glyph_rect(node, rect).right() + CELL_PAD;
        let label_max = (self.band_right - label_x - CELL_PAD).max(0.0);
        if let Some(text) = truncate_to_width(surface, &label, label_max) {
            surface.draw_text(label_x, rect.y + rect.h * 0.7, &text, TEXT_COLOR);
        }
        let label_end = label_x + surface.measure_text(&label).min(label_max);

        // Aggregate cells, skipping any column the label runs into.
        let columns = model.effective_columns();
        for colx in &self.layout {
            let Some(spec) = columns.get(colx.index) else {
                continue;
            };
            if spec.selection || (spec.agg.is_none() && spec.pivot_key.is_none()) {
                continue;
            }
            if colx.x < label_end && colx.pin == PinSide::None {
                continue;
            }
            self.paint_cell(model, surface, node, colx, rect);
        }
    }

    fn paint_cell(
        &self,
        model: &RowModel,
        surface: &mut dyn Surface,
        node: &RowNode,
        colx: &ColumnX,
        rect: &RectPx,
    ) {
        let columns = model.effective_columns();
        let Some(spec) = columns.get(colx.index) else {
            return;
        };

        let cell = RectPx::new(colx.x, rect.y, colx.width, rect.h);
        let clip = match colx.pin {
            PinSide::None => RectPx::new(
                self.band_left,
                rect.y,
                (self.band_right - self.band_left).max(0.0),
                rect.h,
            ),
            _ => RectPx::new(0.0, rect.y, self.viewport_w, rect.h),
        };
        let vis = cell.clipped_to(&clip);
        if vis.is_empty() {
            return;
        }

        let value = model.cell_value(node, spec);

        if spec.selection {
            self.paint_checkbox(surface, &vis, node.selected);
            return;
        }

        // Leading column of a record row gets the group indent.
        let mut text_x = vis.x + CELL_PAD;
        if node.level > 0 && colx.x <= self.band_left && colx.pin != PinSide::Right {
            text_x += node.level as f32 * INDENT_PX + GLYPH_W;
        } else if node.master && colx.x <= self.band_left && colx.pin != PinSide::Right {
            text_x += GLYPH_W;
        }

        match &spec.renderer {
            CellRenderer::Checkbox => {
                self.paint_checkbox(surface, &vis, value.as_bool().unwrap_or(false));
            }
            CellRenderer::MiniChart => {
                paint_mini_chart(surface, &vis, &value);
            }
            CellRenderer::Text => {
                let text = value.display();
                let max = (vis.right() - CELL_PAD - text_x).max(0.0);
                if let Some(t) = truncate_to_width(surface, &text, max) {
                    surface.draw_text(text_x, rect.y + rect.h * 0.7, &t, TEXT_COLOR);
                }
            }
            CellRenderer::Custom(format) => {
                let text = match model.record(node) {
                    Some(record) => format(&value, record),
                    None => value.display(),
                };
                let max = (vis.right() - CELL_PAD - text_x).max(0.0);
                if let Some(t) = truncate_to_width(surface, &text, max) {
                    surface.draw_text(text_x, rect.y + rect.h * 0.7, &t, TEXT_COLOR);
                }
            }
        }
    }

    fn paint_checkbox(&self, surface: &mut dyn Surface, vis: &RectPx, checked: bool) {
        let side = (vis.h.min(vis.w) - 2.0 * CELL_PAD).max(4.0).min(12.0);
        let x = vis.x + CELL_PAD;
        let y = vis.y + (vis.h - side) / 2.0;
        surface.fill_rect(RectPx::new(x, y, side, side), CHECK_BORDER);
        surface.fill_rect(
            RectPx::new(x + 1.0, y + 1.0, side - 2.0, side - 2.0),
            ROW_BG,
        );
        if checked {
            surface.fill_rect(
                RectPx::new(x + 3.0, y + 3.0, side - 6.0, side - 6.0),
                CHECK_FILL,
            );
        }
    }

    // --- hit testing ----------------------------------------------------------

    /// Resolves a pointer position (surface-relative logical pixels) to a
    /// row/column target. Row lookup goes through the cumulative height
    /// index; the column scan checks pinned-left, pinned-right, then the
    /// center band.
    pub fn hit_test(&mut self, model: &RowModel, x: f32, y: f32) -> Option<HitTarget> {
        if y < 0.0 || x < 0.0 || x >= self.viewport_w {
            return None;
        }
        let row = model.row_at_offset(self.scroll_y.saturating_add(y as u64))?;
        if self.layout.is_empty() {
            self.rebuild_column_layout(model);
        }

        let mut column = None;
        for pin in [PinSide::Left, PinSide::Right, PinSide::None] {
            if pin == PinSide::None && (x < self.band_left || x >= self.band_right) {
                continue;
            }
            if let Some(colx) = self
                .layout
                .iter()
                .filter(|c| c.pin == pin)
                .find(|c| x >= c.x && x < c.x + c.width)
            {
                column = Some(colx.clone());
                break;
            }
        }

        let node = model.node_at(row)?;
        let rect = self.row_rect(model, row)?;
        let glyph = self.glyph_rect(node, &rect);
        let on_expand_glyph = node.expandable() && x >= glyph.x && x < glyph.right();
        let on_selection_column = column
            .as_ref()
            .and_then(|c| model.effective_columns().get(c.index))
            .map(|spec| spec.selection)
            .unwrap_or(false);

        Some(HitTarget {
            row,
            column: column.map(|c| c.id),
            on_expand_glyph,
            on_selection_column,
        })
    }

    /// Pointer-down protocol: glyph click toggles expansion (structural, so
    /// full damage); selection-column click toggles just that row; a plain
    /// click selects exclusively; a modifier click toggles additively.
    pub fn pointer_down(
        &mut self,
        model: &mut RowModel,
        damage: &mut DamageTracker,
        x: f32,
        y: f32,
        toggle_modifier: bool,
    ) {
        let Some(hit) = self.hit_test(model, x, y) else {
            return;
        };
        let Some(node) = model.node_at(hit.row) else {
            return;
        };
        let id = node.id.clone();

        if hit.on_expand_glyph {
            // Row count changes underneath; nothing short of full works.
            model.toggle_expanded(&id);
            damage.mark_full();
            self.note_external_damage();
            return;
        }

        if hit.on_selection_column || toggle_modifier {
            model.toggle_selected(&id);
            damage.mark_row(hit.row);
            self.note_external_damage();
            return;
        }

        // Exclusive select: previously selected rows need repainting too.
        let previous: Vec<usize> = model
            .selected_ids()
            .iter()
            .filter_map(|sid| model.display_index_of(sid))
            .collect();
        model.select_only(&id);
        for row in previous {
            damage.mark_row(row);
        }
        damage.mark_row(hit.row);
        self.note_external_damage();
    }

    /// Double-click on a record cell signals an edit-start intent; the
    /// editing surface itself lives in the host.
    pub fn double_click(&mut self, model: &RowModel, x: f32, y: f32) -> Option<GridEvent> {
        let hit = self.hit_test(model, x, y)?;
        let node = model.node_at(hit.row)?;
        if !matches!(node.data, NodeData::Record(_)) {
            return None;
        }
        let column = hit.column?;
        Some(GridEvent::EditRequested {
            row: hit.row,
            column,
        })
    }
}

/// Longest prefix of `text` (plus an ellipsis when cut) that fits `max_w`,
/// found by binary search on the measured width. `None` when nothing fits.
pub(crate) fn truncate_to_width(
    surface: &dyn Surface,
    text: &str,
    max_w: f32,
) -> Option<String> {
    if max_w <= 0.0 || text.is_empty() {
        return None;
    }
    if surface.measure_text(text) <= max_w {
        return Some(text.to_owned());
    }

    let chars: Vec<char> = text.chars().collect();
    let fits = |n: usize| -> bool {
        let mut s: String = chars[..n].iter().collect();
        s.push(ELLIPSIS);
        surface.measure_text(&s) <= max_w
    };

    let mut lo = 0usize;
    let mut hi = chars.len();
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    if lo == 0 {
        return None;
    }
    let mut out: String = chars[..lo].iter().collect();
    out.push(ELLIPSIS);
    Some(out)
}

/// Sparkline over the numbers in the cell: either a single number (flat
/// line) or a comma-separated list in a text cell.
fn paint_mini_chart(surface: &mut dyn Surface, vis: &RectPx, value: &CellValue) {
    let numbers: Vec<f64> = match value {
        CellValue::Number(n) if !n.is_nan() => vec![*n],
        CellValue::Text(s) => s
            .split(',')
            .filter_map(|part| part.trim().parse::<f64>().ok())
            .collect(),
        _ => Vec::new(),
    };
    if numbers.is_empty() {
        return;
    }

    let lo = numbers.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = if hi > lo { hi - lo } else { 1.0 };

    let inner_w = (vis.w - 2.0 * CELL_PAD).max(1.0);
    let inner_h = (vis.h - 2.0 * CELL_PAD).max(1.0);
    let step = if numbers.len() > 1 {
        inner_w / (numbers.len() - 1) as f32
    } else {
        0.0
    };

    let points: Vec<(f32, f32)> = numbers
        .iter()
        .enumerate()
        .map(|(i, &n)| {
            let t = ((n - lo) / span) as f32;
            (
                vis.x + CELL_PAD + step * i as f32,
                vis.y + CELL_PAD + inner_h * (1.0 - t),
            )
        })
        .collect();
    surface.draw_polyline(&points, CHART_COLOR);
}
