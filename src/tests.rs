use crate::blit;
use crate::render::truncate_to_width;
use crate::*;

use std::sync::Arc;

#[derive(Clone, Copy, Debug)]
struct Lcg(u64);

impl Lcg {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u64(&mut self) -> u64 {
        // Deterministic, dependency-free PRNG for tests.
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0
    }

    fn gen_range_u64(&mut self, start: u64, end_exclusive: u64) -> u64 {
        debug_assert!(start < end_exclusive);
        let span = end_exclusive - start;
        start + (self.next_u64() % span)
    }

    fn gen_range_u32(&mut self, start: u32, end_exclusive: u32) -> u32 {
        self.gen_range_u64(start as u64, end_exclusive as u64) as u32
    }

    fn gen_range_usize(&mut self, start: usize, end_exclusive: usize) -> usize {
        self.gen_range_u64(start as u64, end_exclusive as u64) as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Op {
    Fill(RectPx, Color),
    Text(f32, f32, String),
    Polyline(usize),
    Copy(RectPx, f32, f32),
}

/// Records draw calls; text measures at 8 px per char.
struct TestSurface {
    w: f32,
    h: f32,
    ops: Vec<Op>,
}

impl TestSurface {
    fn new(w: f32, h: f32) -> Self {
        Self {
            w,
            h,
            ops: Vec::new(),
        }
    }

    fn copies(&self) -> Vec<&Op> {
        self.ops
            .iter()
            .filter(|op| matches!(op, Op::Copy(..)))
            .collect()
    }
}

impl Surface for TestSurface {
    fn size(&self) -> (f32, f32) {
        (self.w, self.h)
    }

    fn fill_rect(&mut self, rect: RectPx, color: Color) {
        self.ops.push(Op::Fill(rect, color));
    }

    fn draw_text(&mut self, x: f32, y: f32, text: &str, _color: Color) {
        self.ops.push(Op::Text(x, y, text.to_owned()));
    }

    fn measure_text(&self, text: &str) -> f32 {
        text.chars().count() as f32 * 8.0
    }

    fn draw_polyline(&mut self, points: &[(f32, f32)], _color: Color) {
        self.ops.push(Op::Polyline(points.len()));
    }

    fn copy_area(&mut self, src: RectPx, dx: f32, dy: f32) {
        self.ops.push(Op::Copy(src, dx, dy));
    }
}

fn person(id: i64, name: &str, age: f64, dept: &str, salary: f64) -> RowRecord {
    RowRecord::new()
        .with("id", id)
        .with("name", name)
        .with("age", age)
        .with("dept", dept)
        .with("salary", salary)
}

fn people_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("id"),
        ColumnSpec::new("name"),
        ColumnSpec::new("age"),
        ColumnSpec::new("dept"),
        ColumnSpec::new("salary").with_agg(AggFunc::Sum),
    ]
}

/// Display-order names of record rows; empty string for synthetic rows.
fn names(model: &RowModel) -> Vec<String> {
    (0..model.display_len())
        .map(|i| {
            let node = model.node_at(i).unwrap();
            model
                .record(node)
                .map(|r| r.value_of("name").display())
                .unwrap_or_default()
        })
        .collect()
}

// --- cell values -------------------------------------------------------------

#[test]
fn cell_value_display_forms() {
    assert_eq!(CellValue::Number(3.0).display(), "3");
    assert_eq!(CellValue::Number(3.5).display(), "3.5");
    assert_eq!(CellValue::Null.display(), "");
    assert_eq!(CellValue::Bool(true).display(), "true");
    assert_eq!(CellValue::Text("x".into()).display(), "x");
}

#[test]
fn cell_value_compare_mixed_classes_and_missing() {
    use core::cmp::Ordering::*;
    let n = CellValue::Number(5.0);
    let t = CellValue::Text("a".into());
    assert_eq!(n.compare(&t), Less); // numbers order before text
    assert_eq!(n.compare(&CellValue::Null), Less);
    assert_eq!(CellValue::Null.compare(&n), Greater);
    assert_eq!(CellValue::Number(f64::NAN).compare(&n), Greater);
    assert_eq!(
        CellValue::Text("Beta".into()).compare(&CellValue::Text("alpha".into())),
        Greater
    );
}

// --- sorting -----------------------------------------------------------------

#[test]
fn sort_missing_ranks_last_in_both_directions() {
    let mut model = RowModel::new();
    model.set_columns(people_columns());
    let mut nan_row = person(4, "nan", 0.0, "eng", 0.0);
    nan_row.set("age", f64::NAN);
    let mut null_row = person(2, "null", 0.0, "eng", 0.0);
    null_row.set("age", CellValue::Null);
    model.set_rows(vec![
        person(1, "c", 30.0, "eng", 0.0),
        null_row,
        person(3, "a", 10.0, "eng", 0.0),
        nan_row,
        person(5, "b", 20.0, "eng", 0.0),
    ]);

    model.set_sort_model(vec![SortKey::asc("age")]);
    assert_eq!(names(&model), vec!["a", "b", "c", "null", "nan"]);

    model.set_sort_model(vec![SortKey::desc("age")]);
    // Reversing the direction reverses present values only; missing stays last.
    assert_eq!(names(&model), vec!["c", "b", "a", "null", "nan"]);
}

#[test]
fn sort_is_stable_and_multi_key() {
    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_rows(vec![
        person(1, "w", 30.0, "ops", 0.0),
        person(2, "x", 20.0, "eng", 0.0),
        person(3, "y", 30.0, "eng", 0.0),
        person(4, "z", 20.0, "eng", 0.0),
    ]);

    // Tie on dept falls through to age; full ties keep insertion order.
    model.set_sort_model(vec![SortKey::asc("dept"), SortKey::asc("age")]);
    assert_eq!(names(&model), vec!["x", "z", "y", "w"]);

    model.set_sort_model(vec![SortKey::asc("dept")]);
    assert_eq!(names(&model), vec!["x", "y", "z", "w"]);
}

#[test]
fn sort_ignores_unknown_and_unsortable_columns() {
    let mut columns = people_columns();
    columns[2] = ColumnSpec::new("age").with_sortable(false);
    let mut model = RowModel::new();
    model.set_columns(columns);
    model.set_rows(vec![
        person(1, "b", 30.0, "eng", 0.0),
        person(2, "a", 10.0, "eng", 0.0),
    ]);

    model.set_sort_model(vec![SortKey::asc("bogus"), SortKey::asc("age")]);
    assert_eq!(names(&model), vec!["b", "a"]);
}

// --- filtering ---------------------------------------------------------------

#[test]
fn filter_predicates_match_by_kind() {
    let text = CellValue::Text("Hello World".into());
    assert!(
        FilterPredicate::Text {
            op: TextOp::Contains,
            value: "WORLD".into()
        }
        .matches(&text)
    );
    assert!(
        FilterPredicate::Text {
            op: TextOp::StartsWith,
            value: "hell".into()
        }
        .matches(&text)
    );
    assert!(
        !FilterPredicate::Text {
            op: TextOp::Equals,
            value: "hello".into()
        }
        .matches(&text)
    );

    let n = CellValue::Number(42.0);
    assert!(
        FilterPredicate::Number {
            op: CompareOp::GreaterThan,
            value: 41.0
        }
        .matches(&n)
    );
    assert!(FilterPredicate::NumberInRange { low: 0.0, high: 42.0 }.matches(&n));
    // Type mismatch filters the row out.
    assert!(
        !FilterPredicate::Number {
            op: CompareOp::Equals,
            value: 1.0
        }
        .matches(&text)
    );
    // Malformed range is always-pass.
    assert!(FilterPredicate::NumberInRange { low: 9.0, high: 1.0 }.matches(&n));
    assert!(FilterPredicate::NumberInRange { low: 9.0, high: 1.0 }.matches(&text));

    let ts = CellValue::Timestamp(1_000);
    assert!(
        FilterPredicate::Timestamp {
            op: CompareOp::LessThanOrEqual,
            value: 1_000
        }
        .matches(&ts)
    );
    assert!(!FilterPredicate::TimestampInRange { low: 0, high: 999 }.matches(&ts));

    assert!(FilterPredicate::InSet(vec![]).matches(&text));
    assert!(FilterPredicate::InSet(vec!["42".into()]).matches(&n));
    assert!(!FilterPredicate::InSet(vec!["41".into()]).matches(&n));

    assert!(FilterPredicate::Bool(true).matches(&CellValue::Bool(true)));
    assert!(!FilterPredicate::Bool(true).matches(&n));
}

#[test]
fn filters_combine_with_and_against_oracle() {
    let depts = ["eng", "ops", "hr"];
    let mut rng = Lcg::new(7);
    let rows: Vec<RowRecord> = (0..200)
        .map(|i| {
            let age = rng.gen_range_u64(0, 100) as f64;
            let dept = depts[rng.gen_range_usize(0, depts.len())];
            person(i, &format!("p{i}"), age, dept, 0.0)
        })
        .collect();

    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_rows(rows.clone());
    model.set_filter_model(
        FilterModel::new()
            .with("age", FilterPredicate::NumberInRange { low: 20.0, high: 60.0 })
            .with("dept", FilterPredicate::InSet(vec!["eng".into(), "ops".into()])),
    );

    let expected: Vec<String> = rows
        .iter()
        .filter(|r| {
            let age = r.value_of("age").as_number().unwrap();
            let dept = r.value_of("dept").display();
            (20.0..=60.0).contains(&age) && (dept == "eng" || dept == "ops")
        })
        .map(|r| r.value_of("name").display())
        .collect();
    assert_eq!(names(&model), expected);
}

#[test]
fn filter_on_unknown_column_is_ignored() {
    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_rows(vec![person(1, "a", 1.0, "eng", 0.0)]);
    model.set_filter_model(
        FilterModel::new().with("bogus", FilterPredicate::Bool(true)),
    );
    assert_eq!(model.display_len(), 1);
}

// --- grouping & aggregation ----------------------------------------------------

fn grouped_model() -> RowModel {
    let mut model = RowModel::new();
    model.set_columns(vec![
        ColumnSpec::new("id"),
        ColumnSpec::new("name"),
        ColumnSpec::new("dept"),
        ColumnSpec::new("salary").with_agg(AggFunc::Sum),
        ColumnSpec::new("age").with_agg(AggFunc::Avg),
    ]);
    model.set_rows(vec![
        person(1, "a", 30.0, "eng", 100.0),
        person(2, "b", 40.0, "ops", 50.0),
        person(3, "c", 50.0, "eng", 200.0),
    ]);
    model.set_group_columns(vec!["dept".into()]);
    model
}

#[test]
fn groups_start_collapsed_and_expand_in_place() {
    let mut model = grouped_model();
    assert_eq!(model.display_len(), 2);
    let eng = model.node_at(0).unwrap();
    assert!(eng.is_group());
    assert_eq!(eng.group().unwrap().key_text, "eng");
    assert_eq!(eng.group().unwrap().leaf_count, 2);

    let eng_id = eng.id.clone();
    assert!(model.set_expanded(&eng_id, true));
    assert_eq!(model.display_len(), 4);
    assert_eq!(names(&model), vec!["", "a", "c", ""]);
    assert_eq!(model.node_at(1).unwrap().level, 1);

    // Expanding an already expanded node is a no-op.
    assert!(!model.set_expanded(&eng_id, true));
}

#[test]
fn group_aggregates_are_exact() {
    let model = grouped_model();
    let eng = model.node_at(0).unwrap();
    let salary = model.column("salary").unwrap();
    let age = model.column("age").unwrap();
    assert_eq!(model.cell_value(eng, salary), CellValue::Number(300.0));
    assert_eq!(model.cell_value(eng, age), CellValue::Number(40.0));

    let ops = model.node_at(1).unwrap();
    assert_eq!(model.cell_value(ops, salary), CellValue::Number(50.0));
}

#[test]
fn aggregation_functions_reduce_correctly() {
    let values = vec![
        CellValue::Number(3.0),
        CellValue::Null,
        CellValue::Number(1.0),
        CellValue::Text("junk".into()),
        CellValue::Number(2.0),
    ];
    assert_eq!(AggFunc::Sum.apply(&values), CellValue::Number(6.0));
    assert_eq!(AggFunc::Avg.apply(&values), CellValue::Number(2.0));
    assert_eq!(AggFunc::Min.apply(&values), CellValue::Number(1.0));
    assert_eq!(AggFunc::Count.apply(&values), CellValue::Number(5.0));
    // Max sees the non-missing set; text ranks above numbers.
    assert_eq!(AggFunc::Max.apply(&values), CellValue::Text("junk".into()));

    assert_eq!(AggFunc::Sum.apply(&[CellValue::Null]), CellValue::Null);
    assert_eq!(AggFunc::Count.apply(&[]), CellValue::Number(0.0));

    let custom = AggFunc::Custom(Arc::new(|vals: &[CellValue]| {
        CellValue::Number(vals.len() as f64 * 100.0)
    }));
    assert_eq!(custom.apply(&values), CellValue::Number(500.0));
}

#[test]
fn nested_groups_bubble_aggregates() {
    let mut model = RowModel::new();
    model.set_columns(vec![
        ColumnSpec::new("id"),
        ColumnSpec::new("dept"),
        ColumnSpec::new("team"),
        ColumnSpec::new("salary").with_agg(AggFunc::Sum),
    ]);
    model.set_rows(vec![
        RowRecord::new()
            .with("id", 1i64)
            .with("dept", "eng")
            .with("team", "core")
            .with("salary", 10.0),
        RowRecord::new()
            .with("id", 2i64)
            .with("dept", "eng")
            .with("team", "infra")
            .with("salary", 20.0),
    ]);
    model.set_group_columns(vec!["dept".into(), "team".into()]);

    assert_eq!(model.display_len(), 1);
    let eng = model.node_at(0).unwrap();
    let salary = model.column("salary").unwrap().clone();
    assert_eq!(model.cell_value(eng, &salary), CellValue::Number(30.0));

    let eng_id = eng.id.clone();
    model.set_expanded(&eng_id, true);
    assert_eq!(model.display_len(), 3);
    let core = model.node_at(1).unwrap();
    assert!(core.is_group());
    assert_eq!(core.level, 1);
    assert_eq!(model.cell_value(core, &salary), CellValue::Number(10.0));
}

#[test]
fn display_length_matches_independent_flatten_oracle() {
    let depts = ["eng", "ops", "hr", "sales"];
    let mut rng = Lcg::new(99);
    let rows: Vec<RowRecord> = (0..60)
        .map(|i| {
            let dept = depts[rng.gen_range_usize(0, depts.len())];
            person(i, &format!("p{i}"), 0.0, dept, 1.0)
        })
        .collect();

    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_rows(rows.clone());
    model.set_group_columns(vec!["dept".into()]);

    let mut expanded: Vec<String> = Vec::new();
    for dept in depts {
        if rng.gen_range_usize(0, 2) == 1
            && model.set_expanded(&RowId::Group(format!("dept={dept}")), true)
        {
            expanded.push(dept.to_string());
        }
    }

    // Independent flatten: one row per distinct dept, plus the members of
    // every expanded dept.
    let mut seen: Vec<String> = Vec::new();
    let mut members: std::collections::HashMap<String, usize> =
        std::collections::HashMap::new();
    for r in &rows {
        let dept = r.value_of("dept").display();
        if !seen.contains(&dept) {
            seen.push(dept.clone());
        }
        *members.entry(dept).or_insert(0) += 1;
    }
    let expected: usize = seen.len() + expanded.iter().map(|d| members[d]).sum::<usize>();
    assert_eq!(model.display_len(), expected);
}

#[test]
fn group_order_follows_sorted_rows() {
    let mut model = grouped_model();
    model.set_sort_model(vec![SortKey::desc("dept")]);
    let first = model.node_at(0).unwrap().group().unwrap().key_text.clone();
    assert_eq!(first, "ops");
}

// --- pivot ---------------------------------------------------------------------

fn pivot_model() -> RowModel {
    let mut model = RowModel::new();
    model.set_columns(vec![
        ColumnSpec::new("id"),
        ColumnSpec::new("dept").with_row_group(true),
        ColumnSpec::new("year").with_pivot(true),
        ColumnSpec::new("salary").with_agg(AggFunc::Sum),
    ]);
    model.set_rows(vec![
        RowRecord::new()
            .with("id", 1i64)
            .with("dept", "eng")
            .with("year", "2023")
            .with("salary", 10.0),
        RowRecord::new()
            .with("id", 2i64)
            .with("dept", "eng")
            .with("year", "2024")
            .with("salary", 20.0),
        RowRecord::new()
            .with("id", 3i64)
            .with("dept", "ops")
            .with("year", "2023")
            .with("salary", 5.0),
    ]);
    model
}

#[test]
fn pivot_generates_synthetic_column_catalog() {
    let mut model = pivot_model();
    assert_eq!(model.effective_columns().len(), 4); // pivot off: host catalog

    model.set_pivot(vec![], PivotMode::On);
    let ids: Vec<&str> = model
        .effective_columns()
        .iter()
        .map(|c| c.id.as_str())
        .collect();
    assert_eq!(ids, vec!["2023::salary", "2024::salary"]);
    assert_eq!(model.effective_columns()[0].header, "2023 salary");
}

#[test]
fn pivot_matrix_values_resolve_per_group() {
    let mut model = pivot_model();
    model.set_pivot(vec![], PivotMode::On);
    assert_eq!(model.display_len(), 2);

    let col_2023 = model.column("2023::salary").unwrap().clone();
    let col_2024 = model.column("2024::salary").unwrap().clone();

    let eng = model.node_at(0).unwrap();
    assert_eq!(model.cell_value(eng, &col_2023), CellValue::Number(10.0));
    assert_eq!(model.cell_value(eng, &col_2024), CellValue::Number(20.0));

    // Combination absent from the data reads as Null.
    let ops = model.node_at(1).unwrap();
    assert_eq!(model.cell_value(ops, &col_2023), CellValue::Number(5.0));
    assert_eq!(model.cell_value(ops, &col_2024), CellValue::Null);
}

// --- identity & registry ---------------------------------------------------------

#[test]
fn selection_and_expansion_survive_pipeline_reruns() {
    let mut model = grouped_model();
    let eng_id = model.node_at(0).unwrap().id.clone();
    model.set_expanded(&eng_id, true);
    model.select_only(&RowId::Int(3));
    assert!(model.is_selected(&RowId::Int(3)));

    model.set_sort_model(vec![SortKey::desc("dept")]);
    assert!(model.is_expanded(&eng_id));
    assert!(model.is_selected(&RowId::Int(3)));

    // Filtering the row out keeps its node; dropping the filter restores it.
    model.set_filter_model(
        FilterModel::new().with("name", FilterPredicate::Text {
            op: TextOp::Equals,
            value: "b".into(),
        }),
    );
    assert!(model.display_index_of(&RowId::Int(3)).is_none());
    model.set_filter_model(FilterModel::new());
    assert!(model.is_selected(&RowId::Int(3)));
}

#[test]
fn set_rows_with_same_data_is_idempotent() {
    let rows = vec![
        person(1, "a", 30.0, "eng", 100.0),
        person(2, "b", 40.0, "ops", 50.0),
    ];
    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_rows(rows.clone());
    model.select_only(&RowId::Int(2));

    let before: Vec<RowId> = model.display_ids().to_vec();
    model.set_rows(rows);
    assert_eq!(model.display_ids(), before.as_slice());
    assert!(model.is_selected(&RowId::Int(2)));
}

#[test]
fn rows_without_identity_fall_back_to_position() {
    let mut model = RowModel::new();
    model.set_columns(vec![ColumnSpec::new("name")]);
    model.set_rows(vec![
        RowRecord::new().with("name", "x"),
        RowRecord::new().with("name", "y"),
    ]);
    assert_eq!(model.node_at(0).unwrap().id, RowId::Index(0));
    assert_eq!(model.node_at(1).unwrap().id, RowId::Index(1));
}

#[test]
fn custom_id_extractor_wins_over_id_field() {
    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_row_id_extractor(Some(|r: &RowRecord| {
        RowId::from_cell(&r.value_of("name"))
    }));
    model.set_rows(vec![person(1, "a", 0.0, "eng", 0.0)]);
    assert_eq!(model.node_at(0).unwrap().id, RowId::Text("a".into()));
}

// --- transactions -----------------------------------------------------------------

#[test]
fn transaction_add_update_remove_by_identity() {
    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_rows(vec![
        person(1, "a", 30.0, "eng", 0.0),
        person(2, "b", 40.0, "ops", 0.0),
        person(3, "c", 50.0, "eng", 0.0),
    ]);

    let result = model.apply_transaction(GridTransaction::new().with_remove(RowId::Int(1)));
    assert_eq!(result.removed, 1);
    assert_eq!(model.display_len(), 2);
    assert!(model.node_by_id(&RowId::Int(1)).is_none());

    let result = model.apply_transaction(
        GridTransaction::new()
            .with_update(person(2, "b2", 41.0, "ops", 0.0))
            .with_update(person(99, "ghost", 0.0, "eng", 0.0))
            .with_add(person(4, "d", 20.0, "hr", 0.0)),
    );
    assert_eq!(result.updated, 1);
    assert_eq!(result.added, 1);
    assert_eq!(model.display_len(), 3);
    let b2 = model.node_by_id(&RowId::Int(2)).unwrap();
    assert_eq!(
        model.record(b2).unwrap().value_of("name"),
        CellValue::Text("b2".into())
    );
    assert!(model.node_by_id(&RowId::Int(99)).is_none());
}

#[test]
fn point_update_merges_without_reordering() {
    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_rows(vec![
        person(1, "a", 30.0, "eng", 0.0),
        person(2, "b", 40.0, "ops", 0.0),
    ]);
    model.set_sort_model(vec![SortKey::asc("age")]);
    assert_eq!(names(&model), vec!["a", "b"]);

    // Patch moves "a" past "b" in sort terms, but the order stays stale.
    let patch = RowRecord::new().with("age", 99.0);
    let display = model.patch_row(&RowId::Int(1), &patch);
    assert_eq!(display, Some(0));
    assert_eq!(names(&model), vec!["a", "b"]);
    let a = model.node_by_id(&RowId::Int(1)).unwrap();
    assert_eq!(
        model.record(a).unwrap().value_of("age"),
        CellValue::Number(99.0)
    );
    // Other fields of the patched record survive the merge.
    assert_eq!(
        model.record(a).unwrap().value_of("name"),
        CellValue::Text("a".into())
    );

    assert!(model.patch_row(&RowId::Int(42), &patch).is_none());
}

// --- master/detail ------------------------------------------------------------------

#[test]
fn master_rows_expand_into_detail_rows() {
    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_is_master(Some(|r: &RowRecord| {
        r.value_of("master").as_bool().unwrap_or(false)
    }));
    model.set_rows(vec![
        person(1, "a", 30.0, "eng", 0.0).with("master", true),
        person(2, "b", 40.0, "ops", 0.0),
    ]);
    assert_eq!(model.display_len(), 2);

    assert!(model.set_expanded(&RowId::Int(1), true));
    assert_eq!(model.display_len(), 3);
    let detail = model.node_at(1).unwrap();
    assert!(detail.is_detail());
    assert_eq!(detail.id, RowId::Detail(Box::new(RowId::Int(1))));
    assert_eq!(model.row_height(1), Some(160));
    assert_eq!(model.total_height(), 24 + 160 + 24);

    // Plain records are not expandable.
    assert!(!model.set_expanded(&RowId::Int(2), true));
}

// --- height index ---------------------------------------------------------------------

#[test]
fn height_index_matches_linear_oracle() {
    let n = 50usize;
    let mut model = RowModel::new();
    model.set_columns(people_columns());
    model.set_rows(
        (0..n as i64)
            .map(|i| person(i, &format!("p{i}"), 0.0, "eng", 0.0))
            .collect(),
    );

    let mut rng = Lcg::new(42);
    let mut heights = vec![24u32; n];
    for (i, h) in heights.iter_mut().enumerate() {
        *h = rng.gen_range_u32(8, 64);
        model.set_row_height(&RowId::Int(i as i64), *h);
    }

    let mut prefix = 0u64;
    for (i, &h) in heights.iter().enumerate() {
        assert_eq!(model.row_offset(i), prefix);
        assert_eq!(model.row_at_offset(prefix), Some(i));
        assert_eq!(model.row_at_offset(prefix + h as u64 - 1), Some(i));
        prefix += h as u64;
    }
    assert_eq!(model.total_height(), prefix);
    assert_eq!(model.row_at_offset(prefix), None);
}

// --- damage ----------------------------------------------------------------------------

#[test]
fn full_damage_is_exclusive_with_finer_marks() {
    let mut damage = DamageTracker::new();
    damage.mark_row(3);
    damage.mark_cell(4, "name");
    assert!(damage.is_row_dirty(3));
    assert!(damage.is_row_dirty(4));

    damage.mark_full();
    damage.mark_row(9); // absorbed
    let snapshot = damage.take();
    assert!(snapshot.full);
    assert!(snapshot.rows.is_empty());
    assert!(snapshot.cells.is_empty());
    assert!(damage.is_clean());
}

#[test]
fn damage_snapshot_forces_full_when_appropriate() {
    let visible = VisibleRange { start: 0, end: 3 };

    let mut damage = DamageTracker::new();
    damage.mark_column("name");
    assert!(damage.take().forces_full(&visible));

    let mut damage = DamageTracker::new();
    damage.mark_row(0);
    damage.mark_row(1);
    damage.mark_cell(2, "name");
    assert!(damage.take().forces_full(&visible)); // rows cover the band

    let mut damage = DamageTracker::new();
    damage.mark_row(1);
    let snapshot = damage.take();
    assert!(!snapshot.forces_full(&visible));
    assert_eq!(snapshot.dirty_rows().into_iter().collect::<Vec<_>>(), vec![1]);
}

// --- renderer ---------------------------------------------------------------------------

fn painted_grid(rows: usize, w: f32, h: f32) -> (Grid, TestSurface) {
    let mut grid = Grid::new();
    grid.set_columns(vec![ColumnSpec::new("name")]);
    grid.set_rows(
        (0..rows as i64)
            .map(|i| RowRecord::new().with("id", i).with("name", format!("r{i}")))
            .collect(),
    );
    let mut surf = TestSurface::new(w, h);
    let stats = grid.paint_now(&mut surf);
    assert_eq!(stats.mode, PaintMode::Full);
    surf.ops.clear();
    (grid, surf)
}

#[test]
fn visible_range_applies_buffer_and_clamps() {
    let mut grid = Grid::new();
    grid.set_columns(vec![ColumnSpec::new("name")]);
    grid.set_rows(
        (0..100i64)
            .map(|i| RowRecord::new().with("id", i).with("name", "x"))
            .collect(),
    );
    let mut surf = TestSurface::new(100.0, 96.0);
    grid.paint_now(&mut surf);

    // 4 rows of 24 px fit; 5 buffer rows either side.
    assert_eq!(grid.visible_range(), VisibleRange { start: 0, end: 9 });

    grid.set_scroll(0.0, 480);
    assert_eq!(grid.visible_range(), VisibleRange { start: 15, end: 29 });

    // Clamped to the end of the content.
    grid.set_scroll(0.0, u64::MAX);
    assert_eq!(grid.renderer().scroll().1, 100 * 24 - 96);
}

#[test]
fn partial_repaint_touches_only_the_dirty_row() {
    let (mut grid, mut surf) = painted_grid(9, 200.0, 72.0);

    grid.invalidate_row(1);
    let stats = grid.on_frame(0, &mut surf);
    assert_eq!(stats.mode, PaintMode::Partial);
    assert_eq!(stats.rows_painted, 1);
    assert!(!surf.ops.is_empty());
    for op in &surf.ops {
        match op {
            Op::Fill(rect, _) => {
                assert!(rect.y >= 24.0 && rect.bottom() <= 48.0, "fill outside row 1: {rect:?}");
            }
            Op::Text(_, y, _) => assert!(*y >= 24.0 && *y < 48.0),
            other => panic!("unexpected op in partial repaint: {other:?}"),
        }
    }
}

#[test]
fn damage_outside_visible_band_paints_nothing() {
    let (mut grid, mut surf) = painted_grid(9, 200.0, 72.0);
    grid.invalidate_row(1000);
    let stats = grid.on_frame(0, &mut surf);
    assert_eq!(stats.mode, PaintMode::Partial);
    assert_eq!(stats.rows_painted, 0);
    assert!(surf.ops.is_empty());
}

#[test]
fn full_invalidation_repaints_the_visible_band() {
    let (mut grid, mut surf) = painted_grid(9, 200.0, 72.0);
    grid.invalidate_all();
    let stats = grid.on_frame(0, &mut surf);
    assert_eq!(stats.mode, PaintMode::Full);
    assert_eq!(stats.rows_painted, 8); // rows 0..3 visible plus 5 buffer rows below
}

#[test]
fn zero_sized_surface_defers_the_paint() {
    let mut grid = Grid::new();
    grid.set_columns(vec![ColumnSpec::new("name")]);
    grid.set_rows(vec![RowRecord::new().with("id", 1i64).with("name", "x")]);

    let mut empty = TestSurface::new(0.0, 0.0);
    let stats = grid.on_frame(0, &mut empty);
    assert_eq!(stats.mode, PaintMode::Skipped);
    assert!(!grid.damage().is_clean());
    assert!(grid.paint_pending());

    let mut surf = TestSurface::new(100.0, 48.0);
    let stats = grid.on_frame(1, &mut surf);
    assert_eq!(stats.mode, PaintMode::Full);
}

// --- blit -------------------------------------------------------------------------------

#[test]
fn blit_evaluation_geometry() {
    assert_eq!(blit::evaluate(0.0, 0, 96.0), BlitPlan::Repaint);
    assert_eq!(blit::evaluate(1.0, 24, 96.0), BlitPlan::Repaint); // horizontal moved
    assert_eq!(blit::evaluate(0.0, 96, 96.0), BlitPlan::Repaint); // nothing survives
    assert_eq!(
        blit::evaluate(0.0, 24, 96.0),
        BlitPlan::Reuse { dy: -24.0, exposed_h: 24.0 }
    );
    assert_eq!(
        blit::evaluate(0.0, -24, 96.0),
        BlitPlan::Reuse { dy: 24.0, exposed_h: 24.0 }
    );
}

#[test]
fn pure_scroll_reuses_pixels_and_paints_the_exposed_strip() {
    let (mut grid, mut surf) = painted_grid(100, 100.0, 96.0);

    grid.set_scroll(0.0, 24);
    let stats = grid.on_frame(0, &mut surf);
    assert_eq!(stats.mode, PaintMode::Blit);
    assert_eq!(stats.rows_painted, 1); // only the row entering at the bottom
    assert_eq!(
        surf.copies(),
        vec![&Op::Copy(RectPx::new(0.0, 24.0, 100.0, 72.0), 0.0, -24.0)]
    );

    // Scrolling back up exposes a strip at the top instead.
    surf.ops.clear();
    let stats = grid.on_frame(1, &mut surf);
    assert_eq!(stats.mode, PaintMode::Skipped); // nothing pending
    grid.set_scroll(0.0, 0);
    let stats = grid.on_frame(2, &mut surf);
    assert_eq!(stats.mode, PaintMode::Blit);
    assert_eq!(
        surf.copies(),
        vec![&Op::Copy(RectPx::new(0.0, 0.0, 100.0, 72.0), 0.0, 24.0)]
    );
}

#[test]
fn non_scroll_damage_disables_the_blit_path() {
    let (mut grid, mut surf) = painted_grid(100, 100.0, 96.0);
    grid.set_scroll(0.0, 24);
    grid.invalidate_row(0);
    let stats = grid.on_frame(0, &mut surf);
    assert_eq!(stats.mode, PaintMode::Full);
    assert!(surf.copies().is_empty());
}

// --- hit testing & pointer protocol ----------------------------------------------------

fn selectable_grid() -> (Grid, TestSurface) {
    let mut grid = Grid::new();
    grid.set_columns(vec![
        ColumnSpec::new("sel").as_selection_column().with_width(30.0),
        ColumnSpec::new("name"),
        ColumnSpec::new("age"),
    ]);
    grid.set_rows(vec![
        person(1, "a", 30.0, "eng", 0.0),
        person(2, "b", 40.0, "ops", 0.0),
        person(3, "c", 50.0, "eng", 0.0),
    ]);
    let mut surf = TestSurface::new(300.0, 96.0);
    grid.paint_now(&mut surf);
    (grid, surf)
}

#[test]
fn hit_test_resolves_row_and_column() {
    let (mut grid, _surf) = selectable_grid();
    let hit = grid.hit_test(50.0, 30.0).unwrap();
    assert_eq!(hit.row, 1);
    assert_eq!(hit.column.as_deref(), Some("name"));
    assert!(!hit.on_expand_glyph);
    assert!(!hit.on_selection_column);

    let hit = grid.hit_test(10.0, 5.0).unwrap();
    assert_eq!(hit.row, 0);
    assert!(hit.on_selection_column);

    assert!(grid.hit_test(50.0, 500.0).is_none()); // below the content
    assert!(grid.hit_test(-1.0, 5.0).is_none());
}

#[test]
fn pointer_selection_protocol() {
    let (mut grid, _surf) = selectable_grid();

    grid.pointer_down(50.0, 12.0, false);
    assert_eq!(grid.selected_ids(), vec![RowId::Int(1)]);

    // Plain click is exclusive.
    grid.pointer_down(50.0, 36.0, false);
    assert_eq!(grid.selected_ids(), vec![RowId::Int(2)]);

    // Modifier click toggles additively.
    grid.pointer_down(50.0, 12.0, true);
    assert_eq!(grid.selected_ids(), vec![RowId::Int(1), RowId::Int(2)]);

    // Selection-column click toggles just that row.
    grid.pointer_down(10.0, 36.0, false);
    assert_eq!(grid.selected_ids(), vec![RowId::Int(1)]);
}

#[test]
fn exclusive_select_damages_old_and_new_rows() {
    let (mut grid, mut surf) = selectable_grid();
    grid.pointer_down(50.0, 12.0, false);
    grid.on_frame(0, &mut surf);

    surf.ops.clear();
    grid.pointer_down(50.0, 36.0, false);
    let stats = grid.on_frame(1, &mut surf);
    assert_eq!(stats.mode, PaintMode::Partial);
    assert_eq!(stats.rows_painted, 2); // deselected row 0, selected row 1
}

#[test]
fn glyph_click_toggles_group_expansion_with_full_damage() {
    let mut grid = Grid::new();
    grid.set_columns(people_columns());
    grid.set_rows(vec![
        person(1, "a", 30.0, "eng", 100.0),
        person(2, "b", 40.0, "eng", 50.0),
        person(3, "c", 50.0, "ops", 75.0),
    ]);
    grid.set_group_columns(vec!["dept".into()]);
    let mut surf = TestSurface::new(300.0, 96.0);
    grid.paint_now(&mut surf);
    assert_eq!(grid.display_len(), 2);

    grid.pointer_down(5.0, 12.0, false);
    assert_eq!(grid.display_len(), 4);
    assert!(grid.damage().is_full());

    grid.pointer_down(5.0, 12.0, false);
    assert_eq!(grid.display_len(), 2);
}

#[test]
fn group_rows_paint_label_and_aggregates() {
    let mut grid = Grid::new();
    grid.set_columns(people_columns());
    grid.set_rows(vec![
        person(1, "a", 30.0, "eng", 100.0),
        person(2, "b", 40.0, "eng", 50.0),
    ]);
    grid.set_group_columns(vec!["dept".into()]);
    let mut surf = TestSurface::new(700.0, 96.0);
    grid.paint_now(&mut surf);

    let labels: Vec<&str> = surf
        .ops
        .iter()
        .filter_map(|op| match op {
            Op::Text(_, _, s) => Some(s.as_str()),
            _ => None,
        })
        .collect();
    assert!(labels.iter().any(|s| s.contains("dept: eng (2)")), "{labels:?}");
    assert!(labels.contains(&"150")); // sum(salary) cell
}

#[test]
fn double_click_on_record_cell_requests_edit() {
    let (mut grid, _surf) = selectable_grid();
    let event = grid.double_click(50.0, 12.0);
    assert_eq!(
        event,
        Some(GridEvent::EditRequested {
            row: 0,
            column: "name".into()
        })
    );
    assert_eq!(grid.take_events().len(), 1);
    assert!(grid.take_events().is_empty());
}

#[test]
fn double_click_on_group_row_is_ignored() {
    let mut grid = Grid::new();
    grid.set_columns(people_columns());
    grid.set_rows(vec![person(1, "a", 30.0, "eng", 0.0)]);
    grid.set_group_columns(vec!["dept".into()]);
    let mut surf = TestSurface::new(300.0, 96.0);
    grid.paint_now(&mut surf);
    assert!(grid.double_click(50.0, 12.0).is_none());
}

// --- cell renderers ------------------------------------------------------------------

#[test]
fn mini_chart_draws_a_polyline_over_the_series() {
    let mut grid = Grid::new();
    grid.set_columns(vec![
        ColumnSpec::new("trend").with_renderer(CellRenderer::MiniChart),
    ]);
    grid.set_rows(vec![
        RowRecord::new().with("id", 1i64).with("trend", "1, 3, 2"),
    ]);
    let mut surf = TestSurface::new(200.0, 48.0);
    grid.paint_now(&mut surf);
    assert!(surf.ops.contains(&Op::Polyline(3)));
}

#[test]
fn custom_renderer_formats_with_the_full_record() {
    let mut grid = Grid::new();
    let format: CellFormatFn = Arc::new(|value: &CellValue, record: &RowRecord| {
        format!("{}:{}", record.value_of("name").display(), value.display())
    });
    grid.set_columns(vec![
        ColumnSpec::new("name"),
        ColumnSpec::new("age").with_renderer(CellRenderer::Custom(format)),
    ]);
    grid.set_rows(vec![person(1, "a", 30.0, "eng", 0.0)]);
    let mut surf = TestSurface::new(400.0, 48.0);
    grid.paint_now(&mut surf);
    assert!(
        surf.ops
            .iter()
            .any(|op| matches!(op, Op::Text(_, _, s) if s == "a:30"))
    );
}

#[test]
fn text_truncation_binary_search() {
    let surf = TestSurface::new(100.0, 100.0);
    assert_eq!(
        truncate_to_width(&surf, "0123456789", 80.0).as_deref(),
        Some("0123456789")
    );
    assert_eq!(
        truncate_to_width(&surf, "0123456789", 79.0).as_deref(),
        Some("01234567…")
    );
    assert_eq!(
        truncate_to_width(&surf, "0123456789", 16.0).as_deref(),
        Some("0…")
    );
    assert_eq!(truncate_to_width(&surf, "0123456789", 10.0), None);
    assert_eq!(truncate_to_width(&surf, "", 100.0), None);
}

// --- scheduler & batching -----------------------------------------------------------

#[test]
fn paint_requests_coalesce() {
    let mut scheduler = FrameScheduler::new();
    scheduler.request_paint();
    scheduler.request_paint();
    assert!(scheduler.take_paint());
    assert!(!scheduler.take_paint());
}

#[test]
fn flush_deadline_replaces_and_cancels() {
    let mut scheduler = FrameScheduler::new();
    scheduler.schedule_flush(100);
    scheduler.schedule_flush(200); // replaced, not stacked
    assert!(!scheduler.take_due_flush(150));
    assert!(scheduler.take_due_flush(200));
    assert!(!scheduler.take_due_flush(300));

    scheduler.schedule_flush(50);
    scheduler.cancel_flush();
    assert!(!scheduler.take_due_flush(1_000));
}

#[test]
fn updates_buffer_until_the_interval_elapses() {
    let mut grid = Grid::new();
    grid.set_columns(people_columns());
    grid.set_rows(Vec::new());
    let mut surf = TestSurface::new(300.0, 200.0);
    grid.paint_now(&mut surf);

    for i in 0..5 {
        grid.push_update(person(i, &format!("p{i}"), 0.0, "eng", 0.0), 0);
    }
    assert_eq!(grid.display_len(), 0);
    assert_eq!(grid.pending_update_len(), 5);

    let stats = grid.on_frame(50, &mut surf);
    assert_eq!(stats.mode, PaintMode::Skipped);
    assert_eq!(grid.display_len(), 0);

    let before = grid.model().transaction_count();
    let stats = grid.on_frame(100, &mut surf);
    assert_eq!(grid.display_len(), 5);
    assert_eq!(grid.pending_update_len(), 0);
    // All buffered records land in exactly one transaction and one paint.
    assert_eq!(grid.model().transaction_count(), before + 1);
    assert_ne!(stats.mode, PaintMode::Skipped);
    assert!(!grid.paint_pending());
}

#[test]
fn pushes_while_pending_do_not_rearm_the_deadline() {
    let mut grid = Grid::new();
    grid.set_columns(people_columns());
    grid.set_rows(Vec::new());
    let mut surf = TestSurface::new(300.0, 96.0);
    grid.paint_now(&mut surf);

    grid.push_update(person(1, "a", 0.0, "eng", 0.0), 0);
    grid.push_update(person(2, "b", 0.0, "eng", 0.0), 50);
    grid.on_frame(99, &mut surf);
    assert_eq!(grid.display_len(), 0);
    grid.on_frame(100, &mut surf);
    assert_eq!(grid.display_len(), 2);
}

#[test]
fn flush_interval_clamps_to_the_frame_floor() {
    let mut grid = Grid::new();
    grid.set_columns(people_columns());
    grid.set_rows(Vec::new());
    grid.set_batch_interval_ms(1);
    let mut surf = TestSurface::new(300.0, 96.0);
    grid.paint_now(&mut surf);

    grid.push_update(person(1, "a", 0.0, "eng", 0.0), 0);
    grid.on_frame(MIN_FLUSH_INTERVAL_MS - 1, &mut surf);
    assert_eq!(grid.display_len(), 0);
    grid.on_frame(MIN_FLUSH_INTERVAL_MS, &mut surf);
    assert_eq!(grid.display_len(), 1);
}

#[test]
fn manual_flush_applies_even_an_empty_buffer_atomically() {
    let mut grid = Grid::new();
    grid.set_columns(people_columns());
    grid.set_rows(Vec::new());

    let before = grid.model().transaction_count();
    let result = grid.flush_updates();
    assert_eq!(result.added, 0);
    assert_eq!(grid.model().transaction_count(), before + 1);

    grid.push_update(person(1, "a", 0.0, "eng", 0.0), 0);
    let result = grid.flush_updates();
    assert_eq!(result.added, 1);
    // The armed deadline died with the manual flush.
    let mut surf = TestSurface::new(300.0, 96.0);
    grid.paint_now(&mut surf);
    let before = grid.model().transaction_count();
    grid.on_frame(10_000, &mut surf);
    assert_eq!(grid.model().transaction_count(), before);
}

#[test]
fn point_update_by_id_marks_only_that_row() {
    let (mut grid, mut surf) = painted_grid(9, 200.0, 72.0);
    let patch = RowRecord::new().with("name", "patched");
    assert!(grid.update_by_id(&RowId::Int(1), &patch));
    let stats = grid.on_frame(0, &mut surf);
    assert_eq!(stats.mode, PaintMode::Partial);
    assert_eq!(stats.rows_painted, 1);
    assert!(
        surf.ops
            .iter()
            .any(|op| matches!(op, Op::Text(_, _, s) if s == "patched"))
    );

    assert!(!grid.update_by_id(&RowId::Int(999), &patch));
}

// --- persisted state ----------------------------------------------------------------

#[test]
fn restore_state_reorders_and_reconfigures_known_columns() {
    let mut grid = Grid::new();
    grid.set_columns(vec![
        ColumnSpec::new("a"),
        ColumnSpec::new("b"),
        ColumnSpec::new("c"),
    ]);

    let state = GridState {
        sort: vec![SortKey::desc("a")],
        filter: FilterModel::new().with("a", FilterPredicate::Number {
            op: CompareOp::GreaterThan,
            value: 1.0,
        }),
        columns: vec![
            ColumnState {
                id: "c".into(),
                width: 200.0,
                pin: PinSide::Left,
                hidden: false,
            },
            ColumnState {
                id: "ghost".into(),
                width: 50.0,
                pin: PinSide::None,
                hidden: false,
            },
            ColumnState {
                id: "a".into(),
                width: 80.0,
                pin: PinSide::None,
                hidden: true,
            },
        ],
    };
    grid.restore_state(&state);

    let cols = grid.model().host_columns();
    let ids: Vec<&str> = cols.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "a", "b"]); // ghost ignored, b trails
    assert_eq!(cols[0].width, 200.0);
    assert_eq!(cols[0].pin, PinSide::Left);
    assert!(cols[1].hidden);
    assert_eq!(cols[2].width, 120.0);

    assert_eq!(grid.model().sort_model(), &state.sort);
    assert!(grid.model().filter_model().get("a").is_some());
}

#[test]
fn capture_state_round_trips_through_restore() {
    let mut grid = Grid::new();
    grid.set_columns(vec![
        ColumnSpec::new("a").with_pin(PinSide::Left),
        ColumnSpec::new("b").with_hidden(true),
    ]);
    grid.set_sort_model(vec![SortKey::asc("b")]);

    let state = grid.capture_state();
    let mut other = Grid::new();
    other.set_columns(vec![ColumnSpec::new("b"), ColumnSpec::new("a")]);
    other.restore_state(&state);
    assert_eq!(other.capture_state(), state);
}

#[cfg(feature = "serde")]
#[test]
fn grid_state_serde_round_trip() {
    let state = GridState {
        sort: vec![SortKey::asc("name"), SortKey::desc("age")],
        filter: FilterModel::new()
            .with("age", FilterPredicate::NumberInRange { low: 1.0, high: 9.0 })
            .with("dept", FilterPredicate::InSet(vec!["eng".into()])),
        columns: vec![ColumnState {
            id: "name".into(),
            width: 140.0,
            pin: PinSide::Right,
            hidden: false,
        }],
    };
    let json = serde_json::to_string(&state).unwrap();
    let back: GridState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, state);
}
