use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{AggFunc, CellValue, ColumnId, RowRecord};

/// Synthetic aggregate node: all filtered rows sharing one group key,
/// possibly partitioned further by the remaining group-by columns.
#[derive(Clone, Debug)]
pub struct GroupBucket {
    /// Group-by column that produced this bucket.
    pub column: ColumnId,
    /// The shared key value.
    pub key: CellValue,
    /// Display form of the key; also used for bucket identity.
    pub key_text: String,
    pub children: GroupChildren,
    /// Leaf record indices of the whole subtree, in display order.
    pub leaf_rows: Vec<usize>,
    /// field → aggregate over the subtree's leaves.
    pub aggregates: BTreeMap<String, CellValue>,
    /// pivot key → (field → aggregate) matrix, present when pivoting.
    pub pivot: BTreeMap<String, BTreeMap<String, CellValue>>,
}

#[derive(Clone, Debug)]
pub enum GroupChildren {
    /// Leaf level: indices into the row store.
    Records(Vec<usize>),
    /// Inner level: nested buckets for the next group-by column.
    Buckets(Vec<GroupBucket>),
}

impl GroupBucket {
    pub fn leaf_count(&self) -> usize {
        self.leaf_rows.len()
    }

    pub fn child_count(&self) -> usize {
        match &self.children {
            GroupChildren::Records(r) => r.len(),
            GroupChildren::Buckets(b) => b.len(),
        }
    }
}

/// Partitions `ordered` rows by successive group-by columns into a bucket
/// tree. Buckets appear in order of first appearance, which under an active
/// sort model means sorted by the group column when the host sorts on it.
pub(crate) fn build_group_tree(
    rows: &[RowRecord],
    ordered: &[usize],
    group_fields: &[(ColumnId, String)],
    value_cols: &[(String, AggFunc)],
    pivot_fields: &[String],
) -> Vec<GroupBucket> {
    build_level(rows, ordered, group_fields, value_cols, pivot_fields)
}

fn build_level(
    rows: &[RowRecord],
    ordered: &[usize],
    group_fields: &[(ColumnId, String)],
    value_cols: &[(String, AggFunc)],
    pivot_fields: &[String],
) -> Vec<GroupBucket> {
    let Some(((column, field), rest)) = group_fields.split_first() else {
        return Vec::new();
    };

    // Partition preserving order of first appearance.
    let mut order: Vec<String> = Vec::new();
    let mut partitions: HashMap<String, (CellValue, Vec<usize>)> = HashMap::new();
    for &row in ordered {
        let value = rows[row].value_of(field);
        let key = value.display();
        match partitions.get_mut(&key) {
            Some((_, members)) => members.push(row),
            None => {
                order.push(key.clone());
                partitions.insert(key, (value, vec![row]));
            }
        }
    }

    let mut buckets = Vec::with_capacity(order.len());
    for key_text in order {
        let (key, members) = partitions
            .remove(&key_text)
            .unwrap_or((CellValue::Null, Vec::new()));
        let (children, leaf_rows) = if rest.is_empty() {
            (GroupChildren::Records(members.clone()), members)
        } else {
            let nested = build_level(rows, &members, rest, value_cols, pivot_fields);
            (GroupChildren::Buckets(nested), members)
        };

        let aggregates = aggregate_fields(rows, &leaf_rows, value_cols);
        let pivot = if pivot_fields.is_empty() {
            BTreeMap::new()
        } else {
            build_pivot_matrix(rows, &leaf_rows, pivot_fields, value_cols)
        };

        buckets.push(GroupBucket {
            column: column.clone(),
            key,
            key_text,
            children,
            leaf_rows,
            aggregates,
            pivot,
        });
    }
    buckets
}

/// Aggregates every value column over a set of leaf rows.
fn aggregate_fields(
    rows: &[RowRecord],
    leaves: &[usize],
    value_cols: &[(String, AggFunc)],
) -> BTreeMap<String, CellValue> {
    let mut out = BTreeMap::new();
    for (field, agg) in value_cols {
        let values: Vec<CellValue> = leaves.iter().map(|&i| rows[i].value_of(field)).collect();
        out.insert(field.clone(), agg.apply(&values));
    }
    out
}

/// Secondary partition of a bucket's leaves by pivot key, aggregating each
/// cell of the resulting matrix. Multiple pivot columns compose their key
/// display forms.
fn build_pivot_matrix(
    rows: &[RowRecord],
    leaves: &[usize],
    pivot_fields: &[String],
    value_cols: &[(String, AggFunc)],
) -> BTreeMap<String, BTreeMap<String, CellValue>> {
    let mut cells: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for &row in leaves {
        let key = pivot_key_for(&rows[row], pivot_fields);
        cells.entry(key).or_default().push(row);
    }

    let mut out = BTreeMap::new();
    for (key, members) in cells {
        out.insert(key, aggregate_fields(rows, &members, value_cols));
    }
    out
}

pub(crate) fn pivot_key_for(record: &RowRecord, pivot_fields: &[String]) -> String {
    let parts: Vec<String> = pivot_fields
        .iter()
        .map(|f| record.value_of(f).display())
        .collect();
    parts.join(" / ")
}

/// Distinct pivot keys across the whole tree, sorted. Drives regeneration of
/// the synthetic pivot column catalog.
pub(crate) fn collect_pivot_keys(buckets: &[GroupBucket]) -> Vec<String> {
    let mut keys = BTreeSet::new();
    collect_into(buckets, &mut keys);
    keys.into_iter().collect()
}

fn collect_into(buckets: &[GroupBucket], keys: &mut BTreeSet<String>) {
    for bucket in buckets {
        keys.extend(bucket.pivot.keys().cloned());
        if let GroupChildren::Buckets(nested) = &bucket.children {
            collect_into(nested, keys);
        }
    }
}
