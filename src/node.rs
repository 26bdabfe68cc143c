use std::collections::{BTreeMap, HashMap};

use crate::{CellValue, ColumnId, GroupBucket, RowId};

/// Group data carried by a group node, lifted out of the bucket tree during
/// flattening so a node is self-contained for painting and queries.
#[derive(Clone, Debug)]
pub struct GroupInfo {
    pub column: ColumnId,
    pub key: CellValue,
    pub key_text: String,
    /// Direct children (records or nested buckets).
    pub child_count: usize,
    /// Leaf records in the whole subtree.
    pub leaf_count: usize,
    pub aggregates: BTreeMap<String, CellValue>,
    pub pivot: BTreeMap<String, BTreeMap<String, CellValue>>,
}

impl GroupInfo {
    pub(crate) fn from_bucket(bucket: &GroupBucket) -> Self {
        Self {
            column: bucket.column.clone(),
            key: bucket.key.clone(),
            key_text: bucket.key_text.clone(),
            child_count: bucket.child_count(),
            leaf_count: bucket.leaf_count(),
            aggregates: bucket.aggregates.clone(),
            pivot: bucket.pivot.clone(),
        }
    }
}

/// What a row node wraps. Pipeline code matches on this exhaustively
/// instead of duck-typing on marker flags.
#[derive(Clone, Debug)]
pub enum NodeData {
    /// Index into the model's row store.
    Record(usize),
    Group(GroupInfo),
    /// Synthetic detail row inserted after its expanded master.
    Detail,
}

/// Stable wrapper over a record or synthetic aggregate.
///
/// Nodes live in the identity-keyed registry and survive pipeline reruns:
/// `data`, `level` and position indexes are refreshed each rerun while
/// `expanded`, `selected` and the height override persist.
#[derive(Clone, Debug)]
pub struct RowNode {
    pub id: RowId,
    /// Hierarchy depth: 0 for top-level rows, +1 per group level.
    pub level: usize,
    pub data: NodeData,
    /// Matches the host's "is master" predicate; expandable into a detail row.
    pub master: bool,
    pub expanded: bool,
    pub selected: bool,
    /// Per-row height override (e.g. detail rows); `None` uses the default.
    pub height: Option<u32>,
    /// Position before the pipeline ran (source row index; 0 for synthetics).
    pub source_index: usize,
    /// Position in the current display list.
    pub display_index: usize,
    pub(crate) epoch: u64,
}

impl RowNode {
    pub fn is_group(&self) -> bool {
        matches!(self.data, NodeData::Group(_))
    }

    pub fn is_detail(&self) -> bool {
        matches!(self.data, NodeData::Detail)
    }

    pub fn group(&self) -> Option<&GroupInfo> {
        match &self.data {
            NodeData::Group(g) => Some(g),
            _ => None,
        }
    }

    /// Whether the expand/collapse glyph applies to this node.
    pub fn expandable(&self) -> bool {
        self.is_group() || self.master
    }
}

/// Identity-keyed arena of row nodes.
///
/// Each pipeline rerun reconciles into this registry: surviving identities
/// are updated in place, new ones inserted, and entries whose identity
/// disappeared from the source data are dropped. UI state (selection,
/// expansion, height override) therefore deterministically survives
/// sort/filter/group changes.
#[derive(Debug, Default)]
pub(crate) struct NodeRegistry {
    nodes: HashMap<RowId, RowNode>,
    epoch: u64,
}

impl NodeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin_rerun(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Updates or inserts the node for `id`, preserving persistent UI state
    /// on an existing entry. Returns whether the node is currently expanded.
    pub(crate) fn reconcile(
        &mut self,
        id: RowId,
        level: usize,
        data: NodeData,
        master: bool,
        source_index: usize,
        display_index: usize,
        default_height: Option<u32>,
    ) -> bool {
        let epoch = self.epoch;
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.level = level;
                node.data = data;
                node.master = master;
                node.source_index = source_index;
                node.display_index = display_index;
                node.epoch = epoch;
                node.expanded
            }
            None => {
                let node = RowNode {
                    id: id.clone(),
                    level,
                    data,
                    master,
                    expanded: false,
                    selected: false,
                    height: default_height,
                    source_index,
                    display_index,
                    epoch,
                };
                let expanded = node.expanded;
                self.nodes.insert(id, node);
                expanded
            }
        }
    }

    /// Drops entries that neither took part in this rerun nor satisfy
    /// `keep` (used to retain filtered-out record nodes so their selection
    /// state survives a filter round-trip).
    pub(crate) fn finish_rerun(&mut self, keep: impl Fn(&RowId) -> bool) {
        let epoch = self.epoch;
        self.nodes.retain(|id, node| node.epoch == epoch || keep(id));
    }

    pub(crate) fn get(&self, id: &RowId) -> Option<&RowNode> {
        self.nodes.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &RowId) -> Option<&mut RowNode> {
        self.nodes.get_mut(id)
    }

    /// Expansion state for an identity, defaulting to collapsed. Consulted
    /// during flattening before the node is reconciled.
    pub(crate) fn is_expanded(&self, id: &RowId) -> bool {
        self.nodes.get(id).map(|n| n.expanded).unwrap_or(false)
    }

    pub(crate) fn for_each_mut(&mut self, mut f: impl FnMut(&mut RowNode)) {
        for node in self.nodes.values_mut() {
            f(node);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }
}
