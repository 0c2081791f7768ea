//! Graph storage for one snapshot.
//!
//! ## Lifecycle
//!
//! 1. Synthetic roots are added first, so the root is always node 0
//! 2. Extraction appends nodes and edges in any order
//! 3. [`GraphStore::finalize_children`] groups every edge under its source
//! 4. Lookups by [`ObjectId`] build a sorted index on first use; the node
//!    set is frozen from then on

pub mod names;
pub mod summary;

use std::cell::OnceCell;
use std::collections::TryReserveError;

use crate::host::RootCategory;
use crate::registry::{subroot_id, HeapSample, GC_ROOTS_ID, ROOT_ID};
use crate::types::{Edge, EdgeKind, EdgeLabel, Name, Node, NodeIndex, NodeKind, ObjectId};

pub use names::Names;
pub use summary::SnapshotSummary;

/// Name of the synthetic GC roots node.
pub const GC_ROOTS_NAME: &str = "(GC roots)";

/// Index of the synthetic root node.
pub const ROOT_INDEX: NodeIndex = 0;

/// Index of the synthetic GC roots node.
pub const GC_ROOTS_INDEX: NodeIndex = 1;

/// Nodes, edges and names of one snapshot.
#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// Edge indices grouped by source node, valid after finalization.
    children: Vec<usize>,
    children_finalized: bool,
    names: Names,
    sorted_by_id: OnceCell<Vec<NodeIndex>>,
    samples: Vec<HeapSample>,
}

impl GraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve room for additional nodes and edges.
    pub fn reserve(&mut self, nodes: usize, edges: usize) -> Result<(), TryReserveError> {
        self.nodes.try_reserve(nodes)?;
        self.edges.try_reserve(edges)
    }

    /// Intern a name in this snapshot's name table.
    pub fn intern(&mut self, text: &str) -> Name {
        self.names.intern(text)
    }

    /// The name table.
    pub fn names(&self) -> &Names {
        &self.names
    }

    /// Add the root, the GC roots node and one subroot per root category.
    ///
    /// Must be called on an empty store.
    pub fn add_synthetic_roots(&mut self) {
        assert!(self.nodes.is_empty(), "synthetic roots must be added first");
        self.add_node(NodeKind::Synthetic, "", ROOT_ID, 0, 0);
        self.add_node(NodeKind::Synthetic, GC_ROOTS_NAME, GC_ROOTS_ID, 0, 0);
        for category in RootCategory::ALL {
            self.add_node(NodeKind::Synthetic, category.label(), subroot_id(category), 0, 0);
        }
    }

    /// Index of the subroot node for `category`.
    pub fn subroot_index(category: RootCategory) -> NodeIndex {
        GC_ROOTS_INDEX + 1 + category.ordinal()
    }

    /// Append a node.
    pub fn add_node(
        &mut self,
        kind: NodeKind,
        name: &str,
        id: ObjectId,
        self_size: u64,
        trace_node_id: u32,
    ) -> NodeIndex {
        assert!(
            self.sorted_by_id.get().is_none(),
            "nodes added after the ID index was built"
        );
        debug_assert!(
            !self.nodes.is_empty() || id == ROOT_ID,
            "the root must be the first node"
        );
        let name = self.names.intern(name);
        self.nodes.push(Node::new(kind, name, id, self_size, trace_node_id));
        self.nodes.len() - 1
    }

    /// Append an edge owned by `from`.
    pub fn add_edge(&mut self, kind: EdgeKind, label: EdgeLabel, from: NodeIndex, to: NodeIndex) {
        debug_assert!(!self.children_finalized, "edge added after finalization");
        debug_assert!(to < self.nodes.len(), "dangling edge target {to}");
        self.nodes[from].child_count += 1;
        self.edges.push(Edge::new(kind, label, from, to));
    }

    /// Give an unnamed node a name.
    pub fn set_name_if_empty(&mut self, index: NodeIndex, name: &str) {
        if self.nodes[index].name.is_empty() {
            self.nodes[index].name = self.names.intern(name);
        }
    }

    /// Group edges by source node.
    ///
    /// Computes each node's `child_start_index` as a prefix sum of child
    /// counts, then places every edge in its source's bucket, keeping
    /// insertion order within a bucket.
    pub fn finalize_children(&mut self) {
        let mut start = 0u32;
        for node in &mut self.nodes {
            node.child_start_index = start;
            start += node.child_count;
        }
        debug_assert_eq!(start as usize, self.edges.len());

        let mut cursor: Vec<u32> = self.nodes.iter().map(|n| n.child_start_index).collect();
        self.children = vec![0; self.edges.len()];
        for (edge_index, edge) in self.edges.iter().enumerate() {
            let slot = &mut cursor[edge.from];
            self.children[*slot as usize] = edge_index;
            *slot += 1;
        }
        self.children_finalized = true;
    }

    /// Whether [`finalize_children`](Self::finalize_children) has run.
    pub fn is_finalized(&self) -> bool {
        self.children_finalized
    }

    /// Outgoing edges of a node, in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if children have not been finalized.
    pub fn children(&self, index: NodeIndex) -> impl Iterator<Item = &Edge> + '_ {
        assert!(self.children_finalized, "children read before finalization");
        let node = &self.nodes[index];
        let start = node.child_start_index as usize;
        let end = start + node.child_count as usize;
        self.children[start..end].iter().map(move |&e| &self.edges[e])
    }

    /// Node with the given ID. Freezes the node set.
    pub fn lookup_by_id(&self, id: ObjectId) -> Option<NodeIndex> {
        let sorted = self.sorted_by_id.get_or_init(|| {
            let mut indices: Vec<NodeIndex> = (0..self.nodes.len()).collect();
            indices.sort_by_key(|&i| self.nodes[i].id);
            indices
        });
        sorted
            .binary_search_by_key(&id, |&i| self.nodes[i].id)
            .ok()
            .map(|position| sorted[position])
    }

    /// Node at `index`.
    pub fn node(&self, index: NodeIndex) -> &Node {
        &self.nodes[index]
    }

    /// All nodes, root first.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Attach heap-stats samples to this snapshot.
    pub fn set_samples(&mut self, samples: Vec<HeapSample>) {
        self.samples = samples;
    }

    /// Heap-stats samples attached to this snapshot.
    pub fn samples(&self) -> &[HeapSample] {
        &self.samples
    }
}
