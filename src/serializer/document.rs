//! Reading serialized snapshots back.

use serde::{Deserialize, Serialize};

use super::{EDGE_FIELD_COUNT, NODE_FIELD_COUNT};
use crate::types::{EdgeKind, NodeKind};

/// Layout description written under `snapshot.meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Names of the per-node numbers.
    pub node_fields: Vec<String>,
    /// Types of the per-node numbers; the first entry lists node kinds.
    pub node_types: Vec<serde_json::Value>,
    /// Names of the per-edge numbers.
    pub edge_fields: Vec<String>,
    /// Types of the per-edge numbers; the first entry lists edge kinds.
    pub edge_types: Vec<serde_json::Value>,
    /// Fields of allocation trace function infos.
    #[serde(default)]
    pub trace_function_info_fields: Vec<String>,
    /// Fields of allocation trace tree nodes.
    #[serde(default)]
    pub trace_node_fields: Vec<String>,
    /// Fields of heap-stats samples.
    #[serde(default)]
    pub sample_fields: Vec<String>,
}

/// The `snapshot` header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Layout description.
    pub meta: SnapshotMeta,
    /// Number of nodes.
    pub node_count: usize,
    /// Number of edges.
    pub edge_count: usize,
    /// Number of allocation trace functions.
    #[serde(default)]
    pub trace_function_count: u32,
}

/// A complete serialized snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotDocument {
    /// Header.
    pub snapshot: SnapshotHeader,
    /// Flat node tuples.
    pub nodes: Vec<u64>,
    /// Flat edge tuples, grouped by source node.
    pub edges: Vec<u64>,
    /// Allocation trace functions.
    #[serde(default)]
    pub trace_function_infos: Vec<u64>,
    /// Allocation trace tree.
    #[serde(default)]
    pub trace_tree: Vec<serde_json::Value>,
    /// Flat heap-stats samples.
    #[serde(default)]
    pub samples: Vec<i64>,
    /// String table.
    pub strings: Vec<String>,
}

/// One node of a decoded document.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedNode<'d> {
    /// Kind, `None` for an unknown code.
    pub kind: Option<NodeKind>,
    /// Name.
    pub name: &'d str,
    /// Object ID.
    pub id: u64,
    /// Self size.
    pub self_size: u64,
    /// Number of outgoing edges.
    pub edge_count: usize,
    /// Allocation trace node.
    pub trace_node_id: u64,
}

/// One edge of a decoded document.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEdge<'d> {
    /// Source node index.
    pub from: usize,
    /// Kind, `None` for an unknown code.
    pub kind: Option<EdgeKind>,
    /// Name, for named kinds.
    pub name: Option<&'d str>,
    /// Index, for indexed kinds.
    pub index: Option<u64>,
    /// Target node index.
    pub to: usize,
}

/// Parse a complete document.
pub fn decode(json: &str) -> serde_json::Result<SnapshotDocument> {
    serde_json::from_str(json)
}

impl SnapshotDocument {
    /// String at `index`.
    pub fn string(&self, index: u64) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    /// Nodes in document order. Nodes with an out-of-range name index get
    /// an empty name.
    pub fn nodes(&self) -> impl Iterator<Item = DecodedNode<'_>> + '_ {
        self.nodes.chunks_exact(NODE_FIELD_COUNT).map(move |fields| DecodedNode {
            kind: u32::try_from(fields[0]).ok().and_then(NodeKind::from_wire_code),
            name: self.string(fields[1]).unwrap_or(""),
            id: fields[2],
            self_size: fields[3],
            edge_count: fields[4] as usize,
            trace_node_id: fields[5],
        })
    }

    /// Edges with their source node, recovered from the per-node edge
    /// counts.
    pub fn edges(&self) -> Vec<DecodedEdge<'_>> {
        let mut tuples = self.edges.chunks_exact(EDGE_FIELD_COUNT);
        let mut edges = Vec::with_capacity(self.edges.len() / EDGE_FIELD_COUNT);
        for (from, node) in self.nodes().enumerate() {
            for fields in tuples.by_ref().take(node.edge_count) {
                let kind = u32::try_from(fields[0]).ok().and_then(EdgeKind::from_wire_code);
                let indexed = kind.map_or(false, EdgeKind::is_indexed);
                edges.push(DecodedEdge {
                    from,
                    kind,
                    name: if indexed { None } else { self.string(fields[1]) },
                    index: indexed.then_some(fields[1]),
                    to: fields[2] as usize / NODE_FIELD_COUNT,
                });
            }
        }
        edges
    }
}
