//! Order-independent fingerprint of a captured graph.
//!
//! Two captures of the same heap yield the same `snapshot_id` regardless of
//! the order in which objects were visited. Edges are keyed by object ID
//! rather than node index, since node indices depend on visit order.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_hash_hex, to_canonical_bytes};
use crate::SNAPSHOT_FORMAT_VERSION;

use super::GraphStore;

/// Fingerprint of a [`GraphStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSummary {
    /// xxh64 of all hashed components.
    pub snapshot_id: String,
    /// Number of nodes.
    pub node_count: u64,
    /// Number of edges.
    pub edge_count: u64,
    /// Total self size of all nodes.
    pub total_size: u64,
    /// Format version the summary was computed with.
    pub format_version: String,
    /// Hash of the sorted node IDs.
    pub node_id_hash: String,
    /// Hash of the sorted edge tuples.
    pub edge_hash: String,
    /// Unix timestamp when this summary was computed.
    pub computed_at: i64,
}

#[derive(Serialize)]
struct SummaryIdInput<'a> {
    node_count: u64,
    edge_count: u64,
    total_size: u64,
    format_version: &'a str,
    node_id_hash: &'a str,
    edge_hash: &'a str,
}

impl SnapshotSummary {
    /// Summarize a store.
    pub fn compute(store: &GraphStore) -> Self {
        let nodes = store.nodes();
        let node_count = nodes.len() as u64;
        let edge_count = store.edge_count() as u64;
        let total_size = nodes.iter().map(|n| n.self_size).sum();

        let mut node_ids: Vec<(u64, u32, &str)> = nodes
            .iter()
            .map(|n| (n.id.get(), n.kind.wire_code(), &*n.name))
            .collect();
        node_ids.sort_unstable();
        let node_id_hash = canonical_hash_hex(&node_ids);

        let mut edges: Vec<(u64, u32, String, u64)> = store
            .edges()
            .iter()
            .map(|e| {
                (
                    nodes[e.from].id.get(),
                    e.kind.wire_code(),
                    e.label.to_string(),
                    nodes[e.to].id.get(),
                )
            })
            .collect();
        edges.sort_unstable();
        let edge_hash = canonical_hash_hex(&edges);

        let snapshot_id = canonical_hash_hex(&SummaryIdInput {
            node_count,
            edge_count,
            total_size,
            format_version: SNAPSHOT_FORMAT_VERSION,
            node_id_hash: &node_id_hash,
            edge_hash: &edge_hash,
        });

        Self {
            snapshot_id,
            node_count,
            edge_count,
            total_size,
            format_version: SNAPSHOT_FORMAT_VERSION.to_string(),
            node_id_hash,
            edge_hash,
            computed_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Serialize to canonical JSON bytes.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        to_canonical_bytes(self)
    }

    /// Whether `store` has the same fingerprint.
    pub fn matches(&self, store: &GraphStore) -> bool {
        self.snapshot_id == Self::compute(store).snapshot_id
    }
}
