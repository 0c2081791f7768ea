//! Node types for the heap graph.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::Name;

/// Position of a node inside a [`GraphStore`](crate::store::GraphStore).
///
/// Edges refer to nodes by index, not by [`ObjectId`], so cycles need no
/// special handling.
pub type NodeIndex = usize;

/// Stable identity of a heap object across relocations and snapshots.
///
/// IDs are partitioned by parity: even IDs belong to objects owned by the
/// managed runtime (and to the synthetic roots), odd IDs belong to native
/// companion objects. `ObjectId(0)` is reserved for "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The reserved "unknown" ID.
    pub const UNKNOWN: ObjectId = ObjectId(0);

    /// Wrap a raw ID.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the reserved "unknown" ID.
    pub const fn is_unknown(self) -> bool {
        self.0 == 0
    }

    /// Whether the ID belongs to a native companion object (odd IDs).
    pub const fn is_native(self) -> bool {
        self.0 & 1 == 1
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Kind of a graph node.
///
/// The declaration order is the wire order: a node's serialized type is the
/// position of its kind in [`NodeKind::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Internal runtime object without a user-visible type.
    Hidden,
    /// Array-like container.
    Array,
    /// Flat string.
    String,
    /// Property-bearing object.
    Object,
    /// Compiled code, function metadata or script.
    Code,
    /// Function closure.
    Closure,
    /// Regular expression.
    RegExp,
    /// Boxed number.
    Number,
    /// Native companion object living outside the managed heap.
    Native,
    /// Artificial grouping node (roots, native groups).
    Synthetic,
    /// Concatenation of two strings.
    ConcatenatedString,
    /// Substring view into another string.
    SlicedString,
    /// Symbol.
    Symbol,
}

impl NodeKind {
    /// All kinds in wire order.
    pub const ALL: [NodeKind; 13] = [
        NodeKind::Hidden,
        NodeKind::Array,
        NodeKind::String,
        NodeKind::Object,
        NodeKind::Code,
        NodeKind::Closure,
        NodeKind::RegExp,
        NodeKind::Number,
        NodeKind::Native,
        NodeKind::Synthetic,
        NodeKind::ConcatenatedString,
        NodeKind::SlicedString,
        NodeKind::Symbol,
    ];

    /// Numeric code used in the serialized node tuples.
    pub fn wire_code(self) -> u32 {
        self as u32
    }

    /// Label used in the serialized `node_types` table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Array => "array",
            Self::String => "string",
            Self::Object => "object",
            Self::Code => "code",
            Self::Closure => "closure",
            Self::RegExp => "regexp",
            Self::Number => "number",
            Self::Native => "native",
            Self::Synthetic => "synthetic",
            Self::ConcatenatedString => "concatenated string",
            Self::SlicedString => "sliced string",
            Self::Symbol => "symbol",
        }
    }

    /// Parse a kind from its wire code.
    pub fn from_wire_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vertex of the heap graph.
///
/// `child_start_index` is only meaningful once the owning store has run
/// [`finalize_children`](crate::store::GraphStore::finalize_children).
#[derive(Debug, Clone)]
pub struct Node {
    /// Node kind.
    pub kind: NodeKind,
    /// Display name (constructor name, string content, label, ...).
    pub name: Name,
    /// Stable object ID.
    pub id: ObjectId,
    /// Size of the object itself in bytes.
    pub self_size: u64,
    /// Number of outgoing edges.
    pub child_count: u32,
    /// Offset of the first outgoing edge in the finalized child list.
    pub child_start_index: u32,
    /// Allocation trace node, 0 when unknown.
    pub trace_node_id: u32,
}

impl Node {
    /// Create a node with no children.
    pub fn new(kind: NodeKind, name: Name, id: ObjectId, self_size: u64, trace_node_id: u32) -> Self {
        Self {
            kind,
            name,
            id,
            self_size,
            child_count: 0,
            child_start_index: 0,
            trace_node_id,
        }
    }
}
