//! Edge types for the heap graph.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{Name, NodeIndex};

/// Kind of a graph edge.
///
/// Declaration order is the wire order of the `edge_types` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Variable captured by a scope/context object.
    ContextVariable,
    /// Indexed element of an array-like object.
    Element,
    /// Named, user-visible property.
    Property,
    /// Named internal field.
    Internal,
    /// Reference found only by generic slot scanning.
    Hidden,
    /// Convenience link that does not reflect a real field.
    Shortcut,
    /// Reference that does not keep its target alive.
    Weak,
}

impl EdgeKind {
    /// All kinds in wire order.
    pub const ALL: [EdgeKind; 7] = [
        EdgeKind::ContextVariable,
        EdgeKind::Element,
        EdgeKind::Property,
        EdgeKind::Internal,
        EdgeKind::Hidden,
        EdgeKind::Shortcut,
        EdgeKind::Weak,
    ];

    /// Numeric code used in the serialized edge tuples.
    pub fn wire_code(self) -> u32 {
        self as u32
    }

    /// Label used in the serialized `edge_types` table.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ContextVariable => "context",
            Self::Element => "element",
            Self::Property => "property",
            Self::Internal => "internal",
            Self::Hidden => "hidden",
            Self::Shortcut => "shortcut",
            Self::Weak => "weak",
        }
    }

    /// Whether edges of this kind carry a numeric index instead of a name.
    pub fn is_indexed(self) -> bool {
        matches!(self, Self::Element | Self::Hidden)
    }

    /// Parse a kind from its wire code.
    pub fn from_wire_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name or index carried by an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeLabel {
    /// Property, field or variable name.
    Name(Name),
    /// Element or slot index.
    Index(u32),
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Directed edge owned by its source node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Edge kind.
    pub kind: EdgeKind,
    /// Name or index.
    pub label: EdgeLabel,
    /// Source node.
    pub from: NodeIndex,
    /// Target node.
    pub to: NodeIndex,
}

impl Edge {
    /// Create an edge, checking that the label shape matches the kind.
    pub fn new(kind: EdgeKind, label: EdgeLabel, from: NodeIndex, to: NodeIndex) -> Self {
        debug_assert_eq!(
            kind.is_indexed(),
            matches!(label, EdgeLabel::Index(_)),
            "{kind} edge with label {label}"
        );
        Self { kind, label, from, to }
    }

    /// Index carried by an element or hidden edge.
    pub fn index(&self) -> Option<u32> {
        match self.label {
            EdgeLabel::Index(index) => Some(index),
            EdgeLabel::Name(_) => None,
        }
    }

    /// Name carried by a named edge.
    pub fn name(&self) -> Option<&str> {
        match &self.label {
            EdgeLabel::Name(name) => Some(name),
            EdgeLabel::Index(_) => None,
        }
    }
}
