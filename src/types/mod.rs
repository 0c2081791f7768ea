//! Core types for the heap graph.

pub mod node;
pub mod edge;

use std::sync::Arc;

pub use node::{Node, NodeIndex, NodeKind, ObjectId};
pub use edge::{Edge, EdgeKind, EdgeLabel};

/// Interned, cheaply clonable node or edge name.
pub type Name = Arc<str>;
