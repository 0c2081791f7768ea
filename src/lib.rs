//! # heap-graph-snapshot
//!
//! Heap snapshots of a managed runtime, as a graph of objects and references.
//!
//! The engine answers one question:
//!
//! > Which objects are alive right now, what holds on to them, and how much
//! > memory do they use?
//!
//! ## Core Contract
//!
//! 1. Walk every live object reported by a [`HeapHost`] and every reference
//!    between them, producing a directed graph
//! 2. Give every object an [`ObjectId`] that survives relocation and repeated
//!    captures
//! 3. Stream the graph as the heap-snapshot JSON document understood by
//!    existing memory tooling
//!
//! ## Architecture
//!
//! ```text
//! HeapHost → HeapExplorer (roots, pass 1, pass 2, natives) → SnapshotFiller → GraphStore
//!                 ↑                                                              ↓
//!          ObjectIdRegistry                                    HeapSnapshotJsonSerializer → OutputSink
//! ```
//!
//! ## Guarantees
//!
//! - Same object → same ID across captures, as long as moves are reported
//! - Node 0 is always the synthetic root
//! - Every reference slot yields either a typed edge or a hidden edge, never both
//! - The edge set does not depend on the order objects are visited in

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod canonical;
pub mod config;
pub mod error;
pub mod explorer;
pub mod filler;
pub mod generator;
pub mod host;
pub mod profiler;
pub mod registry;
pub mod serializer;
pub mod store;
pub mod types;

// Re-exports
pub use config::SnapshotConfig;
pub use error::{Result, SnapshotError};
pub use explorer::{ContainerKind, ExtractorFn, ExtractorRegistry, HeapExplorer};
pub use generator::{ActivityControl, CaptureOutcome, GeneratorState, SnapshotGenerator};
pub use host::memory::InMemoryHeap;
pub use host::{
    Address, Detail, GlobalObjectNameResolver, HeapHost, HeapObject, NativeCompanion,
    ObjectLayout, RootCategory, RootMode, TypeTag, Value,
};
pub use profiler::HeapProfiler;
pub use registry::{HeapStatsPush, HeapStatsUpdate, ObjectIdRegistry};
pub use serializer::{
    HeapSnapshotJsonSerializer, OutputSink, SerializeStatus, VecSink, WriteResult, WriterSink,
};
pub use store::{GraphStore, SnapshotSummary};
pub use types::{Edge, EdgeKind, EdgeLabel, Node, NodeIndex, NodeKind, ObjectId};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};

/// Version tag of the graph model, recorded in snapshot summaries.
pub const SNAPSHOT_FORMAT_VERSION: &str = "heap_graph_v1";
