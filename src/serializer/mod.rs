//! Streaming JSON serialization of a finalized snapshot.
//!
//! The document is compatible with the established heap-snapshot JSON
//! consumers:
//!
//! ```text
//! {"snapshot":{"meta":{...},"node_count":N,"edge_count":E,"trace_function_count":0},
//!  "nodes":[type,name,id,self_size,edge_count,trace_node_id, ...],
//!  "edges":[type,name_or_index,to_node, ...],
//!  "trace_function_infos":[],"trace_tree":[],
//!  "samples":[timestamp_us,last_assigned_id, ...],
//!  "strings":["<dummy>", ...]}
//! ```
//!
//! Names are written as indices into `strings`, numbered in order of first
//! use; index 0 is a placeholder. `to_node` is the target's offset in the
//! flat `nodes` array, i.e. its node index times [`NODE_FIELD_COUNT`].

pub mod document;
pub mod writer;

use std::fmt::Write as _;
use std::io;

use crate::config::SnapshotConfig;
use crate::error::Result;
use crate::registry::HeapStatsUpdate;
use crate::store::{GraphStore, Names};
use crate::types::{Edge, EdgeKind, EdgeLabel, Node, NodeKind};

pub use document::{decode, SnapshotDocument};
pub use writer::ChunkWriter;

/// Numbers per node in the `nodes` array.
pub const NODE_FIELD_COUNT: usize = 6;

/// Numbers per edge in the `edges` array.
pub const EDGE_FIELD_COUNT: usize = 3;

/// Placeholder at string index 0.
pub const DUMMY_STRING: &str = "<dummy>";

/// Whether the sink wants more output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    /// Keep writing.
    Continue,
    /// Stop; nothing else will be written.
    Abort,
}

/// Destination for serialized snapshots and heap-stats updates.
pub trait OutputSink {
    /// Preferred chunk size in bytes.
    fn chunk_size(&self) -> usize;

    /// Receive one chunk of the document.
    fn write_chunk(&mut self, chunk: &str) -> io::Result<WriteResult>;

    /// The document (or heap-stats push) is complete.
    fn end_of_stream(&mut self) -> io::Result<()>;

    /// Receive a batch of heap-stats updates. Sinks that do not track heap
    /// stats abort the push.
    fn write_heap_stats_chunk(&mut self, _updates: &[HeapStatsUpdate]) -> io::Result<WriteResult> {
        Ok(WriteResult::Abort)
    }
}

/// Sink writing chunks to any [`io::Write`].
#[derive(Debug)]
pub struct WriterSink<W: io::Write> {
    inner: W,
    chunk_size: usize,
}

impl<W: io::Write> WriterSink<W> {
    /// Wrap `inner`, producing chunks of `chunk_size` bytes.
    pub fn new(inner: W, chunk_size: usize) -> Self {
        Self { inner, chunk_size }
    }

    /// Wrap `inner`, using the configured default chunk size.
    pub fn from_config(inner: W, config: &SnapshotConfig) -> Self {
        Self::new(inner, config.default_chunk_size)
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> OutputSink for WriterSink<W> {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn write_chunk(&mut self, chunk: &str) -> io::Result<WriteResult> {
        self.inner.write_all(chunk.as_bytes())?;
        Ok(WriteResult::Continue)
    }

    fn end_of_stream(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Sink collecting everything in memory. Can be told to abort after a
/// number of chunks.
#[derive(Debug, Default)]
pub struct VecSink {
    chunk_size: usize,
    chunks: Vec<String>,
    abort_after: Option<usize>,
    stats: Vec<HeapStatsUpdate>,
    stats_chunks: usize,
    finished: bool,
}

impl VecSink {
    /// Collect chunks of `chunk_size` bytes.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Collect chunks of the configured default size.
    pub fn from_config(config: &SnapshotConfig) -> Self {
        Self::new(config.default_chunk_size)
    }

    /// Abort on the `chunks`-th chunk (that chunk is still kept).
    pub fn aborting_after(chunk_size: usize, chunks: usize) -> Self {
        Self {
            abort_after: Some(chunks),
            ..Self::new(chunk_size)
        }
    }

    /// Chunks received so far.
    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    /// All chunks joined.
    pub fn concat(&self) -> String {
        self.chunks.concat()
    }

    /// Whether `end_of_stream` was called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Heap-stats updates received so far.
    pub fn stats_updates(&self) -> &[HeapStatsUpdate] {
        &self.stats
    }

    fn result_after(&self, writes: usize) -> WriteResult {
        match self.abort_after {
            Some(limit) if writes >= limit => WriteResult::Abort,
            _ => WriteResult::Continue,
        }
    }
}

impl OutputSink for VecSink {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn write_chunk(&mut self, chunk: &str) -> io::Result<WriteResult> {
        self.chunks.push(chunk.to_string());
        Ok(self.result_after(self.chunks.len()))
    }

    fn end_of_stream(&mut self) -> io::Result<()> {
        self.finished = true;
        Ok(())
    }

    fn write_heap_stats_chunk(&mut self, updates: &[HeapStatsUpdate]) -> io::Result<WriteResult> {
        self.stats.extend_from_slice(updates);
        self.stats_chunks += 1;
        Ok(self.result_after(self.stats_chunks))
    }
}

/// How a serialization ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeStatus {
    /// The whole document was written and the stream ended.
    Completed,
    /// The sink aborted; the stream was not ended.
    Aborted,
}

/// Serializes one [`GraphStore`] as a heap-snapshot JSON document.
pub struct HeapSnapshotJsonSerializer<'s> {
    store: &'s GraphStore,
    strings: Names,
}

impl<'s> HeapSnapshotJsonSerializer<'s> {
    /// Create a serializer for `store`.
    pub fn new(store: &'s GraphStore) -> Self {
        let mut strings = Names::new();
        strings.intern(DUMMY_STRING);
        Self { store, strings }
    }

    /// Stream the document to `sink`.
    ///
    /// # Errors
    ///
    /// `Sink` if the sink fails. An abort requested by the sink is reported
    /// as [`SerializeStatus::Aborted`].
    ///
    /// # Panics
    ///
    /// Panics if the store's children have not been finalized.
    pub fn serialize<S: OutputSink + ?Sized>(mut self, sink: &mut S) -> Result<SerializeStatus> {
        let mut writer = ChunkWriter::new(sink);
        self.write_document(&mut writer)?;
        let status = writer.finish()?;
        tracing::debug!(
            ?status,
            nodes = self.store.node_count(),
            edges = self.store.edge_count(),
            strings = self.strings.len(),
            "Serialized heap snapshot"
        );
        Ok(status)
    }

    fn write_document<S: OutputSink + ?Sized>(
        &mut self,
        writer: &mut ChunkWriter<'_, S>,
    ) -> io::Result<()> {
        let store = self.store;
        debug_assert!(
            store.nodes().first().map_or(true, |root| root.kind == NodeKind::Synthetic),
            "node 0 must be the synthetic root"
        );

        writer.write_record(&format!(
            "{{\"snapshot\":{{\"meta\":{},\"node_count\":{},\"edge_count\":{},\"trace_function_count\":0}},\n\"nodes\":[",
            meta(),
            store.node_count(),
            store.edge_count()
        ))?;

        let mut record = String::new();
        for (index, node) in store.nodes().iter().enumerate() {
            record.clear();
            self.node_record(&mut record, node, index == 0);
            writer.write_record(&record)?;
            if writer.is_aborted() {
                return Ok(());
            }
        }

        writer.write_record("],\n\"edges\":[")?;
        let mut first = true;
        for index in 0..store.node_count() {
            for edge in store.children(index) {
                record.clear();
                self.edge_record(&mut record, edge, first);
                first = false;
                writer.write_record(&record)?;
                if writer.is_aborted() {
                    return Ok(());
                }
            }
        }

        writer.write_record("],\n\"trace_function_infos\":[],\n\"trace_tree\":[],\n\"samples\":[")?;
        for (index, sample) in store.samples().iter().enumerate() {
            let separator = if index == 0 { "" } else { "," };
            writer.write_record(&format!(
                "{separator}{},{}\n",
                sample.timestamp_us,
                sample.last_assigned_id.get()
            ))?;
        }

        writer.write_record("],\n\"strings\":[")?;
        for (index, string) in self.strings.iter().enumerate() {
            let separator = if index == 0 { "" } else { ",\n" };
            writer.write_record(&format!("{separator}{}", serde_json::to_string(&**string)?))?;
            if writer.is_aborted() {
                return Ok(());
            }
        }
        writer.write_record("]}")
    }

    fn node_record(&mut self, out: &mut String, node: &Node, first: bool) {
        let name = self.strings.intern_index(&node.name);
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "{}{},{},{},{},{},{}",
            if first { "" } else { "," },
            node.kind.wire_code(),
            name,
            node.id.get(),
            node.self_size,
            node.child_count,
            node.trace_node_id
        );
    }

    fn edge_record(&mut self, out: &mut String, edge: &Edge, first: bool) {
        let name_or_index = match &edge.label {
            EdgeLabel::Index(index) => *index,
            EdgeLabel::Name(name) => self.strings.intern_index(name),
        };
        let _ = writeln!(
            out,
            "{}{},{},{}",
            if first { "" } else { "," },
            edge.kind.wire_code(),
            name_or_index,
            edge.to * NODE_FIELD_COUNT
        );
    }
}

/// The self-describing `meta` object.
fn meta() -> serde_json::Value {
    let node_types: Vec<&str> = NodeKind::ALL.iter().map(|kind| kind.as_str()).collect();
    let edge_types: Vec<&str> = EdgeKind::ALL.iter().map(|kind| kind.as_str()).collect();
    serde_json::json!({
        "node_fields": ["type", "name", "id", "self_size", "edge_count", "trace_node_id"],
        "node_types": [node_types, "string", "number", "number", "number", "number"],
        "edge_fields": ["type", "name_or_index", "to_node"],
        "edge_types": [edge_types, "string_or_number", "node"],
        "trace_function_info_fields": ["function_id", "name", "script_name", "script_id", "line", "column"],
        "trace_node_fields": ["id", "function_info_index", "count", "size", "children"],
        "sample_fields": ["timestamp_us", "last_assigned_id"]
    })
}
