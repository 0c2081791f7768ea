//! Adapter between reference extraction and graph storage.
//!
//! Extraction refers to things (heap objects, backing stores, native
//! companions) rather than to node indices. The filler maps each thing to its
//! node, creating the node on first sight through an [`EntryAllocator`] that
//! knows how to describe things of that provenance.

use std::collections::HashMap;

use crate::host::{Address, Detail, HeapHost, HeapObject, TypeTag};
use crate::registry::ObjectIdRegistry;
use crate::store::GraphStore;
use crate::types::{EdgeKind, EdgeLabel, Name, NodeIndex, NodeKind, ObjectId};

/// Anything that can become a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HeapThing {
    /// Object in the managed heap.
    Object(Address),
    /// Native memory owned by an array buffer.
    BackingStore(Address),
    /// Native companion object, keyed by its ID.
    Native(ObjectId),
    /// Group of native companions, keyed by its label.
    NativeGroup(Name),
}

/// Creates the node for a thing seen for the first time.
pub trait EntryAllocator {
    /// Add a node describing `thing` and return its index.
    fn allocate_entry(&mut self, store: &mut GraphStore, thing: &HeapThing) -> NodeIndex;
}

/// Allocates nodes for heap-managed objects, with IDs from the registry.
pub struct HeapObjectAllocator<'a> {
    /// Host the objects live in.
    pub host: &'a dyn HeapHost,
    /// Registry assigning stable IDs.
    pub registry: &'a mut ObjectIdRegistry,
    /// Display tags of global objects.
    pub global_tags: &'a HashMap<Address, String>,
    /// Maximum length of string node names.
    pub max_name_length: usize,
}

impl HeapObjectAllocator<'_> {
    fn describe(&self, object: &HeapObject) -> (NodeKind, String) {
        let constructor = || {
            object
                .object
                .as_ref()
                .map(|layout| layout.constructor_name.as_str())
                .filter(|name| !name.is_empty())
                .unwrap_or("Object")
                .to_string()
        };

        match (object.tag, &object.detail) {
            (TypeTag::Function, Detail::Function { name, .. }) => (NodeKind::Closure, name.clone()),
            (TypeTag::Function, _) => (NodeKind::Closure, String::new()),
            (TypeTag::BoundFunction, _) => (NodeKind::Closure, "native_bind".to_string()),
            (TypeTag::RegExp, Detail::RegExp { pattern }) => (NodeKind::RegExp, pattern.clone()),
            (TypeTag::RegExp, _) => (NodeKind::RegExp, String::new()),
            (TypeTag::GlobalObject, _) => {
                let name = match self.global_tags.get(&object.address) {
                    Some(tag) => format!("{} / {}", constructor(), tag),
                    None => constructor(),
                };
                (NodeKind::Object, name)
            }
            (
                TypeTag::Object
                | TypeTag::GlobalProxy
                | TypeTag::Collection
                | TypeTag::WeakCollection
                | TypeTag::Promise
                | TypeTag::ArrayBuffer
                | TypeTag::ArrayBufferView,
                _,
            ) => (NodeKind::Object, constructor()),
            (TypeTag::String, Detail::String { content }) => {
                (NodeKind::String, truncate(content, self.max_name_length))
            }
            (TypeTag::String, _) => (NodeKind::String, String::new()),
            (TypeTag::ConsString, _) => {
                (NodeKind::ConcatenatedString, "(concatenated string)".to_string())
            }
            (TypeTag::SlicedString, _) => (NodeKind::SlicedString, "(sliced string)".to_string()),
            (TypeTag::Symbol, _) => (NodeKind::Symbol, "symbol".to_string()),
            (TypeTag::PrivateSymbol, _) => (NodeKind::Hidden, "private symbol".to_string()),
            (TypeTag::Code, _) => (NodeKind::Code, String::new()),
            (TypeTag::SharedFunctionInfo, Detail::SharedFunctionInfo { name, .. }) => {
                (NodeKind::Code, name.clone())
            }
            (TypeTag::Script, Detail::Script { name, .. }) => {
                (NodeKind::Code, name.clone().unwrap_or_default())
            }
            (TypeTag::SharedFunctionInfo | TypeTag::Script, _) => (NodeKind::Code, String::new()),
            (TypeTag::NativeContext, _) => {
                (NodeKind::Hidden, "system / NativeContext".to_string())
            }
            (TypeTag::Context, _) => (NodeKind::Object, "system / Context".to_string()),
            (TypeTag::FixedArray | TypeTag::ByteArray, _) => (NodeKind::Array, String::new()),
            (TypeTag::HeapNumber, _) => (NodeKind::Number, "number".to_string()),
            (tag, _) => (NodeKind::Hidden, tag.system_name()),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

impl EntryAllocator for HeapObjectAllocator<'_> {
    fn allocate_entry(&mut self, store: &mut GraphStore, thing: &HeapThing) -> NodeIndex {
        let HeapThing::Object(address) = *thing else {
            unreachable!("heap object allocator used for {thing:?}");
        };
        let Some(object) = self.host.object(address) else {
            tracing::warn!(%address, "Allocating node for unresolvable object");
            let id = self.registry.find_or_add(address, 0);
            return store.add_node(NodeKind::Hidden, "(unresolved)", id, 0, 0);
        };

        let (kind, name) = self.describe(object);
        let id = self.registry.find_or_add(address, object.size);
        let trace_node_id = self.host.trace_node_id(address);
        store.add_node(kind, &name, id, u64::from(object.size), trace_node_id)
    }
}

/// Allocates the node for an array buffer's native backing store.
///
/// Backing stores are tracked by the registry under their native address,
/// so they keep an even ID across snapshots.
pub struct BackingStoreAllocator<'a> {
    /// Registry assigning stable IDs.
    pub registry: &'a mut ObjectIdRegistry,
    /// Size of the backing store.
    pub byte_length: u64,
}

impl EntryAllocator for BackingStoreAllocator<'_> {
    fn allocate_entry(&mut self, store: &mut GraphStore, thing: &HeapThing) -> NodeIndex {
        let HeapThing::BackingStore(address) = *thing else {
            unreachable!("backing store allocator used for {thing:?}");
        };
        let size = u32::try_from(self.byte_length).unwrap_or(u32::MAX);
        let id = self.registry.find_or_add(address, size);
        store.add_node(NodeKind::Native, "system / JSArrayBufferData", id, self.byte_length, 0)
    }
}

/// Allocates nodes for things outside the managed heap: native companions
/// and their synthetic group nodes. The ID is computed by the caller.
pub struct NativeEntryAllocator {
    /// Node kind.
    pub kind: NodeKind,
    /// Display name.
    pub name: String,
    /// Precomputed (odd) ID.
    pub id: ObjectId,
    /// Self size.
    pub size: u64,
}

impl EntryAllocator for NativeEntryAllocator {
    fn allocate_entry(&mut self, store: &mut GraphStore, thing: &HeapThing) -> NodeIndex {
        debug_assert!(
            matches!(thing, HeapThing::Native(_) | HeapThing::NativeGroup(_)),
            "native allocator used for {thing:?}"
        );
        store.add_node(self.kind, &self.name, self.id, self.size, 0)
    }
}

/// Maps things to nodes and records edges between them.
pub struct SnapshotFiller<'a> {
    store: &'a mut GraphStore,
    entries: HashMap<HeapThing, NodeIndex>,
}

impl<'a> SnapshotFiller<'a> {
    /// Create a filler writing into `store`.
    pub fn new(store: &'a mut GraphStore) -> Self {
        Self {
            store,
            entries: HashMap::new(),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &GraphStore {
        &*self.store
    }

    /// Mutable access to the underlying store.
    pub fn store_mut(&mut self) -> &mut GraphStore {
        &mut *self.store
    }

    /// Create the node for `thing` and remember it.
    pub fn add_entry(&mut self, thing: HeapThing, allocator: &mut dyn EntryAllocator) -> NodeIndex {
        let index = allocator.allocate_entry(&mut *self.store, &thing);
        self.entries.insert(thing, index);
        index
    }

    /// Node already created for `thing`.
    pub fn find_entry(&self, thing: &HeapThing) -> Option<NodeIndex> {
        self.entries.get(thing).copied()
    }

    /// Node for `thing`, created on first use.
    pub fn find_or_add_entry(
        &mut self,
        thing: HeapThing,
        allocator: &mut dyn EntryAllocator,
    ) -> NodeIndex {
        match self.find_entry(&thing) {
            Some(index) => index,
            None => self.add_entry(thing, allocator),
        }
    }

    /// Add an edge labelled with an index.
    pub fn set_indexed_reference(
        &mut self,
        kind: EdgeKind,
        parent: NodeIndex,
        index: u32,
        child: NodeIndex,
    ) {
        self.store.add_edge(kind, EdgeLabel::Index(index), parent, child);
    }

    /// Add an edge labelled with a name.
    pub fn set_named_reference(
        &mut self,
        kind: EdgeKind,
        parent: NodeIndex,
        name: &str,
        child: NodeIndex,
    ) {
        let name = self.store.intern(name);
        self.store.add_edge(kind, EdgeLabel::Name(name), parent, child);
    }

    /// Add an indexed edge whose index is the parent's next child ordinal.
    pub fn set_indexed_auto_index_reference(
        &mut self,
        kind: EdgeKind,
        parent: NodeIndex,
        child: NodeIndex,
    ) {
        let index = self.store.node(parent).child_count + 1;
        self.set_indexed_reference(kind, parent, index, child);
    }

    /// Add a named edge whose name is the parent's next child ordinal.
    pub fn set_named_auto_index_reference(
        &mut self,
        kind: EdgeKind,
        parent: NodeIndex,
        child: NodeIndex,
    ) {
        let index = self.store.node(parent).child_count + 1;
        self.set_named_reference(kind, parent, &index.to_string(), child);
    }
}
