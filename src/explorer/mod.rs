//! Reference extraction.
//!
//! The explorer walks every live object twice. Each visit dispatches on the
//! object's [`TypeTag`] through an [`ExtractorRegistry`]; the selected
//! handler emits typed edges and marks the slots it consumed. Every unmarked
//! reference slot is then reported as a hidden edge, so each reference ends
//! up either typed or hidden, never both.
//!
//! ## Two passes
//!
//! General-purpose containers ([`TypeTag::is_container`]) mean different
//! things depending on who owns them: the table of a weak map holds its keys
//! weakly, an ordinary array holds its elements strongly. Containers are
//! therefore only visited in the second pass, after every owner has had the
//! chance to record a [`ContainerKind`] for them in the first.

pub mod handlers;
pub mod native;
pub mod roots;

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;

use crate::config::SnapshotConfig;
use crate::error::Result;
use crate::filler::{BackingStoreAllocator, HeapObjectAllocator, HeapThing, SnapshotFiller};
use crate::generator::ProgressCounter;
use crate::host::{Address, BackingStore, HeapHost, HeapObject, PropertyKey, TypeTag, Value};
use crate::registry::ObjectIdRegistry;
use crate::store::GraphStore;
use crate::types::{EdgeKind, NodeIndex};

/// Signature of a per-kind extraction routine.
///
/// Called with the object being visited and its node. Handlers report
/// references through the `set_*` methods of [`HeapExplorer`].
pub type ExtractorFn = fn(&mut HeapExplorer<'_>, &HeapObject, NodeIndex);

/// Extraction routines by type tag.
///
/// Open for extension: embedders register handlers for their own tags
/// (typically [`TypeTag::Custom`]) without touching the traversal.
#[derive(Debug, Clone, Default)]
pub struct ExtractorRegistry {
    handlers: HashMap<TypeTag, ExtractorFn>,
}

impl ExtractorRegistry {
    /// An empty table. Every object is then described by hidden edges only.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The table with every built-in handler registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        handlers::register_builtins(&mut registry);
        registry
    }

    /// Register `handler` for `tag`, returning the handler it replaces.
    pub fn register(&mut self, tag: TypeTag, handler: ExtractorFn) -> Option<ExtractorFn> {
        self.handlers.insert(tag, handler)
    }

    /// Handler for `tag`.
    pub fn get(&self, tag: TypeTag) -> Option<ExtractorFn> {
        self.handlers.get(&tag).copied()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Sub-kind recorded by an owner for a container it references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Backing table of a weak collection: keys weak, values strong.
    WeakCollectionTable,
    /// Array whose elements are all held weakly.
    WeakArray,
}

/// Extraction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Everything except containers.
    First,
    /// Containers only.
    Second,
}

impl Pass {
    /// Whether objects with `tag` are visited in this pass.
    pub fn visits(self, tag: TypeTag) -> bool {
        tag.is_container() == (self == Pass::Second)
    }
}

/// Per-object bitset of slots already reported by a handler.
#[derive(Debug, Default)]
struct FieldMarks {
    words: Vec<u64>,
    len: usize,
}

impl FieldMarks {
    fn reset(&mut self, len: usize) {
        self.words.clear();
        self.words.resize(len.div_ceil(64), 0);
        self.len = len;
    }

    fn mark(&mut self, index: usize) {
        if index < self.len {
            self.words[index / 64] |= 1 << (index % 64);
        }
    }

    /// Test and clear.
    fn take(&mut self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        let bit = 1u64 << (index % 64);
        let word = &mut self.words[index / 64];
        let was_set = *word & bit != 0;
        *word &= !bit;
        was_set
    }
}

/// Walks the heap and turns references into graph edges.
pub struct HeapExplorer<'a> {
    host: &'a dyn HeapHost,
    registry: &'a mut ObjectIdRegistry,
    filler: SnapshotFiller<'a>,
    handlers: &'a ExtractorRegistry,
    max_name_length: usize,
    global_tags: HashMap<Address, String>,
    container_kinds: HashMap<Address, ContainerKind>,
    user_roots: HashSet<Address>,
    marks: FieldMarks,
}

impl<'a> HeapExplorer<'a> {
    /// Create an explorer writing into `store`.
    pub(crate) fn new(
        host: &'a dyn HeapHost,
        registry: &'a mut ObjectIdRegistry,
        store: &'a mut GraphStore,
        handlers: &'a ExtractorRegistry,
        config: &SnapshotConfig,
        global_tags: HashMap<Address, String>,
    ) -> Self {
        Self {
            host,
            registry,
            filler: SnapshotFiller::new(store),
            handlers,
            max_name_length: config.max_name_length,
            global_tags,
            container_kinds: HashMap::new(),
            user_roots: HashSet::new(),
            marks: FieldMarks::default(),
        }
    }

    /// The host being explored.
    pub fn host(&self) -> &'a dyn HeapHost {
        self.host
    }

    /// The store being filled.
    pub fn store(&self) -> &GraphStore {
        self.filler.store()
    }

    /// Run one extraction pass over every live object.
    pub(crate) fn extract_pass(
        &mut self,
        pass: Pass,
        progress: &mut ProgressCounter<'_>,
    ) -> Result<ControlFlow<()>> {
        let host = self.host;
        for object in host.live_objects() {
            let entry = self.get_entry(object.address);
            if let Some(entry) = entry.filter(|_| pass.visits(object.tag)) {
                self.extract_object(object, entry);
            }
            progress.step();
            if progress.report(false, self.store().node_count())?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        tracing::debug!(
            ?pass,
            nodes = self.store().node_count(),
            edges = self.store().edge_count(),
            "Extraction pass finished"
        );
        Ok(ControlFlow::Continue(()))
    }

    fn extract_object(&mut self, object: &HeapObject, entry: NodeIndex) {
        self.marks.reset(object.slots.len());
        if let Some(handler) = self.handlers.get(object.tag) {
            handler(self, object, entry);
        }
        if let Some(shape) = object.shape {
            self.set_internal_reference(entry, "map", Value::Ref(shape), None);
        }
        self.extract_hidden_references(object, entry);
    }

    /// Report every reference slot no handler claimed. Hidden edges carry
    /// the 1-based ordinal of the slot.
    fn extract_hidden_references(&mut self, object: &HeapObject, entry: NodeIndex) {
        for (slot, value) in object.slots.iter().enumerate() {
            if self.marks.take(slot) {
                continue;
            }
            let Value::Ref(address) = *value else {
                continue;
            };
            let Some(child) = self.get_entry(address) else {
                continue;
            };
            if self.is_essential(address) {
                self.filler
                    .set_indexed_reference(EdgeKind::Hidden, entry, slot as u32 + 1, child);
            }
        }
    }

    /// Node of the live object at `address`, created on first use.
    pub fn get_entry(&mut self, address: Address) -> Option<NodeIndex> {
        if self.host.object(address).is_none() {
            tracing::warn!(%address, "Dangling reference to an object that is not live");
            return None;
        }
        let mut allocator = HeapObjectAllocator {
            host: self.host,
            registry: &mut *self.registry,
            global_tags: &self.global_tags,
            max_name_length: self.max_name_length,
        };
        Some(self.filler.find_or_add_entry(HeapThing::Object(address), &mut allocator))
    }

    fn get_value_entry(&mut self, value: Value) -> Option<(Address, NodeIndex)> {
        let address = value.as_ref()?;
        self.get_entry(address).map(|entry| (address, entry))
    }

    /// Node of an array buffer's backing store, created on first use.
    pub fn get_backing_store_entry(&mut self, backing_store: BackingStore) -> NodeIndex {
        let mut allocator = BackingStoreAllocator {
            registry: &mut *self.registry,
            byte_length: backing_store.byte_length,
        };
        self.filler
            .find_or_add_entry(HeapThing::BackingStore(backing_store.address), &mut allocator)
    }

    /// Whether a reference to `address` deserves an edge: the target is
    /// live, not an oddball and not a well-known singleton.
    pub fn is_essential(&self, address: Address) -> bool {
        match self.host.object(address) {
            Some(object) => {
                object.tag != TypeTag::Oddball && !self.host.is_well_known_singleton(address)
            }
            None => false,
        }
    }

    fn mark_field(&mut self, field: Option<usize>) {
        if let Some(field) = field {
            self.marks.mark(field);
        }
    }

    /// Exclude a slot from hidden-edge reporting without emitting an edge.
    pub fn mark_non_essential(&mut self, field: usize) {
        self.marks.mark(field);
    }

    /// Named internal edge. `field` is the slot holding the reference, if any.
    pub fn set_internal_reference(
        &mut self,
        parent: NodeIndex,
        name: &str,
        child: Value,
        field: Option<usize>,
    ) {
        self.set_named_if_essential(EdgeKind::Internal, parent, name, child, field);
    }

    /// Named weak edge.
    pub fn set_weak_reference(
        &mut self,
        parent: NodeIndex,
        name: &str,
        child: Value,
        field: Option<usize>,
    ) {
        self.set_named_if_essential(EdgeKind::Weak, parent, name, child, field);
    }

    fn set_named_if_essential(
        &mut self,
        kind: EdgeKind,
        parent: NodeIndex,
        name: &str,
        child: Value,
        field: Option<usize>,
    ) {
        let Some((address, child)) = self.get_value_entry(child) else {
            return;
        };
        if self.is_essential(address) {
            self.filler.set_named_reference(kind, parent, name, child);
        }
        self.mark_field(field);
    }

    /// Internal edge for the reference stored in `slot` of `object`.
    pub fn set_internal_field(
        &mut self,
        object: &HeapObject,
        parent: NodeIndex,
        name: &str,
        slot: usize,
    ) {
        if let Some(value) = object.slot(slot) {
            self.set_internal_reference(parent, name, value, Some(slot));
        }
    }

    /// Internal edge named after the slot index.
    pub fn set_internal_index_field(&mut self, object: &HeapObject, parent: NodeIndex, slot: usize) {
        self.set_internal_field(object, parent, &slot.to_string(), slot);
    }

    /// Weak edge for the reference stored in `slot` of `object`.
    pub fn set_weak_field(&mut self, object: &HeapObject, parent: NodeIndex, name: &str, slot: usize) {
        if let Some(value) = object.slot(slot) {
            self.set_weak_reference(parent, name, value, Some(slot));
        }
    }

    /// Weak edge named after the slot index.
    pub fn set_weak_index_field(&mut self, object: &HeapObject, parent: NodeIndex, slot: usize) {
        self.set_weak_field(object, parent, &slot.to_string(), slot);
    }

    /// Context-variable edge for a variable captured in `slot`.
    pub fn set_context_field(
        &mut self,
        object: &HeapObject,
        parent: NodeIndex,
        name: &str,
        slot: usize,
    ) {
        let Some((_, child)) = object.slot(slot).and_then(|v| self.get_value_entry(v)) else {
            return;
        };
        self.filler
            .set_named_reference(EdgeKind::ContextVariable, parent, name, child);
        self.marks.mark(slot);
    }

    /// Property edge. Symbol keys and non-empty names give `Property`
    /// edges, the empty name gives an `Internal` one. `prefix` is prepended
    /// to string keys (e.g. `"get "` for getters).
    pub fn set_property_reference(
        &mut self,
        parent: NodeIndex,
        key: &PropertyKey,
        child: Value,
        prefix: Option<&str>,
        field: Option<usize>,
    ) {
        let Some((_, child)) = self.get_value_entry(child) else {
            return;
        };
        let kind = match key {
            PropertyKey::Symbol(_) => EdgeKind::Property,
            PropertyKey::Name(name) if !name.is_empty() => EdgeKind::Property,
            PropertyKey::Name(_) => EdgeKind::Internal,
        };
        match (key, prefix) {
            (PropertyKey::Name(name), Some(prefix)) => {
                self.filler
                    .set_named_reference(kind, parent, &format!("{prefix}{name}"), child);
            }
            _ => self.filler.set_named_reference(kind, parent, key.label(), child),
        }
        self.mark_field(field);
    }

    /// Element edge.
    pub fn set_element_reference(
        &mut self,
        parent: NodeIndex,
        index: u32,
        child: Value,
        field: Option<usize>,
    ) {
        if let Some((_, child)) = self.get_value_entry(child) {
            self.filler
                .set_indexed_reference(EdgeKind::Element, parent, index, child);
            self.mark_field(field);
        }
    }

    /// Shortcut edge, a convenience link that mirrors no real field.
    pub fn set_shortcut_reference(&mut self, parent: NodeIndex, name: &str, child: Value) {
        if let Some((_, child)) = self.get_value_entry(child) {
            self.filler
                .set_named_reference(EdgeKind::Shortcut, parent, name, child);
        }
    }

    /// Internal edge to a node that is not a heap object.
    pub fn set_internal_node_reference(&mut self, parent: NodeIndex, name: &str, child: NodeIndex) {
        self.filler
            .set_named_reference(EdgeKind::Internal, parent, name, child);
    }

    /// Name an anonymous essential object.
    pub fn tag_object(&mut self, target: Value, tag: &str) {
        let Some(address) = target.as_ref() else {
            return;
        };
        if !self.is_essential(address) {
            return;
        }
        if let Some(entry) = self.get_entry(address) {
            self.filler.store_mut().set_name_if_empty(entry, tag);
        }
    }

    /// Name the object held in `slot` of `object`.
    pub fn tag_field(&mut self, object: &HeapObject, slot: usize, tag: &str) {
        if let Some(value) = object.slot(slot) {
            self.tag_object(value, tag);
        }
    }

    /// Record the sub-kind of the container held in `slot` of `object`.
    /// Only containers are affected; the tag is read in the second pass.
    pub fn tag_container(&mut self, object: &HeapObject, slot: usize, kind: ContainerKind) {
        let Some(address) = object.slot(slot).and_then(Value::as_ref) else {
            return;
        };
        let is_container = self
            .host
            .object(address)
            .map_or(false, |target| target.tag.is_container());
        if is_container {
            self.container_kinds.insert(address, kind);
        }
    }

    /// Sub-kind recorded for the container at `address`.
    pub fn container_kind(&self, address: Address) -> Option<ContainerKind> {
        self.container_kinds.get(&address).copied()
    }
}
