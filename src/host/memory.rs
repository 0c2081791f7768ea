//! In-memory heap host.
//!
//! Objects live in a `BTreeMap` keyed by address, so iteration is
//! deterministic unless an explicit order is requested. Useful for tests,
//! benchmarks and for embedders prototyping against the engine.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::{
    Address, Detail, HeapHost, HeapObject, NativeCompanion, RootCategory, RootMode, RootReference,
    Value,
};

#[derive(Debug, Clone)]
struct RootEntry {
    reference: RootReference,
    weak: bool,
}

/// A heap held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHeap {
    objects: BTreeMap<Address, HeapObject>,
    iteration_order: Option<Vec<Address>>,
    roots: Vec<RootEntry>,
    singletons: HashSet<Address>,
    companions: Vec<NativeCompanion>,
    trace_ids: HashMap<Address, u32>,
    quiesce_count: u32,
}

impl InMemoryHeap {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an object.
    pub fn insert(&mut self, object: HeapObject) {
        self.objects.insert(object.address, object);
    }

    /// Remove an object, as if it had been collected.
    pub fn remove(&mut self, address: Address) -> Option<HeapObject> {
        self.trace_ids.remove(&address);
        self.objects.remove(&address)
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Mutable access to an object.
    pub fn object_mut(&mut self, address: Address) -> Option<&mut HeapObject> {
        self.objects.get_mut(&address)
    }

    /// Add a strong root reference.
    pub fn add_root(&mut self, category: RootCategory, target: Address, name: Option<&str>) {
        self.push_root(category, target, name, false);
    }

    /// Add a weak root reference.
    pub fn add_weak_root(&mut self, category: RootCategory, target: Address, name: Option<&str>) {
        self.push_root(category, target, name, true);
    }

    fn push_root(&mut self, category: RootCategory, target: Address, name: Option<&str>, weak: bool) {
        self.roots.push(RootEntry {
            reference: RootReference {
                category,
                target,
                name: name.map(str::to_string),
            },
            weak,
        });
    }

    /// Declare `address` a well-known singleton.
    pub fn mark_singleton(&mut self, address: Address) {
        self.singletons.insert(address);
    }

    /// Attach a native companion.
    pub fn add_companion(&mut self, companion: NativeCompanion) {
        self.companions.push(companion);
    }

    /// Record the allocation trace node of an object.
    pub fn set_trace_node_id(&mut self, address: Address, trace_node_id: u32) {
        self.trace_ids.insert(address, trace_node_id);
    }

    /// Visit objects in this order first, then every other object by address.
    pub fn set_iteration_order(&mut self, order: Vec<Address>) {
        self.iteration_order = Some(order);
    }

    /// How many times the heap was quiesced.
    pub fn quiesce_count(&self) -> u32 {
        self.quiesce_count
    }

    /// Move an object to a new address, rewriting every reference to it.
    ///
    /// Returns the object's size, or `None` if nothing lives at `from` or
    /// `to` is occupied.
    pub fn relocate(&mut self, from: Address, to: Address) -> Option<u32> {
        if from == to || self.objects.contains_key(&to) {
            return None;
        }
        let mut object = self.objects.remove(&from)?;
        object.address = to;
        let size = object.size;
        self.objects.insert(to, object);

        let rewrite = |value: &mut Value| {
            if *value == Value::Ref(from) {
                *value = Value::Ref(to);
            }
        };
        let rewrite_address = |address: &mut Address| {
            if *address == from {
                *address = to;
            }
        };

        for object in self.objects.values_mut() {
            object.slots.iter_mut().for_each(rewrite);
            if let Some(shape) = object.shape.as_mut() {
                rewrite_address(shape);
            }
            if let Some(layout) = object.object.as_mut() {
                layout.properties.iter_mut().for_each(|p| rewrite(&mut p.value));
                layout.elements.iter_mut().for_each(|e| rewrite(&mut e.value));
                if let Some(prototype) = layout.prototype.as_mut() {
                    rewrite(prototype);
                }
            }
            if let Detail::Context { global_object: Some(global), .. } = &mut object.detail {
                rewrite_address(global);
            }
        }
        for root in &mut self.roots {
            rewrite_address(&mut root.reference.target);
        }
        for companion in &mut self.companions {
            companion.wrappers.iter_mut().for_each(rewrite_address);
        }
        if let Some(order) = self.iteration_order.as_mut() {
            order.iter_mut().for_each(rewrite_address);
        }
        if self.singletons.remove(&from) {
            self.singletons.insert(to);
        }
        if let Some(trace_id) = self.trace_ids.remove(&from) {
            self.trace_ids.insert(to, trace_id);
        }
        Some(size)
    }
}

impl HeapHost for InMemoryHeap {
    fn quiesce_for_iteration(&mut self) {
        self.quiesce_count += 1;
    }

    fn live_objects(&self) -> Box<dyn Iterator<Item = &HeapObject> + '_> {
        let Some(order) = &self.iteration_order else {
            return Box::new(self.objects.values());
        };
        let listed: HashSet<Address> = order.iter().copied().collect();
        let first = order.iter().filter_map(|address| self.objects.get(address));
        let rest = self
            .objects
            .values()
            .filter(move |object| !listed.contains(&object.address));
        Box::new(first.chain(rest))
    }

    fn object(&self, address: Address) -> Option<&HeapObject> {
        self.objects.get(&address)
    }

    fn iterate_roots(&self, mode: RootMode, visitor: &mut dyn FnMut(RootReference)) {
        for root in &self.roots {
            if mode == RootMode::All || !root.weak {
                visitor(root.reference.clone());
            }
        }
    }

    fn is_well_known_singleton(&self, address: Address) -> bool {
        self.singletons.contains(&address)
    }

    fn trace_node_id(&self, address: Address) -> u32 {
        self.trace_ids.get(&address).copied().unwrap_or(0)
    }

    fn native_companions(&self) -> Vec<NativeCompanion> {
        self.companions.clone()
    }
}
