//! End-to-end capture tests against the in-memory host.
//!
//! These tests verify graph shape, ID stability and traversal-order
//! independence of captured snapshots.

use std::ops::ControlFlow;

use heap_graph_snapshot::host::{BackingStore, ContextField, Element, Property, PropertyKey};
use heap_graph_snapshot::store::{GC_ROOTS_INDEX, ROOT_INDEX};
use heap_graph_snapshot::{
    Address, Detail, EdgeKind, GlobalObjectNameResolver, GraphStore, HeapObject, HeapProfiler,
    HeapExplorer, InMemoryHeap, NativeCompanion, NodeIndex, NodeKind, ObjectLayout, RootCategory,
    SnapshotConfig, SnapshotError, SnapshotSummary, TypeTag, Value, VecSink,
};
use proptest::prelude::*;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn addr(raw: u64) -> Address {
    Address::new(raw)
}

fn r(raw: u64) -> Value {
    Value::Ref(addr(raw))
}

fn plain(raw: u64, constructor: &str) -> HeapObject {
    HeapObject::new(addr(raw), 16, TypeTag::Object).with_object(ObjectLayout {
        constructor_name: constructor.to_string(),
        ..ObjectLayout::default()
    })
}

fn with_property(raw: u64, constructor: &str, key: &str, target: u64) -> HeapObject {
    HeapObject::new(addr(raw), 16, TypeTag::Object)
        .with_slots(vec![r(target)])
        .with_object(ObjectLayout {
            constructor_name: constructor.to_string(),
            properties: vec![Property::in_object(PropertyKey::name(key), r(target), 0)],
            ..ObjectLayout::default()
        })
}

fn empty_context(global_object: Option<Address>) -> Detail {
    Detail::Context {
        closure: 0,
        previous: 1,
        extension: None,
        native_context: 2,
        locals: Vec::new(),
        function_name: None,
        fields: Vec::new(),
        next_context_link: None,
        global_object,
    }
}

fn capture(profiler: &mut HeapProfiler, heap: &mut InMemoryHeap) -> GraphStore {
    profiler
        .take_snapshot(heap, None)
        .expect("capture succeeds")
        .expect("capture is not aborted")
}

fn node_of(profiler: &HeapProfiler, store: &GraphStore, raw: u64) -> NodeIndex {
    let id = profiler.object_id_for(addr(raw)).expect("object was captured");
    store.lookup_by_id(id).expect("node exists for id")
}

/// (kind, label, target name) of every outgoing edge.
fn edges_of(store: &GraphStore, index: NodeIndex) -> Vec<(EdgeKind, String, String)> {
    store
        .children(index)
        .map(|e| (e.kind, e.label.to_string(), store.node(e.to).name.to_string()))
        .collect()
}

fn edge(kind: EdgeKind, label: &str, target: &str) -> (EdgeKind, String, String) {
    (kind, label.to_string(), target.to_string())
}

fn synthetic_count() -> usize {
    2 + RootCategory::ALL.len()
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph Shape
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_three_object_scenario() {
    init_tracing();
    let mut heap = InMemoryHeap::new();
    heap.insert(with_property(0x100, "Root", "x", 0x200));
    heap.insert(
        HeapObject::new(addr(0x200), 16, TypeTag::Object)
            .with_slots(vec![r(0x300)])
            .with_object(ObjectLayout {
                constructor_name: "A".to_string(),
                elements: vec![Element { index: 0, value: r(0x300), slot: Some(0) }],
                ..ObjectLayout::default()
            }),
    );
    heap.insert(with_property(0x300, "B", "back", 0x200));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    assert_eq!(store.node_count(), synthetic_count() + 3);
    assert_eq!(store.node(ROOT_INDEX).kind, NodeKind::Synthetic);

    let root = node_of(&profiler, &store, 0x100);
    let a = node_of(&profiler, &store, 0x200);
    let b = node_of(&profiler, &store, 0x300);
    assert_eq!(edges_of(&store, root), vec![edge(EdgeKind::Property, "x", "A")]);
    assert_eq!(edges_of(&store, a), vec![edge(EdgeKind::Element, "0", "B")]);
    assert_eq!(edges_of(&store, b), vec![edge(EdgeKind::Property, "back", "A")]);

    let strong_roots = GraphStore::subroot_index(RootCategory::StrongRoots);
    assert_eq!(edges_of(&store, strong_roots), vec![edge(EdgeKind::Element, "1", "Root")]);
    assert_eq!(
        edges_of(&store, ROOT_INDEX),
        vec![edge(EdgeKind::Element, "1", "(GC roots)")]
    );
    assert_eq!(store.children(GC_ROOTS_INDEX).count(), RootCategory::ALL.len());
    assert!(store.edges().iter().all(|e| e.kind != EdgeKind::Hidden));
}

#[test]
fn test_untyped_slots_become_hidden_edges() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 40, TypeTag::Object)
            .with_slots(vec![r(0x200), r(0x300), Value::Small(7), r(0xdead0), r(0x400)])
            .with_object(ObjectLayout {
                constructor_name: "Holder".to_string(),
                properties: vec![Property::in_object(PropertyKey::name("a"), r(0x200), 0)],
                ..ObjectLayout::default()
            }),
    );
    heap.insert(plain(0x200, "A"));
    heap.insert(plain(0x300, "B"));
    heap.insert(HeapObject::new(addr(0x400), 8, TypeTag::Oddball));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    let holder = node_of(&profiler, &store, 0x100);
    // Typed slot 0 is not repeated as hidden; the dangling slot and the
    // oddball yield nothing.
    assert_eq!(
        edges_of(&store, holder),
        vec![edge(EdgeKind::Property, "a", "A"), edge(EdgeKind::Hidden, "2", "B")]
    );
    assert!(store.edges().iter().all(|e| e.to < store.node_count()));
}

#[test]
fn test_weak_collection_table_is_read_through_its_owner() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 24, TypeTag::WeakCollection)
            .with_slots(vec![r(0x200)])
            .with_object(ObjectLayout {
                constructor_name: "WeakMap".to_string(),
                ..ObjectLayout::default()
            })
            .with_detail(Detail::WeakCollection { table: 0 }),
    );
    heap.insert(
        HeapObject::new(addr(0x200), 32, TypeTag::FixedArray)
            .with_slots(vec![r(0x300), r(0x400)])
            .with_detail(Detail::HashTable { entries: vec![(0, 1)] }),
    );
    heap.insert(plain(0x300, "Key"));
    heap.insert(plain(0x400, "Value"));
    heap.insert(HeapObject::new(addr(0x500), 16, TypeTag::FixedArray).with_slots(vec![r(0x300)]));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);
    heap.add_root(RootCategory::StrongRoots, addr(0x500), None);
    // The table is visited before its owner.
    heap.set_iteration_order(vec![addr(0x200), addr(0x500), addr(0x100)]);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    let owner = node_of(&profiler, &store, 0x100);
    let table = node_of(&profiler, &store, 0x200);
    let plain_array = node_of(&profiler, &store, 0x500);
    assert_eq!(edges_of(&store, owner), vec![edge(EdgeKind::Internal, "table", "")]);
    assert_eq!(
        edges_of(&store, table),
        vec![edge(EdgeKind::Weak, "0", "Key"), edge(EdgeKind::Internal, "1", "Value")]
    );
    assert_eq!(edges_of(&store, plain_array), vec![edge(EdgeKind::Internal, "0", "Key")]);
}

#[test]
fn test_closure_context_and_code() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 64, TypeTag::Function)
            .with_slots(vec![r(0x200), r(0x400), r(0x300)])
            .with_detail(Detail::Function {
                name: "counter".to_string(),
                shared: 0,
                context: 1,
                code: 2,
                feedback_cell: None,
                prototype: None,
            }),
    );
    heap.insert(
        HeapObject::new(addr(0x200), 48, TypeTag::SharedFunctionInfo)
            .with_slots(vec![r(0x300)])
            .with_detail(Detail::SharedFunctionInfo {
                name: "counter".to_string(),
                code: 0,
                script: None,
                scope_info: None,
            }),
    );
    heap.insert(HeapObject::new(addr(0x300), 128, TypeTag::Code));
    heap.insert(
        HeapObject::new(addr(0x400), 40, TypeTag::Context)
            .with_slots(vec![r(0x100), r(0x500), r(0x500), r(0x600)])
            .with_detail(Detail::Context {
                closure: 0,
                previous: 1,
                extension: None,
                native_context: 2,
                locals: vec![("count".to_string(), 3)],
                function_name: None,
                fields: Vec::new(),
                next_context_link: None,
                global_object: None,
            }),
    );
    heap.insert(HeapObject::new(addr(0x500), 256, TypeTag::NativeContext).with_detail(empty_context(None)));
    heap.insert(HeapObject::new(addr(0x600), 16, TypeTag::HeapNumber));
    heap.add_root(RootCategory::HandleScope, addr(0x100), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    let function = node_of(&profiler, &store, 0x100);
    assert_eq!(store.node(function).kind, NodeKind::Closure);
    assert_eq!(
        edges_of(&store, function),
        vec![
            edge(EdgeKind::Internal, "shared", "counter"),
            edge(EdgeKind::Internal, "context", "system / Context"),
            edge(EdgeKind::Internal, "code", "(code for counter)"),
        ]
    );

    let context = node_of(&profiler, &store, 0x400);
    assert_eq!(
        edges_of(&store, context),
        vec![
            edge(EdgeKind::ContextVariable, "count", "number"),
            edge(EdgeKind::Internal, "closure", "counter"),
            edge(EdgeKind::Internal, "previous", "system / NativeContext"),
            edge(EdgeKind::Internal, "native_context", "system / NativeContext"),
        ]
    );
}

#[test]
fn test_accessor_properties_and_property_store() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 24, TypeTag::Object)
            .with_slots(vec![r(0x200), r(0x500)])
            .with_object(ObjectLayout {
                constructor_name: "Temperature".to_string(),
                properties: vec![Property {
                    key: PropertyKey::name("value"),
                    value: r(0x200),
                    slot: Some(0),
                    accessor: true,
                }],
                properties_slot: Some(1),
                ..ObjectLayout::default()
            }),
    );
    heap.insert(
        HeapObject::new(addr(0x200), 24, TypeTag::AccessorPair)
            .with_slots(vec![r(0x300), r(0x400)])
            .with_detail(Detail::AccessorPair { getter: 0, setter: 1 }),
    );
    heap.insert(
        HeapObject::new(addr(0x300), 64, TypeTag::Function).with_detail(Detail::Function {
            name: "getValue".to_string(),
            shared: 0,
            context: 1,
            code: 2,
            feedback_cell: None,
            prototype: None,
        }),
    );
    heap.insert(HeapObject::new(addr(0x400), 8, TypeTag::Oddball));
    heap.insert(HeapObject::new(addr(0x500), 16, TypeTag::FixedArray));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    // The in-object pair slot is claimed by the property edge, so no hidden
    // edge repeats it; the undefined setter yields no edge.
    let object = node_of(&profiler, &store, 0x100);
    assert_eq!(
        edges_of(&store, object),
        vec![
            edge(EdgeKind::Property, "value", "system / AccessorPair"),
            edge(EdgeKind::Property, "get value", "getValue"),
            edge(EdgeKind::Internal, "properties", "(object properties)"),
        ]
    );
    assert!(store.edges().iter().all(|e| e.kind != EdgeKind::Hidden));
}

#[test]
fn test_accessor_property_without_pair_reports_nothing() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 24, TypeTag::Object)
            .with_slots(vec![r(0x200)])
            .with_object(ObjectLayout {
                constructor_name: "Broken".to_string(),
                properties: vec![Property {
                    key: PropertyKey::name("value"),
                    value: r(0x200),
                    slot: Some(0),
                    accessor: true,
                }],
                ..ObjectLayout::default()
            }),
    );
    heap.insert(plain(0x200, "NotAPair"));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    // No property edge; the unclaimed slot still surfaces.
    let object = node_of(&profiler, &store, 0x100);
    assert_eq!(
        edges_of(&store, object),
        vec![edge(EdgeKind::Hidden, "1", "NotAPair")]
    );
}

struct FixedUrl;

impl GlobalObjectNameResolver for FixedUrl {
    fn name_for(&self, _global: Address) -> Option<String> {
        Some("https://example.test".to_string())
    }
}

#[test]
fn test_root_categories_and_global_shortcut() {
    let mut heap = InMemoryHeap::new();
    heap.insert(HeapObject::new(addr(0x100), 64, TypeTag::GlobalObject).with_object(ObjectLayout {
        constructor_name: "Window".to_string(),
        ..ObjectLayout::default()
    }));
    heap.insert(
        HeapObject::new(addr(0x200), 256, TypeTag::NativeContext)
            .with_detail(empty_context(Some(addr(0x100)))),
    );
    heap.insert(HeapObject::new(addr(0x300), 96, TypeTag::Code));
    heap.insert(plain(0x400, "Cached"));
    heap.insert(HeapObject::new(addr(0x500), 8, TypeTag::String).with_detail(Detail::String {
        content: String::new(),
    }));
    heap.add_root(RootCategory::HandleScope, addr(0x200), None);
    heap.add_root(RootCategory::HandleScope, addr(0x200), None);
    heap.add_root(RootCategory::Builtins, addr(0x300), Some("ArrayPush"));
    heap.add_weak_root(RootCategory::GlobalHandles, addr(0x400), None);
    heap.add_root(RootCategory::StrongRoots, addr(0x500), Some("empty_string"));

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    profiler.set_global_object_name_resolver(Box::new(FixedUrl));
    let store = capture(&mut profiler, &mut heap);

    // One shortcut per global, however often its context is rooted.
    assert_eq!(
        edges_of(&store, ROOT_INDEX),
        vec![
            edge(EdgeKind::Element, "1", "(GC roots)"),
            edge(EdgeKind::Shortcut, "2", "Window / https://example.test"),
        ]
    );

    let builtin = node_of(&profiler, &store, 0x300);
    assert_eq!(&*store.node(builtin).name, "(ArrayPush builtin)");
    assert_eq!(
        edges_of(&store, GraphStore::subroot_index(RootCategory::Builtins)),
        vec![edge(EdgeKind::Element, "1", "(ArrayPush builtin)")]
    );
    assert_eq!(
        edges_of(&store, GraphStore::subroot_index(RootCategory::GlobalHandles)),
        vec![edge(EdgeKind::Weak, "1", "Cached")]
    );
    assert_eq!(
        edges_of(&store, GraphStore::subroot_index(RootCategory::StrongRoots)),
        vec![edge(EdgeKind::Internal, "empty_string", "")]
    );
}

#[test]
fn test_native_companions() {
    init_tracing();
    let mut heap = InMemoryHeap::new();
    heap.insert(plain(0x100, "HTMLDivElement"));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);
    heap.add_companion(NativeCompanion {
        label: "Detached DOM".to_string(),
        group_label: "(Document DOM trees)".to_string(),
        hash: 11,
        element_count: Some(3),
        size: Some(128),
        wrappers: vec![addr(0x100), addr(0xdead0)],
    });

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    let native = store
        .nodes()
        .iter()
        .position(|n| n.kind == NodeKind::Native)
        .expect("companion node");
    let group = store
        .nodes()
        .iter()
        .position(|n| &*n.name == "(Document DOM trees)")
        .expect("group node");
    assert_eq!(&*store.node(native).name, "Detached DOM / 3 entries");
    assert_eq!(store.node(native).self_size, 128);
    assert!(store.node(native).id.is_native());
    assert!(store.node(group).id.is_native());
    assert_eq!(store.node(group).kind, NodeKind::Synthetic);

    let wrapper = node_of(&profiler, &store, 0x100);
    assert_eq!(
        edges_of(&store, wrapper),
        vec![edge(EdgeKind::Internal, "native", "Detached DOM / 3 entries")]
    );
    assert_eq!(
        edges_of(&store, native),
        vec![edge(EdgeKind::Element, "1", "HTMLDivElement")]
    );
    assert_eq!(
        edges_of(&store, group),
        vec![edge(EdgeKind::Internal, "1", "Detached DOM / 3 entries")]
    );
    assert_eq!(
        edges_of(&store, ROOT_INDEX)[1],
        edge(EdgeKind::Element, "2", "(Document DOM trees)")
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

fn chain_heap() -> InMemoryHeap {
    let mut heap = InMemoryHeap::new();
    heap.insert(with_property(0x100, "Head", "next", 0x200));
    heap.insert(with_property(0x200, "Middle", "next", 0x300));
    heap.insert(plain(0x300, "Tail"));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);
    heap
}

#[test]
fn test_ids_stable_across_snapshots() {
    let mut heap = chain_heap();
    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();

    let first = capture(&mut profiler, &mut heap);
    let tail = profiler.object_id_for(addr(0x300)).unwrap();
    let second = capture(&mut profiler, &mut heap);
    assert_eq!(profiler.object_id_for(addr(0x300)), Some(tail));
    assert_eq!(
        SnapshotSummary::compute(&first).snapshot_id,
        SnapshotSummary::compute(&second).snapshot_id
    );

    heap.insert(plain(0x400, "Newcomer"));
    capture(&mut profiler, &mut heap);
    let newcomer = profiler.object_id_for(addr(0x400)).unwrap();
    assert!(newcomer > tail);
    assert!(!newcomer.is_native());
}

#[test]
fn test_relocation_is_transparent() {
    let mut heap = chain_heap();
    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let before = SnapshotSummary::compute(&capture(&mut profiler, &mut heap));

    let size = heap.relocate(addr(0x200), addr(0x900)).unwrap();
    assert!(profiler.object_moved(addr(0x200), addr(0x900), size));

    let after = SnapshotSummary::compute(&capture(&mut profiler, &mut heap));
    assert_eq!(before.node_id_hash, after.node_id_hash);
    assert_eq!(before.edge_hash, after.edge_hash);
}

#[test]
fn test_dead_objects_leave_the_registry() {
    let mut heap = chain_heap();
    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    capture(&mut profiler, &mut heap);
    assert!(profiler.object_id_for(addr(0x300)).is_some());

    heap.object_mut(addr(0x200)).unwrap().slots.clear();
    heap.object_mut(addr(0x200)).unwrap().object = None;
    heap.remove(addr(0x300));
    let store = capture(&mut profiler, &mut heap);
    assert_eq!(profiler.object_id_for(addr(0x300)), None);
    assert_eq!(store.node_count(), synthetic_count() + 2);
}

#[test]
fn test_backing_store_ids_survive_heap_stats_pushes() {
    let mut heap = array_buffer_heap();
    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    capture(&mut profiler, &mut heap);
    let before = profiler.object_id_for(addr(0xB000)).expect("backing store tracked");
    assert!(!before.is_native());

    let mut sink = VecSink::new(64);
    profiler.push_heap_stats(&mut heap, &mut sink).unwrap();
    assert_eq!(profiler.object_id_for(addr(0xB000)), Some(before));

    let store = capture(&mut profiler, &mut heap);
    assert_eq!(profiler.object_id_for(addr(0xB000)), Some(before));
    assert!(store.lookup_by_id(before).is_some());
}

#[test]
fn test_trace_node_ids_are_carried_onto_nodes() {
    let mut heap = chain_heap();
    heap.set_trace_node_id(addr(0x200), 7);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);
    assert_eq!(store.node(node_of(&profiler, &store, 0x200)).trace_node_id, 7);
    assert_eq!(store.node(node_of(&profiler, &store, 0x100)).trace_node_id, 0);
    assert_eq!(store.node(ROOT_INDEX).trace_node_id, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation and Limits
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_abort_from_activity_control() {
    let mut heap = chain_heap();
    let config = SnapshotConfig { progress_granularity: 2, ..SnapshotConfig::default() };
    let mut profiler = HeapProfiler::new(config).unwrap();

    let mut reports = 0;
    let mut stop_second = |_: u64, _: u64| {
        reports += 1;
        if reports == 2 {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    };
    let outcome = profiler.take_snapshot(&mut heap, Some(&mut stop_second)).unwrap();
    assert!(outcome.is_none());
    assert_eq!(reports, 2);

    // The profiler remains usable.
    assert!(profiler.take_snapshot(&mut heap, None).unwrap().is_some());
}

#[test]
fn test_node_limit_is_fatal() {
    let mut heap = chain_heap();
    let config = SnapshotConfig {
        max_nodes: synthetic_count() as u32 + 1,
        ..SnapshotConfig::default()
    };
    let mut profiler = HeapProfiler::new(config).unwrap();
    let err = profiler.take_snapshot(&mut heap, None).unwrap_err();
    assert!(matches!(err, SnapshotError::NodeLimitExceeded { .. }));
}

#[test]
fn test_native_context_fields() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 256, TypeTag::NativeContext)
            .with_slots(vec![r(0x200), r(0x300)])
            .with_detail(Detail::Context {
                closure: 9,
                previous: 9,
                extension: None,
                native_context: 9,
                locals: Vec::new(),
                function_name: None,
                fields: vec![
                    ContextField { name: "math".to_string(), slot: 0, weak: false },
                    ContextField { name: "optimized_code_list".to_string(), slot: 1, weak: true },
                ],
                next_context_link: None,
                global_object: None,
            }),
    );
    heap.insert(plain(0x200, "Math"));
    heap.insert(HeapObject::new(addr(0x300), 64, TypeTag::Code));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);
    let context = node_of(&profiler, &store, 0x100);
    assert_eq!(
        edges_of(&store, context),
        vec![
            edge(EdgeKind::Internal, "math", "Math"),
            edge(EdgeKind::Weak, "optimized_code_list", ""),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Object Kinds
// ─────────────────────────────────────────────────────────────────────────────

fn array_buffer_heap() -> InMemoryHeap {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 32, TypeTag::ArrayBuffer)
            .with_object(ObjectLayout {
                constructor_name: "ArrayBuffer".to_string(),
                ..ObjectLayout::default()
            })
            .with_detail(Detail::ArrayBuffer {
                backing_store: Some(BackingStore { address: addr(0xB000), byte_length: 4096 }),
            }),
    );
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);
    heap
}

#[test]
fn test_array_buffer_backing_store_node() {
    let mut heap = array_buffer_heap();
    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    let buffer = node_of(&profiler, &store, 0x100);
    assert_eq!(
        edges_of(&store, buffer),
        vec![edge(EdgeKind::Internal, "backing_store", "system / JSArrayBufferData")]
    );
    let data = node_of(&profiler, &store, 0xB000);
    assert_eq!(store.node(data).kind, NodeKind::Native);
    assert_eq!(store.node(data).self_size, 4096);
    assert_eq!(store.node_count(), synthetic_count() + 2);
}

#[test]
fn test_bound_function_shortcuts_bound_arguments() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 40, TypeTag::BoundFunction)
            .with_slots(vec![r(0x200), r(0x300), r(0x400)])
            .with_detail(Detail::BoundFunction { target: 0, bound_this: 1, bound_arguments: 2 }),
    );
    heap.insert(HeapObject::new(addr(0x200), 64, TypeTag::Function).with_detail(Detail::Function {
        name: "greet".to_string(),
        shared: 0,
        context: 1,
        code: 2,
        feedback_cell: None,
        prototype: None,
    }));
    heap.insert(plain(0x300, "Receiver"));
    heap.insert(
        HeapObject::new(addr(0x400), 24, TypeTag::FixedArray).with_slots(vec![r(0x500), r(0x600)]),
    );
    heap.insert(plain(0x500, "First"));
    heap.insert(plain(0x600, "Second"));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    let bound = node_of(&profiler, &store, 0x100);
    assert_eq!(&*store.node(bound).name, "native_bind");
    assert_eq!(
        edges_of(&store, bound),
        vec![
            edge(EdgeKind::Internal, "bindings", "(bound arguments)"),
            edge(EdgeKind::Internal, "bound_this", "Receiver"),
            edge(EdgeKind::Internal, "bound_function", "greet"),
            edge(EdgeKind::Shortcut, "bound_argument_0", "First"),
            edge(EdgeKind::Shortcut, "bound_argument_1", "Second"),
        ]
    );
    let arguments = node_of(&profiler, &store, 0x400);
    assert_eq!(
        edges_of(&store, arguments),
        vec![edge(EdgeKind::Internal, "0", "First"), edge(EdgeKind::Internal, "1", "Second")]
    );
}

#[test]
fn test_cons_and_sliced_strings() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 32, TypeTag::ConsString)
            .with_slots(vec![r(0x200), r(0x300)])
            .with_detail(Detail::ConsString { first: 0, second: 1 }),
    );
    heap.insert(HeapObject::new(addr(0x200), 16, TypeTag::String).with_detail(Detail::String {
        content: "hello ".to_string(),
    }));
    heap.insert(HeapObject::new(addr(0x300), 16, TypeTag::String).with_detail(Detail::String {
        content: "world".to_string(),
    }));
    heap.insert(
        HeapObject::new(addr(0x400), 24, TypeTag::SlicedString)
            .with_slots(vec![r(0x100)])
            .with_detail(Detail::SlicedString { parent: 0 }),
    );
    heap.add_root(RootCategory::StrongRoots, addr(0x400), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    let cons = node_of(&profiler, &store, 0x100);
    assert_eq!(store.node(cons).kind, NodeKind::ConcatenatedString);
    assert_eq!(
        edges_of(&store, cons),
        vec![
            edge(EdgeKind::Internal, "first", "hello "),
            edge(EdgeKind::Internal, "second", "world"),
        ]
    );
    let sliced = node_of(&profiler, &store, 0x400);
    assert_eq!(store.node(sliced).kind, NodeKind::SlicedString);
    assert_eq!(
        edges_of(&store, sliced),
        vec![edge(EdgeKind::Internal, "parent", "(concatenated string)")]
    );
}

#[test]
fn test_transitions_and_dependent_code_are_weak() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 80, TypeTag::Shape)
            .with_slots(vec![r(0x200), r(0x300), r(0x400)])
            .with_detail(Detail::Shape {
                prototype: 0,
                constructor: 1,
                descriptors: None,
                transitions: Some(2),
            }),
    );
    heap.insert(plain(0x200, "Proto"));
    heap.insert(plain(0x300, "Ctor"));
    heap.insert(HeapObject::new(addr(0x400), 16, TypeTag::FixedArray).with_slots(vec![r(0x500)]));
    heap.insert(plain(0x500, "Successor"));
    heap.insert(
        HeapObject::new(addr(0x600), 24, TypeTag::PropertyCell)
            .with_slots(vec![r(0x700), r(0x800)])
            .with_detail(Detail::PropertyCell { value: 0, dependent_code: Some(1) }),
    );
    heap.insert(HeapObject::new(addr(0x700), 16, TypeTag::HeapNumber));
    heap.insert(HeapObject::new(addr(0x800), 16, TypeTag::FixedArray).with_slots(vec![r(0x900)]));
    heap.insert(plain(0x900, "Dependent"));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);
    heap.add_root(RootCategory::StrongRoots, addr(0x600), None);
    // The arrays are visited before the objects that say what they hold.
    heap.set_iteration_order(vec![addr(0x400), addr(0x800)]);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    let shape = node_of(&profiler, &store, 0x100);
    assert_eq!(
        edges_of(&store, shape),
        vec![
            edge(EdgeKind::Internal, "transitions", "(transition array)"),
            edge(EdgeKind::Internal, "prototype", "Proto"),
            edge(EdgeKind::Internal, "constructor", "Ctor"),
        ]
    );
    let transitions = node_of(&profiler, &store, 0x400);
    assert_eq!(
        edges_of(&store, transitions),
        vec![edge(EdgeKind::Weak, "0", "Successor")]
    );

    let cell = node_of(&profiler, &store, 0x600);
    assert_eq!(
        edges_of(&store, cell),
        vec![
            edge(EdgeKind::Internal, "value", "number"),
            edge(EdgeKind::Internal, "dependent_code", "(dependent code)"),
        ]
    );
    let dependent = node_of(&profiler, &store, 0x800);
    assert_eq!(
        edges_of(&store, dependent),
        vec![edge(EdgeKind::Weak, "0", "Dependent")]
    );
}

#[test]
fn test_well_known_singletons_get_no_edges() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 16, TypeTag::Cell)
            .with_slots(vec![r(0x200), r(0x200), r(0x300)])
            .with_detail(Detail::Cell { value: 0 }),
    );
    heap.insert(plain(0x200, "EmptyArray"));
    heap.insert(plain(0x300, "Regular"));
    heap.mark_singleton(addr(0x200));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    // Neither the typed value slot nor the untyped copy points at the
    // singleton; the ordinary object still surfaces.
    let cell = node_of(&profiler, &store, 0x100);
    assert_eq!(
        edges_of(&store, cell),
        vec![edge(EdgeKind::Hidden, "3", "Regular")]
    );
}

#[test]
fn test_list_links_are_not_reported() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 32, TypeTag::AllocationSite)
            .with_slots(vec![r(0x200), r(0x300), r(0x400)])
            .with_detail(Detail::AllocationSite {
                transition_info: 0,
                nested_site: Some(1),
                weak_next: Some(2),
            }),
    );
    heap.insert(plain(0x200, "Boilerplate"));
    heap.insert(HeapObject::new(addr(0x300), 32, TypeTag::AllocationSite));
    heap.insert(HeapObject::new(addr(0x400), 32, TypeTag::AllocationSite));
    heap.insert(
        HeapObject::new(addr(0x500), 40, TypeTag::Context)
            .with_slots(vec![r(0x600), r(0x700), r(0x700), r(0x800)])
            .with_detail(Detail::Context {
                closure: 0,
                previous: 1,
                extension: None,
                native_context: 2,
                locals: Vec::new(),
                function_name: None,
                fields: Vec::new(),
                next_context_link: Some(3),
                global_object: None,
            }),
    );
    heap.insert(plain(0x600, "Closure"));
    heap.insert(HeapObject::new(addr(0x700), 256, TypeTag::NativeContext).with_detail(empty_context(None)));
    heap.insert(HeapObject::new(addr(0x800), 40, TypeTag::Context).with_detail(empty_context(None)));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);
    heap.add_root(RootCategory::StrongRoots, addr(0x500), None);

    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);

    let site = node_of(&profiler, &store, 0x100);
    assert_eq!(
        edges_of(&store, site),
        vec![
            edge(EdgeKind::Internal, "transition_info", "Boilerplate"),
            edge(EdgeKind::Internal, "nested_site", "system / AllocationSite"),
        ]
    );
    let context = node_of(&profiler, &store, 0x500);
    assert_eq!(
        edges_of(&store, context),
        vec![
            edge(EdgeKind::Internal, "closure", "Closure"),
            edge(EdgeKind::Internal, "previous", "system / NativeContext"),
            edge(EdgeKind::Internal, "native_context", "system / NativeContext"),
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Extension
// ─────────────────────────────────────────────────────────────────────────────

fn extract_widget(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    ex.set_internal_field(object, entry, "owner", 0);
}

#[test]
fn test_custom_handler_for_host_kind() {
    let mut heap = InMemoryHeap::new();
    heap.insert(
        HeapObject::new(addr(0x100), 24, TypeTag::Custom("Widget"))
            .with_slots(vec![r(0x200), r(0x300)]),
    );
    heap.insert(plain(0x200, "Owner"));
    heap.insert(plain(0x300, "Extra"));
    heap.add_root(RootCategory::StrongRoots, addr(0x100), None);

    // Without a handler every slot is hidden.
    let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
    let store = capture(&mut profiler, &mut heap);
    let widget = node_of(&profiler, &store, 0x100);
    assert_eq!(&*store.node(widget).name, "system / Widget");
    assert_eq!(
        edges_of(&store, widget),
        vec![edge(EdgeKind::Hidden, "1", "Owner"), edge(EdgeKind::Hidden, "2", "Extra")]
    );

    let previous = profiler
        .handlers_mut()
        .register(TypeTag::Custom("Widget"), extract_widget);
    assert!(previous.is_none());
    let store = capture(&mut profiler, &mut heap);
    let widget = node_of(&profiler, &store, 0x100);
    assert_eq!(
        edges_of(&store, widget),
        vec![edge(EdgeKind::Internal, "owner", "Owner"), edge(EdgeKind::Hidden, "2", "Extra")]
    );

    assert!(profiler
        .handlers_mut()
        .register(TypeTag::Custom("Widget"), extract_widget)
        .is_some());
}

// ─────────────────────────────────────────────────────────────────────────────
// Traversal Order
// ─────────────────────────────────────────────────────────────────────────────

const WEAK_MAP: u64 = 0x9000;
const TABLE: u64 = 0x9100;

fn object_address(i: usize) -> u64 {
    0x1000 + i as u64 * 0x10
}

/// `n` objects linked by `links`, plus a weak map whose table holds the
/// first object weakly and the last strongly.
fn linked_heap(n: usize, links: &[(usize, usize)]) -> InMemoryHeap {
    let mut heap = InMemoryHeap::new();
    for i in 0..n {
        let slots: Vec<Value> = links
            .iter()
            .filter(|(from, _)| *from == i)
            .map(|(_, to)| r(object_address(*to)))
            .collect();
        let properties = slots
            .first()
            .map(|&value| vec![Property::in_object(PropertyKey::name("first"), value, 0)])
            .unwrap_or_default();
        heap.insert(
            HeapObject::new(addr(object_address(i)), 16, TypeTag::Object)
                .with_slots(slots)
                .with_object(ObjectLayout {
                    constructor_name: format!("Node{i}"),
                    properties,
                    ..ObjectLayout::default()
                }),
        );
    }
    heap.insert(
        HeapObject::new(addr(WEAK_MAP), 24, TypeTag::WeakCollection)
            .with_slots(vec![r(TABLE)])
            .with_detail(Detail::WeakCollection { table: 0 }),
    );
    heap.insert(
        HeapObject::new(addr(TABLE), 32, TypeTag::FixedArray)
            .with_slots(vec![r(object_address(0)), r(object_address(n - 1))])
            .with_detail(Detail::HashTable { entries: vec![(0, 1)] }),
    );
    heap.add_root(RootCategory::StrongRoots, addr(object_address(0)), None);
    heap.add_root(RootCategory::StrongRoots, addr(WEAK_MAP), None);
    heap
}

fn heap_shape() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<usize>)> {
    (2usize..10).prop_flat_map(|n| {
        let links = proptest::collection::vec((0..n, 0..n), 0..3 * n);
        let order = Just((0..n + 2).collect::<Vec<usize>>()).prop_shuffle();
        (Just(n), links, order)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_edge_set_independent_of_visit_order((n, links, order) in heap_shape()) {
        let mut heap = linked_heap(n, &links);
        let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
        let baseline = SnapshotSummary::compute(&capture(&mut profiler, &mut heap));

        let order: Vec<Address> = order
            .into_iter()
            .map(|i| match i {
                i if i < n => addr(object_address(i)),
                i if i == n => addr(WEAK_MAP),
                _ => addr(TABLE),
            })
            .collect();
        heap.set_iteration_order(order);
        let shuffled = SnapshotSummary::compute(&capture(&mut profiler, &mut heap));

        prop_assert_eq!(baseline.node_id_hash, shuffled.node_id_hash);
        prop_assert_eq!(baseline.edge_hash, shuffled.edge_hash);
    }

    #[test]
    fn prop_no_dangling_edges((n, links, _order) in heap_shape()) {
        let mut heap = linked_heap(n, &links);
        heap.remove(addr(object_address(n - 1)));
        let mut profiler = HeapProfiler::new(SnapshotConfig::default()).unwrap();
        let store = capture(&mut profiler, &mut heap);
        for e in store.edges() {
            prop_assert!(e.to < store.node_count());
            prop_assert!(e.from < store.node_count());
        }
    }
}
