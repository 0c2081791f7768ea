//! The managed runtime as seen by the snapshot engine.
//!
//! The engine never inspects memory directly. A [`HeapHost`] reports live
//! objects, their raw reference slots and, per kind, the structural facts
//! the extractor needs to name edges (property keys, which slot holds a
//! function's context, ...).
//!
//! ## Slots
//!
//! `HeapObject::slots` lists every pointer-shaped field of an object in
//! layout order. Kind-specific details refer to slots by their position in
//! this list. Any slot a kind-specific routine does not claim is reported as
//! a hidden edge, so hosts may describe as little or as much structure as
//! they like without losing references.

pub mod memory;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of an object in the managed heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(u64);

impl Address {
    /// Wrap a raw address.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Content of a pointer-shaped slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    /// Reference to a heap object.
    Ref(Address),
    /// Immediate value (tagged small integer); never a graph node.
    Small(i64),
}

impl Value {
    /// The referenced address, if this is a reference.
    pub fn as_ref(self) -> Option<Address> {
        match self {
            Self::Ref(address) => Some(address),
            Self::Small(_) => None,
        }
    }
}

/// Runtime-reported type tag of an object.
///
/// Selects the extraction routine. `Custom` lets embedders add kinds of their
/// own and register handlers for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Ordinary property-bearing object.
    Object,
    /// Global object of a realm.
    GlobalObject,
    /// Proxy standing in for a global object.
    GlobalProxy,
    /// Function closure.
    Function,
    /// Function produced by `bind`.
    BoundFunction,
    /// Regular expression.
    RegExp,
    /// Keyed collection (map or set).
    Collection,
    /// Weakly keyed collection.
    WeakCollection,
    /// Promise.
    Promise,
    /// Array buffer with native backing store.
    ArrayBuffer,
    /// Typed view over an array buffer.
    ArrayBufferView,
    /// Flat string.
    String,
    /// Concatenated string.
    ConsString,
    /// Substring view.
    SlicedString,
    /// Public symbol.
    Symbol,
    /// Private symbol.
    PrivateSymbol,
    /// Compiled code.
    Code,
    /// Function metadata shared between closures.
    SharedFunctionInfo,
    /// Script.
    Script,
    /// Scope/context object.
    Context,
    /// Outermost context of a realm.
    NativeContext,
    /// General purpose array-like container.
    FixedArray,
    /// Raw byte storage.
    ByteArray,
    /// Boxed number.
    HeapNumber,
    /// Object shape (hidden class / map).
    Shape,
    /// Single-value cell.
    Cell,
    /// Cell holding its value weakly.
    WeakCell,
    /// Cell backing a global property.
    PropertyCell,
    /// Allocation site feedback.
    AllocationSite,
    /// Getter/setter pair.
    AccessorPair,
    /// Well-known immutable value (undefined, null, true, ...).
    Oddball,
    /// Wrapper around a native pointer.
    Foreign,
    /// Embedder-defined kind.
    Custom(&'static str),
}

impl TypeTag {
    /// Whether objects of this kind are general-purpose containers whose
    /// edge semantics depend on their owner. Containers are visited in the
    /// second extraction pass.
    pub fn is_container(self) -> bool {
        matches!(self, Self::FixedArray | Self::Context | Self::NativeContext)
    }

    /// Label used for nodes of kinds that have no dedicated node kind.
    pub fn system_name(self) -> String {
        let name = match self {
            Self::Shape => "Map",
            Self::Cell => "Cell",
            Self::WeakCell => "WeakCell",
            Self::PropertyCell => "PropertyCell",
            Self::AllocationSite => "AllocationSite",
            Self::AccessorPair => "AccessorPair",
            Self::Oddball => "Oddball",
            Self::Foreign => "Foreign",
            Self::Custom(name) => name,
            _ => return "system".to_string(),
        };
        format!("system / {name}")
    }
}

/// Key of an object property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String key. An empty string marks an internal key.
    Name(String),
    /// Symbol key, described by its description.
    Symbol(String),
}

impl PropertyKey {
    /// Convenience constructor for string keys.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Text used as the edge label.
    pub fn label(&self) -> &str {
        match self {
            Self::Name(name) | Self::Symbol(name) => name,
        }
    }
}

/// A named property of a property-bearing object.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Property key.
    pub key: PropertyKey,
    /// Property value. For accessor properties, the accessor pair object.
    pub value: Value,
    /// Slot holding the value when it is stored inside the object.
    pub slot: Option<usize>,
    /// Whether `value` is a getter/setter pair rather than a data value.
    pub accessor: bool,
}

impl Property {
    /// A data property stored outside the object.
    pub fn data(key: PropertyKey, value: Value) -> Self {
        Self { key, value, slot: None, accessor: false }
    }

    /// A data property stored in `slot`.
    pub fn in_object(key: PropertyKey, value: Value, slot: usize) -> Self {
        Self { key, value, slot: Some(slot), accessor: false }
    }

    /// An accessor property whose value is an accessor pair.
    pub fn accessor(key: PropertyKey, pair: Address) -> Self {
        Self { key, value: Value::Ref(pair), slot: None, accessor: true }
    }
}

/// An indexed element of a property-bearing object. Holes are omitted.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element index.
    pub index: u32,
    /// Element value.
    pub value: Value,
    /// Slot holding the value when it is stored inside the object.
    pub slot: Option<usize>,
}

/// Structure shared by all property-bearing objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectLayout {
    /// Name of the constructor that created the object.
    pub constructor_name: String,
    /// Own properties.
    pub properties: Vec<Property>,
    /// Own elements.
    pub elements: Vec<Element>,
    /// Slots reserved for embedder data.
    pub embedder_fields: Vec<usize>,
    /// Prototype, when not null.
    pub prototype: Option<Value>,
    /// Slot of the out-of-object property store.
    pub properties_slot: Option<usize>,
    /// Slot of the element store.
    pub elements_slot: Option<usize>,
}

/// A named field of a native context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextField {
    /// Field name.
    pub name: String,
    /// Slot index.
    pub slot: usize,
    /// Whether the context holds this field weakly.
    pub weak: bool,
}

/// Native memory owned by an array buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackingStore {
    /// Address of the native allocation.
    pub address: Address,
    /// Length in bytes.
    pub byte_length: u64,
}

/// Kind-specific structure of an object. Slot fields index `HeapObject::slots`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Detail {
    /// Nothing beyond the raw slots.
    #[default]
    None,
    /// Global object.
    GlobalObject { native_context: usize, global_proxy: usize },
    /// Global proxy.
    GlobalProxy { native_context: usize },
    /// Function closure.
    Function {
        name: String,
        shared: usize,
        context: usize,
        code: usize,
        feedback_cell: Option<usize>,
        prototype: Option<usize>,
    },
    /// Bound function.
    BoundFunction { target: usize, bound_this: usize, bound_arguments: usize },
    /// Regular expression.
    RegExp { pattern: String },
    /// Map or set.
    Collection { table: usize },
    /// Weak map or weak set.
    WeakCollection { table: usize },
    /// Promise.
    Promise { result: usize, reactions: usize },
    /// Array buffer.
    ArrayBuffer { backing_store: Option<BackingStore> },
    /// View over an array buffer.
    ArrayBufferView { buffer: usize },
    /// Flat string.
    String { content: String },
    /// Concatenated string.
    ConsString { first: usize, second: usize },
    /// Sliced string.
    SlicedString { parent: usize },
    /// Symbol.
    Symbol { name: usize },
    /// Compiled code.
    Code { relocation_info: Option<usize>, source_positions: Option<usize> },
    /// Shared function metadata.
    SharedFunctionInfo { name: String, code: usize, script: Option<usize>, scope_info: Option<usize> },
    /// Script.
    Script { name: Option<String>, source: usize },
    /// Scope/context object. `locals` are the context-allocated variables of
    /// a declaration context; `fields` are the extra slots of a native
    /// context.
    Context {
        closure: usize,
        previous: usize,
        extension: Option<usize>,
        native_context: usize,
        locals: Vec<(String, usize)>,
        function_name: Option<(String, usize)>,
        fields: Vec<ContextField>,
        next_context_link: Option<usize>,
        global_object: Option<Address>,
    },
    /// Object shape.
    Shape {
        prototype: usize,
        constructor: usize,
        descriptors: Option<usize>,
        transitions: Option<usize>,
    },
    /// Cell or weak cell.
    Cell { value: usize },
    /// Property cell.
    PropertyCell { value: usize, dependent_code: Option<usize> },
    /// Allocation site.
    AllocationSite { transition_info: usize, nested_site: Option<usize>, weak_next: Option<usize> },
    /// Getter/setter pair.
    AccessorPair { getter: usize, setter: usize },
    /// Hash table backing a collection; each entry is a (key slot, value slot) pair.
    HashTable { entries: Vec<(usize, usize)> },
}

/// A live object as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapObject {
    /// Current address.
    pub address: Address,
    /// Size in bytes.
    pub size: u32,
    /// Runtime type tag.
    pub tag: TypeTag,
    /// Shape (map) of the object.
    pub shape: Option<Address>,
    /// Pointer-shaped fields in layout order.
    pub slots: Vec<Value>,
    /// Property-bearing part, for objects that have one.
    pub object: Option<ObjectLayout>,
    /// Kind-specific structure.
    pub detail: Detail,
}

impl HeapObject {
    /// Create an object with no slots and no structure.
    pub fn new(address: Address, size: u32, tag: TypeTag) -> Self {
        Self {
            address,
            size,
            tag,
            shape: None,
            slots: Vec::new(),
            object: None,
            detail: Detail::None,
        }
    }

    /// Set the shape.
    pub fn with_shape(mut self, shape: Address) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Set the raw slots.
    pub fn with_slots(mut self, slots: Vec<Value>) -> Self {
        self.slots = slots;
        self
    }

    /// Set the property-bearing part.
    pub fn with_object(mut self, object: ObjectLayout) -> Self {
        self.object = Some(object);
        self
    }

    /// Set the kind-specific structure.
    pub fn with_detail(mut self, detail: Detail) -> Self {
        self.detail = detail;
        self
    }

    /// Value of a slot, if it exists.
    pub fn slot(&self, index: usize) -> Option<Value> {
        self.slots.get(index).copied()
    }
}

/// Category of a GC root. Each category becomes a synthetic subroot node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RootCategory {
    /// Strong root list of the runtime.
    StrongRoots,
    /// Internalized string table.
    InternalizedStrings,
    /// External string table.
    ExternalStrings,
    /// Runtime bootstrapper.
    Bootstrapper,
    /// Per-isolate state.
    Isolate,
    /// Relocatable objects.
    Relocatable,
    /// Debugger state.
    Debugger,
    /// Compilation cache.
    CompilationCache,
    /// Handle scopes.
    HandleScope,
    /// Builtin code objects.
    Builtins,
    /// Global handles.
    GlobalHandles,
    /// Eternal handles.
    EternalHandles,
    /// Thread manager.
    ThreadManager,
    /// Extensions.
    Extensions,
    /// Weak collections registry.
    WeakCollections,
    /// Anything else.
    Unknown,
}

impl RootCategory {
    /// All categories, in subroot order.
    pub const ALL: [RootCategory; 16] = [
        RootCategory::StrongRoots,
        RootCategory::InternalizedStrings,
        RootCategory::ExternalStrings,
        RootCategory::Bootstrapper,
        RootCategory::Isolate,
        RootCategory::Relocatable,
        RootCategory::Debugger,
        RootCategory::CompilationCache,
        RootCategory::HandleScope,
        RootCategory::Builtins,
        RootCategory::GlobalHandles,
        RootCategory::EternalHandles,
        RootCategory::ThreadManager,
        RootCategory::Extensions,
        RootCategory::WeakCollections,
        RootCategory::Unknown,
    ];

    /// Name of the synthetic subroot node.
    pub fn label(self) -> &'static str {
        match self {
            Self::StrongRoots => "(Strong roots)",
            Self::InternalizedStrings => "(Internalized strings)",
            Self::ExternalStrings => "(External strings)",
            Self::Bootstrapper => "(Bootstrapper)",
            Self::Isolate => "(Isolate)",
            Self::Relocatable => "(Relocatable)",
            Self::Debugger => "(Debugger)",
            Self::CompilationCache => "(Compilation cache)",
            Self::HandleScope => "(Handle scope)",
            Self::Builtins => "(Builtins)",
            Self::GlobalHandles => "(Global handles)",
            Self::EternalHandles => "(Eternal handles)",
            Self::ThreadManager => "(Thread manager)",
            Self::Extensions => "(Extensions)",
            Self::WeakCollections => "(Weak collections)",
            Self::Unknown => "(Unknown)",
        }
    }

    /// Position in [`RootCategory::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }
}

/// Which root references a root walk should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootMode {
    /// Strong roots only.
    StrongOnly,
    /// Strong and weak roots.
    All,
}

/// One reference from a GC root.
#[derive(Debug, Clone, PartialEq)]
pub struct RootReference {
    /// Root category.
    pub category: RootCategory,
    /// Referenced object.
    pub target: Address,
    /// Well-known name of the root slot, or the builtin name for
    /// [`RootCategory::Builtins`].
    pub name: Option<String>,
}

/// An object living outside the managed heap, attached to wrapper objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeCompanion {
    /// Display label.
    pub label: String,
    /// Label of the group the companion is listed under.
    pub group_label: String,
    /// Embedder-provided identity hash.
    pub hash: u64,
    /// Number of elements, when meaningful.
    pub element_count: Option<u64>,
    /// Size in bytes, when known.
    pub size: Option<u64>,
    /// Heap objects that wrap this companion.
    pub wrappers: Vec<Address>,
}

/// The managed runtime being snapshotted.
///
/// Implementations must not relocate or collect objects between
/// [`quiesce_for_iteration`](HeapHost::quiesce_for_iteration) and the end of
/// the capture.
pub trait HeapHost {
    /// Bring the heap into an iterable state (typically a full GC).
    fn quiesce_for_iteration(&mut self);

    /// Iterate every live object.
    fn live_objects(&self) -> Box<dyn Iterator<Item = &HeapObject> + '_>;

    /// Look up a live object by address.
    fn object(&self, address: Address) -> Option<&HeapObject>;

    /// Report root references in a stable order. References reported in
    /// [`RootMode::StrongOnly`] must appear, in the same relative order, in
    /// the [`RootMode::All`] walk.
    fn iterate_roots(&self, mode: RootMode, visitor: &mut dyn FnMut(RootReference));

    /// Whether `address` is a well-known immutable singleton (empty array,
    /// filler shapes, ...) that should not appear as an edge target.
    fn is_well_known_singleton(&self, _address: Address) -> bool {
        false
    }

    /// Allocation trace node of an object, 0 when allocation tracking is off.
    fn trace_node_id(&self, _address: Address) -> u32 {
        0
    }

    /// Native companion objects known to the embedder.
    fn native_companions(&self) -> Vec<NativeCompanion> {
        Vec::new()
    }
}

/// Supplies display tags for global objects (e.g. the URL of a window).
pub trait GlobalObjectNameResolver {
    /// Tag for the global object at `global`, if any.
    fn name_for(&self, global: Address) -> Option<String>;
}
