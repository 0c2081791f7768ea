//! Built-in extraction routines, one per type tag.
//!
//! Every routine tolerates a [`Detail`] that does not match its tag: it then
//! reports nothing and the object's slots surface as hidden edges.

use super::{ContainerKind, ExtractorRegistry, HeapExplorer};
use crate::host::{Detail, HeapObject, Property, PropertyKey, TypeTag, Value};
use crate::types::NodeIndex;

/// Register every built-in handler.
pub fn register_builtins(registry: &mut ExtractorRegistry) {
    registry.register(TypeTag::Object, extract_object);
    registry.register(TypeTag::RegExp, extract_object);
    registry.register(TypeTag::GlobalObject, extract_global_object);
    registry.register(TypeTag::GlobalProxy, extract_global_proxy);
    registry.register(TypeTag::Function, extract_function);
    registry.register(TypeTag::BoundFunction, extract_bound_function);
    registry.register(TypeTag::Collection, extract_collection);
    registry.register(TypeTag::WeakCollection, extract_weak_collection);
    registry.register(TypeTag::Promise, extract_promise);
    registry.register(TypeTag::ArrayBuffer, extract_array_buffer);
    registry.register(TypeTag::ArrayBufferView, extract_array_buffer_view);
    registry.register(TypeTag::ConsString, extract_string);
    registry.register(TypeTag::SlicedString, extract_string);
    registry.register(TypeTag::Symbol, extract_symbol);
    registry.register(TypeTag::PrivateSymbol, extract_symbol);
    registry.register(TypeTag::Shape, extract_shape);
    registry.register(TypeTag::SharedFunctionInfo, extract_shared_function_info);
    registry.register(TypeTag::Script, extract_script);
    registry.register(TypeTag::Code, extract_code);
    registry.register(TypeTag::Cell, extract_cell);
    registry.register(TypeTag::WeakCell, extract_weak_cell);
    registry.register(TypeTag::PropertyCell, extract_property_cell);
    registry.register(TypeTag::AllocationSite, extract_allocation_site);
    registry.register(TypeTag::AccessorPair, extract_accessor_pair);
    registry.register(TypeTag::Context, extract_context);
    registry.register(TypeTag::NativeContext, extract_context);
    registry.register(TypeTag::FixedArray, extract_fixed_array);
}

/// Properties, elements, embedder fields, prototype and out-of-object stores of a
/// property-bearing object.
pub fn extract_object(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    let Some(layout) = &object.object else {
        return;
    };

    for property in &layout.properties {
        if property.accessor {
            extract_accessor_property(ex, entry, property);
        } else {
            ex.set_property_reference(entry, &property.key, property.value, None, property.slot);
        }
    }
    for element in &layout.elements {
        ex.set_element_reference(entry, element.index, element.value, element.slot);
    }
    for (ordinal, &slot) in layout.embedder_fields.iter().enumerate() {
        ex.set_internal_field(object, entry, &ordinal.to_string(), slot);
    }
    if let Some(prototype) = layout.prototype {
        ex.set_property_reference(entry, &PropertyKey::name("__proto__"), prototype, None, None);
    }
    if let Some(slot) = layout.properties_slot {
        ex.tag_field(object, slot, "(object properties)");
        ex.set_internal_field(object, entry, "properties", slot);
    }
    if let Some(slot) = layout.elements_slot {
        ex.tag_field(object, slot, "(object elements)");
        ex.set_internal_field(object, entry, "elements", slot);
    }
}

/// Accessor properties get an edge to the pair itself, then "get"/"set"
/// edges to every getter and setter that is not an oddball. A value that is
/// not an accessor pair reports nothing.
fn extract_accessor_property(ex: &mut HeapExplorer<'_>, entry: NodeIndex, property: &Property) {
    let host = ex.host();
    let pair = property.value.as_ref().and_then(|address| host.object(address));
    let Some((pair, Detail::AccessorPair { getter, setter })) = pair.map(|p| (p, &p.detail)) else {
        return;
    };
    ex.set_property_reference(entry, &property.key, property.value, None, property.slot);

    for (slot, prefix) in [(*getter, "get "), (*setter, "set ")] {
        let Some(accessor) = pair.slot(slot) else {
            continue;
        };
        let is_oddball = accessor
            .as_ref()
            .and_then(|address| host.object(address))
            .map_or(true, |target| target.tag == TypeTag::Oddball);
        if !is_oddball {
            ex.set_property_reference(entry, &property.key, accessor, Some(prefix), None);
        }
    }
}

fn extract_global_object(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::GlobalObject { native_context, global_proxy } = object.detail {
        ex.set_internal_field(object, entry, "native_context", native_context);
        ex.set_internal_field(object, entry, "global_proxy", global_proxy);
    }
    extract_object(ex, object, entry);
}

fn extract_global_proxy(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::GlobalProxy { native_context } = object.detail {
        ex.set_internal_field(object, entry, "native_context", native_context);
    }
}

fn extract_function(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::Function {
        shared,
        context,
        code,
        feedback_cell,
        prototype,
        ..
    } = object.detail
    {
        if let Some(slot) = prototype {
            if let Some(value) = object.slot(slot) {
                ex.set_property_reference(entry, &PropertyKey::name("prototype"), value, None, Some(slot));
            }
        }
        if let Some(slot) = feedback_cell {
            ex.tag_field(object, slot, "(function feedback vector cell)");
            ex.set_internal_field(object, entry, "feedback_vector_cell", slot);
        }
        ex.tag_field(object, shared, "(shared function info)");
        ex.set_internal_field(object, entry, "shared", shared);
        ex.tag_field(object, context, "(context)");
        ex.set_internal_field(object, entry, "context", context);
        ex.set_internal_field(object, entry, "code", code);
    }
    extract_object(ex, object, entry);
}

fn extract_bound_function(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::BoundFunction { target, bound_this, bound_arguments } = object.detail {
        ex.tag_field(object, bound_arguments, "(bound arguments)");
        ex.set_internal_field(object, entry, "bindings", bound_arguments);
        ex.set_internal_field(object, entry, "bound_this", bound_this);
        ex.set_internal_field(object, entry, "bound_function", target);

        let host = ex.host();
        let arguments = object
            .slot(bound_arguments)
            .and_then(Value::as_ref)
            .and_then(|address| host.object(address));
        if let Some(arguments) = arguments {
            for (i, &value) in arguments.slots.iter().enumerate() {
                ex.set_shortcut_reference(entry, &format!("bound_argument_{i}"), value);
            }
        }
    }
    extract_object(ex, object, entry);
}

fn extract_collection(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::Collection { table } = object.detail {
        ex.set_internal_field(object, entry, "table", table);
    }
    extract_object(ex, object, entry);
}

fn extract_weak_collection(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::WeakCollection { table } = object.detail {
        ex.tag_container(object, table, ContainerKind::WeakCollectionTable);
        ex.set_internal_field(object, entry, "table", table);
    }
    extract_object(ex, object, entry);
}

fn extract_promise(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::Promise { result, reactions } = object.detail {
        ex.set_internal_field(object, entry, "result", result);
        ex.set_internal_field(object, entry, "reactions", reactions);
    }
    extract_object(ex, object, entry);
}

fn extract_array_buffer(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::ArrayBuffer { backing_store: Some(backing_store) } = object.detail {
        let data = ex.get_backing_store_entry(backing_store);
        ex.set_internal_node_reference(entry, "backing_store", data);
    }
    extract_object(ex, object, entry);
}

fn extract_array_buffer_view(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::ArrayBufferView { buffer } = object.detail {
        ex.set_internal_field(object, entry, "buffer", buffer);
    }
    extract_object(ex, object, entry);
}

fn extract_string(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    match object.detail {
        Detail::ConsString { first, second } => {
            ex.set_internal_field(object, entry, "first", first);
            ex.set_internal_field(object, entry, "second", second);
        }
        Detail::SlicedString { parent } => {
            ex.set_internal_field(object, entry, "parent", parent);
        }
        _ => {}
    }
}

fn extract_symbol(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::Symbol { name } = object.detail {
        ex.set_internal_field(object, entry, "name", name);
    }
}

fn extract_shape(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    let Detail::Shape { prototype, constructor, descriptors, transitions } = object.detail else {
        return;
    };
    if let Some(slot) = transitions {
        ex.tag_field(object, slot, "(transition array)");
        ex.tag_container(object, slot, ContainerKind::WeakArray);
        ex.set_internal_field(object, entry, "transitions", slot);
    }
    if let Some(slot) = descriptors {
        ex.tag_field(object, slot, "(map descriptors)");
        ex.set_internal_field(object, entry, "descriptors", slot);
    }
    ex.set_internal_field(object, entry, "prototype", prototype);
    ex.set_internal_field(object, entry, "constructor", constructor);
}

fn extract_shared_function_info(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    let Detail::SharedFunctionInfo { name, code, script, scope_info } = &object.detail else {
        return;
    };
    let code_tag = if name.is_empty() {
        "(anonymous code)".to_string()
    } else {
        format!("(code for {name})")
    };
    ex.tag_field(object, *code, &code_tag);
    ex.set_internal_field(object, entry, "code", *code);
    if let Some(slot) = *scope_info {
        ex.tag_field(object, slot, "(function scope info)");
        ex.set_internal_field(object, entry, "scope_info", slot);
    }
    if let Some(slot) = *script {
        ex.set_internal_field(object, entry, "script", slot);
    }
}

fn extract_script(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::Script { source, .. } = object.detail {
        ex.set_internal_field(object, entry, "source", source);
    }
}

fn extract_code(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    let Detail::Code { relocation_info, source_positions } = object.detail else {
        return;
    };
    if let Some(slot) = relocation_info {
        ex.tag_field(object, slot, "(code relocation info)");
        ex.set_internal_field(object, entry, "relocation_info", slot);
    }
    if let Some(slot) = source_positions {
        ex.tag_field(object, slot, "(source position table)");
        ex.set_internal_field(object, entry, "source_position_table", slot);
    }
}

fn extract_cell(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::Cell { value } = object.detail {
        ex.set_internal_field(object, entry, "value", value);
    }
}

fn extract_weak_cell(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::Cell { value } = object.detail {
        ex.set_weak_field(object, entry, "value", value);
    }
}

fn extract_property_cell(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    let Detail::PropertyCell { value, dependent_code } = object.detail else {
        return;
    };
    ex.set_internal_field(object, entry, "value", value);
    if let Some(slot) = dependent_code {
        ex.tag_field(object, slot, "(dependent code)");
        ex.tag_container(object, slot, ContainerKind::WeakArray);
        ex.set_internal_field(object, entry, "dependent_code", slot);
    }
}

fn extract_allocation_site(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    let Detail::AllocationSite { transition_info, nested_site, weak_next } = object.detail else {
        return;
    };
    ex.set_internal_field(object, entry, "transition_info", transition_info);
    if let Some(slot) = nested_site {
        ex.set_internal_field(object, entry, "nested_site", slot);
    }
    // The site list link is bookkeeping, not ownership.
    if let Some(slot) = weak_next {
        ex.mark_non_essential(slot);
    }
}

fn extract_accessor_pair(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    if let Detail::AccessorPair { getter, setter } = object.detail {
        ex.set_internal_field(object, entry, "getter", getter);
        ex.set_internal_field(object, entry, "setter", setter);
    }
}

/// Scope objects. Runs in the second pass.
fn extract_context(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    let Detail::Context {
        closure,
        previous,
        extension,
        native_context,
        locals,
        function_name,
        fields,
        next_context_link,
        ..
    } = &object.detail
    else {
        return;
    };

    for (name, slot) in locals {
        ex.set_context_field(object, entry, name, *slot);
    }
    if let Some((name, slot)) = function_name {
        ex.set_context_field(object, entry, name, *slot);
    }

    ex.set_internal_field(object, entry, "closure", *closure);
    ex.set_internal_field(object, entry, "previous", *previous);
    if let Some(slot) = *extension {
        ex.set_internal_field(object, entry, "extension", slot);
    }
    ex.set_internal_field(object, entry, "native_context", *native_context);

    for field in fields {
        if field.weak {
            ex.set_weak_field(object, entry, &field.name, field.slot);
        } else {
            ex.set_internal_field(object, entry, &field.name, field.slot);
        }
    }
    if let Some(slot) = *next_context_link {
        ex.mark_non_essential(slot);
    }
}

/// General-purpose arrays. Runs in the second pass, once owners have
/// recorded what the array is for.
fn extract_fixed_array(ex: &mut HeapExplorer<'_>, object: &HeapObject, entry: NodeIndex) {
    match (ex.container_kind(object.address), &object.detail) {
        (Some(ContainerKind::WeakCollectionTable), Detail::HashTable { entries }) => {
            for &(key, value) in entries {
                ex.set_weak_index_field(object, entry, key);
                ex.set_internal_index_field(object, entry, value);
            }
        }
        (Some(ContainerKind::WeakArray), _) => {
            for slot in 0..object.slots.len() {
                ex.set_weak_index_field(object, entry, slot);
            }
        }
        _ => {
            for slot in 0..object.slots.len() {
                ex.set_internal_index_field(object, entry, slot);
            }
        }
    }
}
