//! GC root edges.
//!
//! The host is walked twice, once for strong roots only and once for every
//! root. References seen in the full walk but not in the strong one are weak
//! roots. Both walks report references in the same relative order, so the
//! two sequences merge with a single cursor.

use std::collections::HashMap;

use super::HeapExplorer;
use crate::host::{
    Address, Detail, GlobalObjectNameResolver, HeapHost, RootCategory, RootMode, RootReference,
    TypeTag,
};
use crate::store::{GraphStore, GC_ROOTS_INDEX, ROOT_INDEX};
use crate::types::EdgeKind;

/// Global object reachable from a native context root, if any.
fn global_of_native_context(host: &dyn HeapHost, context: Address) -> Option<Address> {
    let object = host.object(context)?;
    if object.tag != TypeTag::NativeContext {
        return None;
    }
    let Detail::Context { global_object: Some(global), .. } = object.detail else {
        return None;
    };
    host.object(global)
        .filter(|global| global.tag == TypeTag::GlobalObject)
        .map(|global| global.address)
}

/// Ask `resolver` for a display tag for every global object reachable from a
/// native context root.
pub fn collect_global_tags(
    host: &dyn HeapHost,
    resolver: Option<&dyn GlobalObjectNameResolver>,
) -> HashMap<Address, String> {
    let mut tags = HashMap::new();
    let Some(resolver) = resolver else {
        return tags;
    };
    host.iterate_roots(RootMode::All, &mut |root| {
        let Some(global) = global_of_native_context(host, root.target) else {
            return;
        };
        if tags.contains_key(&global) {
            return;
        }
        if let Some(tag) = resolver.name_for(global) {
            tags.insert(global, tag);
        }
    });
    tracing::debug!(globals = tags.len(), "Tagged global objects");
    tags
}

impl HeapExplorer<'_> {
    /// Add the synthetic root structure and one edge per root reference.
    pub(crate) fn extract_roots(&mut self) {
        self.filler
            .set_indexed_auto_index_reference(EdgeKind::Element, ROOT_INDEX, GC_ROOTS_INDEX);
        for category in RootCategory::ALL {
            self.filler.set_indexed_auto_index_reference(
                EdgeKind::Element,
                GC_ROOTS_INDEX,
                GraphStore::subroot_index(category),
            );
        }

        let mut strong = Vec::new();
        self.host
            .iterate_roots(RootMode::StrongOnly, &mut |root| strong.push(root));
        let mut all = Vec::new();
        self.host.iterate_roots(RootMode::All, &mut |root| all.push(root));

        let mut cursor = 0;
        for root in &all {
            let is_weak = strong.get(cursor) != Some(root);
            if !is_weak {
                cursor += 1;
            }
            self.set_gc_subroot_reference(root, is_weak);
        }
        if cursor != strong.len() {
            tracing::warn!(
                strong = strong.len(),
                matched = cursor,
                "Strong root walk is not a subsequence of the full walk"
            );
        }
        tracing::debug!(
            roots = all.len(),
            weak = all.len() - cursor,
            user_roots = self.user_roots.len(),
            "Extracted root references"
        );
    }

    fn set_gc_subroot_reference(&mut self, root: &RootReference, is_weak: bool) {
        let Some(child) = self.get_entry(root.target) else {
            return;
        };
        let subroot = GraphStore::subroot_index(root.category);

        if root.category == RootCategory::Builtins {
            if let Some(name) = &root.name {
                self.filler
                    .store_mut()
                    .set_name_if_empty(child, &format!("({name} builtin)"));
            }
        }

        let well_known_name = root
            .name
            .as_deref()
            .filter(|_| root.category != RootCategory::Builtins);
        match (is_weak, well_known_name) {
            (true, _) => self
                .filler
                .set_named_auto_index_reference(EdgeKind::Weak, subroot, child),
            (false, Some(name)) => self
                .filler
                .set_named_reference(EdgeKind::Internal, subroot, name, child),
            (false, None) => self
                .filler
                .set_indexed_auto_index_reference(EdgeKind::Element, subroot, child),
        }

        if is_weak {
            return;
        }
        let Some(global) = global_of_native_context(self.host, root.target) else {
            return;
        };
        if self.user_roots.insert(global) {
            self.set_user_global_reference(global);
        }
    }

    /// Shortcut from the snapshot root to a realm's global object, so users
    /// find globals at the top of the graph.
    fn set_user_global_reference(&mut self, global: Address) {
        if let Some(entry) = self.get_entry(global) {
            self.filler
                .set_named_auto_index_reference(EdgeKind::Shortcut, ROOT_INDEX, entry);
        }
    }
}
