//! Native companion objects.
//!
//! Companions live outside the managed heap. Each one gets a `Native` node
//! with an odd ID, listed under a synthetic node for its group, and linked
//! both ways with the heap objects that wrap it.

use std::ops::ControlFlow;

use super::HeapExplorer;
use crate::error::Result;
use crate::filler::{HeapThing, NativeEntryAllocator};
use crate::generator::ProgressCounter;
use crate::host::NativeCompanion;
use crate::store::ROOT_INDEX;
use crate::types::{EdgeKind, NodeIndex, NodeKind};

/// Display name of a companion node.
fn companion_name(companion: &NativeCompanion) -> String {
    match companion.element_count {
        Some(count) => format!("{} / {} entries", companion.label, count),
        None => companion.label.clone(),
    }
}

impl HeapExplorer<'_> {
    /// Add nodes and edges for every companion, then link each group from
    /// the snapshot root.
    pub(crate) fn extract_native_companions(
        &mut self,
        companions: &[NativeCompanion],
        progress: &mut ProgressCounter<'_>,
    ) -> Result<ControlFlow<()>> {
        let mut groups: Vec<NodeIndex> = Vec::new();

        for companion in companions {
            let group = self.group_entry(&companion.group_label, &mut groups);
            let entry = self.companion_entry(companion);
            self.filler
                .set_named_auto_index_reference(EdgeKind::Internal, group, entry);

            for &wrapper in &companion.wrappers {
                let Some(wrapper_entry) = self.filler.find_entry(&HeapThing::Object(wrapper))
                else {
                    tracing::warn!(
                        %wrapper,
                        label = %companion.label,
                        "Native companion wrapper has no node"
                    );
                    continue;
                };
                self.filler
                    .set_named_reference(EdgeKind::Internal, wrapper_entry, "native", entry);
                self.filler
                    .set_indexed_auto_index_reference(EdgeKind::Element, entry, wrapper_entry);
            }

            progress.step();
            if progress.report(false, self.store().node_count())?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }

        for &group in &groups {
            self.filler
                .set_indexed_auto_index_reference(EdgeKind::Element, ROOT_INDEX, group);
        }
        tracing::debug!(
            companions = companions.len(),
            groups = groups.len(),
            "Extracted native companions"
        );
        Ok(ControlFlow::Continue(()))
    }

    fn group_entry(&mut self, label: &str, groups: &mut Vec<NodeIndex>) -> NodeIndex {
        let thing = HeapThing::NativeGroup(label.into());
        if let Some(entry) = self.filler.find_entry(&thing) {
            return entry;
        }
        let mut allocator = NativeEntryAllocator {
            kind: NodeKind::Synthetic,
            name: label.to_string(),
            id: self.registry.generate_group_id(label),
            size: 0,
        };
        let entry = self.filler.add_entry(thing, &mut allocator);
        groups.push(entry);
        entry
    }

    fn companion_entry(&mut self, companion: &NativeCompanion) -> NodeIndex {
        let id = self.registry.generate_native_id(companion);
        let mut allocator = NativeEntryAllocator {
            kind: NodeKind::Native,
            name: companion_name(companion),
            id,
            size: companion.size.unwrap_or(0),
        };
        self.filler
            .find_or_add_entry(HeapThing::Native(id), &mut allocator)
    }
}
