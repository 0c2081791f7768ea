//! Identity registry: stable object IDs across relocations and snapshots.
//!
//! The registry maps the current address of every tracked heap object to an
//! [`ObjectId`]. IDs are handed out monotonically in steps of two, so heap IDs
//! are always even; native companions get odd IDs derived from a hash of
//! their identity and are never stored here.
//!
//! ## Invariants
//!
//! - Entries are ordered by ID (appends are monotonic, compaction keeps order)
//! - `index` holds exactly the entries with a live address
//! - Entry 0 is a dummy with ID 0 and no address

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::label_hash;
use crate::error::Result;
use crate::host::{Address, Detail, HeapHost, NativeCompanion, RootCategory};
use crate::serializer::{OutputSink, WriteResult};
use crate::types::ObjectId;

/// Distance between two consecutive heap IDs.
pub const ID_STEP: u64 = 2;

/// ID of the synthetic root node.
pub const ROOT_ID: ObjectId = ObjectId::new(2);

/// ID of the synthetic "(GC roots)" node.
pub const GC_ROOTS_ID: ObjectId = ObjectId::new(4);

/// ID of the first synthetic subroot.
pub const FIRST_SUBROOT_ID: ObjectId = ObjectId::new(6);

/// First ID handed out to a heap object.
pub const FIRST_AVAILABLE_ID: ObjectId =
    ObjectId::new(FIRST_SUBROOT_ID.get() + ID_STEP * RootCategory::ALL.len() as u64);

/// Seed for hashing native group labels, distinct from the companion label seed.
const GROUP_ID_SEED: u64 = 0x6772_6f75_70; // "group"

/// ID of the subroot node for `category`.
pub fn subroot_id(category: RootCategory) -> ObjectId {
    ObjectId::new(FIRST_SUBROOT_ID.get() + ID_STEP * category.ordinal() as u64)
}

#[derive(Debug, Clone)]
struct EntryInfo {
    id: ObjectId,
    address: Option<Address>,
    size: u32,
    accessed: bool,
}

/// Change in the live population of one heap-stats interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapStatsUpdate {
    /// Interval index.
    pub index: u32,
    /// Live objects allocated during the interval.
    pub count: u32,
    /// Their total size in bytes.
    pub size: u32,
}

/// One heap-stats sample, as written to the snapshot's `samples` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapSample {
    /// Microseconds since the first sample.
    pub timestamp_us: i64,
    /// Last ID assigned when the sample was taken.
    pub last_assigned_id: ObjectId,
}

/// Result of [`ObjectIdRegistry::push_heap_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStatsPush {
    /// Last ID assigned at the time of the push.
    pub last_assigned_id: ObjectId,
    /// Microseconds between the first and the latest interval.
    pub elapsed_us: i64,
    /// Whether the sink aborted the push.
    pub aborted: bool,
}

#[derive(Debug, Clone)]
struct TimeInterval {
    /// Exclusive upper bound of the IDs allocated in this interval.
    id: ObjectId,
    count: u32,
    size: u32,
    timestamp: DateTime<Utc>,
}

/// Address → ID registry, persistent across snapshot generations.
#[derive(Debug)]
pub struct ObjectIdRegistry {
    next_id: u64,
    entries: Vec<EntryInfo>,
    index: HashMap<Address, usize>,
    time_intervals: Vec<TimeInterval>,
    trace_objects: bool,
}

impl Default for ObjectIdRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectIdRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: FIRST_AVAILABLE_ID.get(),
            entries: vec![EntryInfo {
                id: ObjectId::UNKNOWN,
                address: None,
                size: 0,
                accessed: true,
            }],
            index: HashMap::new(),
            time_intervals: Vec::new(),
            trace_objects: false,
        }
    }

    /// Log every move and size update at `trace` level.
    pub fn set_trace_objects(&mut self, enabled: bool) {
        self.trace_objects = enabled;
    }

    /// Number of tracked objects.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no object is tracked.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Return the ID of the object at `address`, assigning a fresh one if it
    /// is not tracked yet. Marks the entry accessed; the size is updated
    /// (last write wins).
    pub fn find_or_add(&mut self, address: Address, size: u32) -> ObjectId {
        self.find_or_add_entry(address, size, true)
    }

    /// Record the current size of an object without marking it accessed.
    pub fn update_object_size(&mut self, address: Address, size: u32) {
        self.find_or_add_entry(address, size, false);
    }

    fn find_or_add_entry(&mut self, address: Address, size: u32, accessed: bool) -> ObjectId {
        if let Some(&slot) = self.index.get(&address) {
            let entry = &mut self.entries[slot];
            entry.accessed = accessed;
            if self.trace_objects {
                tracing::trace!(
                    %address,
                    old_size = entry.size,
                    new_size = size,
                    "Update object size"
                );
            }
            entry.size = size;
            return entry.id;
        }

        let id = ObjectId::new(self.next_id);
        self.next_id += ID_STEP;
        self.index.insert(address, self.entries.len());
        self.entries.push(EntryInfo {
            id,
            address: Some(address),
            size,
            accessed,
        });
        id
    }

    /// ID of the object at `address`, if tracked.
    pub fn find(&self, address: Address) -> Option<ObjectId> {
        self.index.get(&address).map(|&slot| self.entries[slot].id)
    }

    /// Record that the object at `from` now lives at `to`.
    ///
    /// Returns whether `from` was tracked. An entry already at `to` belongs to
    /// an object that has died; it is invalidated either way.
    pub fn move_object(&mut self, from: Address, to: Address, new_size: u32) -> bool {
        if from == to {
            return false;
        }

        let Some(from_slot) = self.index.remove(&from) else {
            if let Some(stale) = self.index.remove(&to) {
                self.entries[stale].address = None;
            }
            return false;
        };

        if let Some(stale) = self.index.insert(to, from_slot) {
            self.entries[stale].address = None;
        }
        let entry = &mut self.entries[from_slot];
        entry.address = Some(to);
        if self.trace_objects {
            tracing::trace!(
                %from,
                %to,
                old_size = entry.size,
                new_size,
                "Move object"
            );
        }
        entry.size = new_size;
        true
    }

    /// Drop entries not accessed since the last sweep (and invalidated
    /// ones), reset the accessed flags and compact the entry table.
    pub fn sweep(&mut self) {
        let before = self.entries.len();
        let mut first_free = 1;
        for i in 1..self.entries.len() {
            let entry = self.entries[i].clone();
            match entry.address {
                Some(address) if entry.accessed => {
                    self.entries[first_free] = EntryInfo { accessed: false, ..entry };
                    self.index.insert(address, first_free);
                    first_free += 1;
                }
                Some(address) => {
                    self.index.remove(&address);
                }
                None => {}
            }
        }
        self.entries.truncate(first_free);
        debug_assert_eq!(self.entries.len() - 1, self.index.len());
        tracing::debug!(
            removed = before - self.entries.len(),
            remaining = self.index.len(),
            "Swept identity registry"
        );
    }

    /// Quiesce the host, register every live object and sweep the dead.
    pub fn update_from_heap<H: HeapHost + ?Sized>(&mut self, host: &mut H) {
        if self.trace_objects {
            tracing::trace!(entries = self.index.len(), "Begin registry update");
        }
        host.quiesce_for_iteration();
        let mut visited = 0usize;
        for object in host.live_objects() {
            self.find_or_add(object.address, object.size);
            // Backing stores are keyed by their native address and live as
            // long as the buffer that owns them.
            if let Detail::ArrayBuffer {
                backing_store: Some(store),
            } = &object.detail
            {
                let size = u32::try_from(store.byte_length).unwrap_or(u32::MAX);
                self.find_or_add(store.address, size);
            }
            visited += 1;
        }
        self.sweep();
        if self.trace_objects {
            tracing::trace!(visited, entries = self.index.len(), "End registry update");
        }
    }

    /// Last ID handed out to a heap object.
    pub fn last_assigned_id(&self) -> ObjectId {
        ObjectId::new(self.next_id - ID_STEP)
    }

    /// Odd ID for a native companion, stable for the same hash, label and
    /// element count.
    pub fn generate_native_id(&self, companion: &NativeCompanion) -> ObjectId {
        let mut hash = companion.hash ^ label_hash(&companion.label);
        if let Some(count) = companion.element_count {
            hash ^= xxhash_rust::xxh64::xxh64(&count.to_le_bytes(), 0);
        }
        Self::native_id(hash)
    }

    /// Odd ID for a native group node.
    ///
    /// Group labels are hashed under their own seed, so a group and a
    /// companion with the same label get unrelated IDs.
    pub fn generate_group_id(&self, group_label: &str) -> ObjectId {
        Self::native_id(xxhash_rust::xxh64::xxh64(group_label.as_bytes(), GROUP_ID_SEED))
    }

    /// Native IDs keep the top 63 bits of the hash. A residual collision
    /// merges two native nodes in the serialized graph; it is not checked.
    fn native_id(hash: u64) -> ObjectId {
        ObjectId::new((hash & !1) | 1)
    }

    /// Open a new heap-stats interval and report every interval whose live
    /// count or size changed since the previous push.
    ///
    /// Updates are written in batches of at most `sink.chunk_size()`. An
    /// aborting sink stops the push early without `end_of_stream`.
    pub fn push_heap_stats<H, S>(&mut self, host: &mut H, sink: &mut S) -> Result<HeapStatsPush>
    where
        H: HeapHost + ?Sized,
        S: OutputSink + ?Sized,
    {
        self.update_from_heap(host);
        self.time_intervals.push(TimeInterval {
            id: ObjectId::new(self.next_id),
            count: 0,
            size: 0,
            timestamp: Utc::now(),
        });

        let batch_size = sink.chunk_size().max(1);
        let mut batch: Vec<HeapStatsUpdate> = Vec::new();
        let mut entries = self.entries.iter().skip(1).peekable();
        let mut aborted = false;

        for (interval_index, interval) in self.time_intervals.iter_mut().enumerate() {
            let mut count = 0u32;
            let mut size = 0u32;
            while let Some(entry) = entries.next_if(|entry| entry.id < interval.id) {
                count += 1;
                size = size.saturating_add(entry.size);
            }
            if interval.count == count && interval.size == size {
                continue;
            }
            interval.count = count;
            interval.size = size;
            batch.push(HeapStatsUpdate {
                index: interval_index as u32,
                count,
                size,
            });
            if batch.len() >= batch_size {
                if sink.write_heap_stats_chunk(&batch)? == WriteResult::Abort {
                    aborted = true;
                    break;
                }
                batch.clear();
            }
        }
        if aborted {
            return Ok(self.stats_push(true));
        }
        debug_assert!(entries.next().is_none());

        if !batch.is_empty() && sink.write_heap_stats_chunk(&batch)? == WriteResult::Abort {
            return Ok(self.stats_push(true));
        }
        sink.end_of_stream()?;
        Ok(self.stats_push(false))
    }

    fn stats_push(&self, aborted: bool) -> HeapStatsPush {
        let elapsed_us = match (self.time_intervals.first(), self.time_intervals.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp)
                .num_microseconds()
                .unwrap_or(i64::MAX),
            _ => 0,
        };
        HeapStatsPush {
            last_assigned_id: self.last_assigned_id(),
            elapsed_us,
            aborted,
        }
    }

    /// Stop heap-stats tracking and forget all intervals.
    pub fn stop_tracking(&mut self) {
        self.time_intervals.clear();
    }

    /// Heap-stats samples recorded so far.
    pub fn samples(&self) -> Vec<HeapSample> {
        let Some(first) = self.time_intervals.first() else {
            return Vec::new();
        };
        self.time_intervals
            .iter()
            .map(|interval| HeapSample {
                timestamp_us: (interval.timestamp - first.timestamp)
                    .num_microseconds()
                    .unwrap_or(i64::MAX),
                last_assigned_id: interval.id,
            })
            .collect()
    }
}
