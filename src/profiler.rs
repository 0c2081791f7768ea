//! Long-lived profiler state.
//!
//! The identity registry must survive across captures for IDs to stay
//! stable, so it lives here rather than in a generator. The host forwards
//! relocation notifications through [`HeapProfiler::object_moved`].

use crate::config::SnapshotConfig;
use crate::error::Result;
use crate::explorer::ExtractorRegistry;
use crate::generator::{ActivityControl, CaptureOutcome, SnapshotGenerator};
use crate::host::{Address, GlobalObjectNameResolver, HeapHost};
use crate::registry::{HeapStatsPush, ObjectIdRegistry};
use crate::serializer::OutputSink;
use crate::store::GraphStore;
use crate::types::ObjectId;

/// Entry point for embedders: takes snapshots and tracks object identity.
pub struct HeapProfiler {
    registry: ObjectIdRegistry,
    handlers: ExtractorRegistry,
    config: SnapshotConfig,
    resolver: Option<Box<dyn GlobalObjectNameResolver>>,
}

impl HeapProfiler {
    /// Create a profiler with the built-in extraction handlers.
    ///
    /// # Errors
    ///
    /// `Config` if `config` fails validation.
    pub fn new(config: SnapshotConfig) -> Result<Self> {
        config.validate()?;
        let mut registry = ObjectIdRegistry::new();
        registry.set_trace_objects(config.trace_objects);
        Ok(Self {
            registry,
            handlers: ExtractorRegistry::with_builtins(),
            config,
            resolver: None,
        })
    }

    /// Capture a snapshot of `host`.
    ///
    /// Returns `None` when `control` stopped the capture. Registry entries of
    /// objects that died since the previous capture are dropped after a
    /// completed one.
    pub fn take_snapshot(
        &mut self,
        host: &mut dyn HeapHost,
        control: Option<&mut dyn ActivityControl>,
    ) -> Result<Option<GraphStore>> {
        let mut generator =
            SnapshotGenerator::new(host, &mut self.registry, &self.handlers, &self.config);
        if let Some(control) = control {
            generator = generator.with_control(control);
        }
        if let Some(resolver) = self.resolver.as_deref() {
            generator = generator.with_resolver(resolver);
        }

        match generator.generate()? {
            CaptureOutcome::Completed => {
                let store = generator.take_store()?;
                self.registry.sweep();
                Ok(Some(store))
            }
            CaptureOutcome::Aborted { .. } => Ok(None),
        }
    }

    /// Relocation notification from the host. Returns whether the object
    /// was tracked.
    pub fn object_moved(&mut self, from: Address, to: Address, size: u32) -> bool {
        self.registry.move_object(from, to, size)
    }

    /// Stable ID of the object at `address`, if it has been seen.
    pub fn object_id_for(&self, address: Address) -> Option<ObjectId> {
        self.registry.find(address)
    }

    /// Current address of the live object with `id`.
    pub fn find_object_by_id(&self, host: &dyn HeapHost, id: ObjectId) -> Option<Address> {
        host.live_objects()
            .map(|object| object.address)
            .find(|&address| self.registry.find(address) == Some(id))
    }

    /// Stream heap-stats updates to `sink`.
    pub fn push_heap_stats<S: OutputSink + ?Sized>(
        &mut self,
        host: &mut dyn HeapHost,
        sink: &mut S,
    ) -> Result<HeapStatsPush> {
        self.registry.push_heap_stats(host, sink)
    }

    /// Stop heap-stats tracking. Object IDs are kept.
    pub fn stop_tracking_heap_objects(&mut self) {
        self.registry.stop_tracking();
    }

    /// Mutable access to the handler table, for registering custom kinds.
    pub fn handlers_mut(&mut self) -> &mut ExtractorRegistry {
        &mut self.handlers
    }

    /// Install a resolver naming global objects.
    pub fn set_global_object_name_resolver(
        &mut self,
        resolver: Box<dyn GlobalObjectNameResolver>,
    ) {
        self.resolver = Some(resolver);
    }

    /// Active configuration.
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// The identity registry.
    pub fn registry(&self) -> &ObjectIdRegistry {
        &self.registry
    }
}
