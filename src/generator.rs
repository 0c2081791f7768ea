//! Snapshot generation.
//!
//! A [`SnapshotGenerator`] drives one capture from an idle store to a
//! finalized graph:
//!
//! ```text
//! Idle → RootsTagged → Pass1Running → Pass2Running → ChildrenFinalized → Done
//!            └──────────────┴──────────────┴──────→ Aborted
//! ```
//!
//! Progress is reported to an optional [`ActivityControl`] every
//! `progress_granularity` objects and once more at the end. The control may
//! stop the capture at any report; that is a normal outcome, not an error.

use std::ops::ControlFlow;
use std::time::Instant;

use crate::config::SnapshotConfig;
use crate::error::{Result, SnapshotError};
use crate::explorer::{roots, ExtractorRegistry, HeapExplorer, Pass};
use crate::host::{GlobalObjectNameResolver, HeapHost};
use crate::registry::ObjectIdRegistry;
use crate::store::GraphStore;

/// Lifecycle of a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Not started.
    Idle,
    /// Global objects tagged, heap quiesced.
    RootsTagged,
    /// Root edges done, first pass running.
    Pass1Running,
    /// Second pass (containers) running.
    Pass2Running,
    /// Edges grouped by source.
    ChildrenFinalized,
    /// Capture complete.
    Done,
    /// Stopped by the activity control or by an error.
    Aborted,
}

/// Receives progress of a running capture and may stop it.
pub trait ActivityControl {
    /// Called with `done` out of `total` work units. Returning
    /// `ControlFlow::Break` aborts the capture.
    fn report_progress(&mut self, done: u64, total: u64) -> ControlFlow<()>;
}

impl<F> ActivityControl for F
where
    F: FnMut(u64, u64) -> ControlFlow<()>,
{
    fn report_progress(&mut self, done: u64, total: u64) -> ControlFlow<()> {
        self(done, total)
    }
}

/// Counts work units and reports them at a fixed granularity.
pub(crate) struct ProgressCounter<'c> {
    control: Option<&'c mut dyn ActivityControl>,
    done: u64,
    total: u64,
    granularity: u64,
    max_nodes: u32,
}

impl<'c> ProgressCounter<'c> {
    pub(crate) fn new(
        control: Option<&'c mut dyn ActivityControl>,
        total: u64,
        config: &SnapshotConfig,
    ) -> Self {
        Self {
            control,
            done: 0,
            total,
            granularity: u64::from(config.progress_granularity.max(1)),
            max_nodes: config.max_nodes,
        }
    }

    /// Count one unit of work.
    pub(crate) fn step(&mut self) {
        self.done += 1;
    }

    /// Mark all work done.
    pub(crate) fn complete(&mut self) {
        self.done = self.total;
    }

    /// Enforce the node limit, then report if `force` is set or a granule
    /// boundary was reached.
    pub(crate) fn report(&mut self, force: bool, node_count: usize) -> Result<ControlFlow<()>> {
        if node_count > self.max_nodes as usize {
            return Err(SnapshotError::NodeLimitExceeded {
                limit: self.max_nodes,
            });
        }
        let Some(control) = self.control.as_deref_mut() else {
            return Ok(ControlFlow::Continue(()));
        };
        if force || self.done % self.granularity == 0 {
            return Ok(control.report_progress(self.done, self.total));
        }
        Ok(ControlFlow::Continue(()))
    }
}

/// How a capture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The graph is complete.
    Completed,
    /// The activity control stopped the capture.
    Aborted {
        /// State the generator was in when it stopped.
        at: GeneratorState,
    },
}

fn advance(state: &mut GeneratorState, next: GeneratorState) {
    tracing::debug!(from = ?*state, to = ?next, "Generator state transition");
    *state = next;
}

/// Builds one snapshot from a host.
pub struct SnapshotGenerator<'a> {
    host: &'a mut dyn HeapHost,
    registry: &'a mut ObjectIdRegistry,
    handlers: &'a ExtractorRegistry,
    config: &'a SnapshotConfig,
    control: Option<&'a mut dyn ActivityControl>,
    resolver: Option<&'a dyn GlobalObjectNameResolver>,
    store: GraphStore,
    state: GeneratorState,
}

impl<'a> SnapshotGenerator<'a> {
    /// Create a generator. IDs come from `registry`, which outlives the
    /// generator so they stay stable across captures.
    pub fn new(
        host: &'a mut dyn HeapHost,
        registry: &'a mut ObjectIdRegistry,
        handlers: &'a ExtractorRegistry,
        config: &'a SnapshotConfig,
    ) -> Self {
        Self {
            host,
            registry,
            handlers,
            config,
            control: None,
            resolver: None,
            store: GraphStore::new(),
            state: GeneratorState::Idle,
        }
    }

    /// Report progress to `control`.
    pub fn with_control(mut self, control: &'a mut dyn ActivityControl) -> Self {
        self.control = Some(control);
        self
    }

    /// Name global objects with `resolver`.
    pub fn with_resolver(mut self, resolver: &'a dyn GlobalObjectNameResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Current state.
    pub fn state(&self) -> GeneratorState {
        self.state
    }

    /// Run the capture.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the generator is idle; `NodeLimitExceeded` or
    /// `Allocation` when the graph outgrows its limits. The generator is
    /// `Aborted` after any error.
    pub fn generate(&mut self) -> Result<CaptureOutcome> {
        if self.state != GeneratorState::Idle {
            return Err(SnapshotError::InvalidState {
                expected: GeneratorState::Idle,
                actual: self.state,
            });
        }

        let started = Instant::now();
        tracing::info!("Heap snapshot capture started");
        match self.run() {
            Ok(ControlFlow::Continue(())) => {
                advance(&mut self.state, GeneratorState::Done);
                tracing::info!(
                    nodes = self.store.node_count(),
                    edges = self.store.edge_count(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Heap snapshot capture finished"
                );
                Ok(CaptureOutcome::Completed)
            }
            Ok(ControlFlow::Break(())) => {
                let at = self.state;
                advance(&mut self.state, GeneratorState::Aborted);
                tracing::info!(?at, "Heap snapshot capture aborted");
                Ok(CaptureOutcome::Aborted { at })
            }
            Err(err) => {
                advance(&mut self.state, GeneratorState::Aborted);
                tracing::warn!(error = %err, "Heap snapshot capture failed");
                Err(err)
            }
        }
    }

    fn run(&mut self) -> Result<ControlFlow<()>> {
        let global_tags = roots::collect_global_tags(&*self.host, self.resolver);
        for _ in 0..self.config.quiesce_passes {
            self.host.quiesce_for_iteration();
        }
        advance(&mut self.state, GeneratorState::RootsTagged);

        let host: &dyn HeapHost = &*self.host;
        let live = host.live_objects().count();
        let companions = host.native_companions();
        self.store.add_synthetic_roots();
        self.store.reserve(live + companions.len(), live)?;

        let total = 2 * live as u64 + companions.len() as u64;
        let control = self
            .control
            .as_mut()
            .map(|control| &mut **control as &mut dyn ActivityControl);
        let mut progress = ProgressCounter::new(control, total, self.config);
        let mut explorer = HeapExplorer::new(
            host,
            &mut *self.registry,
            &mut self.store,
            self.handlers,
            self.config,
            global_tags,
        );

        explorer.extract_roots();
        advance(&mut self.state, GeneratorState::Pass1Running);
        if explorer.extract_pass(Pass::First, &mut progress)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
        advance(&mut self.state, GeneratorState::Pass2Running);
        if explorer.extract_pass(Pass::Second, &mut progress)?.is_break() {
            return Ok(ControlFlow::Break(()));
        }
        if explorer
            .extract_native_companions(&companions, &mut progress)?
            .is_break()
        {
            return Ok(ControlFlow::Break(()));
        }
        drop(explorer);

        self.store.finalize_children();
        self.store.set_samples(self.registry.samples());
        advance(&mut self.state, GeneratorState::ChildrenFinalized);

        progress.complete();
        progress.report(true, self.store.node_count())
    }

    /// The finished graph.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless the capture completed.
    pub fn take_store(self) -> Result<GraphStore> {
        if self.state != GeneratorState::Done {
            return Err(SnapshotError::InvalidState {
                expected: GeneratorState::Done,
                actual: self.state,
            });
        }
        Ok(self.store)
    }
}
