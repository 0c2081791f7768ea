//! Capture and serialization settings.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SnapshotError};

/// Default number of objects between progress reports.
pub const DEFAULT_PROGRESS_GRANULARITY: u32 = 10_000;

/// Default number of quiescing passes before traversal.
pub const DEFAULT_QUIESCE_PASSES: u32 = 2;

/// Default chunk size for sinks that do not choose one.
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024;

/// Settings for capturing and serializing snapshots.
///
/// Every field has a production default; deserializing a partial document
/// fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Objects processed between two progress reports.
    pub progress_granularity: u32,
    /// How many times the host is asked to quiesce before traversal.
    pub quiesce_passes: u32,
    /// Upper bound on the number of nodes in one snapshot.
    pub max_nodes: u32,
    /// String node names are truncated to this many characters.
    pub max_name_length: usize,
    /// Log every registry move and size update at `trace` level.
    pub trace_objects: bool,
    /// Chunk size of sinks built with `VecSink::from_config` or
    /// `WriterSink::from_config`.
    pub default_chunk_size: usize,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            progress_granularity: DEFAULT_PROGRESS_GRANULARITY,
            quiesce_passes: DEFAULT_QUIESCE_PASSES,
            max_nodes: u32::MAX,
            max_name_length: 1024,
            trace_objects: false,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl SnapshotConfig {
    /// Build a configuration from `HEAP_SNAPSHOT_*` environment variables,
    /// falling back to defaults for unset or unparsable values.
    ///
    /// Recognized variables: `HEAP_SNAPSHOT_PROGRESS_GRANULARITY`,
    /// `HEAP_SNAPSHOT_QUIESCE_PASSES`, `HEAP_SNAPSHOT_MAX_NODES`,
    /// `HEAP_SNAPSHOT_MAX_NAME_LENGTH`, `HEAP_SNAPSHOT_TRACE_OBJECTS`,
    /// `HEAP_SNAPSHOT_CHUNK_SIZE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
            default: T,
        ) -> T {
            match lookup(key) {
                Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                    tracing::warn!(key, value = %raw, "Ignoring unparsable setting");
                    default
                }),
                None => default,
            }
        }

        let defaults = Self::default();
        Self {
            progress_granularity: parsed(
                &lookup,
                "HEAP_SNAPSHOT_PROGRESS_GRANULARITY",
                defaults.progress_granularity,
            ),
            quiesce_passes: parsed(&lookup, "HEAP_SNAPSHOT_QUIESCE_PASSES", defaults.quiesce_passes),
            max_nodes: parsed(&lookup, "HEAP_SNAPSHOT_MAX_NODES", defaults.max_nodes),
            max_name_length: parsed(&lookup, "HEAP_SNAPSHOT_MAX_NAME_LENGTH", defaults.max_name_length),
            trace_objects: parsed(&lookup, "HEAP_SNAPSHOT_TRACE_OBJECTS", defaults.trace_objects),
            default_chunk_size: parsed(&lookup, "HEAP_SNAPSHOT_CHUNK_SIZE", defaults.default_chunk_size),
        }
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.progress_granularity == 0 {
            return Err(SnapshotError::Config("progress_granularity must be positive".into()));
        }
        if self.default_chunk_size == 0 {
            return Err(SnapshotError::Config("default_chunk_size must be positive".into()));
        }
        if self.max_nodes == 0 {
            return Err(SnapshotError::Config("max_nodes must be positive".into()));
        }
        Ok(())
    }

    /// Configuration with a small progress granularity, for tests.
    #[cfg(test)]
    pub fn minimal() -> Self {
        Self {
            progress_granularity: 1,
            quiesce_passes: 1,
            default_chunk_size: 64,
            ..Self::default()
        }
    }
}
