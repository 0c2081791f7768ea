//! Error type for snapshot capture and serialization.
//!
//! Cancellation by the caller is not an error: see
//! [`CaptureOutcome`](crate::generator::CaptureOutcome) and
//! [`SerializeStatus`](crate::serializer::SerializeStatus).

use std::collections::TryReserveError;

use crate::generator::GeneratorState;

/// Fatal failure of a capture or serialization.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// The output sink failed.
    #[error("Output sink failed: {0}")]
    Sink(#[from] std::io::Error),
    /// The graph grew past the configured node limit.
    #[error("Snapshot exceeded the node limit of {limit}")]
    NodeLimitExceeded {
        /// Configured limit.
        limit: u32,
    },
    /// Reserving node or edge storage failed.
    #[error("Failed to reserve snapshot storage: {0}")]
    Allocation(#[from] TryReserveError),
    /// The generator was driven out of order.
    #[error("Invalid generator state: expected {expected:?}, found {actual:?}")]
    InvalidState {
        /// State the operation requires.
        expected: GeneratorState,
        /// State the generator was in.
        actual: GeneratorState,
    },
    /// Configuration values are unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SnapshotError>;
