//! Canonical hashing for snapshot fingerprints and native identities.
//!
//! ## Determinism Guarantees
//!
//! - Struct fields serialize in declaration order
//! - Vectors serialize in index order
//! - Hashed data uses sorted vectors or `BTreeMap`, never `HashMap`
//! - Label hashes use a fixed seed, so native IDs are stable across processes

use serde::Serialize;
use xxhash_rust::xxh64::xxh64;

/// Seed for label hashes.
pub const LABEL_HASH_SEED: u64 = 0x6865_6170; // "heap"

/// Serialize a value to canonical JSON bytes for hashing.
///
/// # Panics
///
/// Panics if `value` has a `Serialize` impl that fails (non-string map keys
/// or a custom impl returning an error). The crate only hashes plain data.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("Canonical serialization failed")
}

/// Compute canonical hash of a serializable value.
pub fn canonical_hash<T: Serialize>(value: &T) -> u64 {
    xxh64(&to_canonical_bytes(value), 0)
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex<T: Serialize>(value: &T) -> String {
    format!("{:016x}", canonical_hash(value))
}

/// Hash a label string.
pub fn label_hash(label: &str) -> u64 {
    xxh64(label.as_bytes(), LABEL_HASH_SEED)
}
