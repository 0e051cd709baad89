//! Global configuration constants for vsim.
//!
//! All tuning parameters and input validation limits are defined here.
//! These are compile-time defaults; per-index values live in
//! [`HnswConfig`](crate::hnsw::HnswConfig).

/// Default number of bidirectional links per node on the upper layers.
///
/// Layer 0 uses [`HNSW_DEFAULT_M0`]. Higher values improve recall but
/// increase memory and build time. Typical range: 8–64.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default maximum links per node at layer 0 (twice the upper-layer cap).
pub const HNSW_DEFAULT_M0: usize = HNSW_DEFAULT_M * 2;

/// Default ef parameter during index construction.
///
/// Controls the size of the dynamic candidate list during insertion.
/// Higher values produce a better graph but slow down build time.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default ef parameter during search.
///
/// Controls the size of the dynamic candidate list during query.
/// Higher values improve recall at the cost of latency. Searches always
/// use at least `k`.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 50;

/// Maximum number of layers in the HNSW graph.
pub const HNSW_MAX_LEVEL: usize = 16;

/// Default multiplier applied to `k` to bound how many candidates a
/// filtered search may test against the predicate before giving up.
pub const FILTER_EF_MULT: usize = 100;

/// Number of read slots in the epoch registry.
///
/// Bounds the number of concurrent readers; an acquiring reader blocks
/// (yielding) when all slots are occupied.
pub const READ_SLOTS: usize = 16;

/// Maximum allowed vector dimension.
pub const MAX_DIMENSION: usize = 4096;
