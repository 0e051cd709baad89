//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor
//! index.
//!
//! Nodes are stored in an arena of stable slots; each node carries a
//! quantized vector, a caller value, optional JSON attributes, and one
//! neighbor list per layer. A single writer mutates the graph under a write
//! lock while readers search concurrently, registering through a bounded
//! read-slot registry that also gates when deleted storage may be recycled.

/// Deletion with neighborhood relinking.
mod delete;
/// Distance kernels for the three storage formats.
pub mod distance;
/// Read-slot registry and epoch-based reclamation.
mod epoch;
/// Graph storage: configuration, node arena, live list.
mod graph;
/// Insertion: locked path and optimistic prepare/commit.
mod insert;
/// Validation, statistics, and the recall self-test.
mod introspect;
/// Layer search and the public KNN entry points.
mod search;
/// Generation-stamped visited set.
mod visited;

pub use epoch::ReadSlot;
pub use graph::{HnswConfig, HnswIndex};
pub use insert::InsertPrep;
pub use introspect::{GraphValidation, IndexStats};
pub use search::SearchHit;
