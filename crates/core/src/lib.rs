//! # vsim-core
//!
//! Embeddable in-memory approximate nearest neighbor engine built around a
//! Hierarchical Navigable Small World (HNSW) graph. Vectors are L2-normalized
//! on insertion and stored in one of three formats (exact f32, signed 8-bit
//! with a per-vector range, or a 1-bit sign bitmap). Searches may be
//! restricted by a compiled attribute-filter expression evaluated against
//! each node's JSON attributes.
//!
//! The index supports one writer at a time and any number of concurrent
//! readers. Readers register through a bounded read-slot registry; a deleted
//! node's storage is only recycled once every registered reader has moved
//! past the version that could still observe it.
//!
//! This is the core library crate with zero async dependencies — suitable for
//! embedding directly in Rust or other language bindings.

/// Global configuration constants: limits, defaults, and tuning parameters.
pub mod config;
/// Error types for index operations and filter compilation.
pub mod error;
/// Filter expressions: tokenizer, infix-to-postfix compiler, and postfix VM.
pub mod expr;
/// HNSW approximate nearest neighbor index: graph storage, search, insertion,
/// deletion, distance kernels, and the read-slot registry.
pub mod hnsw;
/// Vector quantization: f32 / signed 8-bit / binary sign bitmap.
pub mod quantization;

pub use error::{ExprError, HnswError};
pub use expr::Program;
pub use hnsw::{
    GraphValidation, HnswConfig, HnswIndex, IndexStats, InsertPrep, ReadSlot, SearchHit,
};
pub use quantization::Quantization;
