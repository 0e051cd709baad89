//! Error types for vsim.
//!
//! Index operations report failures through [`HnswError`]; filter
//! compilation reports through [`ExprError`]. Filter *evaluation* never
//! produces an error — a candidate whose attributes cannot be evaluated is
//! simply treated as not matching.

use thiserror::Error;

/// Errors that can occur in index operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HnswError {
    /// Vector dimension does not match the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The index dimension.
        expected: usize,
        /// The dimension of the offending vector.
        actual: usize,
    },

    /// Invalid dimension at index creation (zero or above the limit).
    #[error("invalid dimension: {0}")]
    InvalidDimension(usize),

    /// The vector has zero magnitude and cannot be normalized.
    #[error("vector has zero magnitude")]
    ZeroVector,

    /// An optimistic insert observed a graph state that changed before
    /// commit. Callers retry with the locked insert path.
    #[error("concurrent update conflict: retry with the locked insert")]
    Conflict,
}

/// Errors produced by the filter-expression compiler.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExprError {
    /// The expression is not syntactically valid at `offset`.
    #[error("syntax error at offset {offset}")]
    Syntax {
        /// Byte offset into the expression string.
        offset: usize,
    },
}

impl ExprError {
    /// Byte offset into the expression at which the error was detected.
    pub fn offset(&self) -> usize {
        match self {
            ExprError::Syntax { offset } => *offset,
        }
    }
}
