//! Error types for the graph store and query engine.
//!
//! Execution-time constraint failures are not errors: a branch that does not
//! satisfy the pattern is pruned and simply yields nothing.

use thiserror::Error;

use crate::graph::EntityKind;

#[derive(Error, Debug)]
pub enum MotifError {
    /// A named reference or merged type constraint is used inconsistently.
    #[error("reference mismatch for `{name}`: {reason}")]
    ReferenceMismatch { name: String, reason: String },

    #[error("malformed relation: {0}")]
    MalformedRelation(String),

    /// Store misuse that would corrupt the indices. Nothing is mutated.
    #[error("broken invariant: {0}")]
    BrokenInvariant(String),

    #[error("unknown type id {0}")]
    UnknownType(u32),

    #[error("type `{0}` is already registered")]
    DuplicateType(String),

    #[error("expected a {expected} type, found `{found}`")]
    KindMismatch { expected: EntityKind, found: String },

    #[error("query handle has been destroyed")]
    Destroyed,

    #[error("config error: {0}")]
    Config(String),

    #[error("fixture error: {0}")]
    Fixture(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MotifError>;
