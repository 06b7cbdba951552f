//! Error taxonomy for the RAM interpreter and its boxing substrate.
//!
//! Mirrors the teacher's `storage::error` style: one `thiserror::Error` enum,
//! one variant per error kind from `spec.md` §7, `#[error("...")]` messages,
//! `#[from]` for wrapped causes where a lower layer already has its own
//! error type (here: `figment::Error` for configuration).

use crate::boxing::Position;
use thiserror::Error;

/// Errors the RAM interpreter can raise. All are fatal to the enclosing
/// `solve` call — see `spec.md` §7 "Propagation."
#[derive(Error, Debug)]
pub enum RamError {
    /// A RAM node refers to an out-of-range index slot, an undefined row
    /// variable, or a column index outside the target arity.
    #[error("malformed RAM program: {0}")]
    MalformedProgram(String),

    /// `boxWith` was called on a key no `unboxWith` ever produced at that
    /// position.
    #[error("unknown boxing key {key} at position {position:?}")]
    UnknownBoxingKey { key: i64, position: Position },

    /// A user-supplied `App`/`Guard`/`Functional` callable raised.
    #[error("user function '{function}' failed: {message}")]
    UserFunctionFailure {
        function: String,
        message: String,
        /// Source location of the offending term, if the compiler attached
        /// one (`spec.md` §7).
        location: Option<String>,
    },

    /// A tuple of the wrong length reached `put`.
    #[error("arity mismatch: index '{index}' expects {expected} columns, got {actual}")]
    ArityMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },

    /// `max_iterations` was configured and a stratum's semi-naive loop
    /// exceeded it without reaching a fixed point. Ambient safety net, not
    /// part of the classical semantics in `spec.md` §8.2 — only triggers
    /// when the caller opts in via `EngineConfig`.
    #[error("stratum {stratum} did not reach a fixed point within {iterations} iterations")]
    FixpointNotReached { stratum: u32, iterations: u64 },
}

/// Errors from loading an `EngineConfig`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}

pub type RamResult<T> = Result<T, RamError>;
