//! The error surface of `scan_state`.
//!
//! Every fallible operation in this crate surfaces one of these kinds. None
//! are retried internally; a failed [`crate::updater::apply_round`] leaves
//! the caller's [`crate::forest::State`] untouched (see that module's doc
//! comment for why this holds structurally, not by convention).

use thiserror::Error;

/// Errors produced by `scan_state`'s state transitions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// `|data| > max_base_jobs` for an incoming batch.
    #[error("data count {got} exceeds max_base_jobs {max}")]
    DataCountExceeded { got: usize, max: u32 },

    /// `|trees| > max_trees` after a transition.
    #[error("forest grew to {got} trees, exceeding max_trees {max}")]
    ForestOverflow { got: usize, max: usize },

    /// Arrivals at a merge slot did not match any entry in the pairing
    /// table.
    #[error("invalid merge job at level {level}: {reason}")]
    InvalidMergeJob { level: u32, reason: String },

    /// Arrivals at a base slot did not match the leaf table.
    #[error("invalid base job at leaf: {reason}")]
    InvalidBaseJob { reason: String },

    /// `next_k_jobs` was asked for more jobs than are currently available.
    #[error("requested {requested} jobs but only {available} are available")]
    InsufficientWork { requested: usize, available: usize },

    /// A `Config` failed validation before a `State` could be constructed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
