//! The error taxonomy of §7: parse-time errors, allocator exhaustion and
//! invariant violations are all fatal and distinguishable by variant so a
//! caller can log and exit with the right diagnostic. Expected terminal
//! conditions (SAT/UNSAT/UNKNOWN) are *not* represented here — they are
//! values, not errors (see [`crate::solver::SolveOutcome`]).

use thiserror::Error;

use crate::formula::Var;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("DIMACS parse error: {0}")]
    DimacsParse(String),

    #[error("clause allocator exhausted: requested {requested} bytes, largest free block {largest_free}")]
    AllocatorExhausted {
        requested: usize,
        largest_free: usize,
    },

    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },

    #[error("unknown variable referenced: {0:?}")]
    UnknownVar(Var),
}

pub type Result<T> = std::result::Result<T, SimError>;
