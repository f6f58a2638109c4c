//! Error kinds for graph construction, rewriting, and scheduling.
//!
//! Every failure is fatal to the current `optimize` call: there is no
//! retry and no partial plan. Variants carry the offending collection or
//! op handle where one exists, for diagnosis.

use crate::handle::{CollectionId, OpId};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The inputs or outputs list handed to `optimize` was empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A structural edge rule was broken: second producing op, duplicate
    /// consumer add, absent consumer remove, malformed op wiring, or a
    /// flatten over mismatched element types.
    #[error("graph invariant broken at collection {collection:?}: {reason}")]
    GraphInvariant {
        reason: &'static str,
        collection: CollectionId,
    },

    /// A rewrite or the interpreter met an operator shape it cannot
    /// process.
    #[error("unsupported operator {kind} at op {op:?}")]
    UnsupportedOperator { kind: &'static str, op: OpId },

    /// The scheduler could not make progress: the MSCR dependency graph
    /// contains a cycle.
    #[error("invariant violated: {0}")]
    InvariantViolated(&'static str),

    /// The cooperative cancellation flag was observed between passes.
    #[error("optimization cancelled")]
    Cancelled,
}
