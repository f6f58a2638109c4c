//! Deferred operator variants of the lazy dataflow graph.
//!
//! Every transformation a user defers is one of these tagged variants. The
//! rewrite passes pattern-match on them; the `combining` flag on
//! [`DeferredOp::ParallelDo`] is the `CombineValues` refinement, checked
//! before the generic ParallelDo handling only where the two differ (the
//! fusion guard above a `GroupByKey`).
//!
//! Ops reference their collections by handle; the owning
//! [`Graph`](crate::graph::Graph) keeps the matching producer/consumer
//! back-edges in sync.

use crate::dofn::{DoFn, Grouper};
use crate::handle::CollectionId;
use std::fmt;
use std::sync::Arc;

/// A deferred transformation node.
pub enum DeferredOp {
    /// Element-wise transform `origin -> dest` through an opaque emitter
    /// function. `combining == true` marks the `CombineValues` refinement,
    /// legal only directly downstream of a `GroupByKey`.
    ParallelDo {
        f: Arc<dyn DoFn>,
        origin: CollectionId,
        dest: CollectionId,
        combining: bool,
    },
    /// Shuffle of key–value pairs into key→sequence pairs. The grouper is
    /// the type-erased shuffle implementation injected by the builder;
    /// rewrites never call it.
    GroupByKey {
        grouper: Arc<dyn Grouper>,
        origin: CollectionId,
        dest: CollectionId,
    },
    /// Set-theoretic union of several same-type collections.
    Flatten {
        origins: Vec<CollectionId>,
        dest: CollectionId,
    },
    /// One input fanned out to many independent transforms; produced by
    /// sibling fusion.
    MultipleParallelDo {
        origin: CollectionId,
        dests: Vec<(Arc<dyn DoFn>, CollectionId)>,
    },
    /// Structural passthrough used by the framework; transparent to every
    /// rewrite.
    OneToOneOp {
        origin: CollectionId,
        dest: CollectionId,
    },
}

impl DeferredOp {
    /// Upstream collections read by this op.
    pub fn origins(&self) -> Vec<CollectionId> {
        match self {
            DeferredOp::ParallelDo { origin, .. }
            | DeferredOp::GroupByKey { origin, .. }
            | DeferredOp::MultipleParallelDo { origin, .. }
            | DeferredOp::OneToOneOp { origin, .. } => vec![*origin],
            DeferredOp::Flatten { origins, .. } => origins.clone(),
        }
    }

    /// Downstream collections written by this op.
    pub fn dests(&self) -> Vec<CollectionId> {
        match self {
            DeferredOp::ParallelDo { dest, .. }
            | DeferredOp::GroupByKey { dest, .. }
            | DeferredOp::Flatten { dest, .. }
            | DeferredOp::OneToOneOp { dest, .. } => vec![*dest],
            DeferredOp::MultipleParallelDo { dests, .. } => {
                dests.iter().map(|(_, d)| *d).collect()
            }
        }
    }

    /// The single destination, if this variant has exactly one.
    pub fn single_dest(&self) -> Option<CollectionId> {
        match self {
            DeferredOp::ParallelDo { dest, .. }
            | DeferredOp::GroupByKey { dest, .. }
            | DeferredOp::Flatten { dest, .. }
            | DeferredOp::OneToOneOp { dest, .. } => Some(*dest),
            DeferredOp::MultipleParallelDo { .. } => None,
        }
    }

    /// Whether this is a `ParallelDo` (combining or not). Fan-out ops are
    /// not ParallelDos for the purposes of the rewrite passes.
    pub fn is_parallel_do(&self) -> bool {
        matches!(self, DeferredOp::ParallelDo { .. })
    }

    /// Variant name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            DeferredOp::ParallelDo { combining: true, .. } => "CombineValues",
            DeferredOp::ParallelDo { .. } => "ParallelDo",
            DeferredOp::GroupByKey { .. } => "GroupByKey",
            DeferredOp::Flatten { .. } => "Flatten",
            DeferredOp::MultipleParallelDo { .. } => "MultipleParallelDo",
            DeferredOp::OneToOneOp { .. } => "OneToOneOp",
        }
    }
}

impl fmt::Debug for DeferredOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferredOp::Flatten { origins, dest } => f
                .debug_struct("Flatten")
                .field("origins", origins)
                .field("dest", dest)
                .finish(),
            DeferredOp::MultipleParallelDo { origin, dests } => f
                .debug_struct("MultipleParallelDo")
                .field("origin", origin)
                .field(
                    "dests",
                    &dests.iter().map(|(_, d)| *d).collect::<Vec<_>>(),
                )
                .finish(),
            other => f
                .debug_struct(other.kind_name())
                .field("origin", &other.origins())
                .field("dest", &other.dests())
                .finish(),
        }
    }
}
