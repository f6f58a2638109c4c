//! The builder-facing workflow surface.
//!
//! A [`Workflow`] is whatever constructs the lazy graph: the surface
//! collection API, a test fixture, or a hand-wired builder. The optimizer
//! only needs three things from it—lazy materialization of the graph, the
//! source collections, and the sink collections—plus mutable access to
//! the graph for rewriting.

use crate::graph::Graph;
use crate::handle::CollectionId;

/// A lazily built dataflow workflow.
///
/// [`Optimizer::optimize_workflow`](crate::optimizer::Optimizer::optimize_workflow)
/// calls [`build`](Self::build) first, then reads the roots and rewrites
/// the graph in place. The graph must be treated as consumed by
/// optimization: the resulting plan references its post-rewrite
/// collections and ops.
pub trait Workflow {
    /// Construct the graph if it has not been built yet. Idempotent.
    fn build(&mut self);

    /// The source collections the caller will feed.
    fn inputs(&self) -> Vec<CollectionId>;

    /// The sink collections the caller wants produced.
    fn outputs(&self) -> Vec<CollectionId>;

    /// Mutable access to the built graph.
    fn graph_mut(&mut self) -> &mut Graph;
}
