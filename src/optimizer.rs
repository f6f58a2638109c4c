//! Graph rewriting and plan construction.
//!
//! The [`Optimizer`] rewrites a lazy dataflow graph into a smaller,
//! semantically equivalent one and derives a staged execution plan:
//!
//! 1. `sink_flattens` pushes `Flatten` ops below single-consumer
//!    ParallelDos, exposing fusion opportunities.
//! 2. `fuse_parallel_dos` collapses producer–consumer ParallelDo chains
//!    into single composed ops.
//! 3. `fuse_sibling_parallel_dos` merges ParallelDo siblings sharing an
//!    input into one fan-out op.
//! 4. `remove_unnecessary_ops` prunes branches that reach no output.
//!
//! Then MSCR formation and stage scheduling (see [`mscr`](crate::mscr) and
//! [`plan`](crate::plan)) turn the rewritten graph into the
//! [`ExecutionStep`] chain handed to an executor.
//!
//! The passes run in fixed order, once per output root, by structural
//! recursion; each is idempotent once its precondition fails, so no outer
//! fixed-point loop is needed. Everything is single-threaded and performs
//! no I/O. Deep pipelines recurse proportionally to chain depth.

use crate::dofn::compose;
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::handle::{CollectionId, OpId};
use crate::mscr::mscr_blocks;
use crate::op::DeferredOp;
use crate::plan::{schedule, ExecutionStep};
use crate::stats::OptimizeStats;
use crate::workflow::Workflow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Rewrites lazy graphs into staged MSCR plans.
///
/// One `Optimizer` may be reused across calls; rewrite counters accumulate
/// in [`stats`](Self::stats) until taken. The optimizer owns the graph it
/// mutates for the duration of a call—callers must treat the input graph
/// as consumed by optimization.
#[derive(Default)]
pub struct Optimizer {
    cancel: Option<Arc<AtomicBool>>,
    stats: OptimizeStats,
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an optimizer that checks `flag` between passes and aborts
    /// with [`Error::Cancelled`] when it is set. Cancellation is
    /// cooperative; a running pass is never interrupted mid-rewrite.
    pub fn with_cancel_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            cancel: Some(flag),
            stats: OptimizeStats::default(),
        }
    }

    /// Counters for the rewrites applied so far.
    pub fn stats(&self) -> &OptimizeStats {
        &self.stats
    }

    /// Take the accumulated counters, leaving zeroes in their place.
    pub fn take_stats(&mut self) -> OptimizeStats {
        std::mem::take(&mut self.stats)
    }

    /// Optimize the graph rooted at `outputs` and derive the staged plan.
    ///
    /// Applies the rewrite passes in fixed order over each output root,
    /// prunes dead branches from each input, forms MSCRs, and schedules
    /// them into a forward-linked stage chain.
    ///
    /// # Errors
    /// [`Error::InvalidArgument`] if either list is empty;
    /// [`Error::GraphInvariant`] on malformed edges;
    /// [`Error::InvariantViolated`] if the MSCR dependency graph cannot be
    /// staged; [`Error::Cancelled`] if the cancellation flag was set.
    pub fn optimize(
        &mut self,
        graph: &mut Graph,
        inputs: &[CollectionId],
        outputs: &[CollectionId],
    ) -> Result<ExecutionStep> {
        if outputs.is_empty() {
            return Err(Error::InvalidArgument("empty output list"));
        }
        if inputs.is_empty() {
            return Err(Error::InvalidArgument("empty input list"));
        }
        debug!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            "optimizing workflow graph"
        );
        for &o in outputs {
            self.sink_flattens(graph, o)?;
        }
        self.checkpoint()?;
        for &o in outputs {
            self.fuse_parallel_dos(graph, o)?;
        }
        self.checkpoint()?;
        for &o in outputs {
            self.fuse_sibling_parallel_dos(graph, o)?;
        }
        self.checkpoint()?;
        for &i in inputs {
            self.remove_unnecessary_ops(graph, i, outputs)?;
        }
        self.checkpoint()?;
        let mscrs = mscr_blocks(graph, outputs)?;
        self.stats.mscr_count = mscrs.len();
        self.checkpoint()?;
        let plan = schedule(mscrs, inputs)?;
        self.stats.stage_count = plan.len();
        debug!(
            mscrs = self.stats.mscr_count,
            stages = self.stats.stage_count,
            "plan ready"
        );
        Ok(plan)
    }

    /// Build a workflow lazily, then optimize it. Mirrors the
    /// builder-facing entry point: `build()`, inputs, outputs, optimize.
    pub fn optimize_workflow(&mut self, wf: &mut dyn Workflow) -> Result<ExecutionStep> {
        wf.build();
        let inputs = wf.inputs();
        let outputs = wf.outputs();
        self.optimize(wf.graph_mut(), &inputs, &outputs)
    }

    fn checkpoint(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Cancelled),
            _ => Ok(()),
        }
    }

    // |---------------|
    // | sink flattens |
    // |---------------|

    /// Push a `Flatten` below its single ParallelDo consumer, so the
    /// ParallelDo distributes over the union and more producer–consumer
    /// fusion becomes visible upstream.
    fn sink_flattens(&mut self, g: &mut Graph, c: CollectionId) -> Result<()> {
        if g.is_materialized(c) {
            return Ok(());
        }
        let Some(flatten_id) = g.producer(c) else {
            return Ok(());
        };
        match g.op(flatten_id) {
            DeferredOp::ParallelDo { origin, .. }
            | DeferredOp::GroupByKey { origin, .. }
            | DeferredOp::MultipleParallelDo { origin, .. }
            | DeferredOp::OneToOneOp { origin, .. } => {
                // keep walking upward through non-Flatten producers
                let origin = *origin;
                return self.sink_flattens(g, origin);
            }
            DeferredOp::Flatten { .. } => {}
        }
        // the rewrite needs exactly one consumer, and it must be a ParallelDo
        let pdo_id = match g.consumers(c) {
            [one] if g.op(*one).is_parallel_do() => *one,
            _ => {
                let origins = g.op(flatten_id).origins();
                for o in origins {
                    self.sink_flattens(g, o)?;
                }
                return Ok(());
            }
        };
        let (f, pdo_dest, combining) = match g.op(pdo_id) {
            DeferredOp::ParallelDo {
                f, dest, combining, ..
            } => (f.clone(), *dest, *combining),
            _ => unreachable!("checked above"),
        };
        let out_ty = g.element_type(pdo_dest);
        let origins = g.op(flatten_id).origins();
        let mut new_origins = Vec::with_capacity(origins.len());
        for u in origins {
            // sink nested flattens above this origin first
            self.sink_flattens(g, u)?;
            let v = g.collection(out_ty);
            let new_pdo = g.insert_op(DeferredOp::ParallelDo {
                f: f.clone(),
                origin: u,
                dest: v,
                combining,
            });
            g.remove_consumer(u, flatten_id)?;
            g.add_consumer(u, new_pdo)?;
            g.set_producer(v, new_pdo)?;
            new_origins.push(v);
        }
        // union the transformed branches straight into the ParallelDo's dest
        let new_flatten = g.insert_op(DeferredOp::Flatten {
            origins: new_origins.clone(),
            dest: pdo_dest,
        });
        for &v in &new_origins {
            g.add_consumer(v, new_flatten)?;
        }
        g.clear_producer(pdo_dest);
        g.set_producer(pdo_dest, new_flatten)?;
        // the old flatten, the old ParallelDo, and `c` itself are orphaned
        g.remove_consumer(c, pdo_id)?;
        g.clear_producer(c);
        self.stats.flattens_sunk += 1;
        trace!(collection = c.raw(), "flatten sunk below parallel-do");
        Ok(())
    }

    // |--------------------------|
    // | producer-consumer fusion |
    // |--------------------------|

    /// Fuse `{O2 => p2 => O1 => p1 => C}` into `{O2 => p1∘p2 => C}`.
    fn fuse_parallel_dos(&mut self, g: &mut Graph, c: CollectionId) -> Result<()> {
        if g.is_materialized(c) {
            return Ok(());
        }
        let Some(p1) = g.producer(c) else {
            return Ok(());
        };
        match g.op(p1) {
            DeferredOp::GroupByKey { origin, .. }
            | DeferredOp::MultipleParallelDo { origin, .. }
            | DeferredOp::OneToOneOp { origin, .. } => {
                let origin = *origin;
                return self.fuse_parallel_dos(g, origin);
            }
            DeferredOp::Flatten { origins, .. } => {
                let origins = origins.clone();
                for o in origins {
                    self.fuse_parallel_dos(g, o)?;
                }
                return Ok(());
            }
            DeferredOp::ParallelDo { .. } => {}
        }
        let (f1, o1) = match g.op(p1) {
            DeferredOp::ParallelDo { f, origin, .. } => (f.clone(), *origin),
            _ => unreachable!("checked above"),
        };
        if g.is_materialized(o1) {
            return Ok(());
        }
        let Some(p2) = g.producer(o1) else {
            return Ok(());
        };
        if !g.op(p2).is_parallel_do() {
            return self.fuse_parallel_dos(g, o1);
        }
        let (f2, o2, p2_combining) = match g.op(p2) {
            DeferredOp::ParallelDo {
                f,
                origin,
                combining,
                ..
            } => (f.clone(), *origin, *combining),
            _ => unreachable!("checked above"),
        };
        // a CombineValues directly above its GroupByKey stays attached to
        // the shuffle
        if p2_combining
            && !g.is_materialized(o2)
            && matches!(
                g.producer(o2).map(|p| g.op(p)),
                Some(DeferredOp::GroupByKey { .. })
            )
        {
            return self.fuse_parallel_dos(g, o1);
        }
        let new_pdo = g.insert_op(DeferredOp::ParallelDo {
            f: compose(f1, f2),
            origin: o2,
            dest: c,
            combining: false,
        });
        g.remove_consumer(o1, p1)?;
        if g.consumers(o1).is_empty() {
            // no sibling still reads O1: orphan it and its producer
            g.remove_consumer(o2, p2)?;
            g.clear_producer(o1);
        }
        g.add_consumer(o2, new_pdo)?;
        g.clear_producer(c);
        g.set_producer(c, new_pdo)?;
        self.stats.producer_fusions += 1;
        trace!(collection = c.raw(), "parallel-do chain fused");
        // the shortened chain may be fusible again; each fusion removes one
        // non-materialized ParallelDo from it, so this terminates
        self.fuse_parallel_dos(g, c)
    }

    // |----------------|
    // | sibling fusion |
    // |----------------|

    /// Merge every ParallelDo consumer of a shared input into one
    /// `MultipleParallelDo`.
    fn fuse_sibling_parallel_dos(&mut self, g: &mut Graph, c: CollectionId) -> Result<()> {
        if g.is_materialized(c) {
            return Ok(());
        }
        let Some(p) = g.producer(c) else {
            return Ok(());
        };
        match g.op(p) {
            DeferredOp::GroupByKey { origin, .. } | DeferredOp::OneToOneOp { origin, .. } => {
                let origin = *origin;
                return self.fuse_sibling_parallel_dos(g, origin);
            }
            DeferredOp::Flatten { origins, .. } => {
                let origins = origins.clone();
                for o in origins {
                    self.fuse_sibling_parallel_dos(g, o)?;
                }
                return Ok(());
            }
            // fan-out already fused here; its origin was handled when the
            // fusion was made
            DeferredOp::MultipleParallelDo { .. } => return Ok(()),
            DeferredOp::ParallelDo { .. } => {}
        }
        let orig = match g.op(p) {
            DeferredOp::ParallelDo { origin, .. } => *origin,
            _ => unreachable!("checked above"),
        };
        let siblings: Vec<OpId> = g
            .consumers(orig)
            .iter()
            .copied()
            .filter(|&o| g.op(o).is_parallel_do())
            .collect();
        if siblings.len() <= 1 {
            return self.fuse_sibling_parallel_dos(g, orig);
        }
        // aggregate: the current op's mapping first, the rest in consumer
        // order
        let mut entries = Vec::with_capacity(siblings.len());
        for &sib in std::iter::once(&p).chain(siblings.iter().filter(|&&s| s != p)) {
            match g.op(sib) {
                DeferredOp::ParallelDo { f, dest, .. } => {
                    entries.push((sib, f.clone(), *dest));
                }
                _ => unreachable!("filtered above"),
            }
        }
        let mpdo = g.insert_op(DeferredOp::MultipleParallelDo {
            origin: orig,
            dests: entries.iter().map(|(_, f, d)| (f.clone(), *d)).collect(),
        });
        for &(sib, _, dest) in &entries {
            g.remove_consumer(orig, sib)?;
            g.clear_producer(dest);
            g.set_producer(dest, mpdo)?;
        }
        // non-ParallelDo consumers keep their order; the fan-out goes last
        g.add_consumer(orig, mpdo)?;
        self.stats.sibling_fusions += 1;
        trace!(
            collection = orig.raw(),
            fused = entries.len(),
            "sibling parallel-dos fused"
        );
        self.fuse_sibling_parallel_dos(g, orig)
    }

    // |------------------------|
    // | dead-branch elimination |
    // |------------------------|

    /// Prune consumer branches that lead to no output, walking top-down
    /// from an input. Returns true when `c` itself leads to no output and
    /// can be pruned upstream.
    fn remove_unnecessary_ops(
        &mut self,
        g: &mut Graph,
        c: CollectionId,
        outputs: &[CollectionId],
    ) -> Result<bool> {
        let consumers: Vec<OpId> = g.consumers(c).to_vec();
        if consumers.is_empty() {
            return Ok(!outputs.contains(&c));
        }
        for op_id in consumers {
            let dead = match g.op(op_id) {
                DeferredOp::ParallelDo { dest, .. }
                | DeferredOp::GroupByKey { dest, .. }
                | DeferredOp::Flatten { dest, .. }
                | DeferredOp::OneToOneOp { dest, .. } => {
                    let dest = *dest;
                    self.remove_unnecessary_ops(g, dest, outputs)?
                }
                DeferredOp::MultipleParallelDo { dests, .. } => {
                    let dests: Vec<CollectionId> = dests.iter().map(|(_, d)| *d).collect();
                    let mut live = Vec::with_capacity(dests.len());
                    for d in dests {
                        if !self.remove_unnecessary_ops(g, d, outputs)? {
                            live.push(d);
                        }
                    }
                    self.trim_fan_out(g, op_id, &live)?;
                    live.is_empty()
                }
            };
            // a sibling traversal may already have detached this op
            if dead && g.consumers(c).contains(&op_id) {
                self.drop_op(g, op_id)?;
                self.stats.ops_pruned += 1;
                trace!(collection = c.raw(), "dead branch pruned");
            }
        }
        Ok(g.consumers(c).is_empty() && !outputs.contains(&c))
    }

    /// Remove dead destinations from a fan-out op. A fan-out left with a
    /// single live destination is demoted in place to a plain ParallelDo;
    /// the op handle stays valid, so no edges need rewiring.
    fn trim_fan_out(&mut self, g: &mut Graph, op_id: OpId, live: &[CollectionId]) -> Result<()> {
        let (origin, dests) = match g.op(op_id) {
            DeferredOp::MultipleParallelDo { origin, dests } => (*origin, dests.clone()),
            _ => return Ok(()),
        };
        if live.len() == dests.len() || live.is_empty() {
            // nothing to trim, or the whole op is about to be dropped
            return Ok(());
        }
        for (_, d) in dests.iter().filter(|(_, d)| !live.contains(d)) {
            g.clear_producer(*d);
            self.stats.ops_pruned += 1;
        }
        let kept: Vec<_> = dests.into_iter().filter(|(_, d)| live.contains(d)).collect();
        *g.op_mut(op_id) = if let [(f, dest)] = &kept[..] {
            DeferredOp::ParallelDo {
                f: f.clone(),
                origin,
                dest: *dest,
                combining: false,
            }
        } else {
            DeferredOp::MultipleParallelDo {
                origin,
                dests: kept,
            }
        };
        Ok(())
    }

    /// Detach an op from every origin it still consumes and orphan its
    /// destinations.
    fn drop_op(&mut self, g: &mut Graph, op_id: OpId) -> Result<()> {
        for o in g.op(op_id).origins() {
            if g.consumers(o).contains(&op_id) {
                g.remove_consumer(o, op_id)?;
            }
        }
        for d in g.op(op_id).dests() {
            if g.producer(d) == Some(op_id) {
                g.clear_producer(d);
            }
        }
        Ok(())
    }
}
