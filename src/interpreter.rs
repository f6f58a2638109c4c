//! Single-threaded reference evaluator for lazy graphs.
//!
//! The [`Interpreter`] pulls a collection's value by walking its producer
//! chain, applying each deferred op to type-erased element buffers. It is
//! the local stand-in for a real execution engine: tests feed element
//! streams into the inputs, evaluate an output before and after
//! optimization, and compare the multisets.
//!
//! Determinism: within one evaluation, every op preserves the order of its
//! input buffer; `Flatten` concatenates origin buffers in origin order.
//! Evaluated buffers are memoized, so a collection consumed by several ops
//! is computed once.

use crate::dofn::{DoFn as _, Grouper as _};
use crate::error::{Error, Result};
use crate::graph::Graph;
use crate::handle::CollectionId;
use crate::op::DeferredOp;
use crate::type_token::Element;
use std::collections::HashMap;

/// Demand-driven evaluator over a (possibly optimized) graph.
pub struct Interpreter<'g> {
    graph: &'g Graph,
    values: HashMap<CollectionId, Vec<Element>>,
}

impl<'g> Interpreter<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self {
            graph,
            values: HashMap::new(),
        }
    }

    /// Supply the element buffer for a source collection.
    pub fn feed(&mut self, c: CollectionId, elems: Vec<Element>) -> &mut Self {
        self.values.insert(c, elems);
        self
    }

    /// Evaluate a collection, pulling through its producer chain.
    ///
    /// # Errors
    /// [`Error::GraphInvariant`] when evaluation reaches a collection with
    /// neither fed data nor a producing op, or a fan-out op that does not
    /// list the requested destination.
    pub fn evaluate(&mut self, c: CollectionId) -> Result<Vec<Element>> {
        if let Some(v) = self.values.get(&c) {
            return Ok(v.clone());
        }
        let g = self.graph;
        let Some(p) = g.producer(c) else {
            return Err(Error::GraphInvariant {
                reason: "evaluation reached a collection with no producer and no fed data",
                collection: c,
            });
        };
        let out = match g.op(p) {
            DeferredOp::ParallelDo { f, origin, .. } => {
                let input = self.evaluate(*origin)?;
                let mut out = Vec::new();
                for v in &input {
                    f.process(v, &mut |e| out.push(e));
                }
                out
            }
            DeferredOp::MultipleParallelDo { origin, dests } => {
                let f = dests
                    .iter()
                    .find(|(_, d)| *d == c)
                    .map(|(f, _)| f)
                    .ok_or(Error::GraphInvariant {
                        reason: "fan-out op does not list this destination",
                        collection: c,
                    })?;
                let input = self.evaluate(*origin)?;
                let mut out = Vec::new();
                for v in &input {
                    f.process(v, &mut |e| out.push(e));
                }
                out
            }
            DeferredOp::GroupByKey {
                grouper, origin, ..
            } => {
                let input = self.evaluate(*origin)?;
                grouper.group(input)
            }
            DeferredOp::Flatten { origins, .. } => {
                let mut out = Vec::new();
                for &o in origins {
                    out.extend(self.evaluate(o)?);
                }
                out
            }
            DeferredOp::OneToOneOp { origin, .. } => self.evaluate(*origin)?,
        };
        self.values.insert(c, out.clone());
        Ok(out)
    }
}
