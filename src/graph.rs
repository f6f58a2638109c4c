//! In-memory representation of a lazy dataflow graph.
//!
//! The [`Graph`] is the central arena for collection nodes and their
//! deferred ops. Both kinds live in plain vectors and reference each other
//! through stable integer handles ([`CollectionId`], [`OpId`]), which keeps
//! the doubly linked producer ↔ consumer structure free of cyclic ownership
//! and makes edge rewiring a local operation on two endpoint slots.
//!
//! # Overview
//! - The external builder inserts collections and wires ops with the
//!   constructors (`parallel_do`, `group_by_key`, `flatten`, ...).
//! - Rewrite passes use the low-level edge operations (`set_producer`,
//!   `add_consumer`, `remove_consumer`, `replace_origin`, ...) which keep
//!   both endpoints in sync and report misuse as
//!   [`Error::GraphInvariant`].
//! - Materialized collections are boundaries (user inputs or
//!   already-computed results); rewrites never traverse past them.
//!
//! Rewrites orphan slots rather than freeing them: a detached collection
//! keeps its arena entry but is absent from every producer/consumer edge,
//! so handles held by the caller stay valid.

use crate::dofn::{DoFn, Grouper};
use crate::error::{Error, Result};
use crate::handle::{CollectionId, OpId};
use crate::op::DeferredOp;
use crate::type_token::TypeTag;
use std::sync::Arc;

/// One lazy collection: element type, boundary flag, and its edges.
struct CollectionNode {
    ty: TypeTag,
    materialized: bool,
    producer: Option<OpId>,
    consumers: Vec<OpId>,
}

/// Arena graph of collections and deferred ops.
#[derive(Default)]
pub struct Graph {
    collections: Vec<CollectionNode>,
    ops: Vec<DeferredOp>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // |----------------|
    // | Node insertion |
    // |----------------|

    /// Insert a fresh, non-materialized collection of element type `ty`.
    pub fn collection(&mut self, ty: TypeTag) -> CollectionId {
        let id = CollectionId::new(self.collections.len() as u32);
        self.collections.push(CollectionNode {
            ty,
            materialized: false,
            producer: None,
            consumers: Vec::new(),
        });
        id
    }

    /// Insert a materialized boundary collection (user input or
    /// already-computed result). Rewrites stop here.
    pub fn input(&mut self, ty: TypeTag) -> CollectionId {
        let id = self.collection(ty);
        self.collections[id.index()].materialized = true;
        id
    }

    /// Mark an existing collection as a materialized boundary.
    pub fn mark_materialized(&mut self, c: CollectionId) {
        self.collections[c.index()].materialized = true;
    }

    pub(crate) fn insert_op(&mut self, op: DeferredOp) -> OpId {
        let id = OpId::new(self.ops.len() as u32);
        self.ops.push(op);
        id
    }

    // |-----------|
    // | Accessors |
    // |-----------|

    /// Element type descriptor of a collection.
    pub fn element_type(&self, c: CollectionId) -> TypeTag {
        self.collections[c.index()].ty
    }

    /// Whether the collection is a rewrite boundary.
    pub fn is_materialized(&self, c: CollectionId) -> bool {
        self.collections[c.index()].materialized
    }

    /// The op producing this collection, if any.
    pub fn producer(&self, c: CollectionId) -> Option<OpId> {
        self.collections[c.index()].producer
    }

    /// The ordered list of ops consuming this collection.
    pub fn consumers(&self, c: CollectionId) -> &[OpId] {
        &self.collections[c.index()].consumers
    }

    pub fn op(&self, id: OpId) -> &DeferredOp {
        &self.ops[id.index()]
    }

    pub(crate) fn op_mut(&mut self, id: OpId) -> &mut DeferredOp {
        &mut self.ops[id.index()]
    }

    /// All collection handles, in insertion order. Orphaned slots included.
    pub fn collection_ids(&self) -> impl Iterator<Item = CollectionId> + '_ {
        (0..self.collections.len() as u32).map(CollectionId::new)
    }

    // |------------------|
    // | Edge maintenance |
    // |------------------|

    /// Install `op` as the producing op of `c`.
    ///
    /// Attaching a second producing op is a programmer error.
    pub fn set_producer(&mut self, c: CollectionId, op: OpId) -> Result<()> {
        let node = &mut self.collections[c.index()];
        if node.producer.is_some() {
            return Err(Error::GraphInvariant {
                reason: "collection already has a producing op",
                collection: c,
            });
        }
        node.producer = Some(op);
        Ok(())
    }

    /// Detach and return the producing op of `c`, if any.
    pub fn clear_producer(&mut self, c: CollectionId) -> Option<OpId> {
        self.collections[c.index()].producer.take()
    }

    /// Append `op` to the consumer list of `c`. Duplicates are forbidden.
    pub fn add_consumer(&mut self, c: CollectionId, op: OpId) -> Result<()> {
        let node = &mut self.collections[c.index()];
        if node.consumers.contains(&op) {
            return Err(Error::GraphInvariant {
                reason: "op is already a consumer of this collection",
                collection: c,
            });
        }
        node.consumers.push(op);
        Ok(())
    }

    /// Remove the specific `op` from the consumer list of `c`.
    ///
    /// Removing an op that is not present is a programmer error; the
    /// removal is by identity, never by position, so neighbors keep their
    /// order.
    pub fn remove_consumer(&mut self, c: CollectionId, op: OpId) -> Result<()> {
        let node = &mut self.collections[c.index()];
        match node.consumers.iter().position(|&o| o == op) {
            Some(i) => {
                node.consumers.remove(i);
                Ok(())
            }
            None => Err(Error::GraphInvariant {
                reason: "removing a consumer op that is not attached",
                collection: c,
            }),
        }
    }

    /// Redirect one origin edge of `op` from `old` to `new`, updating both
    /// endpoints' consumer lists.
    pub fn replace_origin(&mut self, op: OpId, old: CollectionId, new: CollectionId) -> Result<()> {
        let replaced = match self.op_mut(op) {
            DeferredOp::ParallelDo { origin, .. }
            | DeferredOp::GroupByKey { origin, .. }
            | DeferredOp::MultipleParallelDo { origin, .. }
            | DeferredOp::OneToOneOp { origin, .. } => {
                if *origin == old {
                    *origin = new;
                    true
                } else {
                    false
                }
            }
            DeferredOp::Flatten { origins, .. } => {
                match origins.iter().position(|&o| o == old) {
                    Some(i) => {
                        origins[i] = new;
                        true
                    }
                    None => false,
                }
            }
        };
        if !replaced {
            return Err(Error::GraphInvariant {
                reason: "replacing an origin edge the op does not have",
                collection: old,
            });
        }
        self.remove_consumer(old, op)?;
        self.add_consumer(new, op)
    }

    /// Redirect the destination edge of `op` from `old` to `new`, updating
    /// both endpoints' producer slots.
    pub fn replace_dest(&mut self, op: OpId, old: CollectionId, new: CollectionId) -> Result<()> {
        if self.producer(old) != Some(op) {
            return Err(Error::GraphInvariant {
                reason: "replacing a destination edge the op does not have",
                collection: old,
            });
        }
        let replaced = match self.op_mut(op) {
            DeferredOp::ParallelDo { dest, .. }
            | DeferredOp::GroupByKey { dest, .. }
            | DeferredOp::Flatten { dest, .. }
            | DeferredOp::OneToOneOp { dest, .. } => {
                if *dest == old {
                    *dest = new;
                    true
                } else {
                    false
                }
            }
            DeferredOp::MultipleParallelDo { dests, .. } => {
                match dests.iter().position(|(_, d)| *d == old) {
                    Some(i) => {
                        dests[i].1 = new;
                        true
                    }
                    None => false,
                }
            }
        };
        if !replaced {
            return Err(Error::GraphInvariant {
                reason: "replacing a destination edge the op does not have",
                collection: old,
            });
        }
        self.clear_producer(old);
        self.set_producer(new, op)
    }

    // |----------------------|
    // | Builder constructors |
    // |----------------------|

    /// Defer an element-wise transform of `origin`, returning the fresh
    /// destination collection of element type `out_ty`.
    pub fn parallel_do(
        &mut self,
        origin: CollectionId,
        f: Arc<dyn DoFn>,
        out_ty: TypeTag,
    ) -> Result<CollectionId> {
        self.unary_pdo(origin, f, out_ty, false)
    }

    /// Defer a per-key combining transform of `origin` (the
    /// `CombineValues` refinement); legal only directly downstream of a
    /// `group_by_key`.
    pub fn combine_values(
        &mut self,
        origin: CollectionId,
        f: Arc<dyn DoFn>,
        out_ty: TypeTag,
    ) -> Result<CollectionId> {
        self.unary_pdo(origin, f, out_ty, true)
    }

    fn unary_pdo(
        &mut self,
        origin: CollectionId,
        f: Arc<dyn DoFn>,
        out_ty: TypeTag,
        combining: bool,
    ) -> Result<CollectionId> {
        let dest = self.collection(out_ty);
        let op = self.insert_op(DeferredOp::ParallelDo {
            f,
            origin,
            dest,
            combining,
        });
        self.add_consumer(origin, op)?;
        self.set_producer(dest, op)?;
        Ok(dest)
    }

    /// Defer a shuffle of `origin` by key, returning the key→sequence
    /// destination collection.
    pub fn group_by_key(
        &mut self,
        origin: CollectionId,
        grouper: Arc<dyn Grouper>,
        out_ty: TypeTag,
    ) -> Result<CollectionId> {
        let dest = self.collection(out_ty);
        let op = self.insert_op(DeferredOp::GroupByKey {
            grouper,
            origin,
            dest,
        });
        self.add_consumer(origin, op)?;
        self.set_producer(dest, op)?;
        Ok(dest)
    }

    /// Defer a union of several distinct collections of the same element
    /// type.
    pub fn flatten(&mut self, origins: &[CollectionId]) -> Result<CollectionId> {
        let Some(&first) = origins.first() else {
            return Err(Error::InvalidArgument("flatten requires at least one origin"));
        };
        let ty = self.element_type(first);
        for &o in &origins[1..] {
            if self.element_type(o) != ty {
                return Err(Error::GraphInvariant {
                    reason: "flatten origins must share one element type",
                    collection: o,
                });
            }
        }
        let dest = self.collection(ty);
        let op = self.insert_op(DeferredOp::Flatten {
            origins: origins.to_vec(),
            dest,
        });
        for &o in origins {
            self.add_consumer(o, op)?;
        }
        self.set_producer(dest, op)?;
        Ok(dest)
    }

    /// Defer a structural passthrough of `origin`.
    pub fn one_to_one(&mut self, origin: CollectionId) -> Result<CollectionId> {
        let ty = self.element_type(origin);
        let dest = self.collection(ty);
        let op = self.insert_op(DeferredOp::OneToOneOp { origin, dest });
        self.add_consumer(origin, op)?;
        self.set_producer(dest, op)?;
        Ok(dest)
    }
}
