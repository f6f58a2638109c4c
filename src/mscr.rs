//! MSCR formation: carve the rewritten graph into shuffle-centric
//! execution units.
//!
//! An MSCR (MapShuffleCombineReduce) is the maximal connected set of
//! operators centered on one or more `GroupByKey`s that share map-side
//! source collections. [`mscr_blocks`] discovers the units; each one
//! records its input collections and, per produced terminal collection, an
//! [`OutputChannel`] naming the shuffle+reduce path that yields it.
//!
//! Known limitation: no bypass inputs. An MSCR cannot emit one of its
//! inputs unchanged; a caller needing that inserts an identity
//! `GroupByKey` upstream.

use crate::error::Result;
use crate::graph::Graph;
use crate::handle::{CollectionId, OpId};
use crate::op::DeferredOp;
use std::collections::{HashMap, HashSet};

/// The per-output reducer path of an MSCR: the shuffle, an optional
/// combiner kept attached to it, and an optional final ParallelDo, ending
/// at the terminal collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputChannel {
    pub group_by_key: OpId,
    pub combiner: Option<OpId>,
    pub reducer: Option<OpId>,
    pub output: CollectionId,
}

/// One shuffle-centric execution unit.
#[derive(Debug)]
pub struct Mscr {
    /// Collections entering the unit from outside it, in discovery order.
    pub inputs: Vec<CollectionId>,
    /// The member shuffles.
    pub group_by_keys: Vec<OpId>,
    /// Terminal collection → the path that produces it.
    pub output_channels: HashMap<CollectionId, OutputChannel>,
}

impl Mscr {
    /// Whether `c` is one of this unit's input collections.
    pub fn has_input(&self, c: CollectionId) -> bool {
        self.inputs.contains(&c)
    }
}

/// Discover the MSCR units of a rewritten graph.
///
/// Walks upward from each output to find every reachable `GroupByKey`,
/// unions shuffles whose map-side subgraphs share a source collection, and
/// attaches output channels for workflow outputs and for intermediate
/// boundary collections consumed by downstream units.
pub fn mscr_blocks(graph: &Graph, outputs: &[CollectionId]) -> Result<Vec<Mscr>> {
    let gbks = reachable_group_by_keys(graph, outputs);
    let frontiers: Vec<Vec<CollectionId>> = gbks
        .iter()
        .map(|&g| map_side_frontier(graph, g, outputs))
        .collect();

    // union shuffles whose map-side subgraphs share a source
    let mut parent: Vec<usize> = (0..gbks.len()).collect();
    fn find(parent: &mut Vec<usize>, mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }
    for i in 0..gbks.len() {
        for j in (i + 1)..gbks.len() {
            if frontiers[i].iter().any(|c| frontiers[j].contains(c)) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // group members per union class, preserving discovery order
    let mut classes: Vec<Vec<usize>> = Vec::new();
    let mut class_of_root: HashMap<usize, usize> = HashMap::new();
    for i in 0..gbks.len() {
        let root = find(&mut parent, i);
        let class = *class_of_root.entry(root).or_insert_with(|| {
            classes.push(Vec::new());
            classes.len() - 1
        });
        classes[class].push(i);
    }

    let mut mscrs = Vec::with_capacity(classes.len());
    for members in classes {
        let mut inputs: Vec<CollectionId> = Vec::new();
        let mut group_by_keys = Vec::with_capacity(members.len());
        let mut output_channels = HashMap::new();
        for &m in &members {
            group_by_keys.push(gbks[m]);
            for &c in &frontiers[m] {
                if !inputs.contains(&c) {
                    inputs.push(c);
                }
            }
            attach_channels(graph, gbks[m], outputs, &mut output_channels);
        }
        mscrs.push(Mscr {
            inputs,
            group_by_keys,
            output_channels,
        });
    }
    Ok(mscrs)
}

/// Every `GroupByKey` reachable upward from the outputs, in DFS order,
/// stopping at materialized collections.
fn reachable_group_by_keys(graph: &Graph, outputs: &[CollectionId]) -> Vec<OpId> {
    let mut stack: Vec<CollectionId> = outputs.iter().rev().copied().collect();
    let mut seen: HashSet<CollectionId> = HashSet::new();
    let mut found: Vec<OpId> = Vec::new();
    let mut found_set: HashSet<OpId> = HashSet::new();
    while let Some(c) = stack.pop() {
        if !seen.insert(c) || graph.is_materialized(c) {
            continue;
        }
        if let Some(p) = graph.producer(c) {
            if matches!(graph.op(p), DeferredOp::GroupByKey { .. }) && found_set.insert(p) {
                found.push(p);
            }
            let mut origins = graph.op(p).origins();
            origins.reverse();
            stack.extend(origins);
        }
    }
    found
}

/// The source collections feeding a shuffle's map-side subgraph.
///
/// Walks upward from the shuffle's origin through plain ParallelDos,
/// fan-outs, Flattens, and passthroughs. A collection is a frontier source
/// when it is materialized, has no producer, is itself a workflow output,
/// or is the product of an upstream shuffle (a `GroupByKey` or the
/// combining ParallelDo kept attached to one).
fn map_side_frontier(graph: &Graph, gbk: OpId, outputs: &[CollectionId]) -> Vec<CollectionId> {
    let origin = match graph.op(gbk) {
        DeferredOp::GroupByKey { origin, .. } => *origin,
        _ => unreachable!("caller collects GroupByKeys only"),
    };
    let mut stack = vec![origin];
    let mut seen: HashSet<CollectionId> = HashSet::new();
    let mut sources = Vec::new();
    while let Some(c) = stack.pop() {
        if !seen.insert(c) {
            continue;
        }
        let boundary = graph.is_materialized(c)
            || outputs.contains(&c)
            || match graph.producer(c) {
                None => true,
                Some(p) => matches!(
                    graph.op(p),
                    DeferredOp::GroupByKey { .. }
                        | DeferredOp::ParallelDo {
                            combining: true,
                            ..
                        }
                ),
            };
        if boundary {
            if !sources.contains(&c) {
                sources.push(c);
            }
            continue;
        }
        let p = graph.producer(c).expect("non-boundary has a producer");
        let mut origins = graph.op(p).origins();
        origins.reverse();
        stack.extend(origins);
    }
    sources
}

/// Record the output channels below one shuffle.
///
/// The reduce side has two points a channel can hang off: the grouped
/// result itself, and the dest of a combining ParallelDo when one is
/// attached. Nothing restricts how many ops consume either point, so each
/// is scanned in full: every plain ParallelDo or fan-out destination that
/// is a listed output gets a reducer channel, and the point itself gets a
/// channel when it is a listed output or when any consumer leads outside
/// the reduce side — that entry is what lets the scheduler see which unit
/// produces an intermediate boundary collection.
fn attach_channels(
    graph: &Graph,
    gbk: OpId,
    outputs: &[CollectionId],
    channels: &mut HashMap<CollectionId, OutputChannel>,
) {
    let d0 = match graph.op(gbk) {
        DeferredOp::GroupByKey { dest, .. } => *dest,
        _ => unreachable!("caller collects GroupByKeys only"),
    };
    let combiner = graph.consumers(d0).iter().copied().find(|&o| {
        matches!(
            graph.op(o),
            DeferredOp::ParallelDo {
                combining: true,
                ..
            }
        )
    });
    // the raw grouped result: its channels carry no combiner, and the
    // combiner op itself is not one of its reducers
    channels_below(graph, gbk, d0, None, combiner, outputs, channels);
    if let Some(cv) = combiner {
        let base = graph.op(cv).single_dest().expect("combiner has one dest");
        channels_below(graph, gbk, base, Some(cv), None, outputs, channels);
    }
}

/// Scan every consumer of one reduce-side collection, recording a channel
/// per destination that is a listed output. `point` gets a boundary
/// channel of its own when it is a listed output, or when any consumer is
/// not fully accounted for by those channels (a chained shuffle, a
/// downstream mapper, a fan-out with non-output branches) — downstream
/// map-side walks stop exactly there, so the scheduler resolves their
/// dependency through this entry.
fn channels_below(
    graph: &Graph,
    gbk: OpId,
    point: CollectionId,
    combiner: Option<OpId>,
    skip: Option<OpId>,
    outputs: &[CollectionId],
    channels: &mut HashMap<CollectionId, OutputChannel>,
) {
    let push = |out: CollectionId, reducer: Option<OpId>, map: &mut HashMap<_, _>| {
        map.insert(
            out,
            OutputChannel {
                group_by_key: gbk,
                combiner,
                reducer,
                output: out,
            },
        );
    };
    let mut covered = !graph.consumers(point).is_empty();
    for &one in graph.consumers(point) {
        if Some(one) == skip {
            continue;
        }
        match graph.op(one) {
            DeferredOp::ParallelDo {
                combining: false,
                dest,
                ..
            } if outputs.contains(dest) => {
                push(*dest, Some(one), channels);
            }
            DeferredOp::MultipleParallelDo { dests, .. } => {
                let mut all_outputs = true;
                for (_, d) in dests {
                    if outputs.contains(d) {
                        push(*d, Some(one), channels);
                    } else {
                        all_outputs = false;
                    }
                }
                if !all_outputs {
                    covered = false;
                }
            }
            _ => covered = false,
        }
    }
    if outputs.contains(&point) || !covered {
        push(point, None, channels);
    }
}
