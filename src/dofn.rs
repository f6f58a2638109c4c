//! Opaque emitter-based transform functions and their composition.
//!
//! This module defines:
//!
//! - [`SFBound`]: the blanket trait bound for concrete element types used
//!   with the typed adapters.
//! - [`DoFn`]: the opaque element-wise transform the optimizer composes but
//!   never inspects. A `DoFn` receives one element and may emit zero or
//!   more elements through the provided emitter.
//! - **Typed adapters** ([`MapFn`], [`FlatMapFn`], [`FilterFn`],
//!   [`CombinePerKeyFn`]): bridge ordinary closures over concrete types
//!   into the type-erased [`Element`] world.
//! - [`compose`]: the functional composition built by producer–consumer
//!   fusion.
//! - [`Grouper`]: the type-erased shuffle implementation a builder injects
//!   into a `GroupByKey` op, with the [`PairGrouper`] adapter for ordinary
//!   key–value pairs.

use crate::type_token::{element, Element};
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

/// The standard trait bound for concrete element types used with the typed
/// adapters.
///
/// Evaluation may duplicate elements across fan-out branches and buffer
/// them in groups, so element types must be:
///
/// - `'static` (no non-'static borrows inside elements),
/// - `Send + Sync` (elements are shared behind `Arc`),
/// - `Clone` (grouping and fan-out duplicate values).
///
/// This blanket impl allows any type fitting these constraints to be used.
pub trait SFBound: 'static + Send + Sync + Clone {}
impl<T> SFBound for T where T: 'static + Send + Sync + Clone {}

/// An element-wise transform: consume one element, emit zero or more.
///
/// The optimizer treats implementations as opaque; it only ever composes
/// them. The reference interpreter invokes `process` once per input
/// element with an emitter that appends to the destination buffer.
pub trait DoFn: Send + Sync {
    /// Process one element, forwarding any outputs through `emit`.
    fn process(&self, input: &Element, emit: &mut dyn FnMut(Element));
}

/// The composed function built by producer–consumer fusion.
///
/// For each input `v`, `inner` (the producer) runs first; each of its
/// emissions is forwarded one at a time into `outer` (the consumer), which
/// emits through the caller's emitter. Nothing is buffered per element.
struct ComposedFn {
    outer: Arc<dyn DoFn>,
    inner: Arc<dyn DoFn>,
}

impl DoFn for ComposedFn {
    fn process(&self, input: &Element, emit: &mut dyn FnMut(Element)) {
        let outer = &self.outer;
        self.inner.process(input, &mut |w| outer.process(&w, emit));
    }
}

/// Compose `outer ∘ inner`: `f'(v, e) = inner(v, w ↦ outer(w, e))`.
pub fn compose(outer: Arc<dyn DoFn>, inner: Arc<dyn DoFn>) -> Arc<dyn DoFn> {
    Arc::new(ComposedFn { outer, inner })
}

// |----------------|
// | Typed adapters |
// |----------------|

/// Element-wise 1:1 transform built from a plain closure.
pub struct MapFn<I, O, F>(pub F, pub PhantomData<(I, O)>);

impl<I, O, F> DoFn for MapFn<I, O, F>
where
    I: SFBound,
    O: SFBound,
    F: Send + Sync + Fn(&I) -> O + 'static,
{
    fn process(&self, input: &Element, emit: &mut dyn FnMut(Element)) {
        let v = input.downcast_ref::<I>().expect("MapFn input type");
        emit(element(self.0(v)));
    }
}

/// Wrap a `Fn(&I) -> O` closure as an opaque [`DoFn`].
pub fn map_fn<I, O, F>(f: F) -> Arc<dyn DoFn>
where
    I: SFBound,
    O: SFBound,
    F: Send + Sync + Fn(&I) -> O + 'static,
{
    Arc::new(MapFn(f, PhantomData))
}

/// Element-wise 1:N transform built from a plain closure.
pub struct FlatMapFn<I, O, F>(pub F, pub PhantomData<(I, O)>);

impl<I, O, F> DoFn for FlatMapFn<I, O, F>
where
    I: SFBound,
    O: SFBound,
    F: Send + Sync + Fn(&I) -> Vec<O> + 'static,
{
    fn process(&self, input: &Element, emit: &mut dyn FnMut(Element)) {
        let v = input.downcast_ref::<I>().expect("FlatMapFn input type");
        for o in self.0(v) {
            emit(element(o));
        }
    }
}

/// Wrap a `Fn(&I) -> Vec<O>` closure as an opaque [`DoFn`].
pub fn flat_map_fn<I, O, F>(f: F) -> Arc<dyn DoFn>
where
    I: SFBound,
    O: SFBound,
    F: Send + Sync + Fn(&I) -> Vec<O> + 'static,
{
    Arc::new(FlatMapFn(f, PhantomData))
}

/// Keep-or-drop transform built from a predicate.
pub struct FilterFn<T, P>(pub P, pub PhantomData<T>);

impl<T, P> DoFn for FilterFn<T, P>
where
    T: SFBound,
    P: Send + Sync + Fn(&T) -> bool + 'static,
{
    fn process(&self, input: &Element, emit: &mut dyn FnMut(Element)) {
        let v = input.downcast_ref::<T>().expect("FilterFn input type");
        if self.0(v) {
            emit(input.clone());
        }
    }
}

/// Wrap a predicate as an opaque [`DoFn`] that forwards matching elements.
pub fn filter_fn<T, P>(p: P) -> Arc<dyn DoFn>
where
    T: SFBound,
    P: Send + Sync + Fn(&T) -> bool + 'static,
{
    Arc::new(FilterFn(p, PhantomData))
}

/// Per-key combiner over grouped pairs: `(K, Vec<V>) -> (K, O)`.
///
/// This is the function shape carried by a combining `ParallelDo`
/// (`CombineValues`); it runs over the key→sequence pairs a `GroupByKey`
/// produced.
pub struct CombinePerKeyFn<K, V, O, F>(pub F, pub PhantomData<(K, V, O)>);

impl<K, V, O, F> DoFn for CombinePerKeyFn<K, V, O, F>
where
    K: SFBound,
    V: SFBound,
    O: SFBound,
    F: Send + Sync + Fn(&K, &[V]) -> O + 'static,
{
    fn process(&self, input: &Element, emit: &mut dyn FnMut(Element)) {
        let (k, vs) = input
            .downcast_ref::<(K, Vec<V>)>()
            .expect("CombinePerKeyFn input type");
        emit(element((k.clone(), self.0(k, vs))));
    }
}

/// Wrap a `Fn(&K, &[V]) -> O` closure as a per-key combining [`DoFn`].
pub fn combine_per_key_fn<K, V, O, F>(f: F) -> Arc<dyn DoFn>
where
    K: SFBound,
    V: SFBound,
    O: SFBound,
    F: Send + Sync + Fn(&K, &[V]) -> O + 'static,
{
    Arc::new(CombinePerKeyFn(f, PhantomData))
}

// |----------|
// | Grouping |
// |----------|

/// The type-erased shuffle implementation carried by a `GroupByKey` op.
///
/// The builder injects a grouper when it constructs the op, the same way a
/// typed builder context captures closures into execution nodes. Rewrites
/// treat the grouper structurally; only evaluation calls it.
pub trait Grouper: Send + Sync {
    /// Group a batch of key–value elements into key→sequence elements.
    fn group(&self, input: Vec<Element>) -> Vec<Element>;
}

/// Concrete [`Grouper`] over `(K, V)` pairs, producing `(K, Vec<V>)` pairs
/// in first-seen key order.
pub struct PairGrouper<K, V>(PhantomData<(K, V)>);

impl<K, V> Grouper for PairGrouper<K, V>
where
    K: SFBound + Eq + Hash,
    V: SFBound,
{
    fn group(&self, input: Vec<Element>) -> Vec<Element> {
        let mut order: Vec<K> = Vec::new();
        let mut groups: HashMap<K, Vec<V>> = HashMap::new();
        for e in &input {
            let kv = e.downcast_ref::<(K, V)>().expect("PairGrouper input type");
            let (k, v) = kv;
            if !groups.contains_key(k) {
                order.push(k.clone());
            }
            groups.entry(k.clone()).or_default().push(v.clone());
        }
        order
            .into_iter()
            .map(|k| {
                let vs = groups.remove(&k).unwrap();
                element((k, vs))
            })
            .collect()
    }
}

/// Create a type-erased grouper for `(K, V)` pairs.
pub fn pair_grouper<K, V>() -> Arc<dyn Grouper>
where
    K: SFBound + Eq + Hash,
    V: SFBound,
{
    Arc::new(PairGrouper::<K, V>(PhantomData))
}
