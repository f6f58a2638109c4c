//! Testing utilities for graph construction and evaluation.
//!
//! Helpers for moving concrete values in and out of the type-erased
//! [`Element`] world and comparing evaluation results without depending on
//! buffer order:
//!
//! - [`pack`] / [`unpack`]: `Vec<T>` ↔ `Vec<Element>`
//! - [`assert_multiset_equal`]: order-independent comparison
//! - [`assert_elements_equal`]: exact order-dependent comparison

use crate::dofn::SFBound;
use crate::type_token::{element, Element};
use std::fmt::Debug;

/// Box each concrete value as an [`Element`].
pub fn pack<T: SFBound>(items: Vec<T>) -> Vec<Element> {
    items.into_iter().map(element).collect()
}

/// Downcast each element back to `T`.
///
/// # Panics
/// If any element does not hold a `T`.
pub fn unpack<T: SFBound>(elems: &[Element]) -> Vec<T> {
    elems
        .iter()
        .map(|e| e.downcast_ref::<T>().expect("unpack element type").clone())
        .collect()
}

/// Assert two sequences hold the same elements regardless of order.
///
/// # Panics
/// If the sorted sequences differ.
pub fn assert_multiset_equal<T: Ord + Debug + Clone>(actual: &[T], expected: &[T]) {
    let mut a = actual.to_vec();
    let mut e = expected.to_vec();
    a.sort();
    e.sort();
    assert_eq!(a, e, "multisets differ");
}

/// Assert two sequences are identical, order included.
///
/// # Panics
/// If the sequences differ.
pub fn assert_elements_equal<T: PartialEq + Debug>(actual: &[T], expected: &[T]) {
    assert_eq!(actual, expected, "sequences differ");
}
