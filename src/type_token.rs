//! Type tags and type-erased element values.
//!
//! This module provides:
//! - [`TypeTag`]: a lightweight runtime type identifier attached to every
//!   collection so the rewrite passes can assert element-type preservation
//!   across graph surgery without carrying generic types.
//! - [`Element`]: the type-erased value flowing through opaque transform
//!   functions and the reference interpreter.
//!
//! The optimizer never looks inside an [`Element`]; only the typed adapters
//! in [`dofn`](crate::dofn) downcast, exactly where an element enters user
//! code. All downcasts are against the concrete type the builder promised
//! via the collection's `TypeTag`.

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

/// A single type-erased element carried through transforms at evaluation time.
///
/// Elements are reference-counted so fan-out (one collection consumed by
/// several ops) duplicates a pointer, not the payload.
pub type Element = Arc<dyn Any + Send + Sync>;

/// Box a concrete value as an [`Element`].
pub fn element<T: Send + Sync + 'static>(v: T) -> Element {
    Arc::new(v)
}

/// Borrow the concrete value inside an [`Element`], if it holds a `T`.
pub fn downcast<T: 'static>(v: &Element) -> Option<&T> {
    v.downcast_ref::<T>()
}

/// A lightweight runtime type tag for debugging and assertions.
///
/// `TypeTag` carries the `TypeId` and a readable type name. It is attached
/// to every collection so rewrites and the flatten constructor can reason
/// about the element type without a generic parameter.
///
/// ```
/// use steelflume::type_token::TypeTag;
/// let tag = TypeTag::of::<u32>();
/// assert_eq!(tag.name, "u32");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeTag {
    /// Stable Rust type identifier.
    pub id: TypeId,
    /// Human-readable type name (best-effort).
    pub name: &'static str,
}

impl TypeTag {
    /// Construct a tag for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}
