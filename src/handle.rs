//! Lightweight unique identifiers for the two node kinds of a [`Graph`](crate::graph::Graph).
//!
//! Collections and deferred ops live in arena vectors and reference each
//! other through these sequential handles. The handles are opaque—only the
//! graph, the rewrite passes, and the scheduler inspect them directly.
//!
//! They’re small, `Copy`, and hashable, so they can be used efficiently as
//! keys in maps or sets when traversing or rewiring the graph.

/// Unique numeric identifier for a collection node in a graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CollectionId(u32);

impl CollectionId {
    /// Create a new `CollectionId` (used internally by the graph).
    pub(crate) fn new(v: u32) -> Self {
        Self(v)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Return the underlying numeric value.
    ///
    /// Useful mainly for debugging or diagnostics.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

/// Unique numeric identifier for a deferred op in a graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct OpId(u32);

impl OpId {
    /// Create a new `OpId` (used internally by the graph).
    pub(crate) fn new(v: u32) -> Self {
        Self(v)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    /// Return the underlying numeric value.
    pub fn raw(&self) -> u32 {
        self.0
    }
}
