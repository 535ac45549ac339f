use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::NodeId;

static NEXT_STORE_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of one node store.
///
/// Handles remember the store they were created by; mixing handles of
/// different stores is rejected with [`BddError::ForeignStore`][crate::error::BddError::ForeignStore].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct StoreId(u32);

impl StoreId {
    pub(crate) fn fresh() -> Self {
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl Display for StoreId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// A lightweight, immutable handle to the root of a diagram.
///
/// Two handles from the same store are equal iff they denote the same
/// Boolean function. The slot generation tells a handle to a collected
/// node apart from a handle to whatever later reuses its slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Ref {
    store: StoreId,
    node: NodeId,
    generation: u32,
}

impl Ref {
    pub(crate) const fn new(store: StoreId, node: NodeId, generation: u32) -> Self {
        Self { store, node, generation }
    }

    /// Returns the store this handle belongs to.
    pub const fn store(self) -> StoreId {
        self.store
    }

    /// Returns the node this handle points to.
    pub const fn node(self) -> NodeId {
        self.node
    }

    /// Generation of the node's slot when this handle was created.
    pub const fn generation(self) -> u32 {
        self.generation
    }

    pub const fn is_terminal(self) -> bool {
        self.node.is_terminal()
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_ids_are_unique() {
        let a = StoreId::fresh();
        let b = StoreId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ref_equality_includes_store() {
        let a = StoreId::fresh();
        let b = StoreId::fresh();
        let node = NodeId::new(7);
        assert_eq!(Ref::new(a, node, 0), Ref::new(a, node, 0));
        assert_ne!(Ref::new(a, node, 0), Ref::new(b, node, 0));
        assert_eq!(Ref::new(a, node, 0).to_string(), "@7");
    }

    #[test]
    fn test_ref_equality_includes_generation() {
        let a = StoreId::fresh();
        let node = NodeId::new(7);
        assert_ne!(Ref::new(a, node, 0), Ref::new(a, node, 1));
        assert_eq!(Ref::new(a, node, 1).generation(), 1);
    }
}
