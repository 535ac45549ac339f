use crate::types::{NodeId, Var};
use crate::utils::{pairing3, MyHash};

/// An internal decision node: `if variable then high else low`.
///
/// Terminals are not stored as `Node`s; they are the reserved indices
/// [`NodeId::ZERO`] and [`NodeId::ONE`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Node {
    pub variable: Var,
    pub low: NodeId,
    pub high: NodeId,
}

impl Node {
    pub fn new(variable: Var, low: NodeId, high: NodeId) -> Self {
        Self { variable, low, high }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        pairing3(
            self.variable.id() as u64,
            self.low.raw() as u64,
            self.high.raw() as u64,
        )
    }
}
