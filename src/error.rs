//! Error types of the decision-diagram engine.

use thiserror::Error;

use crate::reference::StoreId;
use crate::types::{NodeId, Var};

/// Errors raised by the node store, the Boolean engine, the query engine
/// and the decision procedure.
///
/// Every variant is fatal to the operation that raised it. The store stays
/// usable afterwards: a failed operation never leaves partial nodes behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BddError {
    /// A variable with this name has already been declared.
    #[error("variable `{0}` is already declared")]
    DuplicateVariable(String),

    /// A literal or lookup referenced a variable that is not declared.
    #[error("variable `{0}` is not declared")]
    UndeclaredVariable(String),

    /// `make_node` would break the rank order of the diagram.
    #[error("node ({var}, {low}, {high}) violates the variable order")]
    InvalidOrdering { var: Var, low: NodeId, high: NodeId },

    /// A handle from one store was passed to another.
    #[error("handle belongs to {found}, but the operation runs on {expected}")]
    ForeignStore { expected: StoreId, found: StoreId },

    /// The handle points to a node that was reclaimed by garbage collection.
    #[error("node {0} has been reclaimed")]
    StaleReference(NodeId),

    /// A model count was requested over fewer variables than the diagram uses.
    #[error("model count over {given} variables, but the diagram mentions variable rank {required}")]
    InsufficientVariableCount { required: usize, given: usize },

    /// The engine detected an inconsistency in its own state.
    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

pub type Result<T, E = BddError> = std::result::Result<T, E>;
