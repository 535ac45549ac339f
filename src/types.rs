//! Type-safe wrappers for variables, literals and node indices.
//!
//! These newtypes keep ranks, signed literals and arena indices apart at
//! compile time, so that a node index can never be mistaken for a variable.
use std::fmt;
use std::ops::Neg;

/// A declared variable, identified by its rank (1-indexed).
///
/// Ranks are assigned in declaration order by [`Bdd::declare_variable`][crate::bdd::Bdd::declare_variable],
/// so comparing two variables compares their position in the global ordering.
///
/// Unlike [`Ref`][crate::reference::Ref], a variable is not tied to a store:
/// it is a plain rank, and any store that has declared at least that many
/// variables accepts it. Stores that declare the same names in the same
/// order therefore agree on every `Var`.
///
/// # Invariants
///
/// - Variable IDs must be >= 1 (0 is reserved for terminals)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Var(u32);

impl Var {
    /// Rank used for terminals: sorts after every variable.
    pub(crate) const TERMINAL_RANK: u32 = u32::MAX;

    /// Creates a new variable with the given ID.
    ///
    /// # Panics
    ///
    /// Panics if `id == 0`. Variables must be 1-indexed.
    pub fn new(id: u32) -> Self {
        assert_ne!(id, 0, "Variable IDs must be >= 1");
        Var(id)
    }

    /// Returns the raw variable ID, which is also its rank.
    pub fn id(self) -> u32 {
        self.0
    }

    /// Positive literal of this variable.
    pub fn pos(self) -> Lit {
        Lit::new(self, false)
    }

    /// Negative literal of this variable.
    pub fn neg(self) -> Lit {
        Lit::new(self, true)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

impl From<Var> for u32 {
    fn from(var: Var) -> Self {
        var.0
    }
}

/// A literal: a variable or its negation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Lit {
    var: Var,
    negated: bool,
}

impl Lit {
    pub fn new(var: Var, negated: bool) -> Self {
        Self { var, negated }
    }

    /// Creates a literal from a signed DIMACS integer (`-3` is `¬x3`).
    ///
    /// # Panics
    ///
    /// Panics if `lit == 0`.
    pub fn from_dimacs(lit: i32) -> Self {
        assert_ne!(lit, 0, "DIMACS literal must be non-zero");
        Self::new(Var::new(lit.unsigned_abs()), lit < 0)
    }

    /// Returns the signed DIMACS representation.
    pub fn to_dimacs(self) -> i32 {
        let v = self.var.id() as i32;
        if self.negated {
            -v
        } else {
            v
        }
    }

    pub fn var(self) -> Var {
        self.var
    }

    pub fn is_negated(self) -> bool {
        self.negated
    }

    pub fn is_positive(self) -> bool {
        !self.negated
    }
}

impl Neg for Lit {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(self.var, !self.negated)
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "~{}", self.var)
        } else {
            write!(f, "{}", self.var)
        }
    }
}

/// Index of a node inside the store's arena.
///
/// Indices `0` and `1` are the `false` and `true` terminals.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub const ZERO: Self = NodeId(0);
    pub const ONE: Self = NodeId(1);

    pub const fn new(index: u32) -> Self {
        NodeId(index)
    }

    pub const fn terminal(value: bool) -> Self {
        if value {
            Self::ONE
        } else {
            Self::ZERO
        }
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_terminal(self) -> bool {
        self.0 <= 1
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}
