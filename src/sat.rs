//! Satisfiability queries: model counting, support and witnesses.

use std::collections::{BTreeSet, HashMap};

use log::debug;
use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::error::{BddError, Result};
use crate::reference::Ref;
use crate::types::{Lit, NodeId, Var};

impl Bdd {
    /// Returns the set of variables `f` actually depends on.
    pub fn support(&self, f: Ref) -> Result<BTreeSet<Var>> {
        let root = self.check(f)?;
        let support: BTreeSet<Var> = self
            .post_order(root, |_| false)
            .into_iter()
            .map(|index| self.node(index).variable)
            .collect();
        debug!("support(f = {}) -> {} vars", f, support.len());
        Ok(support)
    }

    /// Counts the assignments of the first `num_vars` variables satisfying `f`.
    ///
    /// Every variable of rank `1..=num_vars` takes part in the count, whether
    /// or not it occurs in `f`; a skipped variable doubles the count. This
    /// holds above the root as well as between a node and its children.
    ///
    /// The count is computed bottom-up as a fraction of `2^num_vars`:
    ///
    /// ```text
    /// count(0) = 0
    /// count(1) = 2^num_vars
    /// count(v ? high : low) = (count(low) + count(high)) / 2
    /// ```
    ///
    /// which equals weighting each child by `2^(skipped ranks)` explicitly,
    /// and is exact since `low` and `high` do not depend on `v`.
    pub fn model_count(&self, f: Ref, num_vars: usize) -> Result<BigUint> {
        let root = self.check(f)?;
        let order = self.post_order(root, |_| false);

        if let Some(required) = order
            .iter()
            .map(|&index| self.node(index).variable.id() as usize)
            .max()
        {
            if required > num_vars {
                return Err(BddError::InsufficientVariableCount {
                    required,
                    given: num_vars,
                });
            }
        }

        let max = BigUint::from(1u32) << num_vars;
        let mut counts: HashMap<NodeId, BigUint> = HashMap::with_capacity(order.len() + 2);
        counts.insert(NodeId::ZERO, BigUint::ZERO);
        counts.insert(NodeId::ONE, max);

        for index in order {
            let node = self.node(index);
            let count = (&counts[&node.low] + &counts[&node.high]) >> 1u32;
            counts.insert(index, count);
        }

        let count = counts.remove(&root).unwrap_or_default();
        debug!("model_count(f = {}, num_vars = {}) -> {}", f, num_vars, count);
        Ok(count)
    }

    /// [`Bdd::model_count`] over all declared variables.
    pub fn model_count_all(&self, f: Ref) -> Result<BigUint> {
        self.model_count(f, self.num_vars())
    }

    pub fn is_satisfiable(&self, f: Ref) -> Result<bool> {
        self.check(f)?;
        Ok(!self.is_zero(f))
    }

    /// Returns one satisfying path of `f`, if any exists.
    ///
    /// Only the variables on the path are assigned; the remaining ones are
    /// free. Returns `None` if `f` is the constant false function.
    pub fn one_sat(&self, f: Ref) -> Result<Option<Vec<Lit>>> {
        let mut current = self.check(f)?;
        if current == NodeId::ZERO {
            return Ok(None);
        }

        let mut path = Vec::new();

        // Walk down the BDD, always picking a satisfying branch
        while current != NodeId::ONE {
            let node = self.node(current);
            if node.high != NodeId::ZERO {
                path.push(node.variable.pos());
                current = node.high;
            } else {
                path.push(node.variable.neg());
                current = node.low;
            }
        }

        Ok(Some(path))
    }

    /// Evaluates `f` under a full assignment; `values[i]` is the value of
    /// the variable of rank `i + 1`.
    pub fn eval(&self, f: Ref, values: &[bool]) -> Result<bool> {
        let mut current = self.check(f)?;
        while !current.is_terminal() {
            let node = self.node(current);
            let rank = node.variable.id() as usize;
            let Some(&value) = values.get(rank - 1) else {
                return Err(BddError::InsufficientVariableCount {
                    required: rank,
                    given: values.len(),
                });
            };
            current = if value { node.high } else { node.low };
        }
        Ok(current == NodeId::ONE)
    }
}
