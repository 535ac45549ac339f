//! The BDD manager: node store, Boolean engine and garbage collector.
//!
//! All diagrams live inside one [`Bdd`] manager. Nodes are hash-consed in a
//! unique table, so two handles from the same manager are equal iff they
//! denote the same Boolean function. Handles ([`Ref`]) are plain indices
//! tagged with the manager's [`StoreId`]; they never own nodes.
//!
//! # Variable order
//!
//! Variables are declared by name with [`Bdd::declare_variable`]. The
//! declaration order is the variable order: the first declared variable is
//! tested at the root.
//!
//! # Operations
//!
//! Every connective goes through one memoized engine over [`OpKey`]s:
//!
//! ```text
//! apply(op, f, g)     op ∈ {AND, OR, XOR}
//! not(f)
//! ite(f, g, h)        = (f ∧ g) ∨ (¬f ∧ h)
//! ```
//!
//! The engine walks the cofactor tree with an explicit work stack instead of
//! native recursion, so deep diagrams cannot exhaust the call stack.
//!
//! # Garbage collection
//!
//! Nodes are reclaimed by mark-and-sweep from the registered roots (see
//! [`Bdd::retain`]) plus any extra roots passed to [`Bdd::collect_garbage`].
//! With [`BddConfig::gc_threshold`] set, a collection also runs at the entry
//! of top-level operations once the store outgrows the threshold; the
//! operands of that operation are protected automatically.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use log::debug;

use crate::cache::{Cache, CacheStats};
use crate::config::BddConfig;
use crate::error::{BddError, Result};
use crate::node::Node;
use crate::reference::{Ref, StoreId};
use crate::table::Table;
use crate::types::{Lit, NodeId, Var};

/// Number of reserved arena slots: the two terminals.
const NUM_TERMINALS: usize = 2;

type Storage = Table<Node>;

impl Storage {
    fn node(&self, index: NodeId) -> Node {
        *self.value(index.index())
    }

    fn rank(&self, index: NodeId) -> u32 {
        if index.is_terminal() {
            Var::TERMINAL_RANK
        } else {
            self.node(index).variable.id()
        }
    }

    /// Cofactors of `index` with respect to `var`, which must not be ranked
    /// below the top variable of `index`.
    fn cofactors(&self, index: NodeId, var: Var) -> (NodeId, NodeId) {
        if index.is_terminal() {
            return (index, index);
        }
        let node = self.node(index);
        if node.variable == var {
            (node.low, node.high)
        } else {
            debug_assert!(node.variable > var);
            (index, index)
        }
    }

    /// Canonical node constructor. Callers guarantee the rank order.
    fn mk(&mut self, variable: Var, low: NodeId, high: NodeId) -> NodeId {
        if low == high {
            return low;
        }
        debug_assert!(variable.id() < self.rank(low) && variable.id() < self.rank(high));
        let index = self.put(Node::new(variable, low, high));
        assert!(index <= u32::MAX as usize, "Node store is full");
        NodeId::new(index as u32)
    }
}

/// Binary Boolean connectives accepted by [`Bdd::apply`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Op {
    And,
    Or,
    Xor,
}

impl Op {
    fn eval(self, a: bool, b: bool) -> bool {
        match self {
            Op::And => a && b,
            Op::Or => a || b,
            Op::Xor => a != b,
        }
    }
}

/// Computed-table key of one engine step.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum OpKey {
    Apply(Op, NodeId, NodeId),
    Not(NodeId),
    Ite(NodeId, NodeId, NodeId),
}

enum Reduced {
    Done(NodeId),
    Key(OpKey),
}

impl OpKey {
    /// Resolves terminal cases and brings the key into normal form.
    ///
    /// Operands of commutative connectives are sorted, so that `f ∧ g` and
    /// `g ∧ f` share one cache entry.
    fn reduce(self) -> Reduced {
        match self {
            OpKey::Apply(op, f, g) => {
                let (f, g) = if f <= g { (f, g) } else { (g, f) };
                if f.is_terminal() && g.is_terminal() {
                    return Reduced::Done(NodeId::terminal(
                        op.eval(f == NodeId::ONE, g == NodeId::ONE),
                    ));
                }
                match op {
                    Op::And => {
                        if f == NodeId::ZERO {
                            return Reduced::Done(NodeId::ZERO);
                        }
                        if f == NodeId::ONE || f == g {
                            return Reduced::Done(g);
                        }
                    }
                    Op::Or => {
                        if f == NodeId::ONE {
                            return Reduced::Done(NodeId::ONE);
                        }
                        if f == NodeId::ZERO || f == g {
                            return Reduced::Done(g);
                        }
                    }
                    Op::Xor => {
                        if f == g {
                            return Reduced::Done(NodeId::ZERO);
                        }
                        if f == NodeId::ZERO {
                            return Reduced::Done(g);
                        }
                        if f == NodeId::ONE {
                            return OpKey::Not(g).reduce();
                        }
                    }
                }
                Reduced::Key(OpKey::Apply(op, f, g))
            }
            OpKey::Not(f) => {
                if f.is_terminal() {
                    Reduced::Done(NodeId::terminal(f == NodeId::ZERO))
                } else {
                    Reduced::Key(self)
                }
            }
            OpKey::Ite(f, g, h) => {
                // ite(1,G,H) => G
                // ite(0,G,H) => H
                // ite(F,G,G) => G
                // ite(F,1,0) => F
                if f == NodeId::ONE {
                    return Reduced::Done(g);
                }
                if f == NodeId::ZERO || g == h {
                    return Reduced::Done(h);
                }
                if g == NodeId::ONE && h == NodeId::ZERO {
                    return Reduced::Done(f);
                }
                // ite(F,0,1) => ~F
                if g == NodeId::ZERO && h == NodeId::ONE {
                    return OpKey::Not(f).reduce();
                }
                // ite(F,1,H) == ite(F,F,H) => F ∨ H
                if g == NodeId::ONE || g == f {
                    return OpKey::Apply(Op::Or, f, h).reduce();
                }
                // ite(F,G,0) == ite(F,G,F) => F ∧ G
                if h == NodeId::ZERO || h == f {
                    return OpKey::Apply(Op::And, f, g).reduce();
                }
                Reduced::Key(self)
            }
        }
    }

    /// Variable with the minimum rank among the operands.
    fn top_var(self, storage: &Storage) -> Var {
        let rank = match self {
            OpKey::Apply(_, f, g) => storage.rank(f).min(storage.rank(g)),
            OpKey::Not(f) => storage.rank(f),
            OpKey::Ite(f, g, h) => storage.rank(f).min(storage.rank(g)).min(storage.rank(h)),
        };
        debug_assert_ne!(rank, Var::TERMINAL_RANK, "reduced key has a non-terminal operand");
        Var::new(rank)
    }

    /// The two sub-problems obtained by fixing `var` to false and true.
    fn cofactors(self, storage: &Storage, var: Var) -> (OpKey, OpKey) {
        match self {
            OpKey::Apply(op, f, g) => {
                let (f0, f1) = storage.cofactors(f, var);
                let (g0, g1) = storage.cofactors(g, var);
                (OpKey::Apply(op, f0, g0), OpKey::Apply(op, f1, g1))
            }
            OpKey::Not(f) => {
                let (f0, f1) = storage.cofactors(f, var);
                (OpKey::Not(f0), OpKey::Not(f1))
            }
            OpKey::Ite(f, g, h) => {
                let (f0, f1) = storage.cofactors(f, var);
                let (g0, g1) = storage.cofactors(g, var);
                let (h0, h1) = storage.cofactors(h, var);
                (OpKey::Ite(f0, g0, h0), OpKey::Ite(f1, g1, h1))
            }
        }
    }
}

enum Task {
    Visit(OpKey),
    Combine(OpKey, Var),
}

#[derive(Debug, Default)]
struct Variables {
    names: Vec<String>,
    by_name: HashMap<String, Var>,
}

pub struct Bdd {
    id: StoreId,
    config: BddConfig,
    storage: RefCell<Storage>,
    cache: RefCell<Cache<OpKey, NodeId>>,
    variables: RefCell<Variables>,
    roots: RefCell<HashMap<NodeId, usize>>,
    next_gc: Cell<Option<usize>>,
    collections: Cell<usize>,
}

impl Bdd {
    pub fn new() -> Self {
        Self::with_config(BddConfig::default())
    }

    pub fn with_config(config: BddConfig) -> Self {
        let id = StoreId::fresh();
        debug!("Creating {} with {:?}", id, config);
        Self {
            id,
            config,
            storage: RefCell::new(Storage::new(NUM_TERMINALS, config.initial_nodes)),
            cache: RefCell::new(Cache::with_capacity(config.cache_capacity)),
            variables: RefCell::new(Variables::default()),
            roots: RefCell::new(HashMap::new()),
            next_gc: Cell::new(config.gc_threshold),
            collections: Cell::new(0),
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new()
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        f.debug_struct("Bdd")
            .field("id", &self.id)
            .field("variables", &self.num_vars())
            .field("nodes", &storage.len())
            .field("slots", &storage.slots())
            .field("roots", &self.roots.borrow().len())
            .finish()
    }
}

// Handles and inspection.
impl Bdd {
    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn config(&self) -> &BddConfig {
        &self.config
    }

    /// Handle to a live node. Must not be called while `storage` is borrowed mutably.
    pub(crate) fn wrap(&self, node: NodeId) -> Ref {
        let generation = self.storage.borrow().generation(node.index());
        Ref::new(self.id, node, generation)
    }

    /// Validates that `f` belongs to this store and still denotes the node
    /// it was created for. A collected node is stale even after its slot
    /// has been handed to a new node.
    pub(crate) fn check(&self, f: Ref) -> Result<NodeId> {
        if f.store() != self.id {
            return Err(BddError::ForeignStore {
                expected: self.id,
                found: f.store(),
            });
        }
        let node = f.node();
        if !node.is_terminal() {
            let storage = self.storage.borrow();
            if !storage.is_occupied(node.index()) || storage.generation(node.index()) != f.generation() {
                return Err(BddError::StaleReference(node));
            }
        }
        Ok(node)
    }

    /// The internal node at `index`, which must not be a terminal.
    pub(crate) fn node(&self, index: NodeId) -> Node {
        self.storage.borrow().node(index)
    }

    pub fn zero(&self) -> Ref {
        self.wrap(NodeId::ZERO)
    }

    pub fn one(&self) -> Ref {
        self.wrap(NodeId::ONE)
    }

    /// Returns the canonical `true`/`false` leaf.
    pub fn terminal(&self, value: bool) -> Ref {
        self.wrap(NodeId::terminal(value))
    }

    pub fn is_zero(&self, f: Ref) -> bool {
        f == self.zero()
    }

    pub fn is_one(&self, f: Ref) -> bool {
        f == self.one()
    }

    pub fn is_terminal(&self, f: Ref) -> bool {
        self.is_zero(f) || self.is_one(f)
    }

    /// The variable tested at the root of `f`, or `None` for terminals.
    pub fn top_var(&self, f: Ref) -> Result<Option<Var>> {
        let index = self.check(f)?;
        if index.is_terminal() {
            Ok(None)
        } else {
            Ok(Some(self.node(index).variable))
        }
    }

    /// The `var = false` child of the root of `f` (terminals are their own children).
    pub fn low(&self, f: Ref) -> Result<Ref> {
        let index = self.check(f)?;
        if index.is_terminal() {
            return Ok(f);
        }
        Ok(self.wrap(self.node(index).low))
    }

    /// The `var = true` child of the root of `f` (terminals are their own children).
    pub fn high(&self, f: Ref) -> Result<Ref> {
        let index = self.check(f)?;
        if index.is_terminal() {
            return Ok(f);
        }
        Ok(self.wrap(self.node(index).high))
    }

    /// Number of live internal nodes in the store.
    pub fn node_count(&self) -> usize {
        self.storage.borrow().len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.borrow().stats()
    }

    /// Number of garbage collections performed so far.
    pub fn collections(&self) -> usize {
        self.collections.get()
    }
}

// Variables.
impl Bdd {
    /// Declares a new variable ranked after all previously declared ones.
    pub fn declare_variable(&self, name: impl Into<String>) -> Result<Var> {
        let name = name.into();
        let mut vars = self.variables.borrow_mut();
        if vars.by_name.contains_key(&name) {
            return Err(BddError::DuplicateVariable(name));
        }
        let var = Var::new(vars.names.len() as u32 + 1);
        debug!("declare_variable({}) -> {}", name, var);
        vars.names.push(name.clone());
        vars.by_name.insert(name, var);
        Ok(var)
    }

    /// Looks up a declared variable by name.
    pub fn var(&self, name: &str) -> Result<Var> {
        self.variables
            .borrow()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| BddError::UndeclaredVariable(name.to_string()))
    }

    pub fn var_name(&self, var: Var) -> Option<String> {
        self.variables
            .borrow()
            .names
            .get(var.id() as usize - 1)
            .cloned()
    }

    pub fn num_vars(&self) -> usize {
        self.variables.borrow().names.len()
    }

    /// All declared variables in rank order.
    pub fn variables(&self) -> Vec<Var> {
        (1..=self.num_vars() as u32).map(Var::new).collect()
    }

    /// Accepts any rank up to the number of declared variables, whichever
    /// store `var` was obtained from.
    pub(crate) fn check_var(&self, var: Var) -> Result<Var> {
        if var.id() as usize <= self.num_vars() {
            Ok(var)
        } else {
            Err(BddError::UndeclaredVariable(var.to_string()))
        }
    }
}

// Node construction.
impl Bdd {
    /// Canonical constructor of the node `if var then high else low`.
    ///
    /// Returns `low` when both children coincide, and the existing node when
    /// the triple is already in the unique table.
    pub fn make_node(&self, var: Var, low: Ref, high: Ref) -> Result<Ref> {
        debug!("make_node(v = {}, low = {}, high = {})", var, low, high);

        self.check_var(var)?;
        let low = self.check(low)?;
        let high = self.check(high)?;

        let node = {
            let mut storage = self.storage.borrow_mut();
            if var.id() >= storage.rank(low) || var.id() >= storage.rank(high) {
                return Err(BddError::InvalidOrdering { var, low, high });
            }
            storage.mk(var, low, high)
        };
        Ok(self.wrap(node))
    }

    /// The diagram of the positive literal `var`.
    pub fn mk_var(&self, var: Var) -> Result<Ref> {
        self.make_node(var, self.zero(), self.one())
    }

    pub fn mk_literal(&self, lit: Lit) -> Result<Ref> {
        if lit.is_negated() {
            self.make_node(lit.var(), self.one(), self.zero())
        } else {
            self.mk_var(lit.var())
        }
    }
}

// Boolean engine.
impl Bdd {
    /// Runs the memoized cofactor expansion of `key` to completion.
    fn compute(&self, key: OpKey) -> NodeId {
        let mut storage = self.storage.borrow_mut();
        let mut cache = self.cache.borrow_mut();

        let mut tasks = vec![Task::Visit(key)];
        let mut results: Vec<NodeId> = Vec::new();

        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(key) => {
                    let key = match key.reduce() {
                        Reduced::Done(res) => {
                            results.push(res);
                            continue;
                        }
                        Reduced::Key(key) => key,
                    };
                    if let Some(res) = cache.get(&key) {
                        debug!("cache: {:?} -> {}", key, res);
                        results.push(res);
                        continue;
                    }
                    let var = key.top_var(&storage);
                    let (key0, key1) = key.cofactors(&storage, var);
                    tasks.push(Task::Combine(key, var));
                    tasks.push(Task::Visit(key1));
                    tasks.push(Task::Visit(key0));
                }
                Task::Combine(key, var) => {
                    let high = results.pop();
                    let low = results.pop();
                    let (Some(low), Some(high)) = (low, high) else {
                        unreachable!("cofactor results missing for {:?}", key);
                    };
                    let res = storage.mk(var, low, high);
                    debug!("computed: {:?} -> {}", key, res);
                    cache.insert(key, res);
                    results.push(res);
                }
            }
        }

        assert_eq!(results.len(), 1, "unbalanced engine result stack");
        results[0]
    }

    /// Collects garbage before a top-level operation if the store has
    /// outgrown the configured threshold. `operands` survive the collection.
    fn maybe_collect(&self, operands: &[NodeId]) {
        let Some(limit) = self.next_gc.get() else {
            return;
        };
        if self.node_count() <= limit {
            return;
        }
        debug!("Store has {} nodes (limit {}), collecting", self.node_count(), limit);
        self.collect(operands.iter().copied());
        if let Some(threshold) = self.config.gc_threshold {
            self.next_gc.set(Some(threshold.max(2 * self.node_count())));
        }
    }

    /// Combines two diagrams with a binary connective.
    pub fn apply(&self, op: Op, f: Ref, g: Ref) -> Result<Ref> {
        debug!("apply({:?}, f = {}, g = {})", op, f, g);
        let f = self.check(f)?;
        let g = self.check(g)?;
        self.maybe_collect(&[f, g]);
        Ok(self.wrap(self.compute(OpKey::Apply(op, f, g))))
    }

    pub fn apply_not(&self, f: Ref) -> Result<Ref> {
        debug!("apply_not(f = {})", f);
        let f = self.check(f)?;
        self.maybe_collect(&[f]);
        Ok(self.wrap(self.compute(OpKey::Not(f))))
    }

    pub fn apply_and(&self, f: Ref, g: Ref) -> Result<Ref> {
        self.apply(Op::And, f, g)
    }

    pub fn apply_or(&self, f: Ref, g: Ref) -> Result<Ref> {
        self.apply(Op::Or, f, g)
    }

    pub fn apply_xor(&self, f: Ref, g: Ref) -> Result<Ref> {
        self.apply(Op::Xor, f, g)
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(f, g, h) = (f ∧ g) ∨ (¬f ∧ h)
    /// ```
    ///
    /// # Examples
    ///
    /// ```
    /// use bdd_decide::bdd::Bdd;
    ///
    /// let bdd = Bdd::default();
    /// let x = bdd.declare_variable("x").and_then(|v| bdd.mk_var(v)).unwrap();
    /// let y = bdd.declare_variable("y").and_then(|v| bdd.mk_var(v)).unwrap();
    /// let z = bdd.declare_variable("z").and_then(|v| bdd.mk_var(v)).unwrap();
    /// let f = bdd.apply_ite(x, y, z).unwrap();
    ///
    /// let x_and_y = bdd.apply_and(x, y).unwrap();
    /// let not_x = bdd.apply_not(x).unwrap();
    /// let not_x_and_z = bdd.apply_and(not_x, z).unwrap();
    /// assert_eq!(f, bdd.apply_or(x_and_y, not_x_and_z).unwrap());
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref> {
        debug!("apply_ite(f = {}, g = {}, h = {})", f, g, h);
        let f = self.check(f)?;
        let g = self.check(g)?;
        let h = self.check(h)?;
        self.maybe_collect(&[f, g, h]);
        Ok(self.wrap(self.compute(OpKey::Ite(f, g, h))))
    }

    /// `f → g`
    pub fn apply_imply(&self, f: Ref, g: Ref) -> Result<Ref> {
        self.apply_ite(f, g, self.one())
    }

    /// `f ↔ g`
    pub fn apply_eq(&self, f: Ref, g: Ref) -> Result<Ref> {
        let not_g = self.apply_not(g)?;
        self.apply_ite(f, g, not_g)
    }

    /// Left fold of `op` over `nodes`, starting from `init`.
    fn fold(&self, op: Op, init: NodeId, nodes: impl IntoIterator<Item = Ref>) -> Result<Ref> {
        let nodes = nodes
            .into_iter()
            .map(|f| self.check(f))
            .collect::<Result<Vec<_>>>()?;
        self.maybe_collect(&nodes);

        let mut res = init;
        for node in nodes {
            res = self.compute(OpKey::Apply(op, res, node));
        }
        Ok(self.wrap(res))
    }

    /// Conjunction of all `diagrams` (`true` for none).
    pub fn conjoin_all(&self, diagrams: impl IntoIterator<Item = Ref>) -> Result<Ref> {
        debug!("conjoin_all(...)");
        self.fold(Op::And, NodeId::ONE, diagrams)
    }

    /// Disjunction of all `diagrams` (`false` for none).
    pub fn apply_or_all(&self, diagrams: impl IntoIterator<Item = Ref>) -> Result<Ref> {
        debug!("apply_or_all(...)");
        self.fold(Op::Or, NodeId::ZERO, diagrams)
    }

    fn literal_diagrams(&self, literals: impl IntoIterator<Item = Lit>) -> Result<Vec<Ref>> {
        literals.into_iter().map(|lit| self.mk_literal(lit)).collect()
    }

    /// Disjunction of `literals`, e.g. one CNF clause.
    pub fn build_clause(&self, literals: impl IntoIterator<Item = Lit>) -> Result<Ref> {
        let literals = self.literal_diagrams(literals)?;
        debug!("build_clause({} literals)", literals.len());
        self.apply_or_all(literals)
    }

    /// Conjunction of `literals`.
    pub fn build_cube(&self, literals: impl IntoIterator<Item = Lit>) -> Result<Ref> {
        let literals = self.literal_diagrams(literals)?;
        debug!("build_cube({} literals)", literals.len());
        self.conjoin_all(literals)
    }

    /// Nodes reachable from `root` in post-order (children first), each
    /// exactly once. Terminals are skipped, and the children of nodes whose
    /// variable satisfies `stop` are not visited.
    pub(crate) fn post_order(&self, root: NodeId, stop: impl Fn(Var) -> bool) -> Vec<NodeId> {
        let storage = self.storage.borrow();
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(root, false)];

        while let Some((index, expanded)) = stack.pop() {
            if index.is_terminal() {
                continue;
            }
            if expanded {
                order.push(index);
                continue;
            }
            if !visited.insert(index) {
                continue;
            }
            stack.push((index, true));
            let node = storage.node(index);
            if !stop(node.variable) {
                stack.push((node.high, false));
                stack.push((node.low, false));
            }
        }

        order
    }

    /// The cofactor `f|var<-value`.
    pub fn restrict(&self, f: Ref, var: Var, value: bool) -> Result<Ref> {
        debug!("restrict(f = {}, {} <- {})", f, var, value);
        let root = self.check(f)?;
        self.check_var(var)?;

        let order = self.post_order(root, |v| v >= var);
        let mut results: HashMap<NodeId, NodeId> = HashMap::with_capacity(order.len());
        let get = |results: &HashMap<NodeId, NodeId>, index: NodeId| {
            results.get(&index).copied().unwrap_or(index)
        };

        let mut storage = self.storage.borrow_mut();
        for index in order {
            let node = storage.node(index);
            let res = if node.variable > var {
                index
            } else if node.variable == var {
                if value {
                    node.high
                } else {
                    node.low
                }
            } else {
                let low = get(&results, node.low);
                let high = get(&results, node.high);
                storage.mk(node.variable, low, high)
            };
            results.insert(index, res);
        }
        drop(storage);

        Ok(self.wrap(get(&results, root)))
    }

    /// Existential projection `∃vars. f`.
    pub fn exists(&self, f: Ref, vars: impl IntoIterator<Item = Var>) -> Result<Ref> {
        let root = self.check(f)?;
        let vars = vars
            .into_iter()
            .map(|v| self.check_var(v))
            .collect::<Result<HashSet<_>>>()?;
        debug!("exists(f = {}, {} vars)", f, vars.len());
        let Some(&last) = vars.iter().max() else {
            return Ok(f);
        };
        self.maybe_collect(&[root]);

        let order = self.post_order(root, |v| v > last);
        let mut results: HashMap<NodeId, NodeId> = HashMap::with_capacity(order.len());
        let get = |results: &HashMap<NodeId, NodeId>, index: NodeId| {
            results.get(&index).copied().unwrap_or(index)
        };

        for index in order {
            let node = self.node(index);
            let res = if node.variable > last {
                index
            } else {
                let low = get(&results, node.low);
                let high = get(&results, node.high);
                if vars.contains(&node.variable) {
                    self.compute(OpKey::Apply(Op::Or, low, high))
                } else {
                    self.storage.borrow_mut().mk(node.variable, low, high)
                }
            };
            results.insert(index, res);
        }

        Ok(self.wrap(get(&results, root)))
    }
}

// Roots and garbage collection.
impl Bdd {
    /// Registers `f` as an external root. Roots are reference-counted.
    pub fn retain(&self, f: Ref) -> Result<()> {
        let index = self.check(f)?;
        if !index.is_terminal() {
            *self.roots.borrow_mut().entry(index).or_insert(0) += 1;
        }
        Ok(())
    }

    /// Drops one registration of `f`. Returns whether `f` was registered.
    ///
    /// A registered node is never collected, so a stale `f` is an error
    /// rather than a miss.
    pub fn release(&self, f: Ref) -> Result<bool> {
        let index = self.check(f)?;
        let mut roots = self.roots.borrow_mut();
        match roots.get_mut(&index) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(true)
            }
            Some(_) => {
                roots.remove(&index);
                Ok(true)
            }
            None => Ok(index.is_terminal()),
        }
    }

    /// Reclaims every node unreachable from the registered roots and
    /// `extra_roots`. Returns the number of reclaimed nodes.
    ///
    /// All memoized results are dropped first.
    pub fn collect_garbage(&self, extra_roots: &[Ref]) -> Result<usize> {
        let extra = extra_roots
            .iter()
            .map(|&f| self.check(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.collect(extra))
    }

    fn collect(&self, extra_roots: impl IntoIterator<Item = NodeId>) -> usize {
        debug!("Collecting garbage...");

        let mut alive: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = self.roots.borrow().keys().copied().collect();
        stack.extend(extra_roots);

        self.cache.borrow_mut().clear();

        let mut storage = self.storage.borrow_mut();
        while let Some(index) = stack.pop() {
            if index.is_terminal() || !alive.insert(index) {
                continue;
            }
            let node = storage.node(index);
            stack.push(node.low);
            stack.push(node.high);
        }

        let dead: Vec<usize> = storage
            .indices()
            .filter(|&i| !alive.contains(&NodeId::new(i as u32)))
            .collect();
        for &index in &dead {
            storage.remove(index);
        }

        self.collections.set(self.collections.get() + 1);
        debug!(
            "Garbage collection #{}: {} alive, {} reclaimed",
            self.collections.get(),
            alive.len(),
            dead.len()
        );
        dead.len()
    }

    /// Number of distinct nodes in `f`, terminals included.
    pub fn size(&self, f: Ref) -> Result<usize> {
        let root = self.check(f)?;
        let internal = self.post_order(root, |_| false);
        let terminals = if root.is_terminal() {
            1
        } else {
            let storage = self.storage.borrow();
            let mut seen = HashSet::new();
            for &index in &internal {
                let node = storage.node(index);
                for child in [node.low, node.high] {
                    if child.is_terminal() {
                        seen.insert(child);
                    }
                }
            }
            seen.len()
        };
        Ok(internal.len() + terminals)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn setup(n: usize) -> (Bdd, Vec<Ref>) {
        let bdd = Bdd::default();
        let vars = (1..=n)
            .map(|i| {
                let v = bdd.declare_variable(format!("x{}", i)).unwrap();
                bdd.mk_var(v).unwrap()
            })
            .collect();
        (bdd, vars)
    }

    #[test]
    fn test_var() {
        let (bdd, xs) = setup(1);
        let x = xs[0];

        assert_eq!(bdd.top_var(x).unwrap(), Some(Var::new(1)));
        assert_eq!(bdd.high(x).unwrap(), bdd.one());
        assert_eq!(bdd.low(x).unwrap(), bdd.zero());
    }

    #[test]
    fn test_terminal() {
        let bdd = Bdd::default();

        assert!(bdd.is_terminal(bdd.zero()));
        assert!(bdd.is_zero(bdd.zero()));
        assert!(!bdd.is_one(bdd.zero()));
        assert!(bdd.is_one(bdd.terminal(true)));
        assert_eq!(bdd.top_var(bdd.one()).unwrap(), None);
        assert_eq!(bdd.low(bdd.one()).unwrap(), bdd.one());
    }

    #[test]
    fn test_duplicate_variable() {
        let bdd = Bdd::default();
        bdd.declare_variable("a").unwrap();
        assert_eq!(
            bdd.declare_variable("a"),
            Err(BddError::DuplicateVariable("a".to_string()))
        );
        assert_eq!(bdd.num_vars(), 1);
    }

    #[test]
    fn test_lookup_by_name() {
        let bdd = Bdd::default();
        let a = bdd.declare_variable("a").unwrap();
        let b = bdd.declare_variable("b").unwrap();
        assert!(a < b);
        assert_eq!(bdd.var("b").unwrap(), b);
        assert_eq!(bdd.var_name(a).as_deref(), Some("a"));
        assert_eq!(
            bdd.var("c"),
            Err(BddError::UndeclaredVariable("c".to_string()))
        );
    }

    #[test]
    fn test_make_node_redundant() {
        let (bdd, xs) = setup(2);
        let x2 = xs[1];
        assert_eq!(bdd.make_node(Var::new(1), x2, x2).unwrap(), x2);
    }

    #[test]
    fn test_make_node_hash_consing() {
        let (bdd, xs) = setup(2);
        let x2 = xs[1];
        let before = bdd.node_count();
        let a = bdd.make_node(Var::new(1), bdd.zero(), x2).unwrap();
        let b = bdd.make_node(Var::new(1), bdd.zero(), x2).unwrap();
        assert_eq!(a, b);
        assert_eq!(bdd.node_count(), before + 1);
        assert_eq!(a, bdd.apply_and(xs[0], x2).unwrap());
    }

    #[test]
    fn test_make_node_invalid_ordering() {
        let (bdd, xs) = setup(2);
        let x1 = xs[0];
        let before = bdd.node_count();
        let err = bdd.make_node(Var::new(2), x1, bdd.one()).unwrap_err();
        assert!(matches!(err, BddError::InvalidOrdering { .. }));
        let err = bdd.make_node(Var::new(1), x1, bdd.one()).unwrap_err();
        assert!(matches!(err, BddError::InvalidOrdering { .. }));
        assert_eq!(bdd.node_count(), before);
    }

    #[test]
    fn test_make_node_undeclared() {
        let bdd = Bdd::default();
        assert_eq!(
            bdd.mk_var(Var::new(1)),
            Err(BddError::UndeclaredVariable("x1".to_string()))
        );
    }

    #[test]
    fn test_foreign_store() {
        let (a, xs) = setup(1);
        let (b, ys) = setup(1);
        let err = a.apply_and(xs[0], ys[0]).unwrap_err();
        assert_eq!(
            err,
            BddError::ForeignStore {
                expected: a.id(),
                found: b.id()
            }
        );
    }

    #[test]
    fn test_not() {
        let (bdd, xs) = setup(2);
        let f = bdd.apply_and(xs[0], xs[1]).unwrap();
        let not_f = bdd.apply_not(f).unwrap();
        assert_ne!(f, not_f);
        assert_eq!(bdd.apply_not(not_f).unwrap(), f);
        assert_eq!(bdd.apply_not(bdd.one()).unwrap(), bdd.zero());
    }

    #[test]
    fn test_de_morgan_and() {
        let (bdd, xs) = setup(2);
        let (x, y) = (xs[0], xs[1]);

        let f = bdd.apply_not(bdd.apply_and(x, y).unwrap()).unwrap();
        let g = bdd
            .apply_or(bdd.apply_not(x).unwrap(), bdd.apply_not(y).unwrap())
            .unwrap();
        assert_eq!(f, g);
    }

    #[test]
    fn test_xor_itself_and_contrary() {
        let (bdd, xs) = setup(2);
        let f = bdd.apply_and(xs[0], xs[1]).unwrap();
        let not_f = bdd.apply_not(f).unwrap();

        assert_eq!(bdd.apply_xor(f, f).unwrap(), bdd.zero());
        assert_eq!(bdd.apply_xor(f, not_f).unwrap(), bdd.one());
        assert_eq!(bdd.apply_xor(bdd.one(), f).unwrap(), not_f);
    }

    #[test]
    fn test_apply_ite() {
        let (bdd, xs) = setup(4);
        let (f, g, h) = (xs[3], xs[1], xs[2]);

        assert_eq!(bdd.apply_ite(bdd.one(), g, h).unwrap(), g);
        assert_eq!(bdd.apply_ite(bdd.zero(), g, h).unwrap(), h);
        assert_eq!(bdd.apply_ite(f, g, g).unwrap(), g);
        assert_eq!(bdd.apply_ite(f, bdd.one(), bdd.zero()).unwrap(), f);
        assert_eq!(
            bdd.apply_ite(f, bdd.zero(), bdd.one()).unwrap(),
            bdd.apply_not(f).unwrap()
        );
        assert_eq!(bdd.apply_ite(f, f, h).unwrap(), bdd.apply_or(f, h).unwrap());
        assert_eq!(bdd.apply_ite(f, g, f).unwrap(), bdd.apply_and(f, g).unwrap());

        // General case: the root variable decides between g and h.
        let res = bdd.apply_ite(xs[0], g, h).unwrap();
        assert_eq!(res, bdd.make_node(Var::new(1), h, g).unwrap());
    }

    #[test]
    fn test_clause_and_cube() {
        let (bdd, xs) = setup(3);

        let f = bdd
            .apply_or(bdd.apply_or(xs[0], bdd.apply_not(xs[1]).unwrap()).unwrap(), xs[2])
            .unwrap();
        let clause = bdd
            .build_clause([1, -2, 3].map(Lit::from_dimacs))
            .unwrap();
        assert_eq!(f, clause);

        let g = bdd.conjoin_all([xs[0], xs[1], xs[2]]).unwrap();
        let cube = bdd.build_cube([3, 1, 2].map(Lit::from_dimacs)).unwrap();
        assert_eq!(g, cube);

        assert_eq!(bdd.build_clause(Vec::<Lit>::new()).unwrap(), bdd.zero());
        assert_eq!(bdd.conjoin_all(Vec::<Ref>::new()).unwrap(), bdd.one());
    }

    #[test]
    fn test_clause_undeclared_literal() {
        let (bdd, _) = setup(2);
        let err = bdd.build_clause([1, -5].map(Lit::from_dimacs)).unwrap_err();
        assert_eq!(err, BddError::UndeclaredVariable("x5".to_string()));
    }

    #[test]
    fn test_restrict() {
        let (bdd, xs) = setup(3);
        let (x1, x2, x3) = (xs[0], xs[1], xs[2]);

        let f = bdd.apply_or(bdd.apply_eq(x1, x2).unwrap(), x3).unwrap();
        let f_x2_zero = bdd.restrict(f, Var::new(2), false).unwrap();
        let g = bdd.apply_or(bdd.apply_not(x1).unwrap(), x3).unwrap();
        assert_eq!(f_x2_zero, g);

        assert_eq!(bdd.restrict(x1, Var::new(1), true).unwrap(), bdd.one());
        assert_eq!(bdd.restrict(x2, Var::new(1), true).unwrap(), x2);
    }

    #[test]
    fn test_exists() {
        let (bdd, xs) = setup(3);
        let (x1, x2, x3) = (xs[0], xs[1], xs[2]);

        let f = bdd.conjoin_all([x1, x2, x3]).unwrap();
        let g = bdd.exists(f, [Var::new(2)]).unwrap();
        assert_eq!(g, bdd.apply_and(x1, x3).unwrap());

        let h = bdd.exists(f, bdd.variables()).unwrap();
        assert_eq!(h, bdd.one());

        let xor = bdd.apply_xor(x1, x3).unwrap();
        assert_eq!(bdd.exists(xor, [Var::new(3)]).unwrap(), bdd.one());
        assert_eq!(bdd.exists(xor, Vec::<Var>::new()).unwrap(), xor);
    }

    #[test]
    fn test_deep_chain_does_not_overflow_stack() {
        let n = 20_000;
        let (bdd, xs) = setup(n);
        let f = bdd.conjoin_all(xs.iter().rev().copied()).unwrap();
        let g = bdd.apply_or_all(xs.iter().rev().copied()).unwrap();
        let h = bdd.apply_and(f, g).unwrap();
        assert_eq!(h, f);
        assert_eq!(bdd.size(f).unwrap(), n + 2);
    }

    #[test]
    fn test_collect_garbage() {
        let (bdd, xs) = setup(3);
        let f = bdd.apply_and(xs[0], xs[1]).unwrap();
        let g = bdd.apply_or(xs[1], xs[2]).unwrap();
        let nodes = bdd.node_count();

        bdd.retain(f).unwrap();
        let reclaimed = bdd.collect_garbage(&[]).unwrap();
        assert!(reclaimed > 0);
        assert!(bdd.node_count() < nodes);
        assert_eq!(bdd.top_var(f).unwrap(), Some(Var::new(1)));
        assert_eq!(bdd.top_var(g), Err(BddError::StaleReference(g.node())));

        // Rebuilding yields a canonical node again.
        let g2 = bdd
            .apply_or(bdd.mk_var(Var::new(2)).unwrap(), bdd.mk_var(Var::new(3)).unwrap())
            .unwrap();
        assert_ne!(g2, g);
        assert_eq!(bdd.top_var(g2).unwrap(), Some(Var::new(2)));
        assert!(bdd.is_one(bdd.high(g2).unwrap()));
        assert_eq!(bdd.low(g2).unwrap(), bdd.mk_var(Var::new(3)).unwrap());
        assert_eq!(bdd.model_count_all(g2).unwrap(), num_bigint::BigUint::from(6u32));
        assert_eq!(bdd.apply_or(xs[1], bdd.mk_var(Var::new(3)).unwrap()).unwrap(), g2);
        assert_eq!(bdd.top_var(g), Err(BddError::StaleReference(g.node())));

        assert!(bdd.release(f).unwrap());
        assert!(!bdd.release(f).unwrap());
        bdd.collect_garbage(&[]).unwrap();
        assert_eq!(bdd.node_count(), 0);
    }

    #[test]
    fn test_variables_are_ranks_shared_across_stores() {
        let small = Bdd::default();
        let large = Bdd::default();
        let x = small.declare_variable("x").unwrap();
        large.declare_variable("a").unwrap();
        let b = large.declare_variable("b").unwrap();

        // Rank 1 is declared in both stores.
        let f = large.mk_var(x).unwrap();
        assert_eq!(large.top_var(f).unwrap(), Some(Var::new(1)));
        assert_eq!(large.var_name(x).as_deref(), Some("a"));

        // Rank 2 is not declared in `small`.
        assert_eq!(small.mk_var(b), Err(BddError::UndeclaredVariable(b.to_string())));
        assert_eq!(
            small.restrict(small.one(), b, true),
            Err(BddError::UndeclaredVariable(b.to_string()))
        );
    }

    #[test]
    fn test_handle_to_reused_slot_is_stale() {
        let (bdd, xs) = setup(3);
        let g = bdd.apply_or(xs[1], xs[2]).unwrap();
        assert_eq!(bdd.collect_garbage(&xs).unwrap(), 1);

        // The only free slot goes to the next new node.
        let h = bdd.apply_and(xs[0], xs[1]).unwrap();
        assert_eq!(h.node(), g.node());
        assert_ne!(h, g);
        assert_eq!(bdd.top_var(h).unwrap(), Some(Var::new(1)));

        let stale = BddError::StaleReference(g.node());
        assert_eq!(bdd.top_var(g), Err(stale.clone()));
        assert_eq!(bdd.low(g), Err(stale.clone()));
        assert_eq!(bdd.apply_not(g), Err(stale.clone()));
        assert_eq!(bdd.retain(g), Err(stale.clone()));
        assert_eq!(bdd.release(g), Err(stale));
    }

    #[test]
    fn test_automatic_collection_invalidates_unretained_handles() {
        let bdd = Bdd::with_config(BddConfig::default().with_gc_threshold(1));
        let a = bdd.declare_variable("a").unwrap();
        let b = bdd.declare_variable("b").unwrap();
        let c = bdd.declare_variable("c").unwrap();

        let fa = bdd.mk_var(a).unwrap();
        let fb = bdd.mk_var(b).unwrap();
        // Collects `fa`: only the operand survives.
        let not_b = bdd.apply_not(fb).unwrap();
        assert!(bdd.collections() > 0);
        let fc = bdd.mk_var(c).unwrap();

        assert_eq!(bdd.top_var(fa), Err(BddError::StaleReference(fa.node())));
        assert_eq!(bdd.top_var(fc).unwrap(), Some(c));
        assert_eq!(bdd.top_var(not_b).unwrap(), Some(b));
    }

    #[test]
    fn test_automatic_collection_keeps_operands() {
        let bdd = Bdd::with_config(BddConfig::default().with_gc_threshold(8));
        let vars: Vec<Ref> = (0..12)
            .map(|i| {
                let v = bdd.declare_variable(format!("v{}", i)).unwrap();
                bdd.mk_var(v).unwrap()
            })
            .collect();
        bdd.retain(vars[0]).unwrap();

        // Literals are rebuilt on demand: collections may reclaim them.
        let mut f = bdd.one();
        for i in (1..=12).rev() {
            let lit = bdd.mk_var(Var::new(i)).unwrap();
            f = bdd.apply_and(f, lit).unwrap();
        }
        assert!(bdd.collections() > 0);
        assert_eq!(bdd.size(f).unwrap(), 12 + 2);
        assert_eq!(bdd.top_var(vars[0]).unwrap(), Some(Var::new(1)));
    }
}
