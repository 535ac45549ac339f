//! Encoders turning constraint problems into a single diagram.
//!
//! Supported problem shapes:
//!
//! - [`Cnf`]: a clause list over variables `x_1..x_n` (DIMACS numbering),
//! - [`Graph`] k-coloring: one variable `x_{v}_{c}` per vertex and color,
//!   constrained so that every vertex has exactly one color and adjacent
//!   vertices never share one,
//! - [`Graph`] adjacency: the edge relation over binary vertex numbers,
//!   see [`encode_edge_relation`].

use log::debug;
use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::error::Result;
use crate::reference::Ref;
use crate::types::{Lit, Var};

/// Clause (or cube) diagrams held as roots until they are combined, so that
/// an automatic collection between two of them does not reclaim them.
struct ClauseSet<'a> {
    bdd: &'a Bdd,
    clauses: Vec<Ref>,
}

impl<'a> ClauseSet<'a> {
    fn new(bdd: &'a Bdd) -> Self {
        Self {
            bdd,
            clauses: Vec::new(),
        }
    }

    fn push(&mut self, literals: impl IntoIterator<Item = Lit>) -> Result<()> {
        let clause = self.bdd.build_clause(literals)?;
        self.hold(clause)
    }

    fn push_cube(&mut self, literals: impl IntoIterator<Item = Lit>) -> Result<()> {
        let cube = self.bdd.build_cube(literals)?;
        self.hold(cube)
    }

    fn hold(&mut self, f: Ref) -> Result<()> {
        self.bdd.retain(f)?;
        self.clauses.push(f);
        Ok(())
    }

    fn conjoin(&self) -> Result<Ref> {
        self.bdd.conjoin_all(self.clauses.iter().copied())
    }

    fn disjoin(&self) -> Result<Ref> {
        self.bdd.apply_or_all(self.clauses.iter().copied())
    }
}

impl Drop for ClauseSet<'_> {
    fn drop(&mut self) {
        for &clause in &self.clauses {
            let _ = self.bdd.release(clause);
        }
    }
}

/// A CNF formula with DIMACS-numbered variables `1..=num_vars`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cnf {
    pub num_vars: usize,
    pub clauses: Vec<Vec<i32>>,
    /// Optional decision order over DIMACS variable numbers.
    pub order: Option<Vec<u32>>,
}

/// Name under which DIMACS variable `id` is declared.
pub fn cnf_var_name(id: u32) -> String {
    format!("x_{}", id)
}

impl Cnf {
    pub fn new(num_vars: usize) -> Self {
        Self {
            num_vars,
            ..Default::default()
        }
    }

    pub fn add_clause(&mut self, clause: impl IntoIterator<Item = i32>) {
        self.clauses.push(clause.into_iter().collect());
    }

    /// Declares `x_1..x_n` in order.
    pub fn declare(&self, bdd: &Bdd) -> Result<Vec<Var>> {
        (1..=self.num_vars as u32)
            .map(|id| bdd.declare_variable(cnf_var_name(id)))
            .collect()
    }

    fn literal(bdd: &Bdd, lit: i32) -> Result<Lit> {
        let var = bdd.var(&cnf_var_name(lit.unsigned_abs()))?;
        Ok(Lit::new(var, lit < 0))
    }

    /// Builds the conjunction of all clauses over already declared variables.
    pub fn build(&self, bdd: &Bdd) -> Result<Ref> {
        debug!(
            "Encoding CNF with {} variables and {} clauses",
            self.num_vars,
            self.clauses.len()
        );
        let mut clauses = ClauseSet::new(bdd);
        for clause in &self.clauses {
            let literals = clause
                .iter()
                .map(|&lit| Self::literal(bdd, lit))
                .collect::<Result<Vec<_>>>()?;
            clauses.push(literals)?;
        }
        clauses.conjoin()
    }

    /// Declares the variables and builds the formula.
    pub fn encode(&self, bdd: &Bdd) -> Result<Ref> {
        self.declare(bdd)?;
        self.build(bdd)
    }

    /// The decision order as declared variables, or all variables in
    /// numbering order if the formula carries none.
    pub fn decision_order(&self, bdd: &Bdd) -> Result<Vec<Var>> {
        match &self.order {
            Some(order) => order.iter().map(|&id| bdd.var(&cnf_var_name(id))).collect(),
            None => (1..=self.num_vars as u32)
                .map(|id| bdd.var(&cnf_var_name(id)))
                .collect(),
        }
    }
}

/// An undirected graph over vertices `0..vertices`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    adjacency: Vec<Vec<usize>>,
}

/// Name under which the "vertex has color" variable is declared.
pub fn coloring_var_name(vertex: usize, color: usize) -> String {
    format!("x_{}_{}", vertex, color)
}

/// Name of bit `bit` of the source (`x_{bit}`) or target (`x_{bit}_prime`)
/// vertex in the edge relation.
pub fn edge_var_name(bit: usize, target: bool) -> String {
    if target {
        format!("x_{}_prime", bit)
    } else {
        format!("x_{}", bit)
    }
}

impl Graph {
    pub fn new(vertices: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); vertices],
        }
    }

    pub fn vertices(&self) -> usize {
        self.adjacency.len()
    }

    /// Adds the undirected edge `{u, v}`. Repeated edges are ignored.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is out of range.
    pub fn add_edge(&mut self, u: usize, v: usize) {
        assert!(
            u < self.vertices() && v < self.vertices(),
            "edge ({}, {}) is out of range for {} vertices",
            u,
            v,
            self.vertices()
        );
        if !self.adjacency[u].contains(&v) {
            self.adjacency[u].push(v);
            if u != v {
                self.adjacency[v].push(u);
            }
        }
    }

    pub fn neighbors(&self, v: usize) -> &[usize] {
        &self.adjacency[v]
    }

    /// Each edge once, as `(u, v)` with `u <= v`.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.adjacency
            .iter()
            .enumerate()
            .flat_map(|(u, ns)| ns.iter().filter(move |&&v| u <= v).map(move |&v| (u, v)))
    }

    /// First-fit coloring in vertex order: each vertex takes the smallest
    /// color unused by its already colored neighbors.
    pub fn greedy_coloring(&self) -> Vec<usize> {
        let mut colors: Vec<Option<usize>> = vec![None; self.vertices()];
        let mut taken = vec![false; self.vertices() + 1];

        for u in 0..self.vertices() {
            for &n in &self.adjacency[u] {
                if let Some(c) = colors[n] {
                    taken[c] = true;
                }
            }
            let color = taken.iter().position(|&t| !t).unwrap_or(self.vertices());
            colors[u] = Some(color);
            for &n in &self.adjacency[u] {
                if let Some(c) = colors[n] {
                    taken[c] = false;
                }
            }
        }

        colors.into_iter().map(|c| c.unwrap_or(0)).collect()
    }

    /// Number of bits needed to write every vertex number in binary.
    pub fn vertex_bits(&self) -> usize {
        let max = self.vertices().saturating_sub(1);
        (usize::BITS - max.leading_zeros()) as usize
    }

    /// Upper bound on the chromatic number from [`Graph::greedy_coloring`].
    pub fn color_bound(&self) -> usize {
        self.greedy_coloring().into_iter().max().map_or(0, |c| c + 1)
    }

    /// Counts proper `k`-colorings by exhaustive backtracking.
    ///
    /// Exponential; meant as a reference for small graphs.
    pub fn count_colorings_bruteforce(&self, k: usize) -> BigUint {
        fn go(graph: &Graph, k: usize, vertex: usize, colors: &mut Vec<usize>) -> BigUint {
            if vertex == graph.vertices() {
                return BigUint::from(1u32);
            }
            let mut count = BigUint::ZERO;
            for color in 0..k {
                let safe = graph.adjacency[vertex]
                    .iter()
                    .all(|&n| n >= vertex || colors[n] != color)
                    && !graph.adjacency[vertex].contains(&vertex);
                if safe {
                    colors.push(color);
                    count += go(graph, k, vertex + 1, colors);
                    colors.pop();
                }
            }
            count
        }

        go(self, k, 0, &mut Vec::with_capacity(self.vertices()))
    }
}

/// Encodes "`graph` is properly colored with `colors` colors".
///
/// Variables are declared color-major: all vertices of color 0, then all
/// vertices of color 1, and so on.
pub fn encode_coloring(bdd: &Bdd, graph: &Graph, colors: usize) -> Result<Ref> {
    debug!(
        "Encoding {}-coloring of a graph with {} vertices",
        colors,
        graph.vertices()
    );

    let mut vars = vec![Vec::with_capacity(colors); graph.vertices()];
    for c in 0..colors {
        for (v, row) in vars.iter_mut().enumerate() {
            row.push(bdd.declare_variable(coloring_var_name(v, c))?);
        }
    }

    let mut clauses = ClauseSet::new(bdd);
    for row in &vars {
        // At least one color.
        clauses.push(row.iter().map(|v| v.pos()))?;
        // At most one color.
        for (i, &a) in row.iter().enumerate() {
            for &b in &row[i + 1..] {
                clauses.push([a.neg(), b.neg()])?;
            }
        }
    }
    for (u, v) in graph.edges() {
        for c in 0..colors {
            clauses.push([vars[u][c].neg(), vars[v][c].neg()])?;
        }
    }

    clauses.conjoin()
}

/// Literals spelling `vertex` in binary over `bits`, most significant first.
fn vertex_literals(bits: &[Var], vertex: usize) -> impl Iterator<Item = Lit> + '_ {
    let width = bits.len();
    bits.iter()
        .enumerate()
        .map(move |(i, &var)| Lit::new(var, (vertex >> (width - 1 - i)) & 1 == 0))
}

/// Encodes the adjacency relation of `graph`.
///
/// The source vertex is written in binary over `x_0..x_{b-1}` and the target
/// over `x_0_prime..x_{b-1}_prime`, with `b` = [`Graph::vertex_bits`] and
/// bit 0 the most significant. Source and target bits are declared
/// interleaved. Every edge is a model in both orientations, a self-loop
/// once, so the models are exactly the ordered pairs of adjacent vertices.
pub fn encode_edge_relation(bdd: &Bdd, graph: &Graph) -> Result<Ref> {
    let bits = graph.vertex_bits();
    debug!(
        "Encoding edge relation of a graph with {} vertices over {} bits",
        graph.vertices(),
        bits
    );

    let mut source = Vec::with_capacity(bits);
    let mut target = Vec::with_capacity(bits);
    for i in 0..bits {
        source.push(bdd.declare_variable(edge_var_name(i, false))?);
        target.push(bdd.declare_variable(edge_var_name(i, true))?);
    }

    let mut cubes = ClauseSet::new(bdd);
    for u in 0..graph.vertices() {
        for &v in graph.neighbors(u) {
            cubes.push_cube(vertex_literals(&source, u).chain(vertex_literals(&target, v)))?;
        }
    }

    cubes.disjoin()
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn triangle() -> Graph {
        let mut g = Graph::new(3);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(0, 2);
        g
    }

    #[test]
    fn test_cnf_encode() {
        let bdd = Bdd::default();
        let mut cnf = Cnf::new(3);
        cnf.add_clause([1, 2]);
        cnf.add_clause([-1, 3]);

        let f = cnf.encode(&bdd).unwrap();
        assert_eq!(bdd.model_count_all(f).unwrap(), BigUint::from(4u32));
        assert_eq!(bdd.var_name(Var::new(2)).as_deref(), Some("x_2"));
    }

    #[test]
    fn test_cnf_decision_order() {
        let bdd = Bdd::default();
        let mut cnf = Cnf::new(3);
        cnf.declare(&bdd).unwrap();
        assert_eq!(cnf.decision_order(&bdd).unwrap(), bdd.variables());

        cnf.order = Some(vec![3, 1]);
        assert_eq!(
            cnf.decision_order(&bdd).unwrap(),
            vec![Var::new(3), Var::new(1)]
        );
    }

    #[test]
    fn test_cnf_out_of_range_literal() {
        let bdd = Bdd::default();
        let mut cnf = Cnf::new(2);
        cnf.add_clause([1, 3]);
        assert!(cnf.encode(&bdd).is_err());
    }

    #[test]
    fn test_edges_listed_once() {
        let mut g = triangle();
        g.add_edge(1, 0);
        let edges: Vec<_> = g.edges().collect();
        assert_eq!(edges, vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_greedy_coloring() {
        let g = triangle();
        assert_eq!(g.greedy_coloring(), vec![0, 1, 2]);
        assert_eq!(g.color_bound(), 3);

        // A path is 2-colorable and first-fit finds it.
        let mut path = Graph::new(4);
        path.add_edge(0, 1);
        path.add_edge(1, 2);
        path.add_edge(2, 3);
        assert_eq!(path.greedy_coloring(), vec![0, 1, 0, 1]);
        assert_eq!(path.color_bound(), 2);

        assert_eq!(Graph::new(0).color_bound(), 0);
        assert_eq!(Graph::new(3).color_bound(), 1);
    }

    #[test]
    fn test_bruteforce_counts() {
        let g = triangle();
        assert_eq!(g.count_colorings_bruteforce(3), BigUint::from(6u32));
        assert_eq!(g.count_colorings_bruteforce(2), BigUint::ZERO);
        assert_eq!(g.count_colorings_bruteforce(4), BigUint::from(24u32));
    }

    #[test]
    fn test_encode_triangle() {
        let bdd = Bdd::default();
        let f = encode_coloring(&bdd, &triangle(), 3).unwrap();
        assert_eq!(bdd.num_vars(), 9);
        assert_eq!(bdd.model_count_all(f).unwrap(), BigUint::from(6u32));
        // Color-major declaration order.
        assert_eq!(bdd.var(&coloring_var_name(2, 0)).unwrap(), Var::new(3));
        assert_eq!(bdd.var(&coloring_var_name(0, 1)).unwrap(), Var::new(4));
    }

    #[test]
    fn test_encode_under_automatic_collection() {
        use crate::config::BddConfig;

        let bdd = Bdd::with_config(BddConfig::default().with_gc_threshold(16));
        let f = encode_coloring(&bdd, &triangle(), 3).unwrap();
        assert!(bdd.collections() > 0);
        assert_eq!(bdd.model_count_all(f).unwrap(), BigUint::from(6u32));
    }

    #[test]
    fn test_vertex_bits() {
        assert_eq!(Graph::new(0).vertex_bits(), 0);
        assert_eq!(Graph::new(1).vertex_bits(), 0);
        assert_eq!(Graph::new(2).vertex_bits(), 1);
        assert_eq!(Graph::new(4).vertex_bits(), 2);
        assert_eq!(Graph::new(5).vertex_bits(), 3);
    }

    #[test]
    fn test_edge_relation_of_path() {
        let mut path = Graph::new(4);
        path.add_edge(0, 1);
        path.add_edge(1, 2);
        path.add_edge(2, 3);

        let bdd = Bdd::default();
        let f = encode_edge_relation(&bdd, &path).unwrap();
        assert_eq!(bdd.num_vars(), 4);
        assert_eq!(bdd.var(&edge_var_name(0, false)).unwrap(), Var::new(1));
        assert_eq!(bdd.var(&edge_var_name(0, true)).unwrap(), Var::new(2));
        assert_eq!(bdd.var_name(Var::new(4)).as_deref(), Some("x_1_prime"));

        // Both orientations of every edge.
        assert_eq!(bdd.model_count_all(f).unwrap(), BigUint::from(6u32));

        // Values in order x_0, x_0_prime, x_1, x_1_prime.
        let pair = |u: usize, v: usize| [(u >> 1) & 1 == 1, (v >> 1) & 1 == 1, u & 1 == 1, v & 1 == 1];
        for u in 0..4 {
            for v in 0..4 {
                let adjacent = path.neighbors(u).contains(&v);
                assert_eq!(bdd.eval(f, &pair(u, v)).unwrap(), adjacent, "({}, {})", u, v);
            }
        }
    }

    #[test]
    fn test_edge_relation_edge_cases() {
        let bdd = Bdd::default();
        let f = encode_edge_relation(&bdd, &Graph::new(3)).unwrap();
        assert!(bdd.is_zero(f));

        // One vertex needs no bits: its self-loop is the only pair.
        let mut lonely = Graph::new(1);
        lonely.add_edge(0, 0);
        let bdd = Bdd::default();
        let f = encode_edge_relation(&bdd, &lonely).unwrap();
        assert_eq!(bdd.num_vars(), 0);
        assert!(bdd.is_one(f));
    }

    #[test]
    fn test_edge_relation_counts_ordered_pairs() {
        use crate::config::BddConfig;

        let mut g = Graph::new(6);
        for v in 0..6 {
            g.add_edge(v, (v + 1) % 6);
        }
        g.add_edge(0, 3);
        g.add_edge(5, 5);

        let bdd = Bdd::with_config(BddConfig::default().with_gc_threshold(8));
        let f = encode_edge_relation(&bdd, &g).unwrap();
        let pairs: usize = (0..g.vertices()).map(|v| g.neighbors(v).len()).sum();
        assert_eq!(pairs, 2 * 7 + 1);
        assert_eq!(bdd.model_count_all(f).unwrap(), BigUint::from(pairs));
    }

    #[test]
    fn test_encode_matches_bruteforce() {
        // Cycle of length 5 plus a chord.
        let mut g = Graph::new(5);
        for v in 0..5 {
            g.add_edge(v, (v + 1) % 5);
        }
        g.add_edge(0, 2);

        for k in 1..=4 {
            let bdd = Bdd::default();
            let f = encode_coloring(&bdd, &g, k).unwrap();
            assert_eq!(
                bdd.model_count_all(f).unwrap(),
                g.count_colorings_bruteforce(k),
                "k = {}",
                k
            );
        }
    }
}
