//! Encoding and model-counting benchmarks.
//!
//! Run with:
//! ```bash
//! cargo bench --bench model_count
//! ```

use bdd_decide::bdd::Bdd;
use bdd_decide::config::BddConfig;
use bdd_decide::decide::{Decider, Policy};
use bdd_decide::encode::{encode_coloring, Graph};
use bdd_decide::reference::Ref;
use bdd_decide::types::Var;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

// ============================================================================
// Helper: N-Queens Problem (canonical BDD benchmark)
// ============================================================================

/// Encodes N-Queens; variable `i * n + j + 1` means "queen at row i, column j".
fn solve_queens(bdd: &Bdd, n: usize) -> Ref {
    let vars: Vec<Var> = (0..n * n)
        .map(|k| bdd.declare_variable(format!("q{}", k)).unwrap())
        .collect();
    let var = |i: usize, j: usize| vars[i * n + j];

    let mut clauses = Vec::new();

    // Exactly one queen per row
    for i in 0..n {
        clauses.push(bdd.build_clause((0..n).map(|j| var(i, j).pos())).unwrap());
        for j1 in 0..n {
            for j2 in (j1 + 1)..n {
                clauses.push(bdd.build_clause([var(i, j1).neg(), var(i, j2).neg()]).unwrap());
            }
        }
    }

    // At most one queen per column
    for j in 0..n {
        for i1 in 0..n {
            for i2 in (i1 + 1)..n {
                clauses.push(bdd.build_clause([var(i1, j).neg(), var(i2, j).neg()]).unwrap());
            }
        }
    }

    // Diagonals
    for i1 in 0..n {
        for j1 in 0..n {
            for i2 in (i1 + 1)..n {
                let di = i2 - i1;
                for j2 in [j1 + di, j1.wrapping_sub(di)] {
                    if j2 < n {
                        clauses.push(bdd.build_clause([var(i1, j1).neg(), var(i2, j2).neg()]).unwrap());
                    }
                }
            }
        }
    }

    bdd.conjoin_all(clauses).unwrap()
}

fn cycle(n: usize) -> Graph {
    let mut g = Graph::new(n);
    for v in 0..n {
        g.add_edge(v, (v + 1) % n);
    }
    g
}

// ============================================================================
// Benchmark: Queens encoding and counting
// ============================================================================

fn bench_queens(c: &mut Criterion) {
    let mut group = c.benchmark_group("count/queens");
    group.sample_size(10);

    for n in [4, 5, 6, 7] {
        group.bench_with_input(BenchmarkId::new("queens", n), &n, |b, &n| {
            b.iter(|| {
                let bdd = Bdd::default();
                let f = solve_queens(&bdd, n);
                bdd.model_count_all(f).unwrap()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Counting alone on a prebuilt diagram
// ============================================================================

fn bench_count_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("count/prebuilt");

    let bdd = Bdd::default();
    let f = solve_queens(&bdd, 7);
    group.bench_function("queens-7", |b| b.iter(|| bdd.model_count_all(f).unwrap()));

    group.finish();
}

// ============================================================================
// Benchmark: Coloring with and without automatic collection
// ============================================================================

fn bench_coloring(c: &mut Criterion) {
    let mut group = c.benchmark_group("count/coloring");
    group.sample_size(10);

    let graph = cycle(12);
    for threshold in [None, Some(1 << 10)] {
        let label = threshold.map_or("off".to_string(), |t| t.to_string());
        group.bench_with_input(BenchmarkId::new("cycle-12/gc", label), &threshold, |b, &threshold| {
            b.iter(|| {
                let config = match threshold {
                    Some(t) => BddConfig::default().with_gc_threshold(t),
                    None => BddConfig::default(),
                };
                let bdd = Bdd::with_config(config);
                let f = encode_coloring(&bdd, &graph, 3).unwrap();
                bdd.model_count_all(f).unwrap()
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Decision procedure
// ============================================================================

fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("decide/queens");
    group.sample_size(10);

    for policy in Policy::ALL {
        group.bench_with_input(BenchmarkId::new("queens-6", policy), &policy, |b, &policy| {
            b.iter(|| {
                let bdd = Bdd::default();
                let f = solve_queens(&bdd, 6);
                let mut decider = Decider::new(&bdd, f, bdd.variables(), policy).unwrap();
                decider.run().unwrap().final_count
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_queens, bench_count_only, bench_coloring, bench_decide);
criterion_main!(benches);
