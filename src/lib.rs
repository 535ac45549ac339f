//! # bdd-decide: Binary Decision Diagrams for configuration decisions
//!
//! **`bdd-decide`** is a manager-centric library for building **Binary Decision Diagrams (BDDs)**
//! from constraint sets, counting their models exactly, and walking a configuration space one
//! decision at a time.
//!
//! ## What is a BDD?
//!
//! A Binary Decision Diagram is a data structure that represents a boolean function as a directed acyclic graph.
//! It is **canonical** --- for a fixed variable ordering, every boolean function has exactly one representation.
//! Two diagrams built in the same store are equivalent if and only if their handles are equal.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: All operations go through the [`Bdd`][crate::bdd::Bdd] manager, which owns the node arena, the unique table and the computed table.
//! - **Checked Handles**: [`Ref`][crate::reference::Ref] handles remember the store they came from. Mixing stores or using a reclaimed node is reported as an error instead of silently producing garbage.
//! - **Exact Counting**: Model counts are arbitrary-precision integers ([`BigUint`][num_bigint::BigUint]) over all declared variables.
//! - **No Deep Recursion**: Apply, restriction, quantification and counting run on explicit work stacks.
//! - **Incremental Decisions**: The [`Decider`][crate::decide::Decider] fixes variables one at a time, guided by model counts.
//!
//! ## Basic Usage
//!
//! ```rust
//! use bdd_decide::bdd::Bdd;
//! use bdd_decide::types::Lit;
//!
//! // 1. Initialize the manager
//! let bdd = Bdd::default();
//!
//! // 2. Declare variables; declaration order is the variable order
//! for name in ["x1", "x2", "x3"] {
//!     bdd.declare_variable(name).unwrap();
//! }
//!
//! // 3. Build (x1 ∨ x2) ∧ (¬x1 ∨ x3) from DIMACS-style literals
//! let c1 = bdd.build_clause([1, 2].map(Lit::from_dimacs)).unwrap();
//! let c2 = bdd.build_clause([-1, 3].map(Lit::from_dimacs)).unwrap();
//! let f = bdd.conjoin_all([c1, c2]).unwrap();
//!
//! // 4. Count models over all three variables
//! assert_eq!(bdd.model_count_all(f).unwrap().to_string(), "4");
//! ```
//!
//! ## Core Components
//!
//! - **[`bdd`]**: The [`Bdd`][crate::bdd::Bdd] manager, the Boolean engine and garbage collection.
//! - **[`sat`]**: Support, model counting and witnesses.
//! - **[`decide`]**: The incremental decision procedure and its policies.
//! - **[`encode`]**: CNF, graph-coloring and edge-relation encoders.
//! - **[`dimacs`]**: Readers for DIMACS CNF and `.col` files.

pub mod bdd;
pub mod cache;
pub mod config;
pub mod decide;
pub mod dimacs;
pub mod encode;
pub mod error;
pub mod node;
pub mod reference;
pub mod sat;
pub mod table;
pub mod types;
pub mod utils;
