use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use bdd_decide::bdd::Bdd;
use bdd_decide::config::BddConfig;
use bdd_decide::decide::{Decider, Policy, StepQuery, Strategy};
use bdd_decide::dimacs::{parse_cnf, parse_col};
use bdd_decide::encode::{cnf_var_name, encode_coloring, encode_edge_relation};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, eyre};
use color_eyre::Result;

#[derive(Parser)]
#[command(author, version, about = "Model counting and incremental configuration with BDDs")]
struct Cli {
    /// Pre-allocated node slots, as a power of two
    #[arg(long, value_name = "INT")]
    bdd_size: Option<usize>,

    /// Collect garbage once the store holds this many nodes
    #[arg(long, value_name = "NODES")]
    gc_threshold: Option<usize>,

    /// Log engine internals
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count the models of a DIMACS CNF formula
    Count {
        /// Input file in DIMACS CNF format
        input: PathBuf,
    },

    /// Count the proper colorings of a DIMACS graph
    Color {
        /// Input file in DIMACS `.col` format
        input: PathBuf,

        /// Number of colors (defaults to the greedy bound)
        #[arg(short = 'k', long)]
        colors: Option<usize>,

        /// Also count by exhaustive search and compare
        #[arg(long)]
        check: bool,
    },

    /// Encode the edge relation of a DIMACS graph over binary vertex numbers
    Edges {
        /// Input file in DIMACS `.col` format
        input: PathBuf,
    },

    /// Fix the variables of a DIMACS CNF formula one by one
    Decide {
        /// Input file in DIMACS CNF format
        input: PathBuf,

        /// One of always-include, always-exclude, maximize-if-tie-include,
        /// maximize-if-tie-exclude, interactive
        #[arg(short, long, default_value = "maximize-if-tie-include")]
        policy: String,

        /// Decision order as comma-separated DIMACS variables
        /// (defaults to the `c vo` line, then to 1..=n)
        #[arg(short, long, value_delimiter = ',')]
        order: Option<Vec<u32>>,
    },
}

/// Asks on the terminal which value to take.
fn ask(query: &StepQuery) -> bool {
    ask_with(&mut io::stdin().lock(), &mut io::stdout(), query)
}

/// Prompts on `output` until `input` yields a y/n answer. Without one, at
/// end of input or on a read error, picks the side with more models.
fn ask_with(input: &mut impl BufRead, output: &mut impl Write, query: &StepQuery) -> bool {
    let fallback = query.c_true >= query.c_false;
    loop {
        let _ = write!(
            output,
            "{}: true leaves {} models, false leaves {}. Include? [y/n] ",
            query.name, query.c_true, query.c_false
        );
        let _ = output.flush();

        let mut answer = String::new();
        match input.read_line(&mut answer) {
            Ok(0) => {
                log::warn!("No answer for {}, choosing {}", query.name, fallback);
                return fallback;
            }
            Ok(_) => {}
            Err(e) => {
                log::warn!("Failed to read answer for {}: {}, choosing {}", query.name, e, fallback);
                return fallback;
            }
        }
        match answer.trim() {
            "y" | "yes" | "1" | "true" => return true,
            "n" | "no" | "0" | "false" => return false,
            other => {
                let _ = writeln!(output, "Please answer y or n, not `{}`", other);
            }
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    simplelog::TermLogger::init(
        if cli.verbose {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let mut config = BddConfig::default();
    if let Some(size) = cli.bdd_size {
        config = config.with_initial_nodes(1 << size);
    }
    if let Some(threshold) = cli.gc_threshold {
        config = config.with_gc_threshold(threshold);
    }
    let bdd = Bdd::with_config(config);

    match cli.command {
        Commands::Count { input } => {
            log::info!("Loading CNF from {:?}", input);
            let cnf = parse_cnf(File::open(&input)?)?;
            log::info!(
                "Loaded {} variables and {} clauses",
                cnf.num_vars,
                cnf.clauses.len()
            );

            let f = cnf.encode(&bdd)?;
            log::info!("BDD encoding complete. Size: {} nodes", bdd.size(f)?);

            println!("Models: {}", bdd.model_count_all(f)?);
            println!("Support: {} of {} variables", bdd.support(f)?.len(), bdd.num_vars());
            log::debug!("{}", bdd.cache_stats());
        }

        Commands::Color { input, colors, check } => {
            log::info!("Loading graph from {:?}", input);
            let graph = parse_col(File::open(&input)?)?;

            let bound = graph.color_bound();
            println!("Greedy coloring uses {} colors", bound);
            let k = colors.unwrap_or(bound);

            let f = encode_coloring(&bdd, &graph, k)?;
            log::info!("BDD encoding complete. Size: {} nodes", bdd.size(f)?);

            let count = bdd.model_count_all(f)?;
            println!("Proper {}-colorings: {}", k, count);

            if check {
                let expected = graph.count_colorings_bruteforce(k);
                if expected != count {
                    bail!("exhaustive search found {} colorings, BDD found {}", expected, count);
                }
                println!("Exhaustive search agrees");
            }
        }

        Commands::Edges { input } => {
            log::info!("Loading graph from {:?}", input);
            let graph = parse_col(File::open(&input)?)?;

            let f = encode_edge_relation(&bdd, &graph)?;
            log::info!("BDD encoding complete. Size: {} nodes", bdd.size(f)?);

            println!("Bits per vertex: {}", graph.vertex_bits());
            println!("Adjacent ordered pairs: {}", bdd.model_count_all(f)?);
        }

        Commands::Decide { input, policy, order } => {
            log::info!("Loading CNF from {:?}", input);
            let mut cnf = parse_cnf(File::open(&input)?)?;
            if order.is_some() {
                cnf.order = order;
            }

            let f = cnf.encode(&bdd)?;
            let order = cnf.decision_order(&bdd)?;

            let strategy = if policy == "interactive" {
                Strategy::interactive(ask)
            } else {
                Strategy::Policy(policy.parse::<Policy>().map_err(|e| eyre!(e))?)
            };

            let mut decider = Decider::new(&bdd, f, order, strategy)?;
            let report = decider.run()?;

            println!("Initial models: {}", report.initial_count);
            println!("Decisions ({}):", report.decisions.len());
            for decision in &report.decisions {
                let name = bdd
                    .var_name(decision.var)
                    .unwrap_or_else(|| cnf_var_name(decision.var.id()));
                println!(
                    "  {} = {} (true: {}, false: {})",
                    name, decision.value, decision.c_true, decision.c_false
                );
            }
            println!("Skipped: {}", report.skipped.len());
            println!("Final models: {}", report.final_count);
        }
    }

    Ok(())
}
