//! termeval CLI: inspect evaluation trees and how they split.

mod input;

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use termeval_core::circuit::{Circuit, ElIndices, IndexMap, Label};
use termeval_core::config::{CostBudget, CostMetric, SplitConfig, TreeConfig};
use termeval_tree::verify::{assert_eval_order_valid, assert_partition_exact, assert_split_closed};
use termeval_tree::EvalTree;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::input::parse_circuits;

#[derive(Parser)]
#[command(name = "termeval")]
#[command(about = "Evaluation-tree planner for term-based circuit simulation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a tree from a circuit list and check it replays the input
    Validate {
        /// Path to the circuit list (YAML, or JSON by extension)
        #[arg(short, long)]
        circuits: PathBuf,
    },

    /// Split a tree and print the resulting partition
    Explain {
        /// Path to the circuit list (YAML, or JSON by extension)
        #[arg(short, long)]
        circuits: PathBuf,

        /// Maximum entries per sub-tree
        #[arg(long, conflicts_with_all = ["num_sub_trees", "max_cost"])]
        max_sub_tree_size: Option<usize>,

        /// Number of sub-trees
        #[arg(long, conflicts_with = "max_cost")]
        num_sub_trees: Option<usize>,

        /// Cost threshold for the balanced walk
        #[arg(long)]
        max_cost: Option<f64>,

        /// Threshold growth per visited entry
        #[arg(long, default_value_t = 0.0, requires = "max_cost")]
        max_cost_rate: f64,

        /// Cost metric: size or applys
        #[arg(long, default_value = "size", requires = "max_cost")]
        metric: String,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { circuits } => {
            if let Err(e) = validate_circuits(&circuits) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Circuit list is valid");
        }
        Commands::Explain {
            circuits,
            max_sub_tree_size,
            num_sub_trees,
            max_cost,
            max_cost_rate,
            metric,
        } => {
            let base = TreeConfig::from_env().split;
            let split = match split_config(base, max_sub_tree_size, num_sub_trees, max_cost, max_cost_rate, &metric) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(2);
                }
            };
            if let Err(e) = explain_split(&circuits, &split) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn load_tree(path: &Path) -> Result<(EvalTree, Vec<Circuit>), Box<dyn std::error::Error>> {
    let src = fs::read_to_string(path)?;
    let circuits: Vec<(Circuit, Vec<Label>)> = parse_circuits(path, &src)?;
    let list: Vec<Circuit> = circuits.iter().map(|(c, _)| c.clone()).collect();
    let tree = EvalTree::from_circuits(circuits)?;
    Ok((tree, list))
}

fn validate_circuits(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (tree, list) = load_tree(path)?;
    assert_eval_order_valid(&tree);
    if tree.generate_circuit_list(true)? != list {
        return Err("tree does not reproduce the circuit list".into());
    }
    tracing::info!(
        circuits = tree.num_final_strings(),
        elements = tree.num_final_els(),
        "tree built"
    );
    Ok(())
}

/// Command-line split flags layered over `base`, the environment's split
/// settings. Any split flag replaces `base` entirely.
fn split_config(
    base: SplitConfig,
    max_sub_tree_size: Option<usize>,
    num_sub_trees: Option<usize>,
    max_cost: Option<f64>,
    max_cost_rate: f64,
    metric: &str,
) -> Result<SplitConfig, String> {
    let mut split = base;
    if max_sub_tree_size.is_some() || num_sub_trees.is_some() || max_cost.is_some() {
        split = SplitConfig::default();
    }
    split.max_sub_tree_size = max_sub_tree_size.or(split.max_sub_tree_size);
    split.num_sub_trees = num_sub_trees.or(split.num_sub_trees);
    if let Some(c) = max_cost {
        let metric = CostMetric::parse(metric).ok_or_else(|| format!("unknown cost metric '{metric}'"))?;
        split.cost = Some(CostBudget {
            max_cost: c,
            max_cost_rate,
            metric,
        });
    }
    if split == SplitConfig::default() {
        return Err("give one of --max-sub-tree-size, --num-sub-trees or --max-cost".into());
    }
    Ok(split)
}

/// One element range per circuit, keyed by input position.
fn element_indices(tree: &EvalTree) -> ElIndices {
    let offsets = tree.element_offsets();
    tree.num_outcomes()
        .into_iter()
        .enumerate()
        .map(|(i, n)| (i, IndexMap::Slice(offsets[i]..offsets[i] + n)))
        .collect()
}

fn explain_split(path: &Path, split: &SplitConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (mut tree, _) = load_tree(path)?;
    let el_indices = element_indices(&tree);
    let metric = split.cost.map(|b| b.metric).unwrap_or_default();
    let cost_before = tree.cost(metric);

    let updated = match split.cost {
        Some(budget) => tree.split_by_cost(&el_indices, budget)?,
        None => tree.split(&el_indices, split.max_sub_tree_size, split.num_sub_trees)?,
    };
    assert_split_closed(&tree);
    assert_partition_exact(&tree);

    println!("Evaluation Tree Partition");
    println!("=========================");
    println!();
    println!("Circuits: {}", tree.num_final_strings());
    println!("Final elements: {}", tree.num_final_els());
    println!("Total cost ({:?}): {}", metric, cost_before);
    println!();

    if tree.sub_trees().is_empty() {
        println!("Tree fits in a single sub-tree; no split performed.");
    } else {
        let pc = tree.partition_cost(metric);
        println!("Sub-trees: {} (imbalance {:.3})", tree.sub_trees().len(), pc.imbalance());
        for (k, st) in tree.sub_trees().iter().enumerate() {
            let els = st.final_els_to_parent_final_els_map().unwrap_or(&[]);
            let range = match (els.first(), els.last()) {
                (Some(a), Some(b)) => format!("{a}..={b}"),
                _ => "-".to_string(),
            };
            println!(
                "  {}. {} entries, {} final circuits, elements {} (cost {})",
                k + 1,
                st.len(),
                st.num_final_strings(),
                range,
                pc.sub_tree_costs[k]
            );
        }
    }
    println!();
    println!("Circuit element indices after split:");
    for (i, map) in &updated {
        println!("  {i}: {:?}", map.indices());
    }
    println!();
    println!("Manifest:");
    println!("{}", serde_json::to_string_pretty(&tree.partition_manifest()?)?);

    Ok(())
}
