//! DCR-Graph CLI - simulate, explore and minimize declarative process graphs.
//!
//! Graphs are read from JSON files in the `dcr-graph-core` serde format.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

use dcr_graph_core::{ActivityId, DcrGraph};
use dcr_graph_engine::{
    compute_trace_language, trace_ids, CompiledGraph, ExhaustiveMinimizer, ExploreOutcome,
    Minimization, PatternMinimizer, SearchConfig, Semantics,
};

/// DCR-Graph: execute and minimize declarative process graphs.
///
/// Run `dcr stats <graph.json>` for a quick look at a model, `dcr explore`
/// to enumerate its trace language, or `dcr minimize` to strip redundant
/// relations.
#[derive(Parser, Debug)]
#[command(
    name = "dcr",
    author,
    version,
    about = "DCR-Graph: execute and minimize declarative process graphs",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show structural statistics for a graph.
    Stats {
        /// Path to the graph JSON file.
        graph: PathBuf,
    },

    /// Fire a sequence of activities and report the resulting state.
    Simulate {
        /// Path to the graph JSON file.
        graph: PathBuf,

        /// Activity ids to execute, in order.
        #[arg(required = true)]
        trace: Vec<String>,

        /// Confidence threshold for mined relations.
        #[arg(short, long, default_value_t = 0.0)]
        threshold: f64,
    },

    /// Enumerate the complete trace language.
    Explore {
        /// Path to the graph JSON file.
        graph: PathBuf,

        /// Confidence threshold for mined relations.
        #[arg(short, long, default_value_t = 0.0)]
        threshold: f64,

        /// State budget before the search is declared inconclusive.
        #[arg(short, long)]
        max_states: Option<usize>,

        /// Print at most this many sample traces.
        #[arg(short, long, default_value_t = 10)]
        samples: usize,
    },

    /// Remove semantically redundant relations.
    Minimize {
        /// Path to the graph JSON file.
        graph: PathBuf,

        /// Minimization strategy.
        #[arg(short, long, value_enum, default_value_t = Strategy::Exhaustive)]
        strategy: Strategy,

        /// Confidence threshold for mined relations.
        #[arg(short, long, default_value_t = 0.0)]
        threshold: f64,

        /// State budget per equivalence check.
        #[arg(short, long)]
        max_states: Option<usize>,

        /// Write the minimized graph to this JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export a graph in Graphviz DOT format.
    ExportDot {
        /// Path to the graph JSON file.
        graph: PathBuf,

        /// Output file (stdout when omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Minimization strategies exposed by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// Language-equivalence proof per relation; complete but slower.
    Exhaustive,
    /// Structural rewrite rules; fast but incomplete.
    Patterns,
    /// Run both and report them side by side.
    Both,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Stats { graph } => {
            let graph = load_graph(&graph)?;
            print_stats(&graph);
        }

        Commands::Simulate {
            graph,
            trace,
            threshold,
        } => {
            let model = load_graph(&graph)?;
            simulate(model, &trace, threshold)?;
        }

        Commands::Explore {
            graph,
            threshold,
            max_states,
            samples,
        } => {
            let model = load_graph(&graph)?;
            explore(&model, search_config(threshold, max_states), samples)?;
        }

        Commands::Minimize {
            graph,
            strategy,
            threshold,
            max_states,
            output,
        } => {
            let model = load_graph(&graph)?;
            let config = search_config(threshold, max_states);
            let minimized = minimize(&model, strategy, config)?;
            if let Some(path) = output {
                let json = serde_json::to_string_pretty(&minimized)?;
                std::fs::write(&path, json)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("\n💾 Minimized graph written to {}", path.display());
            }
        }

        Commands::ExportDot { graph, output } => {
            let model = load_graph(&graph)?;
            export_dot(&model, output.as_deref())?;
        }
    }

    Ok(())
}

/// Load and deserialize a graph JSON file.
fn load_graph(path: &Path) -> Result<DcrGraph> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let graph: DcrGraph =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(graph)
}

fn search_config(threshold: f64, max_states: Option<usize>) -> SearchConfig {
    let mut config = SearchConfig::default().with_threshold(threshold);
    if let Some(max_states) = max_states {
        config = config.with_max_states(max_states);
    }
    config
}

fn print_stats(graph: &DcrGraph) {
    let stats = graph.stats();
    println!("📊 {}", graph.title);
    println!("{:─<50}", "");
    println!("🔵 Activities:  {}", stats.activities);
    if stats.nested > 0 {
        println!("📦 Nested:      {}", stats.nested);
    }
    println!("🔗 Relations:   {}", stats.total_relations());
    println!("   • condition: {}", stats.conditions);
    println!("   • response:  {}", stats.responses);
    println!("   • milestone: {}", stats.milestones);
    println!("   • include:   {}", stats.includes);
    println!("   • exclude:   {}", stats.excludes);
}

fn simulate(mut graph: DcrGraph, trace: &[String], threshold: f64) -> Result<()> {
    let semantics = Semantics::new(threshold);
    graph.seal()?;

    for raw in trace {
        let id = ActivityId::new(raw.clone())?;
        if semantics.execute(&mut graph, &id)? {
            println!("✅ {raw}");
        } else {
            bail!("activity {raw:?} is not runnable at this point");
        }
    }

    let runnable: BTreeSet<ActivityId> = semantics.runnable_set(&graph)?;
    println!();
    println!(
        "🏁 Accepting: {}",
        if semantics.is_final(&graph) { "yes" } else { "no" }
    );
    if runnable.is_empty() {
        println!("⏸  Nothing is runnable");
    } else {
        let ids: Vec<String> = runnable.iter().map(|id| id.to_string()).collect();
        println!("▶  Runnable: {}", ids.join(", "));
    }
    Ok(())
}

fn explore(graph: &DcrGraph, config: SearchConfig, samples: usize) -> Result<()> {
    let compiled = CompiledGraph::compile(graph, config.threshold)?;
    match compute_trace_language(graph, config)? {
        ExploreOutcome::Complete(language) => {
            println!("📊 {}", graph.title);
            println!("{:─<50}", "");
            println!("🗺  States visited:     {}", language.state_count());
            println!("🏁 Final traces:       {}", language.final_traces.len());
            println!("🔁 Early-term traces:  {}", language.early_traces.len());

            let mut shown: Vec<Vec<String>> = language
                .final_traces
                .iter()
                .map(|t| trace_ids(&compiled, t))
                .collect();
            shown.sort();
            if !shown.is_empty() {
                println!();
                println!("Sample final traces:");
                for trace in shown.iter().take(samples) {
                    println!("   • [{}]", trace.join(", "));
                }
                if shown.len() > samples {
                    println!("   … and {} more", shown.len() - samples);
                }
            }
        }
        ExploreOutcome::BudgetExceeded { states_explored } => {
            bail!(
                "exploration inconclusive: budget of {} states exhausted after {} states",
                config.max_states,
                states_explored
            );
        }
    }
    Ok(())
}

fn minimize(graph: &DcrGraph, strategy: Strategy, config: SearchConfig) -> Result<DcrGraph> {
    match strategy {
        Strategy::Exhaustive => {
            let result = ExhaustiveMinimizer::new(config).minimize(graph)?;
            print_minimization("exhaustive", graph, &result);
            Ok(result.graph)
        }
        Strategy::Patterns => {
            let report = PatternMinimizer::new(config).minimize(graph)?;
            print_minimization("patterns", graph, &report.minimization);
            print_rule_counts(&report);
            Ok(report.minimization.graph)
        }
        Strategy::Both => {
            let exhaustive = ExhaustiveMinimizer::new(config).minimize(graph)?;
            let report = PatternMinimizer::new(config).minimize(graph)?;

            print_minimization("exhaustive", graph, &exhaustive);
            println!();
            print_minimization("patterns", graph, &report.minimization);
            print_rule_counts(&report);

            let missed = exhaustive
                .relations_removed
                .saturating_sub(report.minimization.relations_removed);
            println!();
            println!("⚖  Pattern coverage: {missed} relation(s) only the exhaustive strategy caught");
            Ok(exhaustive.graph)
        }
    }
}

fn print_minimization(label: &str, original: &DcrGraph, result: &Minimization) {
    println!("✂  Minimization ({label})");
    println!("{:─<50}", "");
    println!(
        "🔗 Relations:  {} → {} ({} removed)",
        original.relation_count(),
        result.graph.relation_count(),
        result.relations_removed
    );
    println!(
        "🔵 Activities: {} → {} ({} removed)",
        original.flatten().map(|f| f.node_count()).unwrap_or(0),
        result.graph.node_count(),
        result.activities_removed
    );
}

fn print_rule_counts(report: &dcr_graph_engine::PatternReport) {
    println!("   passes to fixed point: {}", report.passes);
    for (kind, count) in &report.rule_counts {
        if *count > 0 {
            println!("   • {kind}: {count}");
        }
    }
}

fn export_dot(graph: &DcrGraph, output: Option<&Path>) -> Result<()> {
    let (petgraph, _) = graph.to_petgraph();
    let labeled = petgraph.map(|_, id| id.to_string(), |_, kind| kind.label());
    let dot = format!(
        "{:?}",
        petgraph::dot::Dot::with_config(&labeled, &[petgraph::dot::Config::GraphContentOnly])
    );
    let body = format!("digraph {{\n{dot}}}\n");

    match output {
        Some(path) => {
            std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
            println!("💾 DOT written to {}", path.display());
        }
        None => print!("{body}"),
    }
    Ok(())
}
