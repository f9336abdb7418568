//! Batch CLI: run scenarios, export the record table, summarise it.
//!
//! Usage:
//!   cargo run --release -- run --scenario mixed_tables --seed 42 --out data/results.jsonl
//!   cargo run --release -- summarize data/results.jsonl
//!   cargo run --release -- list

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use public_goods_engine::engine::analysis::BatchSummary;
use public_goods_engine::engine::arena::run_batch;
use public_goods_engine::engine::completion::{CommandBackend, CompletionBackend};
use public_goods_engine::engine::error::ScenarioError;
use public_goods_engine::engine::export::{read_records, write_records};
use public_goods_engine::engine::scenarios::{load_default_scenarios, load_scenarios, ScenarioFile};

#[derive(Parser)]
#[command(name = "public-goods-engine", about = "Iterated public-goods game simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play scenarios and write the record table as JSON Lines
    Run {
        /// Path to scenarios.toml (default: auto-discover, then built-ins)
        #[arg(long, env = "PUBLIC_GOODS_SCENARIOS")]
        scenarios: Option<PathBuf>,

        /// Scenario to run; repeat for several. Default: all of them
        #[arg(long = "scenario")]
        names: Vec<String>,

        /// Base random seed; game i uses seed + i
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output file
        #[arg(long, short, default_value = "data/simulation_results.jsonl")]
        out: PathBuf,

        /// Override the completion timeout from the scenario file (seconds)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Print aggregates for an exported table
    Summarize {
        path: PathBuf,
    },
    /// List available scenarios
    List {
        #[arg(long, env = "PUBLIC_GOODS_SCENARIOS")]
        scenarios: Option<PathBuf>,
    },
}

fn load_file(path: Option<&Path>) -> Result<ScenarioFile, ScenarioError> {
    match path {
        Some(p) => load_scenarios(p),
        None => load_default_scenarios(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            scenarios,
            names,
            seed,
            out,
            timeout_secs,
        } => {
            let file = load_file(scenarios.as_deref())?;
            let names: Vec<String> = if names.is_empty() {
                file.scenarios.keys().cloned().collect()
            } else {
                names
            };
            for name in &names {
                file.scenario(name)?;
            }

            let stop = Arc::new(AtomicBool::new(false));
            {
                let stop = stop.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupt received, stopping after the current round");
                        stop.store(true, Ordering::Relaxed);
                    }
                });
            }

            let settings = file.backend.clone();
            let timeout = timeout_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| settings.timeout());
            let handle = tokio::runtime::Handle::current();
            let stop_flag = stop.clone();

            tracing::info!(scenarios = ?names, seed, "starting batch");
            let records = tokio::task::spawn_blocking(move || {
                let backend_for = |model: &str| -> Arc<dyn CompletionBackend> {
                    Arc::new(CommandBackend::new(
                        settings.command.clone(),
                        settings.args_for(model),
                        timeout,
                        handle.clone(),
                    ))
                };
                let progress = |done: usize, total: usize| {
                    eprint!("\r  [{}/{}] games completed", done, total);
                };
                run_batch(&names, &file, seed, &backend_for, &stop_flag, Some(&progress))
            })
            .await??;
            eprintln!();

            write_records(&out, &records)?;
            if stop.load(Ordering::Relaxed) {
                tracing::warn!(rows = records.len(), "batch interrupted, partial table written");
            }
            println!("{}", BatchSummary::from_records(&records).summary());
        }
        Command::Summarize { path } => {
            let records = read_records(&path)?;
            println!("{}", BatchSummary::from_records(&records).summary());
        }
        Command::List { scenarios } => {
            let file = load_file(scenarios.as_deref())?;
            for (name, scenario) in &file.scenarios {
                let (min, max) = scenario.player_range();
                let players = if min == max {
                    format!("{} players", min)
                } else {
                    format!("{}-{} players", min, max)
                };
                println!(
                    "{:>20}: {} games, {}{}  {}",
                    name,
                    scenario.games,
                    players,
                    if scenario.uses_model() { ", model-backed" } else { "" },
                    scenario.description.as_deref().unwrap_or(""),
                );
            }
        }
    }

    Ok(())
}
