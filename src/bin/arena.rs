//! Arena CLI: play an ad-hoc roster from the command line.
//!
//! Usage:
//!   cargo run --release --bin arena -- --games 100 --player altruist --player free_rider --player random
//!   cargo run --release --bin arena -- --games 1 --rounds 20 --player llm:greedy --player conditional_cooperator --model mistral

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use public_goods_engine::engine::analysis::BatchSummary;
use public_goods_engine::engine::arena::run_scenario;
use public_goods_engine::engine::completion::{CommandBackend, CompletionBackend};
use public_goods_engine::engine::export::write_records;
use public_goods_engine::engine::scenarios::{
    BackendSettings, Defaults, Scenario, ScenarioFile, StrategyKind,
};

const SCENARIO_NAME: &str = "arena";

#[derive(Parser)]
#[command(name = "arena", about = "Play an ad-hoc roster of public-goods strategies")]
struct Cli {
    /// Seat to add: altruist, free_rider, random, conditional_cooperator or
    /// llm:<persona>. Repeat once per seat
    #[arg(long = "player", required = true)]
    players: Vec<StrategyKind>,

    /// Number of games to play
    #[arg(long, default_value = "100")]
    games: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Tokens per player per round
    #[arg(long, default_value = "20")]
    endowment: f64,

    /// Synergy factor
    #[arg(long, default_value = "1.6")]
    multiplier: f64,

    /// Rounds per game
    #[arg(long, default_value = "50")]
    rounds: u32,

    /// Shuffle seat positions between games
    #[arg(long)]
    shuffle_seats: bool,

    /// Model name for llm:<persona> seats
    #[arg(long, default_value = "gemma2")]
    model: String,

    /// Completion command for llm seats
    #[arg(long, default_value = "ollama")]
    command: String,

    /// Completion timeout (seconds)
    #[arg(long, default_value = "60")]
    timeout_secs: u64,

    /// Also write the records as JSON Lines
    #[arg(long)]
    out: Option<PathBuf>,
}

fn build_file(cli: &Cli) -> ScenarioFile {
    let scenario = Scenario {
        description: Some("ad-hoc arena roster".into()),
        games: cli.games,
        endowment: None,
        multiplier: None,
        n_rounds: None,
        model: None,
        multiplier_range: None,
        roster: cli.players.clone(),
        shuffle_seats: cli.shuffle_seats,
        pool: Vec::new(),
        min_players: None,
        max_players: None,
    };

    ScenarioFile {
        defaults: Defaults {
            endowment: cli.endowment,
            multiplier: cli.multiplier,
            n_rounds: cli.rounds,
            model: cli.model.clone(),
        },
        backend: BackendSettings {
            command: cli.command.clone(),
            timeout_secs: cli.timeout_secs,
            ..BackendSettings::default()
        },
        personas: HashMap::new(),
        scenarios: BTreeMap::from([(SCENARIO_NAME.to_string(), scenario)]),
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let file = build_file(&cli);
    file.validate()?;

    let seats: Vec<String> = cli.players.iter().map(|p| p.to_string()).collect();
    eprintln!(
        "Arena: {} games, seed={}, endowment={}, multiplier={}, rounds={}, shuffle_seats={}",
        cli.games, cli.seed, cli.endowment, cli.multiplier, cli.rounds, cli.shuffle_seats
    );
    eprintln!("  seats: {}", seats.join(", "));
    eprintln!();

    // Only model-backed seats need the runtime; keep it alive for the whole run.
    let runtime = tokio::runtime::Runtime::new()?;
    let backend: Option<Arc<dyn CompletionBackend>> = if cli.players.iter().any(StrategyKind::is_model) {
        let settings = &file.backend;
        Some(Arc::new(CommandBackend::new(
            settings.command.clone(),
            settings.args_for(&cli.model),
            Duration::from_secs(settings.timeout_secs),
            runtime.handle().clone(),
        )))
    } else {
        None
    };

    let total = cli.games;
    let progress_cb = move |done: usize, _total: usize| {
        eprint!("\r  [{}/{}] games completed", done, total);
    };

    let stop = AtomicBool::new(false);
    let records = run_scenario(SCENARIO_NAME, &file, cli.seed, backend, &stop, Some(&progress_cb))?;

    eprintln!("\r                                    "); // clear progress line
    if let Some(path) = &cli.out {
        write_records(path, &records)?;
    }
    println!("{}", BatchSummary::from_records(&records).summary());
    Ok(())
}
