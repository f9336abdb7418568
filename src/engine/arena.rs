//! Batch runner: plays every game of a scenario and tags the records with
//! run-scoped columns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::engine::bot_strategy::*;
use crate::engine::completion::CompletionBackend;
use crate::engine::error::ScenarioError;
use crate::engine::models::*;
use crate::engine::persona::{persona_instructions, PersonaStrategy};
use crate::engine::scenarios::{Scenario, ScenarioFile, StrategyKind};
use crate::engine::simulator::run_game_until;

/// An engine record plus the columns the batch driver adds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(flatten)]
    pub record: OutputRecord,
    pub game_id: String,
    pub scenario: String,
    pub n_players: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
}

/// Seating and parameters of one game, fixed before it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct GamePlan {
    pub game_id: String,
    pub seats: Vec<StrategyKind>,
    /// Seed of each seat's private RNG.
    pub seat_seeds: Vec<u64>,
    pub config: GameConfig,
}

/// Everything needed to turn a `StrategyKind` into a live strategy.
pub struct SeatContext<'a> {
    pub personas: &'a HashMap<String, String>,
    pub model: &'a str,
    pub backend: Option<&'a Arc<dyn CompletionBackend>>,
}

/// Decide seating and parameters for game `game_idx` of a scenario.
/// Depends only on the scenario, `base_seed` and `game_idx`.
pub fn plan_game(
    name: &str,
    scenario: &Scenario,
    file: &ScenarioFile,
    base_seed: u64,
    game_idx: usize,
) -> GamePlan {
    let seed = base_seed.wrapping_add(game_idx as u64);
    let mut rng = StdRng::seed_from_u64(seed);

    let seats: Vec<StrategyKind> = if !scenario.roster.is_empty() {
        let mut seats = scenario.roster.clone();
        if scenario.shuffle_seats {
            seats.shuffle(&mut rng);
        }
        seats
    } else {
        let (min, max) = scenario.player_range();
        let n_players = rng.gen_range(min..=max);
        (0..n_players)
            .filter_map(|_| scenario.pool.choose(&mut rng).cloned())
            .collect()
    };

    let mut config = scenario.base_config(&file.defaults);
    if let Some([lo, hi]) = scenario.multiplier_range {
        let drawn = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        config.multiplier = (drawn * 100.0).round() / 100.0;
    }

    let seat_seeds = seats.iter().map(|_| rng.gen()).collect();

    GamePlan {
        game_id: format!("{}-{}-{:04}", name, base_seed, game_idx),
        seats,
        seat_seeds,
        config,
    }
}

/// Instantiate the strategy for one seat.
pub fn build_strategy(
    kind: &StrategyKind,
    seed: u64,
    config: &GameConfig,
    ctx: &SeatContext<'_>,
) -> Result<Box<dyn Strategy>, ScenarioError> {
    Ok(match kind {
        StrategyKind::Altruist => Box::new(Altruist),
        StrategyKind::FreeRider => Box::new(FreeRider),
        StrategyKind::Random => Box::new(RandomPlayer::seeded(seed)),
        StrategyKind::ConditionalCooperator => Box::new(ConditionalCooperator),
        StrategyKind::Model { persona } => {
            let backend = ctx
                .backend
                .ok_or_else(|| ScenarioError::MissingBackend(kind.to_string()))?;
            Box::new(PersonaStrategy::new(
                persona.clone(),
                persona_instructions(ctx.personas, persona),
                ctx.model,
                config.multiplier,
                Arc::clone(backend),
                seed,
            ))
        }
    })
}

/// Play every game of scenario `name`.
///
/// Coded-only scenarios run their games in parallel; scenarios with
/// model-backed seats run one game at a time so the completion service sees
/// one request at a time. Records come back ordered by game, round and
/// player either way. When `stop` is set, games stop between rounds and the
/// completed rounds are kept.
pub fn run_scenario(
    name: &str,
    file: &ScenarioFile,
    base_seed: u64,
    backend: Option<Arc<dyn CompletionBackend>>,
    stop: &AtomicBool,
    progress_callback: Option<&(dyn Fn(usize, usize) + Sync)>,
) -> Result<Vec<BatchRecord>, ScenarioError> {
    let scenario = file.scenario(name)?;
    scenario.validate(name, &file.defaults)?;
    let uses_model = scenario.uses_model();
    if uses_model && backend.is_none() {
        return Err(ScenarioError::MissingBackend(name.to_string()));
    }

    let personas = file.persona_table();
    let model = scenario.model(&file.defaults);
    let ctx = SeatContext {
        personas: &personas,
        model,
        backend: backend.as_ref(),
    };

    tracing::info!(
        scenario = name,
        games = scenario.games,
        uses_model,
        base_seed,
        "starting scenario"
    );
    let t0 = Instant::now();
    let done = AtomicUsize::new(0);

    let play = |game_idx: usize| -> Result<Vec<BatchRecord>, ScenarioError> {
        if stop.load(Ordering::Relaxed) {
            return Ok(Vec::new());
        }
        let plan = plan_game(name, scenario, file, base_seed, game_idx);
        let records = play_planned_game(name, &plan, uses_model.then_some(model), &ctx, stop)?;
        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(cb) = progress_callback {
            cb(finished, scenario.games);
        }
        Ok(records)
    };

    let per_game: Vec<Vec<BatchRecord>> = if uses_model {
        (0..scenario.games).map(play).collect::<Result<_, _>>()?
    } else {
        (0..scenario.games)
            .into_par_iter()
            .map(play)
            .collect::<Result<_, _>>()?
    };

    let records: Vec<BatchRecord> = per_game.into_iter().flatten().collect();
    tracing::info!(
        scenario = name,
        games = done.load(Ordering::Relaxed),
        records = records.len(),
        elapsed_s = t0.elapsed().as_secs_f64(),
        "scenario finished"
    );
    Ok(records)
}

/// Run several scenarios in order. `backend_for` builds the completion
/// backend for a model name and is only called for scenarios that need one.
pub fn run_batch(
    names: &[String],
    file: &ScenarioFile,
    base_seed: u64,
    backend_for: &dyn Fn(&str) -> Arc<dyn CompletionBackend>,
    stop: &AtomicBool,
    progress_callback: Option<&(dyn Fn(usize, usize) + Sync)>,
) -> Result<Vec<BatchRecord>, ScenarioError> {
    let mut all = Vec::new();
    for name in names {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let scenario = file.scenario(name)?;
        let backend = scenario
            .uses_model()
            .then(|| backend_for(scenario.model(&file.defaults)));
        all.extend(run_scenario(name, file, base_seed, backend, stop, progress_callback)?);
    }
    Ok(all)
}

fn play_planned_game(
    scenario: &str,
    plan: &GamePlan,
    model_used: Option<&str>,
    ctx: &SeatContext<'_>,
    stop: &AtomicBool,
) -> Result<Vec<BatchRecord>, ScenarioError> {
    let mut roster = plan
        .seats
        .iter()
        .zip(&plan.seat_seeds)
        .map(|(kind, &seed)| build_strategy(kind, seed, &plan.config, ctx))
        .collect::<Result<Vec<_>, _>>()?;

    let n_players = roster.len();
    let t0 = Instant::now();
    let records = run_game_until(&mut roster, &plan.config, stop)?;
    tracing::debug!(
        game_id = %plan.game_id,
        n_players,
        multiplier = plan.config.multiplier,
        elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0,
        "game finished"
    );

    Ok(records
        .into_iter()
        .map(|record| BatchRecord {
            record,
            game_id: plan.game_id.clone(),
            scenario: scenario.to_string(),
            n_players,
            model_used: model_used.map(str::to_string),
        })
        .collect())
}
