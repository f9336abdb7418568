//! Round-by-round public-goods game engine.
//!
//! Each round every player decides against the history of prior rounds, the
//! engine clamps and pools the contributions, multiplies the pot, splits it
//! evenly and emits one `OutputRecord` per player.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine::bot_strategy::Strategy;
use crate::engine::error::{ConfigError, DecisionError};
use crate::engine::models::*;

/// Lifecycle of a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    /// `completed` rounds have been fully settled.
    Running { completed: u32 },
    Completed,
}

/// Mutable state of one run. Owns history and scores; borrows the roster.
pub struct Simulation<'a> {
    roster: &'a mut [Box<dyn Strategy>],
    config: GameConfig,
    labels: Vec<String>,
    history: Vec<RoundRecord>,
    scores: Vec<f64>,
    phase: RunPhase,
}

impl<'a> Simulation<'a> {
    pub fn new(roster: &'a mut [Box<dyn Strategy>], config: GameConfig) -> Result<Self, ConfigError> {
        config.validate(roster.len())?;
        let labels = roster.iter().map(|s| s.name()).collect();
        let scores = vec![0.0; roster.len()];
        Ok(Self {
            roster,
            config,
            labels,
            history: Vec::with_capacity(config.n_rounds as usize),
            scores,
            phase: RunPhase::NotStarted,
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn history(&self) -> &[RoundRecord] {
        &self.history
    }

    /// Cumulative score per player, indexed by `PlayerId`.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn n_players(&self) -> usize {
        self.roster.len()
    }

    /// Play the next round and return its records in player order, or
    /// `None` once every round has been played.
    pub fn play_round(&mut self) -> Option<Vec<OutputRecord>> {
        let round = match self.phase {
            RunPhase::NotStarted => 1,
            RunPhase::Running { completed } => completed + 1,
            RunPhase::Completed => return None,
        };

        let contributions = self.collect_contributions(round);

        let n_players = self.roster.len();
        let total_pot: f64 = contributions.iter().sum();
        let multiplied_pot = total_pot * self.config.multiplier;
        let share_per_player = multiplied_pot / n_players as f64;

        tracing::debug!(
            round,
            total_pot,
            share_per_player,
            "round settled"
        );

        self.history.push(RoundRecord {
            round,
            contributions: contributions.clone(),
            total_pot,
        });

        let endowment = self.config.endowment;
        let records: Vec<OutputRecord> = contributions
            .iter()
            .enumerate()
            .map(|(pid, &contribution)| {
                let kept = endowment - contribution;
                let round_gain = kept + share_per_player;
                self.scores[pid] += round_gain;
                OutputRecord {
                    round,
                    player_id: pid,
                    strategy: self.labels[pid].clone(),
                    endowment,
                    contribution,
                    kept_private: kept,
                    pot_share_received: round_gain - kept,
                    round_gain_total: round_gain,
                    cumulative_score: self.scores[pid],
                    group_total_pot: total_pot,
                    group_synergy_factor: self.config.multiplier,
                }
            })
            .collect();

        self.phase = if round >= self.config.n_rounds {
            RunPhase::Completed
        } else {
            RunPhase::Running { completed: round }
        };

        Some(records)
    }

    /// Decision phase. Every strategy sees only the history of earlier rounds;
    /// same-round choices stay in a local buffer until all players decided.
    fn collect_contributions(&mut self, round: u32) -> Vec<f64> {
        let endowment = self.config.endowment;
        let history = &self.history;
        self.roster
            .iter_mut()
            .enumerate()
            .map(|(pid, strategy)| {
                let raw = panic::catch_unwind(AssertUnwindSafe(|| {
                    strategy.decide_contribution(history, pid, endowment)
                }))
                .unwrap_or_else(|payload| Err(DecisionError::Strategy(panic_message(&*payload))))
                .and_then(|value| {
                    if value.is_finite() {
                        Ok(value)
                    } else {
                        Err(DecisionError::NonFinite(value))
                    }
                });
                match raw {
                    Ok(value) => self.config.clamp_contribution(value),
                    Err(e) => {
                        tracing::warn!(
                            round,
                            player_id = pid,
                            strategy = %self.labels[pid],
                            service_fault = e.is_service_fault(),
                            error = %e,
                            "decision failed, contributing 0"
                        );
                        0.0
                    }
                }
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// Run every round and return the full record stream, round-major then
/// player order.
pub fn run_game(
    roster: &mut [Box<dyn Strategy>],
    config: &GameConfig,
) -> Result<Vec<OutputRecord>, ConfigError> {
    let stop = AtomicBool::new(false);
    run_game_until(roster, config, &stop)
}

/// Like [`run_game`], but checks `stop` before each round. When it is set the
/// records of all fully completed rounds are returned.
pub fn run_game_until(
    roster: &mut [Box<dyn Strategy>],
    config: &GameConfig,
    stop: &AtomicBool,
) -> Result<Vec<OutputRecord>, ConfigError> {
    let mut sim = Simulation::new(roster, *config)?;
    let mut records = Vec::with_capacity(config.n_rounds as usize * sim.n_players());

    while !stop.load(Ordering::Relaxed) {
        match sim.play_round() {
            Some(round_records) => records.extend(round_records),
            None => break,
        }
    }

    if sim.phase() != RunPhase::Completed {
        tracing::info!(
            completed = sim.history().len(),
            n_rounds = config.n_rounds,
            "run interrupted"
        );
    }

    Ok(records)
}
