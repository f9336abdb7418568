//! Strategy trait and the built-in deterministic and stochastic players.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::error::DecisionError;
use crate::engine::models::*;

/// A strategy decides how much of its endowment to put into the pot.
///
/// `history` holds every settled round before the current one and is empty
/// on round 1. The returned value does not have to be in range: the engine
/// clamps it into `[0, endowment]`. An `Err` or a panic is recorded as a
/// contribution of 0 for this round only.
pub trait Strategy: Send {
    fn decide_contribution(
        &mut self,
        history: &[RoundRecord],
        my_id: PlayerId,
        endowment: f64,
    ) -> Result<f64, DecisionError>;

    /// Label written to the `strategy` column.
    fn name(&self) -> String;
}

/// Always contributes the full endowment.
pub struct Altruist;

impl Strategy for Altruist {
    fn decide_contribution(
        &mut self,
        _history: &[RoundRecord],
        _my_id: PlayerId,
        endowment: f64,
    ) -> Result<f64, DecisionError> {
        Ok(endowment)
    }

    fn name(&self) -> String {
        "altruist".into()
    }
}

/// Never contributes.
pub struct FreeRider;

impl Strategy for FreeRider {
    fn decide_contribution(
        &mut self,
        _history: &[RoundRecord],
        _my_id: PlayerId,
        _endowment: f64,
    ) -> Result<f64, DecisionError> {
        Ok(0.0)
    }

    fn name(&self) -> String {
        "free_rider".into()
    }
}

/// Draws a whole number of tokens uniformly from `[0, endowment]`.
pub struct RandomPlayer {
    rng: StdRng,
}

impl RandomPlayer {
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for RandomPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for RandomPlayer {
    fn decide_contribution(
        &mut self,
        _history: &[RoundRecord],
        _my_id: PlayerId,
        endowment: f64,
    ) -> Result<f64, DecisionError> {
        Ok(uniform_tokens(&mut self.rng, endowment))
    }

    fn name(&self) -> String {
        "random".into()
    }
}

/// Whole-token uniform draw in `[0, floor(endowment)]`.
pub(crate) fn uniform_tokens(rng: &mut StdRng, endowment: f64) -> f64 {
    if endowment.is_nan() || endowment < 1.0 {
        return 0.0;
    }
    rng.gen_range(0..=endowment.floor() as u64) as f64
}

/// Opens with half the endowment, then matches the mean contribution of the
/// other players in the previous round.
pub struct ConditionalCooperator;

impl Strategy for ConditionalCooperator {
    fn decide_contribution(
        &mut self,
        history: &[RoundRecord],
        my_id: PlayerId,
        endowment: f64,
    ) -> Result<f64, DecisionError> {
        let last = match history.last() {
            Some(r) => r,
            None => return Ok((endowment / 2.0).floor()),
        };
        Ok(last.others_mean(my_id).map(f64::floor).unwrap_or(0.0))
    }

    fn name(&self) -> String {
        "conditional_cooperator".into()
    }
}
