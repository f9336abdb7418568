//! Core engine data types: game configuration, round history and the flat
//! per-player output record.

use serde::{Deserialize, Serialize};

use crate::engine::error::ConfigError;

/// Roster position, fixed for the lifetime of one run.
pub type PlayerId = usize;

/// Immutable per-run game parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    /// Tokens handed to every player at the start of every round.
    pub endowment: f64,
    /// Synergy factor applied to the pooled contributions.
    pub multiplier: f64,
    pub n_rounds: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            endowment: 20.0,
            multiplier: 1.6,
            n_rounds: 20,
        }
    }
}

impl GameConfig {
    /// Reject configurations the engine cannot settle before a run starts.
    /// The dilemma condition (`1 < multiplier < n_players`) is not checked.
    pub fn validate(&self, n_players: usize) -> Result<(), ConfigError> {
        if n_players == 0 {
            return Err(ConfigError::NoPlayers);
        }
        if !self.endowment.is_finite() || self.endowment < 0.0 {
            return Err(ConfigError::InvalidEndowment(self.endowment));
        }
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(ConfigError::InvalidMultiplier(self.multiplier));
        }
        if self.n_rounds == 0 {
            return Err(ConfigError::NoRounds);
        }
        Ok(())
    }

    /// Clamp a raw decision into `[0, endowment]`. Never returns `-0.0`.
    pub fn clamp_contribution(&self, raw: f64) -> f64 {
        raw.min(self.endowment).max(0.0) + 0.0
    }
}

/// Settled contributions of one round. Frozen once appended to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// 1-based round number.
    pub round: u32,
    /// Clamped contribution of each player, indexed by `PlayerId`.
    pub contributions: Vec<f64>,
    pub total_pot: f64,
}

impl RoundRecord {
    pub fn contribution_of(&self, player: PlayerId) -> Option<f64> {
        self.contributions.get(player).copied()
    }

    /// Mean contribution of everyone except `player`, or `None` when
    /// `player` sat alone at the table.
    pub fn others_mean(&self, player: PlayerId) -> Option<f64> {
        let (sum, count) = self
            .contributions
            .iter()
            .enumerate()
            .filter(|(pid, _)| *pid != player)
            .fold((0.0, 0usize), |(s, n), (_, c)| (s + c, n + 1));
        if count == 0 {
            None
        } else {
            Some(sum / count as f64)
        }
    }
}

/// One flat row per (round, player). Field names are the column names of the
/// exported table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub round: u32,
    pub player_id: PlayerId,
    pub strategy: String,
    pub endowment: f64,
    pub contribution: f64,
    pub kept_private: f64,
    pub pot_share_received: f64,
    pub round_gain_total: f64,
    pub cumulative_score: f64,
    pub group_total_pot: f64,
    pub group_synergy_factor: f64,
}
