//! Aggregates over an exported record table: overall averages, per-strategy
//! performance and contribution over time.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::engine::arena::BatchRecord;

/// Per-strategy aggregates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyStats {
    pub decisions: usize,
    pub mean_contribution: f64,
    /// Cumulative score of every seat of this strategy at its game's last round.
    pub final_scores: Vec<f64>,
}

impl StrategyStats {
    pub fn mean_final_score(&self) -> f64 {
        if self.final_scores.is_empty() {
            return 0.0;
        }
        self.final_scores.iter().sum::<f64>() / self.final_scores.len() as f64
    }

    pub fn final_score_stddev(&self) -> f64 {
        if self.final_scores.len() < 2 {
            return 0.0;
        }
        let avg = self.mean_final_score();
        let variance = self
            .final_scores
            .iter()
            .map(|s| (s - avg).powi(2))
            .sum::<f64>()
            / (self.final_scores.len() - 1) as f64;
        variance.sqrt()
    }
}

/// Aggregated view of a batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total_games: usize,
    pub rows: usize,
    pub avg_multiplier: f64,
    pub avg_contribution: f64,
    pub avg_round_gain: f64,
    pub strategies: BTreeMap<String, StrategyStats>,
    /// Mean contribution keyed by (round, strategy).
    pub evolution: BTreeMap<(u32, String), f64>,
}

impl BatchSummary {
    pub fn from_records(records: &[BatchRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let rows = records.len();
        let n = rows as f64;
        let games: HashSet<&str> = records.iter().map(|r| r.game_id.as_str()).collect();

        let mut contribution_sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        let mut by_round: BTreeMap<(u32, &str), (f64, usize)> = BTreeMap::new();
        let mut last_round: HashMap<(&str, usize), &BatchRecord> = HashMap::new();

        for r in records {
            let rec = &r.record;
            let entry = contribution_sums.entry(rec.strategy.as_str()).or_default();
            entry.0 += rec.contribution;
            entry.1 += 1;

            let entry = by_round.entry((rec.round, rec.strategy.as_str())).or_default();
            entry.0 += rec.contribution;
            entry.1 += 1;

            let key = (r.game_id.as_str(), rec.player_id);
            let newer = last_round
                .get(&key)
                .map_or(true, |prev| rec.round > prev.record.round);
            if newer {
                last_round.insert(key, r);
            }
        }

        let mut strategies: BTreeMap<String, StrategyStats> = contribution_sums
            .into_iter()
            .map(|(name, (sum, count))| {
                let stats = StrategyStats {
                    decisions: count,
                    mean_contribution: sum / count as f64,
                    final_scores: Vec::new(),
                };
                (name.to_string(), stats)
            })
            .collect();

        // Stable order for the score lists: by game, then seat.
        let mut finals: Vec<&BatchRecord> = last_round.into_values().collect();
        finals.sort_by(|a, b| {
            (a.game_id.as_str(), a.record.player_id).cmp(&(b.game_id.as_str(), b.record.player_id))
        });
        for r in finals {
            if let Some(stats) = strategies.get_mut(&r.record.strategy) {
                stats.final_scores.push(r.record.cumulative_score);
            }
        }

        Self {
            total_games: games.len(),
            rows,
            avg_multiplier: records.iter().map(|r| r.record.group_synergy_factor).sum::<f64>() / n,
            avg_contribution: records.iter().map(|r| r.record.contribution).sum::<f64>() / n,
            avg_round_gain: records.iter().map(|r| r.record.round_gain_total).sum::<f64>() / n,
            strategies,
            evolution: by_round
                .into_iter()
                .map(|((round, name), (sum, count))| ((round, name.to_string()), sum / count as f64))
                .collect(),
        }
    }

    /// Strategy names ordered by mean final score, best first.
    pub fn ranking(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.strategies.keys().map(String::as_str).collect();
        names.sort_by(|a, b| {
            let sa = self.strategies[*a].mean_final_score();
            let sb = self.strategies[*b].mean_final_score();
            sb.total_cmp(&sa).then_with(|| a.cmp(b))
        });
        names
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Batch Results ({} games, {} rows)",
            self.total_games, self.rows
        )];
        lines.push("=".repeat(72));
        lines.push(format!(
            "  avg multiplier: x{:.2}  |  avg contribution: {:.1}  |  avg gain/round: {:.1}",
            self.avg_multiplier, self.avg_contribution, self.avg_round_gain
        ));
        lines.push(String::new());
        for name in self.ranking() {
            let stats = &self.strategies[name];
            lines.push(format!(
                "  {:>28}: final={:7.1} +/- {:6.1}  contribution={:5.1}  decisions={}",
                name,
                stats.mean_final_score(),
                stats.final_score_stddev(),
                stats.mean_contribution,
                stats.decisions,
            ));
        }
        lines.join("\n")
    }

    /// Mean contribution per round for one strategy, in round order.
    pub fn contribution_curve(&self, strategy: &str) -> Vec<(u32, f64)> {
        self.evolution
            .iter()
            .filter(|((_, name), _)| name == strategy)
            .map(|((round, _), mean)| (*round, *mean))
            .collect()
    }
}
