//! Named batch scenarios: rosters or strategy pools plus game parameters.
//! Loaded from TOML at runtime for the batch CLI.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::completion::DEFAULT_TIMEOUT;
use crate::engine::error::ScenarioError;
use crate::engine::models::GameConfig;
use crate::engine::persona::builtin_personas;

/// Scenarios shipped with the binary, used when no file is found.
pub const BUILTIN_SCENARIOS: &str = r#"
[defaults]
endowment = 20
multiplier = 1.6
n_rounds = 50
model = "gemma2"

[scenarios.mixed_tables]
description = "Random tables of 3 to 6 coded players with a random synergy factor"
games = 200
pool = ["altruist", "free_rider", "random", "conditional_cooperator"]
min_players = 3
max_players = 6
multiplier_range = [1.2, 2.5]

[scenarios.llm_psychology]
description = "One altruist persona against three greedy personas"
games = 1
n_rounds = 200
roster = ["llm:altruist", "llm:greedy", "llm:greedy", "llm:greedy"]
shuffle_seats = true
"#;

/// A roster entry as written in scenario files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum StrategyKind {
    Altruist,
    FreeRider,
    Random,
    ConditionalCooperator,
    /// Model-backed player with the given persona name.
    Model { persona: String },
}

impl StrategyKind {
    pub fn is_model(&self) -> bool {
        matches!(self, StrategyKind::Model { .. })
    }
}

impl FromStr for StrategyKind {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "altruist" => Ok(StrategyKind::Altruist),
            "free_rider" => Ok(StrategyKind::FreeRider),
            "random" => Ok(StrategyKind::Random),
            "conditional_cooperator" => Ok(StrategyKind::ConditionalCooperator),
            other => match other.strip_prefix("llm:") {
                Some(persona) if !persona.is_empty() => Ok(StrategyKind::Model {
                    persona: persona.to_string(),
                }),
                _ => Err(ScenarioError::UnknownStrategy(s.to_string())),
            },
        }
    }
}

impl TryFrom<String> for StrategyKind {
    type Error = ScenarioError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Altruist => f.write_str("altruist"),
            StrategyKind::FreeRider => f.write_str("free_rider"),
            StrategyKind::Random => f.write_str("random"),
            StrategyKind::ConditionalCooperator => f.write_str("conditional_cooperator"),
            StrategyKind::Model { persona } => write!(f, "llm:{}", persona),
        }
    }
}

/// Game parameters shared by every scenario unless overridden.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Defaults {
    pub endowment: f64,
    pub multiplier: f64,
    pub n_rounds: u32,
    pub model: String,
}

impl Default for Defaults {
    fn default() -> Self {
        let config = GameConfig::default();
        Self {
            endowment: config.endowment,
            multiplier: config.multiplier,
            n_rounds: config.n_rounds,
            model: "gemma2".into(),
        }
    }
}

/// How model-backed players reach the text-generation service.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendSettings {
    pub command: String,
    /// `{model}` is replaced with the scenario's model name.
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            command: "ollama".into(),
            args: vec!["run".into(), "{model}".into()],
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl BackendSettings {
    pub fn args_for(&self, model: &str) -> Vec<String> {
        self.args.iter().map(|a| a.replace("{model}", model)).collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One batch scenario.
#[derive(Debug, Deserialize, Clone)]
pub struct Scenario {
    pub description: Option<String>,
    #[serde(default = "default_games")]
    pub games: usize,

    // Per-scenario overrides of `[defaults]`.
    pub endowment: Option<f64>,
    pub multiplier: Option<f64>,
    pub n_rounds: Option<u32>,
    pub model: Option<String>,
    /// Draw each game's multiplier uniformly from `[lo, hi]`, two decimals.
    pub multiplier_range: Option<[f64; 2]>,

    /// Fixed seating. Takes precedence over `pool`.
    #[serde(default)]
    pub roster: Vec<StrategyKind>,
    #[serde(default)]
    pub shuffle_seats: bool,

    /// Random composition: each seat drawn from the pool.
    #[serde(default)]
    pub pool: Vec<StrategyKind>,
    pub min_players: Option<usize>,
    pub max_players: Option<usize>,
}

fn default_games() -> usize {
    1
}

impl Scenario {
    /// Base game config for this scenario. `multiplier_range` is applied per
    /// game by the batch driver.
    pub fn base_config(&self, defaults: &Defaults) -> GameConfig {
        GameConfig {
            endowment: self.endowment.unwrap_or(defaults.endowment),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
            n_rounds: self.n_rounds.unwrap_or(defaults.n_rounds),
        }
    }

    pub fn model<'a>(&'a self, defaults: &'a Defaults) -> &'a str {
        self.model.as_deref().unwrap_or(&defaults.model)
    }

    /// Inclusive bounds on table size for pool-based scenarios.
    pub fn player_range(&self) -> (usize, usize) {
        if !self.roster.is_empty() {
            return (self.roster.len(), self.roster.len());
        }
        let min = self.min_players.unwrap_or(self.pool.len().max(1));
        let max = self.max_players.unwrap_or(min);
        (min, max)
    }

    pub fn uses_model(&self) -> bool {
        self.roster.iter().chain(self.pool.iter()).any(StrategyKind::is_model)
    }

    /// Check everything that can be checked without playing.
    pub fn validate(&self, name: &str, defaults: &Defaults) -> Result<(), ScenarioError> {
        if self.roster.is_empty() && self.pool.is_empty() {
            return Err(ScenarioError::EmptyRoster(name.to_string()));
        }
        let (min, max) = self.player_range();
        if min == 0 || min > max {
            return Err(ScenarioError::PlayerRange {
                scenario: name.to_string(),
                min,
                max,
            });
        }
        if let Some([lo, hi]) = self.multiplier_range {
            if !lo.is_finite() || !hi.is_finite() || lo < 0.0 || lo > hi {
                return Err(ScenarioError::MultiplierRange {
                    scenario: name.to_string(),
                    lo,
                    hi,
                });
            }
        }
        self.base_config(defaults).validate(min)?;
        Ok(())
    }
}

/// Top-level TOML file structure.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScenarioFile {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub backend: BackendSettings,
    /// Extra or overriding persona instructions.
    #[serde(default)]
    pub personas: HashMap<String, String>,
    #[serde(default)]
    pub scenarios: BTreeMap<String, Scenario>,
}

impl ScenarioFile {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn scenario(&self, name: &str) -> Result<&Scenario, ScenarioError> {
        self.scenarios
            .get(name)
            .ok_or_else(|| ScenarioError::UnknownScenario(name.to_string()))
    }

    /// Built-in personas with the file's `[personas]` table layered on top.
    pub fn persona_table(&self) -> HashMap<String, String> {
        let mut table = builtin_personas();
        for (name, text) in &self.personas {
            table.insert(name.clone(), text.trim().to_string());
        }
        table
    }

    pub fn validate(&self) -> Result<(), ScenarioError> {
        for (name, scenario) in &self.scenarios {
            scenario.validate(name, &self.defaults)?;
        }
        Ok(())
    }
}

/// Load scenarios from a TOML file at the given path.
pub fn load_scenarios(path: &Path) -> Result<ScenarioFile, ScenarioError> {
    let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file = ScenarioFile::parse(&content).map_err(|source| ScenarioError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    file.validate()?;
    Ok(file)
}

/// Try well-known paths, falling back to [`BUILTIN_SCENARIOS`].
pub fn load_default_scenarios() -> Result<ScenarioFile, ScenarioError> {
    let candidates = ["scenarios.toml", "../scenarios.toml", "/etc/public-goods/scenarios.toml"];
    for path in &candidates {
        let p = Path::new(path);
        if p.exists() {
            match load_scenarios(p) {
                Ok(file) => {
                    tracing::info!(path = %p.display(), count = file.scenarios.len(), "loaded scenarios");
                    return Ok(file);
                }
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "failed to load scenarios");
                }
            }
        }
    }
    tracing::info!("no scenarios.toml found, using built-in scenarios");
    let file = ScenarioFile::parse(BUILTIN_SCENARIOS)?;
    file.validate()?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_scenarios_parse() {
        let file = ScenarioFile::parse(BUILTIN_SCENARIOS).unwrap();
        file.validate().unwrap();

        let mixed = file.scenario("mixed_tables").unwrap();
        assert_eq!(mixed.games, 200);
        assert_eq!(mixed.player_range(), (3, 6));
        assert_eq!(mixed.multiplier_range, Some([1.2, 2.5]));
        assert!(!mixed.uses_model());
        assert_eq!(mixed.base_config(&file.defaults).n_rounds, 50);

        let llm = file.scenario("llm_psychology").unwrap();
        assert!(llm.uses_model());
        assert!(llm.shuffle_seats);
        assert_eq!(llm.player_range(), (4, 4));
        assert_eq!(llm.base_config(&file.defaults).n_rounds, 200);
        assert_eq!(llm.model(&file.defaults), "gemma2");
    }

    #[test]
    fn test_strategy_kind_parsing() {
        assert_eq!("altruist".parse::<StrategyKind>().unwrap(), StrategyKind::Altruist);
        assert_eq!(
            "llm:greedy".parse::<StrategyKind>().unwrap(),
            StrategyKind::Model { persona: "greedy".into() }
        );
        assert!("llm:".parse::<StrategyKind>().is_err());
        assert!(matches!(
            "tit_for_tat".parse::<StrategyKind>(),
            Err(ScenarioError::UnknownStrategy(_))
        ));
        assert_eq!(StrategyKind::Model { persona: "x".into() }.to_string(), "llm:x");
    }

    #[test]
    fn test_unknown_strategy_in_file_fails_to_parse() {
        let content = r#"
            [scenarios.bad]
            roster = ["altruist", "grim_trigger"]
        "#;
        assert!(ScenarioFile::parse(content).is_err());
    }

    #[test]
    fn test_overrides_and_personas() {
        let content = r#"
            [defaults]
            endowment = 10
            model = "mistral"

            [backend]
            command = "llm-cli"
            args = ["--model", "{model}"]
            timeout_secs = 5

            [personas]
            skeptic = "You trust nobody."

            [scenarios.duel]
            roster = ["llm:skeptic", "free_rider"]
            multiplier = 1.9
            model = "llama3"
        "#;
        let file = ScenarioFile::parse(content).unwrap();
        file.validate().unwrap();
        let duel = file.scenario("duel").unwrap();
        let config = duel.base_config(&file.defaults);
        assert_eq!(config.endowment, 10.0);
        assert_eq!(config.multiplier, 1.9);
        assert_eq!(config.n_rounds, GameConfig::default().n_rounds);
        assert_eq!(duel.model(&file.defaults), "llama3");
        assert_eq!(file.backend.args_for("llama3"), vec!["--model", "llama3"]);
        assert_eq!(file.backend.timeout(), Duration::from_secs(5));

        let personas = file.persona_table();
        assert_eq!(personas["skeptic"], "You trust nobody.");
        assert!(personas.contains_key("altruist"));
    }

    #[test]
    fn test_validation_errors() {
        let empty = ScenarioFile::parse("[scenarios.empty]\ngames = 3\n").unwrap();
        assert!(matches!(empty.validate(), Err(ScenarioError::EmptyRoster(_))));

        let bad_range = ScenarioFile::parse(
            "[scenarios.r]\npool = [\"random\"]\nmin_players = 5\nmax_players = 2\n",
        )
        .unwrap();
        assert!(matches!(bad_range.validate(), Err(ScenarioError::PlayerRange { .. })));

        let bad_mult = ScenarioFile::parse(
            "[scenarios.m]\nroster = [\"random\"]\nmultiplier_range = [2.0, 1.0]\n",
        )
        .unwrap();
        assert!(matches!(bad_mult.validate(), Err(ScenarioError::MultiplierRange { .. })));

        let bad_config = ScenarioFile::parse(
            "[scenarios.c]\nroster = [\"random\"]\nendowment = -4\n",
        )
        .unwrap();
        assert!(matches!(bad_config.validate(), Err(ScenarioError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "[scenarios.solo]\nroster = [\"conditional_cooperator\"]\nn_rounds = 4").unwrap();
        let file = load_scenarios(tmp.path()).unwrap();
        assert_eq!(file.scenario("solo").unwrap().n_rounds, Some(4));
        assert!(matches!(file.scenario("nope"), Err(ScenarioError::UnknownScenario(_))));

        let missing = load_scenarios(Path::new("/nonexistent/scenarios.toml"));
        assert!(matches!(missing, Err(ScenarioError::Read { .. })));
    }
}
