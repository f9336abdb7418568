//! Error types for configuration, decisions, the completion backend,
//! scenario files and export.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Invalid game configuration, rejected before round 1.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("a game needs at least one player")]
    NoPlayers,
    #[error("endowment must be a finite non-negative number, got {0}")]
    InvalidEndowment(f64),
    #[error("multiplier must be a finite non-negative number, got {0}")]
    InvalidMultiplier(f64),
    #[error("a game needs at least one round")]
    NoRounds,
}

/// A strategy failed to produce a usable contribution. The engine records 0
/// for that player and round and keeps going.
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("strategy fault: {0}")]
    Strategy(String),
    #[error("strategy returned a non-finite contribution ({0})")]
    NonFinite(f64),
    #[error("completion service fault: {0}")]
    Service(#[from] CompletionError),
}

impl DecisionError {
    /// True when the fault came from the external text-generation service.
    pub fn is_service_fault(&self) -> bool {
        matches!(self, DecisionError::Service(_))
    }
}

/// Failure talking to the external text-generation service.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("i/o error talking to completion process: {0}")]
    Io(#[from] std::io::Error),
    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion process exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },
    #[error("completion output is not valid UTF-8")]
    InvalidUtf8,
    #[error("completion returned an empty reply")]
    EmptyReply,
}

/// Scenario file and roster construction failures.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid built-in scenarios: {0}")]
    BuiltIn(#[from] toml::de::Error),
    #[error("unknown strategy '{0}' (expected altruist, free_rider, random, conditional_cooperator or llm:<persona>)")]
    UnknownStrategy(String),
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),
    #[error("scenario '{0}' needs either a roster or a non-empty pool")]
    EmptyRoster(String),
    #[error("scenario '{scenario}': invalid player range {min}..={max}")]
    PlayerRange {
        scenario: String,
        min: usize,
        max: usize,
    },
    #[error("scenario '{scenario}': invalid multiplier range [{lo}, {hi}]")]
    MultiplierRange { scenario: String, lo: f64, hi: f64 },
    #[error("scenario '{0}' seats model-backed players but no completion backend was provided")]
    MissingBackend(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure writing or reading the exported record table.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}
