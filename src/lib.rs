//! Iterated public-goods game simulator.
//!
//! Each round every player privately decides how much of a fixed endowment to
//! put into a shared pot; the pot is multiplied by a synergy factor and split
//! evenly among all players. The engine emits one flat record per player per
//! round for downstream analysis.

pub mod engine;
