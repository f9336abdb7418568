//! Model-backed strategy: describes the game and a persona to a
//! text-generation service and reads the contribution out of its reply.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::engine::bot_strategy::{uniform_tokens, Strategy};
use crate::engine::completion::CompletionBackend;
use crate::engine::error::DecisionError;
use crate::engine::models::*;

/// How many past rounds are summarised in each prompt.
pub const HISTORY_WINDOW: usize = 3;

/// Persona used when a name is not found in the persona table.
pub const FALLBACK_PERSONA: &str = "adaptive";

const ALTRUIST: &str = "\
You are a benevolent cooperator. The success of the group matters more to you than your own.
- You usually contribute high amounts (between 75% and 100% of the endowment) to set an example.
- If others contribute little, do not retaliate at once. Keep contributing high for a round or two to see whether they change.
- Only when abuse is blatant and repeated, lower your contribution to protect yourself, but stay above the group average.
Your goal is to inspire trust.";

const GREEDY: &str = "\
You are an opportunistic calculator. The others are there to fill the pot; you are there to collect it.
- Your goal is to finish with a higher individual score than everyone else.
- Do not contribute 0 every time, or the others will stop contributing and the pot will be empty.
- Contribute a little LESS than the observed average (if they put 15, put 8 or 10).
- Look cooperative, but always keep a profit margin for yourself.";

const ADAPTIVE: &str = "\
You are a pragmatic and fair player. Tit for tat: you refuse to be either the sucker or the villain.
- Look at the history: how much did the others contribute last round?
- Contribute roughly the same as the others' average.
- When trust holds, raise your contribution towards the maximum.
- When you sense betrayal (low contributions), lower your contribution immediately next round.
Be fair: neither naive nor a thief.";

/// Built-in persona instructions keyed by persona name.
pub fn builtin_personas() -> HashMap<String, String> {
    [("altruist", ALTRUIST), ("greedy", GREEDY), ("adaptive", ADAPTIVE)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Resolve a persona name to its instructions, falling back to `adaptive`.
pub fn persona_instructions(personas: &HashMap<String, String>, persona: &str) -> String {
    personas
        .get(persona)
        .or_else(|| personas.get(FALLBACK_PERSONA))
        .cloned()
        .unwrap_or_else(|| ADAPTIVE.to_string())
}

/// Strategy that asks an external model for each decision.
pub struct PersonaStrategy {
    persona: String,
    instructions: String,
    model: String,
    multiplier: f64,
    backend: Arc<dyn CompletionBackend>,
    rng: StdRng,
}

impl PersonaStrategy {
    /// `multiplier` is only used to describe the rules in the prompt.
    pub fn new(
        persona: impl Into<String>,
        instructions: impl Into<String>,
        model: impl Into<String>,
        multiplier: f64,
        backend: Arc<dyn CompletionBackend>,
        seed: u64,
    ) -> Self {
        Self {
            persona: persona.into(),
            instructions: instructions.into(),
            model: model.into(),
            multiplier,
            backend,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn build_prompt(&self, history: &[RoundRecord], my_id: PlayerId, endowment: f64) -> String {
        let mut situation = String::new();
        if history.is_empty() {
            situation.push_str("This is the very first round. You do not know the other players yet.");
        } else {
            situation.push_str("### Recent rounds:\n");
            let start = history.len().saturating_sub(HISTORY_WINDOW);
            for record in &history[start..] {
                let mine = record.contribution_of(my_id).unwrap_or(0.0);
                let others = record.others_mean(my_id).unwrap_or(0.0);
                let _ = writeln!(
                    situation,
                    "- Round {}: I contributed {}/{}. The others contributed {:.1}/{} on average. Total pot: {}.",
                    record.round, mine, endowment, others, endowment, record.total_pot
                );
            }
        }

        format!(
            "CONTEXT:\n\
             You are playing a repeated Public Goods Game against other players.\n\
             \n\
             RULES:\n\
             - Endowment per round: {endowment} tokens.\n\
             - Your contribution: between 0 and {endowment}.\n\
             - The common pot is multiplied by {multiplier} (synergy) and then split equally among all players.\n\
             - Your gain = (what you keep) + (your share of the pot).\n\
             \n\
             YOUR ROLE:\n\
             {instructions}\n\
             \n\
             CURRENT SITUATION:\n\
             {situation}\n\
             \n\
             YOUR DECISION:\n\
             How much do you contribute this round? Think about the situation according to your role.\n\
             \n\
             EXPECTED ANSWER FORMAT:\n\
             Answer ONLY with a whole number (nothing else, no text).\n\
             Example: 12\n",
            endowment = endowment,
            multiplier = self.multiplier,
            instructions = self.instructions,
            situation = situation.trim_end(),
        )
    }
}

impl Strategy for PersonaStrategy {
    fn decide_contribution(
        &mut self,
        history: &[RoundRecord],
        my_id: PlayerId,
        endowment: f64,
    ) -> Result<f64, DecisionError> {
        let prompt = self.build_prompt(history, my_id, endowment);
        let reply = self.backend.complete(&prompt)?;

        match first_integer(&reply) {
            Some(value) => Ok(value),
            None => {
                let fallback = uniform_tokens(&mut self.rng, endowment);
                tracing::warn!(
                    round = history.len() + 1,
                    player_id = my_id,
                    strategy = %self.name(),
                    fallback,
                    "no number in model reply, contributing at random"
                );
                Ok(fallback)
            }
        }
    }

    fn name(&self) -> String {
        format!("llm_{}_{}", self.persona, self.model)
    }
}

/// First run of ASCII digits in `text`, as a number. Signs and decimal
/// points are not part of the literal: "-5" reads as 5, "7.9" as 7.
/// Non-ASCII decimal digits such as full-width "１２" are not recognised.
pub fn first_integer(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: &str = &text[start..];
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<f64>().ok()
}
