// src/policy.rs
//
// Epsilon-greedy action selection.
//
// With probability ε the policy explores (uniform over the action set);
// otherwise it exploits the maximal Q-value, breaking ties in favor of
// the first-declared action. Selections are deterministic given the RNG
// seed, so seeded tests and replays reproduce exactly.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::BetConfig;
use crate::store::QAction;
use crate::types::ActionType;

/// One candidate the policy chooses among.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCandidate {
    pub action: QAction,
    /// Learned Q-value; 0.0 for never-updated pairs.
    pub q_value: f64,
}

/// The policy's choice plus its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSelection {
    pub action: QAction,
    pub q_value: f64,
    /// Normalized, visit-matured confidence in [0, 1].
    pub confidence: f64,
    /// True when this pick came from the exploration branch.
    pub explored: bool,
}

/// Visits at which the confidence maturity factor saturates.
const MATURITY_VISITS: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct EpsilonGreedy {
    rng: ChaCha8Rng,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self::new()
    }
}

impl EpsilonGreedy {
    /// Deterministic default seed; pass a seed for independent streams.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Select an action from `candidates` under exploration rate
    /// `epsilon`, with `state_visits` feeding the confidence maturity
    /// factor. Returns None only for an empty candidate set.
    pub fn select(
        &mut self,
        candidates: &[ActionCandidate],
        state_visits: u64,
        epsilon: f64,
    ) -> Option<ActionSelection> {
        if candidates.is_empty() {
            return None;
        }

        let epsilon = epsilon.clamp(0.0, 1.0);
        let explored = epsilon > 0.0 && self.rng.gen::<f64>() < epsilon;

        let chosen = if explored {
            &candidates[self.rng.gen_range(0..candidates.len())]
        } else {
            // Strictly-greater comparison keeps the first-declared
            // action on ties.
            let mut best = &candidates[0];
            for c in &candidates[1..] {
                if c.q_value > best.q_value {
                    best = c;
                }
            }
            best
        };

        let confidence = selection_confidence(candidates, chosen.q_value, state_visits);

        Some(ActionSelection {
            action: chosen.action.clone(),
            q_value: chosen.q_value,
            confidence,
            explored,
        })
    }
}

/// Confidence = position of the chosen Q-value within the candidate
/// range (0.5 when the range is zero), scaled by a visit-count maturity
/// factor min(1, visits / 100).
fn selection_confidence(candidates: &[ActionCandidate], chosen_q: f64, state_visits: u64) -> f64 {
    let min = candidates
        .iter()
        .map(|c| c.q_value)
        .fold(f64::INFINITY, f64::min);
    let max = candidates
        .iter()
        .map(|c| c.q_value)
        .fold(f64::NEG_INFINITY, f64::max);

    let spread = max - min;
    let normalized = if spread.abs() < f64::EPSILON {
        0.5
    } else {
        (chosen_q - min) / spread
    };

    let maturity = (state_visits as f64 / MATURITY_VISITS).min(1.0);
    (normalized * maturity).clamp(0.0, 1.0)
}

/// Stake for a non-Hold action: min(base_bet, bankroll × fraction)
/// scaled by the action's multiplier. Hold stakes nothing.
pub fn bet_amount(action: &QAction, bankroll: f64, betting: &BetConfig) -> Option<f64> {
    if action.action_type == ActionType::Hold {
        return None;
    }
    let bankroll = bankroll.max(0.0);
    let base = betting.base_bet.min(bankroll * betting.bankroll_fraction);
    Some(base * action.bet_size_multiplier)
}
