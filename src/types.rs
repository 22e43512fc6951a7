// src/types.rs
//
// Common shared types for the Rugpulse decision engine.

use serde::{Deserialize, Serialize};

/// Millisecond timestamp since Unix epoch.
pub type TimestampMs = i64;

/// Raw game state delivered by the upstream feed relay.
///
/// This is the consumed half of the external contract: the transport
/// client (out of scope here) translates game events into this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Tick counter of the current round (resets each round).
    pub tick_count: u32,
    /// Current price multiplier.
    pub price: f64,
    /// Whether a round is currently running.
    pub active: bool,
    /// Cooldown timer between rounds (ticks; 0 while a round runs).
    pub cooldown_timer: i64,
    /// Highest price seen so far in this round.
    pub peak_price: f64,
    /// Identifier of the current round, when known.
    pub game_id: Option<String>,
    /// Feed-side timestamp of this state, when provided.
    pub timestamp_ms: Option<TimestampMs>,
}

/// Timing statistics snapshot derived from observed inter-tick intervals.
///
/// Produced by the timing model, consumed by the probability model and
/// the state encoder. All interval figures are in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingData {
    /// Blended average interval over the recent rate window.
    pub current_rate: f64,
    /// Reliability of the observed timing vs. the empirical baseline, in [0, 1].
    pub reliability: f64,
    /// Sample variance of the windowed intervals.
    pub variance: f64,
    /// Mean of the windowed intervals.
    pub mean: f64,
    /// Median of the windowed intervals.
    pub median: f64,
}

/// Discrete risk/opportunity classification of a rug probability.
///
/// The six bands are contiguous, non-overlapping, and cover [0, 1]
/// exactly once; all boundaries are left-closed, right-open except the
/// final band which includes 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Zone {
    Avoid,
    Caution,
    Opportunity,
    Strong,
    Excellent,
    Certainty,
}

impl Zone {
    /// Stable lowercase name used in logs/telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Avoid => "avoid",
            Zone::Caution => "caution",
            Zone::Opportunity => "opportunity",
            Zone::Strong => "strong",
            Zone::Excellent => "excellent",
            Zone::Certainty => "certainty",
        }
    }
}

/// Point-in-time rug estimate. Recomputed every tick, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Probability the round ends within the bet window, in [0, 1].
    pub rug_probability: f64,
    /// Expected value per unit staked at 5:1 payout odds.
    pub expected_value: f64,
    /// Confidence in the estimate, in [0, 1].
    pub confidence: f64,
    /// Zone classification of `rug_probability`.
    pub zone: Zone,
    /// Human-readable recommendation derived from the zone.
    pub recommendation: String,
}

/// Fixed action set available to the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    Hold,
    BetSmall,
    BetMedium,
    BetLarge,
}

impl ActionType {
    /// All actions in declaration order. The policy breaks Q-value ties
    /// by this order.
    pub const ALL: [ActionType; 4] = [
        ActionType::Hold,
        ActionType::BetSmall,
        ActionType::BetMedium,
        ActionType::BetLarge,
    ];

    /// Stable lowercase name used in logs/telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Hold => "hold",
            ActionType::BetSmall => "bet_small",
            ActionType::BetMedium => "bet_medium",
            ActionType::BetLarge => "bet_large",
        }
    }

    /// Whether this action places a wager.
    pub fn is_bet(&self) -> bool {
        !matches!(self, ActionType::Hold)
    }
}

/// One decision returned to the application layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Selected action.
    pub action: ActionType,
    /// Confidence in the selection, in [0, 1].
    pub confidence: f64,
    /// Expected value of the current prediction.
    pub expected_value: f64,
    /// Learned Q-value of the selected action in the current state.
    pub q_value: f64,
    /// Human-readable explanation of the selection.
    pub reasoning: String,
    /// Stake to place; None for Hold.
    pub bet_amount: Option<f64>,
    /// Whether Q-learning updates are currently enabled.
    pub learning_enabled: bool,
}

/// Resolution state of a side bet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetOutcome {
    Pending,
    Win,
    Loss,
}

impl BetOutcome {
    /// Stable lowercase name used in logs/telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            BetOutcome::Pending => "pending",
            BetOutcome::Win => "win",
            BetOutcome::Loss => "loss",
        }
    }
}

/// A placed wager on the round ending within a fixed tick window.
///
/// Resolved exactly once: either when the round ends or when the window
/// expires while the round continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideBet {
    /// Round this bet belongs to.
    pub game_id: String,
    /// Tick at which the bet was placed.
    pub start_tick: u32,
    /// Last tick covered by the bet window (start_tick + window).
    pub end_tick: u32,
    /// Stake.
    pub bet_amount: f64,
    /// Gross payout (0 until resolved; stake × payout multiplier on a win).
    pub payout: f64,
    /// Resolution state.
    pub outcome: BetOutcome,
    /// Net profit (payout − stake on a win, −stake on a loss, 0 pending).
    pub profit: f64,
    /// When the bet was placed.
    pub placed_at_ms: TimestampMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_order_is_stable() {
        // Tie-breaking in the policy depends on this declaration order.
        assert_eq!(ActionType::ALL[0], ActionType::Hold);
        assert_eq!(ActionType::ALL[1], ActionType::BetSmall);
        assert_eq!(ActionType::ALL[2], ActionType::BetMedium);
        assert_eq!(ActionType::ALL[3], ActionType::BetLarge);
    }

    #[test]
    fn test_hold_is_not_a_bet() {
        assert!(!ActionType::Hold.is_bet());
        assert!(ActionType::BetSmall.is_bet());
        assert!(ActionType::BetMedium.is_bet());
        assert!(ActionType::BetLarge.is_bet());
    }

    #[test]
    fn test_side_bet_serialization_roundtrip() {
        let bet = SideBet {
            game_id: "g-1".to_string(),
            start_tick: 120,
            end_tick: 160,
            bet_amount: 0.02,
            payout: 0.0,
            outcome: BetOutcome::Pending,
            profit: 0.0,
            placed_at_ms: 1_700_000_000_000,
        };

        let json = serde_json::to_string(&bet).unwrap();
        let parsed: SideBet = serde_json::from_str(&json).unwrap();
        assert_eq!(bet, parsed);
    }
}
