// src/config.rs
//
// Central configuration for the Rugpulse engine.
// This is the single source of truth for every model constant: the
// empirical timing baseline, the probability anchor table, state
// discretization boundaries, Q-learning hyperparameters, and bet sizing.

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Human-readable config / release version.
    pub version: &'static str,
    /// Tick timing model (empirical baseline, windows).
    pub timing: TimingConfig,
    /// Rug probability model (anchors, odds, Kelly sizing).
    pub probability: ProbabilityConfig,
    /// State discretization boundaries.
    pub encoder: EncoderConfig,
    /// Q-learning hyperparameters.
    pub learning: LearningConfig,
    /// Side bet window and stake sizing.
    pub betting: BetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "rugpulse-0.1.0",
            timing: TimingConfig::default(),
            probability: ProbabilityConfig::default(),
            encoder: EncoderConfig::default(),
            learning: LearningConfig::default(),
            betting: BetConfig::default(),
        }
    }
}

/// Tick timing model configuration.
///
/// The empirical baseline constants were measured over historical rounds
/// and stabilize estimates while the live sample window is still sparse.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Nominal (theoretical) tick interval in milliseconds.
    pub nominal_interval_ms: f64,
    /// Empirical mean tick interval in milliseconds.
    pub empirical_mean_ms: f64,
    /// Empirical coefficient of variation (stdev / mean) of intervals.
    pub baseline_cv: f64,
    /// Rolling sample window capacity.
    pub sample_window: usize,
    /// Number of most-recent intervals used for the tick rate.
    pub rate_window: usize,
    /// Number of most-recent intervals used for the reliability score.
    pub reliability_window: usize,
    /// Below this many samples, estimates blend toward the baseline.
    pub min_samples: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            nominal_interval_ms: 250.0,
            empirical_mean_ms: 271.5,
            baseline_cv: 1.09,
            sample_window: 100,
            rate_window: 20,
            reliability_window: 50,
            min_samples: 20,
        }
    }
}

/// Rug probability model configuration.
#[derive(Debug, Clone)]
pub struct ProbabilityConfig {
    /// (tick, probability) anchors for piecewise-linear interpolation.
    /// Must be sorted by tick, strictly increasing in both columns.
    pub anchors: Vec<(f64, f64)>,
    /// Hard cap on any probability the model emits.
    pub max_probability: f64,
    /// Exponent damping the timing-ratio adjustment.
    pub timing_damping: f64,
    /// Net odds b of the side bet (5:1 payout ⇒ b = 4).
    pub net_odds: f64,
    /// Fraction of full Kelly to stake (0.5 = half-Kelly).
    pub kelly_fraction: f64,
    /// Hard cap on the Kelly stake as a fraction of bankroll.
    pub kelly_cap: f64,
}

impl Default for ProbabilityConfig {
    fn default() -> Self {
        Self {
            anchors: vec![
                (0.0, 0.15),
                (50.0, 0.32),
                (100.0, 0.50),
                (150.0, 0.58),
                (200.0, 0.74),
                (250.0, 0.80),
                (300.0, 0.88),
                (400.0, 0.93),
                (500.0, 0.96),
                (600.0, 0.98),
            ],
            max_probability: 0.98,
            timing_damping: 0.3,
            net_odds: 4.0,
            kelly_fraction: 0.5,
            kelly_cap: 0.2,
        }
    }
}

/// State discretization boundaries for the encoder.
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    /// Ticks strictly below this are the early phase.
    pub early_phase_max: u32,
    /// Ticks strictly below this (and not early) are the mid phase.
    pub mid_phase_max: u32,
    /// Price level ceiling (levels are 1..=price_level_max).
    pub price_level_max: u8,
    /// |price − peak| / peak above this is high volatility.
    pub vol_high: f64,
    /// |price − peak| / peak above this is medium volatility.
    pub vol_medium: f64,
    /// Timing reliability at or above this is the top band.
    pub reliability_high: f64,
    /// Timing reliability at or above this is the middle band.
    pub reliability_medium: f64,
    /// Price at or above this fraction of peak reads as rising.
    pub rising_threshold: f64,
    /// Price strictly below this fraction of peak reads as falling.
    pub falling_threshold: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            early_phase_max: 50,
            mid_phase_max: 200,
            price_level_max: 5,
            vol_high: 0.10,
            vol_medium: 0.05,
            reliability_high: 0.75,
            reliability_medium: 0.40,
            rising_threshold: 0.95,
            falling_threshold: 0.80,
        }
    }
}

/// Q-learning hyperparameters.
#[derive(Debug, Clone)]
pub struct LearningConfig {
    /// Learning rate α.
    pub alpha: f64,
    /// Discount factor γ.
    pub gamma: f64,
    /// Initial exploration rate ε₀ (used when the store has no persisted ε).
    pub epsilon: f64,
    /// Exploration floor ε_min.
    pub epsilon_min: f64,
    /// Per-episode multiplicative exploration decay.
    pub epsilon_decay: f64,
    /// Reward applied to every non-terminal step (time cost).
    pub step_penalty: f64,
    /// Terminal reward for a round that did not win.
    pub loss_reward: f64,
    /// Whether Bellman updates and exploration decay run at all.
    /// When disabled the policy exploits only and Q-values freeze.
    pub enabled: bool,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.95,
            epsilon: 0.3,
            epsilon_min: 0.05,
            epsilon_decay: 0.995,
            step_penalty: -0.01,
            loss_reward: -1.0,
            enabled: true,
        }
    }
}

/// Side bet window and stake sizing.
#[derive(Debug, Clone)]
pub struct BetConfig {
    /// Bet window length in ticks (end_tick = start_tick + window_ticks).
    pub window_ticks: u32,
    /// Gross payout multiplier on a win (5:1).
    pub payout_multiplier: f64,
    /// Absolute cap on the base stake.
    pub base_bet: f64,
    /// Base stake as a fraction of bankroll.
    pub bankroll_fraction: f64,
    /// Stake multiplier per action: (small, medium, large).
    pub multipliers: (f64, f64, f64),
}

impl Default for BetConfig {
    fn default() -> Self {
        Self {
            window_ticks: 40,
            payout_multiplier: 5.0,
            base_bet: 0.05,
            bankroll_fraction: 0.02,
            multipliers: (0.5, 1.0, 2.0),
        }
    }
}

impl BetConfig {
    /// Stake multiplier for an action type.
    pub fn multiplier_for(&self, action: crate::types::ActionType) -> f64 {
        use crate::types::ActionType;
        match action {
            ActionType::Hold => 0.0,
            ActionType::BetSmall => self.multipliers.0,
            ActionType::BetMedium => self.multipliers.1,
            ActionType::BetLarge => self.multipliers.2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionType;

    #[test]
    fn test_default_anchors_sorted_and_monotone() {
        let cfg = ProbabilityConfig::default();
        for pair in cfg.anchors.windows(2) {
            assert!(pair[0].0 < pair[1].0, "anchor ticks must increase");
            assert!(pair[0].1 <= pair[1].1, "anchor probabilities must not decrease");
        }
    }

    #[test]
    fn test_multiplier_mapping() {
        let cfg = BetConfig::default();
        assert_eq!(cfg.multiplier_for(ActionType::Hold), 0.0);
        assert_eq!(cfg.multiplier_for(ActionType::BetSmall), 0.5);
        assert_eq!(cfg.multiplier_for(ActionType::BetMedium), 1.0);
        assert_eq!(cfg.multiplier_for(ActionType::BetLarge), 2.0);
    }
}
