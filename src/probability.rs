// src/probability.rs
//
// Rug probability model.
//
// Maps tick count to a rug probability via piecewise-linear
// interpolation over fixed empirical anchors, adjusts it by the observed
// tick-rate ratio (damped, reliability-weighted), and derives the
// expected value, half-Kelly stake, and zone classification that make up
// a Prediction.

use crate::config::{ProbabilityConfig, TimingConfig};
use crate::types::{Prediction, TimingData, Zone};

#[derive(Debug, Clone)]
pub struct ProbabilityModel {
    cfg: ProbabilityConfig,
    timing_cfg: TimingConfig,
}

impl ProbabilityModel {
    pub fn new(cfg: ProbabilityConfig, timing_cfg: TimingConfig) -> Self {
        Self { cfg, timing_cfg }
    }

    /// Base rug probability at `tick`, from the anchor table.
    ///
    /// Ticks below the first anchor clamp to its probability; ticks
    /// beyond the last anchor clamp to its probability. Between anchors
    /// the probability is linearly interpolated.
    pub fn base_probability(&self, tick: f64) -> f64 {
        let anchors = &self.cfg.anchors;
        debug_assert!(!anchors.is_empty());

        let (first_tick, first_p) = anchors[0];
        if tick <= first_tick {
            return first_p;
        }
        let (last_tick, last_p) = anchors[anchors.len() - 1];
        if tick >= last_tick {
            return last_p;
        }

        for pair in anchors.windows(2) {
            let (t0, p0) = pair[0];
            let (t1, p1) = pair[1];
            if tick < t1 {
                let frac = (tick - t0) / (t1 - t0);
                return p0 + frac * (p1 - p0);
            }
        }

        last_p
    }

    /// Tick-rate ratio blended between observation and baseline.
    ///
    /// observed = current_rate / nominal, baseline = empirical_mean /
    /// nominal; the observation's weight is the timing reliability, so
    /// sparse or noisy windows lean on the baseline.
    fn blended_timing_ratio(&self, timing: &TimingData) -> f64 {
        let nominal = self.timing_cfg.nominal_interval_ms;
        let baseline_ratio = self.timing_cfg.empirical_mean_ms / nominal;

        let observed_ratio = if timing.current_rate > 0.0 {
            timing.current_rate / nominal
        } else {
            baseline_ratio
        };

        let reliability = timing.reliability.clamp(0.0, 1.0);
        let blended = reliability * observed_ratio + (1.0 - reliability) * baseline_ratio;

        // A non-positive ratio can only come from degenerate inputs;
        // fall back to the baseline rather than feeding powf a negative.
        if blended > 0.0 {
            blended
        } else {
            baseline_ratio
        }
    }

    /// Timing-adjusted rug probability, capped at `max_probability`.
    ///
    /// Slower-than-nominal ticks mean each tick spans more wall time, so
    /// the same tick count carries more hazard; the 0.3 exponent damps
    /// the adjustment.
    pub fn adaptive_probability(&self, tick: f64, timing: &TimingData) -> f64 {
        let base = self.base_probability(tick);
        let ratio = self.blended_timing_ratio(timing);
        let adjusted = base * ratio.powf(self.cfg.timing_damping);
        adjusted.clamp(0.0, self.cfg.max_probability)
    }

    /// Zone classification of a probability.
    ///
    /// Left-closed, right-open bands except the final one: probabilities
    /// at or above 0.90 (including exactly 1.0) are Certainty.
    pub fn zone(&self, probability: f64) -> Zone {
        let p = probability.clamp(0.0, 1.0);
        if p < 0.167 {
            Zone::Avoid
        } else if p < 0.25 {
            Zone::Caution
        } else if p < 0.50 {
            Zone::Opportunity
        } else if p < 0.75 {
            Zone::Strong
        } else if p < 0.90 {
            Zone::Excellent
        } else {
            Zone::Certainty
        }
    }

    /// Expected value per unit staked at net odds b: `b·p − 1`.
    pub fn expected_value(&self, probability: f64) -> f64 {
        self.cfg.net_odds * probability - 1.0
    }

    /// Half-Kelly stake for win probability `p` and the given bankroll,
    /// hard-capped at `kelly_cap` of bankroll and floored at zero (a
    /// negative edge stakes nothing).
    pub fn kelly_bet_size(&self, probability: f64, bankroll: f64) -> f64 {
        let p = probability.clamp(0.0, 1.0);
        let b = self.cfg.net_odds;
        let kelly = (b * p - (1.0 - p)) / b;
        let stake = kelly * bankroll * self.cfg.kelly_fraction;
        stake.clamp(0.0, self.cfg.kelly_cap * bankroll)
    }

    /// Assemble a full prediction for the current tick.
    pub fn predict(&self, tick: f64, timing: &TimingData) -> Prediction {
        let p = self.adaptive_probability(tick, timing);
        let zone = self.zone(p);
        let expected_value = self.expected_value(p);

        Prediction {
            rug_probability: p,
            expected_value,
            confidence: timing.reliability.clamp(0.0, 1.0),
            zone,
            recommendation: recommendation_text(zone, p),
        }
    }
}

/// Zone-derived recommendation line shown to the player.
fn recommendation_text(zone: Zone, probability: f64) -> String {
    let pct = probability * 100.0;
    match zone {
        Zone::Avoid => format!("Hold: {pct:.0}% rug chance cannot cover 5:1 odds"),
        Zone::Caution => format!("Hold: {pct:.0}% rug chance is below breakeven"),
        Zone::Opportunity => format!("Small bet viable: {pct:.0}% rug chance beats 5:1 breakeven"),
        Zone::Strong => format!("Bet: {pct:.0}% rug chance carries strong positive EV"),
        Zone::Excellent => format!("Bet aggressively: {pct:.0}% rug chance, EV near maximum"),
        Zone::Certainty => format!("Max conviction: {pct:.0}% rug chance within the window"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProbabilityConfig, TimingConfig};

    fn model() -> ProbabilityModel {
        ProbabilityModel::new(ProbabilityConfig::default(), TimingConfig::default())
    }

    /// TimingData whose blended ratio is exactly 1 (nominal rate at full
    /// reliability).
    fn neutral_timing() -> TimingData {
        TimingData {
            current_rate: 250.0,
            reliability: 1.0,
            variance: 0.0,
            mean: 250.0,
            median: 250.0,
        }
    }

    #[test]
    fn test_base_probability_at_anchors() {
        let m = model();
        assert!((m.base_probability(0.0) - 0.15).abs() < 1e-12);
        assert!((m.base_probability(100.0) - 0.50).abs() < 1e-12);
        assert!((m.base_probability(600.0) - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_base_probability_interpolates() {
        let m = model();
        // Halfway between the 0 and 50 anchors: (0.15 + 0.32) / 2.
        assert!((m.base_probability(25.0) - 0.235).abs() < 1e-12);
    }

    #[test]
    fn test_base_probability_clamps_out_of_domain() {
        let m = model();
        assert!((m.base_probability(-10.0) - 0.15).abs() < 1e-12);
        assert!((m.base_probability(10_000.0) - 0.98).abs() < 1e-12);
    }

    #[test]
    fn test_zone_boundaries_left_closed() {
        let m = model();
        assert_eq!(m.zone(0.0), Zone::Avoid);
        assert_eq!(m.zone(0.167), Zone::Caution);
        assert_eq!(m.zone(0.25), Zone::Opportunity);
        assert_eq!(m.zone(0.50), Zone::Strong);
        assert_eq!(m.zone(0.75), Zone::Excellent);
        assert_eq!(m.zone(0.90), Zone::Certainty);
        assert_eq!(m.zone(1.0), Zone::Certainty);
    }

    #[test]
    fn test_scenario_tick_zero_is_avoid() {
        let m = model();
        let p = m.base_probability(0.0);
        assert!((p - 0.15).abs() < 1e-12);
        assert_eq!(m.zone(p), Zone::Avoid);
    }

    #[test]
    fn test_scenario_tick_200_neutral_timing() {
        let m = model();
        let p = m.adaptive_probability(200.0, &neutral_timing());
        assert!((p - 0.74).abs() < 1e-9, "expected 0.74, got {p}");
        assert_eq!(m.zone(p), Zone::Strong);
        assert!((m.expected_value(p) - 1.96).abs() < 1e-9);
    }

    #[test]
    fn test_slow_ticks_raise_probability() {
        let m = model();
        let slow = TimingData {
            current_rate: 400.0,
            ..neutral_timing()
        };
        let p_neutral = m.adaptive_probability(150.0, &neutral_timing());
        let p_slow = m.adaptive_probability(150.0, &slow);
        assert!(p_slow > p_neutral);
    }

    #[test]
    fn test_kelly_negative_edge_stakes_nothing() {
        let m = model();
        // p = 0.15 ⇒ kelly fraction (0.6 − 0.85) / 4 < 0.
        assert_eq!(m.kelly_bet_size(0.15, 100.0), 0.0);
    }

    #[test]
    fn test_kelly_capped_at_twenty_percent() {
        let m = model();
        let stake = m.kelly_bet_size(1.0, 100.0);
        assert!(stake <= 20.0 + 1e-12);
    }

    #[test]
    fn test_predict_assembles_fields() {
        let m = model();
        let pred = m.predict(200.0, &neutral_timing());
        assert_eq!(pred.zone, Zone::Strong);
        assert!((pred.rug_probability - 0.74).abs() < 1e-9);
        assert_eq!(pred.confidence, 1.0);
        assert!(!pred.recommendation.is_empty());
    }
}
