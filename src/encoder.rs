// src/encoder.rs
//
// State discretization and canonical state hashing.
//
// Continuous game state is bucketed into a small categorical feature
// tuple; the tuple's SHA-256 digest is the identity key for the Q-value
// store. The hash covers each field in fixed declaration order, so
// identity is independent of any serialization's key ordering and stable
// across runs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EncoderConfig;
use crate::types::{GameState, TimingData};

/// Round phase bucketed by tick count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickPhase {
    Early,
    Mid,
    Late,
}

impl TickPhase {
    /// Stable lowercase name; also the hash token for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            TickPhase::Early => "early",
            TickPhase::Mid => "mid",
            TickPhase::Late => "late",
        }
    }
}

/// Recent price behavior relative to the round peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecentPattern {
    Rising,
    Falling,
    Volatile,
}

impl RecentPattern {
    /// Stable lowercase name; also the hash token for this field.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecentPattern::Rising => "rising",
            RecentPattern::Falling => "falling",
            RecentPattern::Volatile => "volatile",
        }
    }
}

/// Discretized game situation, the policy's state representation.
///
/// Field order is load-bearing: `state_hash` consumes the fields in
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameStateFeatures {
    /// Round phase (tick buckets at 50 / 200).
    pub tick_phase: TickPhase,
    /// ceil(price) clamped to 1..=5.
    pub price_level: u8,
    /// Distance from peak bucketed into 1 (calm) ..= 3 (high).
    pub volatility_level: u8,
    /// Timing reliability bucketed into 1 (noisy) ..= 3 (steady).
    pub timing_reliability: u8,
    /// Price trajectory relative to the peak.
    pub recent_pattern: RecentPattern,
}

/// Maps raw game state + timing into `GameStateFeatures`.
#[derive(Debug, Clone)]
pub struct StateEncoder {
    cfg: EncoderConfig,
}

impl StateEncoder {
    pub fn new(cfg: EncoderConfig) -> Self {
        Self { cfg }
    }

    /// Discretize one game state.
    ///
    /// Out-of-domain inputs (negative prices, zero peak) are clamped
    /// into the nearest bucket rather than rejected.
    pub fn encode(&self, state: &GameState, timing: &TimingData) -> GameStateFeatures {
        GameStateFeatures {
            tick_phase: self.tick_phase(state.tick_count),
            price_level: self.price_level(state.price),
            volatility_level: self.volatility_level(state.price, state.peak_price),
            timing_reliability: self.reliability_level(timing.reliability),
            recent_pattern: self.recent_pattern(state.price, state.peak_price),
        }
    }

    fn tick_phase(&self, tick: u32) -> TickPhase {
        if tick < self.cfg.early_phase_max {
            TickPhase::Early
        } else if tick < self.cfg.mid_phase_max {
            TickPhase::Mid
        } else {
            TickPhase::Late
        }
    }

    fn price_level(&self, price: f64) -> u8 {
        if !price.is_finite() || price <= 0.0 {
            return 1;
        }
        let level = price.ceil() as i64;
        level.clamp(1, self.cfg.price_level_max as i64) as u8
    }

    fn volatility_level(&self, price: f64, peak: f64) -> u8 {
        if !(price.is_finite() && peak.is_finite()) || peak <= 0.0 {
            return 1;
        }
        let drawdown = (price - peak).abs() / peak;
        if drawdown > self.cfg.vol_high {
            3
        } else if drawdown > self.cfg.vol_medium {
            2
        } else {
            1
        }
    }

    fn reliability_level(&self, reliability: f64) -> u8 {
        let r = reliability.clamp(0.0, 1.0);
        if r >= self.cfg.reliability_high {
            3
        } else if r >= self.cfg.reliability_medium {
            2
        } else {
            1
        }
    }

    fn recent_pattern(&self, price: f64, peak: f64) -> RecentPattern {
        if !(price.is_finite() && peak.is_finite()) || peak <= 0.0 {
            return RecentPattern::Volatile;
        }
        let ratio = price / peak;
        if ratio >= self.cfg.rising_threshold {
            RecentPattern::Rising
        } else if ratio < self.cfg.falling_threshold {
            RecentPattern::Falling
        } else {
            RecentPattern::Volatile
        }
    }
}

/// Canonical identity hash of a feature tuple.
///
/// Each field is fed to SHA-256 in declaration order with a field tag,
/// so distinct tuples cannot collide and identical tuples always produce
/// the same lowercase-hex digest.
pub fn state_hash(features: &GameStateFeatures) -> String {
    let mut hasher = Sha256::new();

    hasher.update(b"tick_phase=");
    hasher.update(features.tick_phase.as_str().as_bytes());
    hasher.update(b";price_level=");
    hasher.update([features.price_level]);
    hasher.update(b";volatility_level=");
    hasher.update([features.volatility_level]);
    hasher.update(b";timing_reliability=");
    hasher.update([features.timing_reliability]);
    hasher.update(b";recent_pattern=");
    hasher.update(features.recent_pattern.as_str().as_bytes());

    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
