// src/timing.rs
//
// Tick timing model.
//
// Tracks inter-tick intervals in a fixed-capacity rolling window and
// derives a current tick rate plus a reliability score relative to the
// empirical baseline in TimingConfig. When live samples are sparse the
// estimates blend toward the baseline rather than extrapolating from
// noise.

use std::collections::VecDeque;

use crate::config::TimingConfig;
use crate::metrics::{window_mean, window_median, window_stddev};
use crate::types::{GameState, TimestampMs, TimingData};

/// One observed tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSample {
    /// Tick index within the round.
    pub tick: u32,
    /// Price at this tick.
    pub price: f64,
    /// Wall-clock timestamp of the observation.
    pub timestamp_ms: TimestampMs,
    /// Interval since the prior observed tick, in milliseconds.
    pub interval_ms: f64,
}

/// Rolling tick timing model.
///
/// The sample window is a fixed-capacity ring: once `sample_window`
/// samples are held, each new sample evicts the oldest in O(1).
#[derive(Debug, Clone)]
pub struct TickTimingModel {
    cfg: TimingConfig,
    window: VecDeque<TickSample>,
    last_timestamp_ms: Option<TimestampMs>,
}

impl TickTimingModel {
    pub fn new(cfg: TimingConfig) -> Self {
        let cap = cfg.sample_window;
        Self {
            cfg,
            window: VecDeque::with_capacity(cap),
            last_timestamp_ms: None,
        }
    }

    /// Record one tick observation at `now_ms`.
    ///
    /// The interval is the wall-clock delta since the previous call; the
    /// very first sample uses the empirical mean as its interval.
    pub fn record_tick(&mut self, state: &GameState, now_ms: TimestampMs) {
        let interval_ms = match self.last_timestamp_ms {
            // Out-of-order or duplicate timestamps are clamped to zero
            // rather than recorded as negative intervals.
            Some(prev) => ((now_ms - prev) as f64).max(0.0),
            None => self.cfg.empirical_mean_ms,
        };
        self.last_timestamp_ms = Some(now_ms);

        if self.window.len() == self.cfg.sample_window {
            self.window.pop_front();
        }
        self.window.push_back(TickSample {
            tick: state.tick_count,
            price: state.price,
            timestamp_ms: now_ms,
            interval_ms,
        });
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Drop all samples (round boundary; intervals across rounds are
    /// not meaningful).
    pub fn reset(&mut self) {
        self.window.clear();
        self.last_timestamp_ms = None;
    }

    /// Intervals of the most recent `n` samples, oldest first.
    fn recent_intervals(&self, n: usize) -> Vec<f64> {
        let skip = self.window.len().saturating_sub(n);
        self.window.iter().skip(skip).map(|s| s.interval_ms).collect()
    }

    /// Average interval over the rate window, linearly blended toward
    /// the empirical mean as the sample count falls below the window
    /// size (weight = min(n / rate_window, 1)).
    pub fn current_tick_rate(&self) -> f64 {
        let intervals = self.recent_intervals(self.cfg.rate_window);
        if intervals.is_empty() {
            return self.cfg.empirical_mean_ms;
        }

        let observed = window_mean(&intervals);
        let weight = (intervals.len() as f64 / self.cfg.rate_window as f64).min(1.0);
        weight * observed + (1.0 - weight) * self.cfg.empirical_mean_ms
    }

    /// Timing reliability in [0, 1].
    ///
    /// Compares the coefficient of variation of the recent intervals
    /// against the empirical baseline CV: steadier-than-baseline timing
    /// scores 1.0, noisier timing decays toward 0. With fewer than
    /// `min_samples` observations, returns the neutral cold-start
    /// default `clamp(1 − baseline_cv, 0, 1)`.
    pub fn reliability_score(&self) -> f64 {
        if self.window.len() < self.cfg.min_samples {
            return (1.0 - self.cfg.baseline_cv).clamp(0.0, 1.0);
        }

        let intervals = self.recent_intervals(self.cfg.reliability_window);
        let mean = window_mean(&intervals);
        if mean <= f64::EPSILON {
            return (1.0 - self.cfg.baseline_cv).clamp(0.0, 1.0);
        }

        let cv = window_stddev(&intervals) / mean;
        if cv <= f64::EPSILON {
            // Perfectly regular ticks: as reliable as it gets.
            return 1.0;
        }

        (self.cfg.baseline_cv / cv).clamp(0.0, 1.0)
    }

    /// Snapshot the current window as a `TimingData` for the probability
    /// model and state encoder.
    pub fn snapshot(&self) -> TimingData {
        let intervals: Vec<f64> = self.window.iter().map(|s| s.interval_ms).collect();

        let (variance, mean, median) = if intervals.is_empty() {
            (0.0, self.cfg.empirical_mean_ms, self.cfg.empirical_mean_ms)
        } else {
            let sd = window_stddev(&intervals);
            (
                sd * sd,
                window_mean(&intervals),
                window_median(&intervals),
            )
        };

        TimingData {
            current_rate: self.current_tick_rate(),
            reliability: self.reliability_score(),
            variance,
            mean,
            median,
        }
    }
}
