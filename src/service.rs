// src/service.rs
//
// Decision service: the orchestration layer over the timing model,
// probability model, state encoder, policy, learner, and store.
//
// The service is an explicit object over an injected store and telemetry
// sink; there is no module-level state, so independent instances (one
// per test, per simulation, per deployment) never interfere.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::encoder::StateEncoder;
use crate::learner::QLearner;
use crate::logging::{EngineEvent, EventRecord, EventSink};
use crate::policy::{bet_amount, ActionCandidate, EpsilonGreedy};
use crate::probability::ProbabilityModel;
use crate::store::{seed_actions, LearningStore, QAction, StoreError};
use crate::timing::TickTimingModel;
use crate::types::{
    BetOutcome, Decision, GameState, Prediction, SideBet, TimestampMs, TimingData,
};

/// Aggregated performance view for the application layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_bets: u64,
    pub wins: u64,
    pub losses: u64,
    pub pending: u64,
    pub win_rate: f64,
    pub total_profit: f64,
    pub episodes_started: u64,
    pub episodes_recorded: u64,
    pub exploration_rate: f64,
    pub learning_enabled: bool,
}

/// Orchestrates one decision engine instance.
pub struct DecisionService {
    cfg: Config,
    store: Arc<dyn LearningStore>,
    timing: TickTimingModel,
    probability: ProbabilityModel,
    encoder: StateEncoder,
    policy: EpsilonGreedy,
    learner: QLearner,
    /// The seeded action set, fetched once at startup.
    actions: Vec<QAction>,
    /// At most one active (unresolved) bet per game.
    active_bets: HashMap<String, SideBet>,
    sink: Box<dyn EventSink>,
}

impl DecisionService {
    /// Build a service over an injected store and telemetry sink.
    /// Seeds the fixed action set on first run and restores persisted
    /// learning state.
    pub fn new(
        cfg: Config,
        store: Arc<dyn LearningStore>,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, StoreError> {
        let actions = seed_actions(store.as_ref(), &cfg.betting)?;
        let learner = QLearner::new(store.clone(), cfg.learning.clone())?;
        let timing = TickTimingModel::new(cfg.timing.clone());
        let probability = ProbabilityModel::new(cfg.probability.clone(), cfg.timing.clone());
        let encoder = StateEncoder::new(cfg.encoder.clone());

        Ok(Self {
            cfg,
            store,
            timing,
            probability,
            encoder,
            policy: EpsilonGreedy::new(),
            learner,
            actions,
            active_bets: HashMap::new(),
            sink,
        })
    }

    /// Replace the policy RNG seed (independent exploration streams).
    pub fn with_policy_seed(mut self, seed: u64) -> Self {
        self.policy = EpsilonGreedy::with_seed(seed);
        self
    }

    /// Current timing snapshot for the probability model / encoder.
    pub fn timing_snapshot(&self) -> TimingData {
        self.timing.snapshot()
    }

    /// Current exploration rate.
    pub fn exploration_rate(&self) -> f64 {
        self.learner.epsilon()
    }

    /// Ingest one tick: updates the timing window, resolves any bet
    /// whose window has expired while the round continues, and returns
    /// the fresh prediction.
    pub fn record_tick(&mut self, state: &GameState) -> Result<Prediction, StoreError> {
        let now_ms = resolve_now(state);
        self.timing.record_tick(state, now_ms);

        if let Some(game_id) = state.game_id.clone() {
            self.expire_stale_bet(&game_id, state.tick_count, now_ms)?;
        }

        let timing = self.timing.snapshot();
        let prediction = self.probability.predict(state.tick_count as f64, &timing);

        self.emit(
            now_ms,
            EngineEvent::Prediction {
                game_id: state.game_id.clone(),
                tick: state.tick_count,
                rug_probability: prediction.rug_probability,
                expected_value: prediction.expected_value,
                confidence: prediction.confidence,
                zone: prediction.zone,
            },
        );

        Ok(prediction)
    }

    /// Encode the state, look up the Q-row, and run the policy.
    ///
    /// Pairs never updated default to Q = 0 rather than erroring. The
    /// chosen (state, action) step is appended to the open episode when
    /// one exists.
    pub fn get_recommendation(
        &mut self,
        state: &GameState,
        timing: &TimingData,
        bankroll: f64,
    ) -> Result<Decision, StoreError> {
        let now_ms = resolve_now(state);

        let features = self.encoder.encode(state, timing);
        let q_state = self.store.get_or_create_q_state(&features, now_ms)?;

        let mut candidates = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            let q_value = self
                .store
                .get_q_value(q_state.id, action.id)?
                .map(|v| v.q_value)
                .unwrap_or(0.0);
            candidates.push(ActionCandidate {
                action: action.clone(),
                q_value,
            });
        }

        let epsilon = if self.learner.enabled() {
            self.learner.epsilon()
        } else {
            0.0
        };

        let selection = self
            .policy
            .select(&candidates, q_state.visit_count, epsilon)
            .ok_or_else(|| StoreError::Backend("action set is empty".to_string()))?;

        if self.learner.open_game_id().is_some() {
            self.learner
                .record_state_action(q_state.id, selection.action.id);
        }

        let p = self
            .probability
            .adaptive_probability(state.tick_count as f64, timing);
        let expected_value = self.probability.expected_value(p);
        let stake = bet_amount(&selection.action, bankroll, &self.cfg.betting);

        let reasoning = if selection.explored {
            format!(
                "explore (eps={:.3}): random {} at tick {}",
                epsilon,
                selection.action.action_type.as_str(),
                state.tick_count,
            )
        } else {
            format!(
                "exploit: {} has max q={:.3} ({} state visits)",
                selection.action.action_type.as_str(),
                selection.q_value,
                q_state.visit_count,
            )
        };

        let decision = Decision {
            action: selection.action.action_type,
            confidence: selection.confidence,
            expected_value,
            q_value: selection.q_value,
            reasoning,
            bet_amount: stake,
            learning_enabled: self.learner.enabled(),
        };

        self.emit(
            now_ms,
            EngineEvent::Decision {
                game_id: state.game_id.clone(),
                tick: state.tick_count,
                action: decision.action,
                q_value: decision.q_value,
                confidence: decision.confidence,
                explored: selection.explored,
                bet_amount: decision.bet_amount,
            },
        );

        Ok(decision)
    }

    /// Turn a non-Hold decision into a recorded wager. Hold decisions
    /// and games that already carry an active bet are no-ops.
    pub fn execute_bet(
        &mut self,
        game_id: &str,
        decision: &Decision,
        state: &GameState,
    ) -> Result<Option<SideBet>, StoreError> {
        let stake = match decision.bet_amount {
            Some(amount) if decision.action.is_bet() && amount > 0.0 => amount,
            _ => return Ok(None),
        };

        if self.active_bets.contains_key(game_id) {
            eprintln!("[service] WARN: bet for {game_id} already active; ignoring");
            return Ok(None);
        }

        let now_ms = resolve_now(state);
        let bet = SideBet {
            game_id: game_id.to_string(),
            start_tick: state.tick_count,
            end_tick: state.tick_count + self.cfg.betting.window_ticks,
            bet_amount: stake,
            payout: 0.0,
            outcome: BetOutcome::Pending,
            profit: 0.0,
            placed_at_ms: now_ms,
        };

        self.store.save_side_bet(bet.clone())?;
        self.active_bets.insert(game_id.to_string(), bet.clone());

        self.emit(
            now_ms,
            EngineEvent::BetPlaced {
                game_id: game_id.to_string(),
                start_tick: bet.start_tick,
                end_tick: bet.end_tick,
                bet_amount: bet.bet_amount,
            },
        );

        Ok(Some(bet))
    }

    /// Open the learning episode for a new round. Returns false when an
    /// episode is already open (duplicate start signal).
    pub fn start_game(&mut self, game_id: &str) -> Result<bool, StoreError> {
        self.learner.start_episode(game_id)
    }

    /// Close out a round: resolve the active bet against `final_tick`,
    /// persist the outcome, and feed it to the learner.
    ///
    /// Returns the resolved bet, if one was active. Ending a round with
    /// neither an active bet nor an open episode is a logged no-op.
    pub fn end_game(
        &mut self,
        game_id: &str,
        final_tick: u32,
    ) -> Result<Option<SideBet>, StoreError> {
        let now_ms = wall_clock_ms();

        let resolved = match self.active_bets.remove(game_id) {
            Some(bet) => Some(self.resolve_bet(bet, final_tick, now_ms)?),
            None => None,
        };

        let episode_open = self.learner.open_game_id() == Some(game_id);
        if !episode_open && resolved.is_none() {
            eprintln!(
                "[service] WARN: end_game({game_id}) with no active bet or open episode; ignored"
            );
            return Ok(None);
        }

        if episode_open {
            let (outcome, final_reward) = match &resolved {
                Some(bet) if bet.outcome == BetOutcome::Win => (BetOutcome::Win, bet.profit),
                _ => (BetOutcome::Loss, 0.0),
            };

            if let Some(record) = self.learner.end_episode(outcome, final_reward, now_ms)? {
                self.emit(
                    now_ms,
                    EngineEvent::EpisodeClosed {
                        game_id: record.game_id.clone(),
                        length: record.length,
                        total_reward: record.total_reward,
                        outcome: record.outcome,
                        exploration_rate: record.exploration_rate,
                    },
                );
            }
        }

        Ok(resolved)
    }

    /// Aggregate performance over everything the store has seen.
    pub fn performance_summary(&self) -> Result<PerformanceSummary, StoreError> {
        let bets = self.store.side_bets()?;

        let mut wins = 0u64;
        let mut losses = 0u64;
        let mut pending = 0u64;
        let mut total_profit = 0.0;
        for bet in &bets {
            match bet.outcome {
                BetOutcome::Win => wins += 1,
                BetOutcome::Loss => losses += 1,
                BetOutcome::Pending => pending += 1,
            }
            total_profit += bet.profit;
        }
        let resolved = wins + losses;
        let win_rate = if resolved == 0 {
            0.0
        } else {
            wins as f64 / resolved as f64
        };

        Ok(PerformanceSummary {
            total_bets: bets.len() as u64,
            wins,
            losses,
            pending,
            win_rate,
            total_profit,
            episodes_started: self.learner.episodes_started(),
            episodes_recorded: self.store.training_episode_count()?,
            exploration_rate: self.learner.epsilon(),
            learning_enabled: self.learner.enabled(),
        })
    }

    /// Resolve a bet whose window elapsed while the round kept running.
    fn expire_stale_bet(
        &mut self,
        game_id: &str,
        current_tick: u32,
        now_ms: TimestampMs,
    ) -> Result<(), StoreError> {
        let expired = match self.active_bets.get(game_id) {
            Some(bet) if current_tick > bet.end_tick => bet.clone(),
            _ => return Ok(()),
        };
        self.active_bets.remove(game_id);

        // The round outlived the window: a loss, resolved at the first
        // tick observed past end_tick.
        let profit = -expired.bet_amount;
        let updated = self
            .store
            .update_side_bet(game_id, BetOutcome::Loss, 0.0, profit)?;
        self.store
            .save_performance_metric("side_bet_profit", profit, now_ms)?;

        self.emit(
            now_ms,
            EngineEvent::BetResolved {
                game_id: game_id.to_string(),
                outcome: updated.outcome,
                payout: updated.payout,
                profit: updated.profit,
                final_tick: current_tick,
            },
        );

        Ok(())
    }

    /// Resolve a bet at round end: a win iff the round ended inside the
    /// bet window.
    fn resolve_bet(
        &mut self,
        bet: SideBet,
        final_tick: u32,
        now_ms: TimestampMs,
    ) -> Result<SideBet, StoreError> {
        let won = final_tick >= bet.start_tick && final_tick <= bet.end_tick;
        let (outcome, payout) = if won {
            (
                BetOutcome::Win,
                bet.bet_amount * self.cfg.betting.payout_multiplier,
            )
        } else {
            (BetOutcome::Loss, 0.0)
        };
        let profit = payout - bet.bet_amount;

        let updated = self
            .store
            .update_side_bet(&bet.game_id, outcome, payout, profit)?;
        self.store
            .save_performance_metric("side_bet_profit", profit, now_ms)?;

        self.emit(
            now_ms,
            EngineEvent::BetResolved {
                game_id: updated.game_id.clone(),
                outcome: updated.outcome,
                payout: updated.payout,
                profit: updated.profit,
                final_tick,
            },
        );

        Ok(updated)
    }

    fn emit(&mut self, now_ms: TimestampMs, event: EngineEvent) {
        self.sink.log_event(&EventRecord { now_ms, event });
    }
}

/// Feed-side timestamp when present, wall clock otherwise.
fn resolve_now(state: &GameState) -> TimestampMs {
    state.timestamp_ms.unwrap_or_else(wall_clock_ms)
}

fn wall_clock_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as TimestampMs)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, LearningConfig};
    use crate::logging::NoopSink;
    use crate::store::MemoryStore;
    use crate::types::ActionType;

    /// Exploit-only config so policy picks are deterministic.
    fn exploit_config() -> Config {
        Config {
            learning: LearningConfig {
                epsilon: 0.0,
                epsilon_min: 0.0,
                ..LearningConfig::default()
            },
            ..Config::default()
        }
    }

    fn state(tick: u32, price: f64, peak: f64, game_id: &str) -> GameState {
        GameState {
            tick_count: tick,
            price,
            active: true,
            cooldown_timer: 0,
            peak_price: peak,
            game_id: Some(game_id.to_string()),
            timestamp_ms: Some(1_000 + tick as i64 * 250),
        }
    }

    fn service_over(store: Arc<MemoryStore>) -> DecisionService {
        DecisionService::new(exploit_config(), store, Box::new(NoopSink)).unwrap()
    }

    #[test]
    fn test_fresh_state_defaults_to_hold() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store);

        let s = state(10, 1.2, 1.2, "g-1");
        let timing = svc.timing_snapshot();
        let decision = svc.get_recommendation(&s, &timing, 1.0).unwrap();

        // All Q-values are 0: the tie breaks to the first-declared Hold.
        assert_eq!(decision.action, ActionType::Hold);
        assert!(decision.bet_amount.is_none());
    }

    #[test]
    fn test_learned_state_is_exploited() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store.clone());

        let s = state(120, 2.3, 2.3, "g-1");
        let timing = svc.timing_snapshot();

        // First call creates the state row.
        svc.get_recommendation(&s, &timing, 1.0).unwrap();

        // Teach the store that BetMedium is best here.
        let actions = store.q_actions().unwrap();
        let medium = actions
            .iter()
            .find(|a| a.action_type == ActionType::BetMedium)
            .unwrap();
        store.update_q_value(1, medium.id, 0.5, None).unwrap();

        let decision = svc.get_recommendation(&s, &timing, 1.0).unwrap();
        assert_eq!(decision.action, ActionType::BetMedium);
        assert!((decision.q_value - 0.5).abs() < 1e-12);
        assert!((decision.bet_amount.unwrap() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_hold_decision_places_no_bet() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store.clone());

        let s = state(10, 1.0, 1.0, "g-1");
        let timing = svc.timing_snapshot();
        let decision = svc.get_recommendation(&s, &timing, 1.0).unwrap();

        let placed = svc.execute_bet("g-1", &decision, &s).unwrap();
        assert!(placed.is_none());
        assert!(store.side_bets().unwrap().is_empty());
    }

    #[test]
    fn test_single_active_bet_per_game() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store.clone());

        let s = state(100, 2.0, 2.0, "g-1");
        let decision = Decision {
            action: ActionType::BetMedium,
            confidence: 0.5,
            expected_value: 1.0,
            q_value: 0.5,
            reasoning: "test".to_string(),
            bet_amount: Some(0.02),
            learning_enabled: true,
        };

        let first = svc.execute_bet("g-1", &decision, &s).unwrap();
        assert!(first.is_some());
        assert_eq!(first.as_ref().unwrap().end_tick, 140);

        let second = svc.execute_bet("g-1", &decision, &s).unwrap();
        assert!(second.is_none(), "second bet for the same game must be refused");
        assert_eq!(store.side_bets().unwrap().len(), 1);
    }

    #[test]
    fn test_end_game_win_resolution() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store.clone());

        svc.start_game("g-1").unwrap();
        let s = state(100, 2.0, 2.0, "g-1");
        let decision = Decision {
            action: ActionType::BetMedium,
            confidence: 0.5,
            expected_value: 1.0,
            q_value: 0.5,
            reasoning: "test".to_string(),
            bet_amount: Some(0.02),
            learning_enabled: true,
        };
        svc.execute_bet("g-1", &decision, &s).unwrap();

        // Rug at tick 120, inside [100, 140].
        let resolved = svc.end_game("g-1", 120).unwrap().unwrap();
        assert_eq!(resolved.outcome, BetOutcome::Win);
        assert!((resolved.payout - 0.10).abs() < 1e-12);
        assert!((resolved.profit - 0.08).abs() < 1e-12);

        let metrics = store.performance_metrics().unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].name, "side_bet_profit");
    }

    #[test]
    fn test_end_game_loss_resolution() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store.clone());

        svc.start_game("g-1").unwrap();
        let s = state(100, 2.0, 2.0, "g-1");
        let decision = Decision {
            action: ActionType::BetSmall,
            confidence: 0.5,
            expected_value: 1.0,
            q_value: 0.2,
            reasoning: "test".to_string(),
            bet_amount: Some(0.01),
            learning_enabled: true,
        };
        svc.execute_bet("g-1", &decision, &s).unwrap();

        // Rug at tick 180, past end_tick 140.
        let resolved = svc.end_game("g-1", 180).unwrap().unwrap();
        assert_eq!(resolved.outcome, BetOutcome::Loss);
        assert_eq!(resolved.payout, 0.0);
        assert!((resolved.profit - (-0.01)).abs() < 1e-12);
    }

    #[test]
    fn test_window_expiry_resolves_loss_on_tick() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store.clone());

        svc.start_game("g-1").unwrap();
        let s = state(100, 2.0, 2.0, "g-1");
        let decision = Decision {
            action: ActionType::BetMedium,
            confidence: 0.5,
            expected_value: 1.0,
            q_value: 0.5,
            reasoning: "test".to_string(),
            bet_amount: Some(0.02),
            learning_enabled: true,
        };
        svc.execute_bet("g-1", &decision, &s).unwrap();

        // Ticks up to end_tick leave the bet pending.
        svc.record_tick(&state(140, 2.2, 2.2, "g-1")).unwrap();
        assert_eq!(store.side_bets().unwrap()[0].outcome, BetOutcome::Pending);

        // First tick past the window resolves it as a loss.
        svc.record_tick(&state(141, 2.2, 2.2, "g-1")).unwrap();
        let bets = store.side_bets().unwrap();
        assert_eq!(bets[0].outcome, BetOutcome::Loss);
        assert!((bets[0].profit - (-0.02)).abs() < 1e-12);

        // Round end later finds no active bet; episode still closes.
        let resolved = svc.end_game("g-1", 200).unwrap();
        assert!(resolved.is_none());
        assert_eq!(store.training_episode_count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_end_game_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store.clone());

        svc.start_game("g-1").unwrap();
        svc.end_game("g-1", 50).unwrap();

        // Second end signal: nothing to resolve, nothing to close.
        let resolved = svc.end_game("g-1", 50).unwrap();
        assert!(resolved.is_none());
        assert_eq!(store.training_episode_count().unwrap(), 1);
    }

    #[test]
    fn test_recommendations_feed_open_episode() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store.clone());

        svc.start_game("g-1").unwrap();
        let timing = svc.timing_snapshot();
        svc.get_recommendation(&state(10, 1.0, 1.0, "g-1"), &timing, 1.0)
            .unwrap();
        svc.get_recommendation(&state(60, 1.5, 1.5, "g-1"), &timing, 1.0)
            .unwrap();
        svc.end_game("g-1", 70).unwrap();

        let episodes = store.training_episodes().unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].length, 2);
        assert_eq!(episodes[0].state_sequence.len(), 2);
        assert_eq!(episodes[0].reward_sequence.len(), 2);
    }

    #[test]
    fn test_performance_summary_aggregates() {
        let store = Arc::new(MemoryStore::new());
        let mut svc = service_over(store.clone());

        svc.start_game("g-1").unwrap();
        let s = state(100, 2.0, 2.0, "g-1");
        let decision = Decision {
            action: ActionType::BetMedium,
            confidence: 0.5,
            expected_value: 1.0,
            q_value: 0.5,
            reasoning: "test".to_string(),
            bet_amount: Some(0.02),
            learning_enabled: true,
        };
        svc.execute_bet("g-1", &decision, &s).unwrap();
        svc.end_game("g-1", 110).unwrap();

        let summary = svc.performance_summary().unwrap();
        assert_eq!(summary.total_bets, 1);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.losses, 0);
        assert_eq!(summary.win_rate, 1.0);
        assert!((summary.total_profit - 0.08).abs() < 1e-12);
        assert_eq!(summary.episodes_started, 1);
        assert_eq!(summary.episodes_recorded, 1);
    }
}
