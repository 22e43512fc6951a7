// src/learner.rs
//
// Episode lifecycle and Q-learning updates.
//
// One learning episode per game round: Idle → Open(game_id) → Closed.
// On close, the learner derives per-step rewards from the round outcome,
// sweeps the trajectory backward with the Bellman update, persists the
// immutable episode record, and decays the exploration rate.
//
// Lifecycle signals from the upstream feed may arrive duplicated or out
// of order, so invalid transitions are logged no-ops rather than errors.

use std::sync::Arc;

use crate::config::LearningConfig;
use crate::store::{EpisodeRecord, LearningStore, StoreError};
use crate::types::{BetOutcome, TimestampMs};

/// Model parameter names persisted through the store.
pub const PARAM_EXPLORATION_RATE: &str = "exploration_rate";
pub const PARAM_EPISODE_COUNT: &str = "episode_count";

/// An episode currently being collected.
#[derive(Debug, Clone)]
struct OpenEpisode {
    game_id: String,
    state_sequence: Vec<i64>,
    action_sequence: Vec<i64>,
}

/// Tabular Q-learner over the persisted value store.
pub struct QLearner {
    store: Arc<dyn LearningStore>,
    cfg: LearningConfig,
    epsilon: f64,
    episodes_started: u64,
    episode: Option<OpenEpisode>,
}

impl QLearner {
    /// Build a learner, restoring the exploration rate and episode
    /// counter persisted by earlier runs (falling back to config).
    pub fn new(store: Arc<dyn LearningStore>, cfg: LearningConfig) -> Result<Self, StoreError> {
        let floor = cfg.epsilon_min.min(cfg.epsilon);
        let epsilon = match store.get_model_parameter(PARAM_EXPLORATION_RATE)? {
            Some(persisted) => persisted.clamp(floor, cfg.epsilon),
            None => cfg.epsilon,
        };
        let episodes_started = store
            .get_model_parameter(PARAM_EPISODE_COUNT)?
            .map(|v| v.max(0.0) as u64)
            .unwrap_or(0);

        Ok(Self {
            store,
            cfg,
            epsilon,
            episodes_started,
            episode: None,
        })
    }

    /// Current exploration rate.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Total episodes ever started (persisted counter).
    pub fn episodes_started(&self) -> u64 {
        self.episodes_started
    }

    /// Whether learning updates are enabled.
    pub fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    /// Game id of the open episode, if any.
    pub fn open_game_id(&self) -> Option<&str> {
        self.episode.as_ref().map(|e| e.game_id.as_str())
    }

    /// Idle → Open. Returns false (logged no-op) if an episode is
    /// already open; the first episode is kept.
    pub fn start_episode(&mut self, game_id: &str) -> Result<bool, StoreError> {
        if let Some(open) = &self.episode {
            eprintln!(
                "[learner] WARN: start_episode({game_id}) ignored; episode for {} still open",
                open.game_id
            );
            return Ok(false);
        }

        self.episodes_started += 1;
        self.store
            .set_model_parameter(PARAM_EPISODE_COUNT, self.episodes_started as f64)?;

        self.episode = Some(OpenEpisode {
            game_id: game_id.to_string(),
            state_sequence: Vec::new(),
            action_sequence: Vec::new(),
        });
        Ok(true)
    }

    /// Append one (state, action) step to the open episode. A no-op
    /// when no episode is open.
    pub fn record_state_action(&mut self, state_id: i64, action_id: i64) {
        match &mut self.episode {
            Some(open) => {
                open.state_sequence.push(state_id);
                open.action_sequence.push(action_id);
            }
            None => {
                eprintln!("[learner] WARN: record_state_action with no open episode; ignored");
            }
        }
    }

    /// Open → Closed. Computes per-step rewards, applies the backward
    /// Bellman sweep, persists the episode record, and decays ε.
    ///
    /// Returns the persisted record, or None when no episode was open
    /// (logged no-op).
    pub fn end_episode(
        &mut self,
        outcome: BetOutcome,
        final_reward: f64,
        now_ms: TimestampMs,
    ) -> Result<Option<EpisodeRecord>, StoreError> {
        let open = match self.episode.take() {
            Some(open) => open,
            None => {
                eprintln!("[learner] WARN: end_episode with no open episode; ignored");
                return Ok(None);
            }
        };

        let n = open.state_sequence.len();
        debug_assert_eq!(n, open.action_sequence.len());

        // Terminal step carries the round outcome; every earlier step
        // pays the time cost.
        let mut rewards = vec![self.cfg.step_penalty; n];
        if n > 0 {
            rewards[n - 1] = if outcome == BetOutcome::Win {
                final_reward
            } else {
                self.cfg.loss_reward
            };
        }

        if self.cfg.enabled && n > 0 {
            self.apply_bellman_sweep(&open, &rewards)?;
        }

        let record = EpisodeRecord {
            game_id: open.game_id,
            state_sequence: open.state_sequence,
            action_sequence: open.action_sequence,
            total_reward: rewards.iter().sum(),
            length: n,
            outcome,
            exploration_rate: self.epsilon,
            learning_rate: self.cfg.alpha,
            reward_sequence: rewards,
            closed_at_ms: now_ms,
        };
        self.store.save_training_episode(record.clone())?;

        if self.cfg.enabled {
            self.epsilon = (self.epsilon * self.cfg.epsilon_decay).max(self.cfg.epsilon_min);
            self.store
                .set_model_parameter(PARAM_EXPLORATION_RATE, self.epsilon)?;
        }

        Ok(Some(record))
    }

    /// Backward Bellman sweep over one trajectory:
    /// `Q(s_i,a_i) += α·[r_i + γ·max_a Q(s_{i+1},a) − Q(s_i,a_i)]`,
    /// with `max_a Q = 0` at the terminal step. Sweeping backward means
    /// each step sees its successor's already-updated values.
    fn apply_bellman_sweep(
        &mut self,
        open: &OpenEpisode,
        rewards: &[f64],
    ) -> Result<(), StoreError> {
        let actions = self.store.q_actions()?;
        let n = open.state_sequence.len();

        for i in (0..n).rev() {
            let state_id = open.state_sequence[i];
            let action_id = open.action_sequence[i];
            let reward = rewards[i];

            let next_max_q = if i + 1 == n {
                0.0
            } else {
                self.max_q_for_state(open.state_sequence[i + 1], &actions)?
            };

            let old_q = self
                .store
                .get_q_value(state_id, action_id)?
                .map(|v| v.q_value)
                .unwrap_or(0.0);

            let new_q = old_q + self.cfg.alpha * (reward + self.cfg.gamma * next_max_q - old_q);
            self.store
                .update_q_value(state_id, action_id, new_q, Some(reward))?;
        }

        Ok(())
    }

    /// Max Q-value over the action set for a state; never-updated pairs
    /// count as 0.
    fn max_q_for_state(
        &self,
        state_id: i64,
        actions: &[crate::store::QAction],
    ) -> Result<f64, StoreError> {
        let mut max_q = f64::NEG_INFINITY;
        for action in actions {
            let q = self
                .store
                .get_q_value(state_id, action.id)?
                .map(|v| v.q_value)
                .unwrap_or(0.0);
            if q > max_q {
                max_q = q;
            }
        }
        Ok(if max_q.is_finite() { max_q } else { 0.0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BetConfig, LearningConfig};
    use crate::encoder::{GameStateFeatures, RecentPattern, TickPhase};
    use crate::store::{seed_actions, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, QLearner, Vec<crate::store::QAction>) {
        let store = Arc::new(MemoryStore::new());
        let actions = seed_actions(store.as_ref(), &BetConfig::default()).unwrap();
        let learner = QLearner::new(store.clone(), LearningConfig::default()).unwrap();
        (store, learner, actions)
    }

    fn make_state(store: &MemoryStore, price_level: u8) -> i64 {
        let features = GameStateFeatures {
            tick_phase: TickPhase::Mid,
            price_level,
            volatility_level: 1,
            timing_reliability: 2,
            recent_pattern: RecentPattern::Rising,
        };
        store.get_or_create_q_state(&features, 0).unwrap().id
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (_store, mut learner, _actions) = setup();

        assert!(learner.start_episode("g-1").unwrap());
        assert!(!learner.start_episode("g-2").unwrap());
        assert_eq!(learner.open_game_id(), Some("g-1"));
    }

    #[test]
    fn test_end_without_open_is_noop() {
        let (_store, mut learner, _actions) = setup();
        let record = learner.end_episode(BetOutcome::Loss, 0.0, 0).unwrap();
        assert!(record.is_none());
    }

    #[test]
    fn test_single_step_win_update() {
        // Scenario: α=0.1, γ=0.95, reward=1, oldQ=0, terminal ⇒ newQ=0.1.
        let (store, mut learner, actions) = setup();
        let state_id = make_state(&store, 2);

        learner.start_episode("g-1").unwrap();
        learner.record_state_action(state_id, actions[2].id);
        learner.end_episode(BetOutcome::Win, 1.0, 0).unwrap();

        let q = store.get_q_value(state_id, actions[2].id).unwrap().unwrap();
        assert!((q.q_value - 0.1).abs() < 1e-12);
        assert_eq!(q.last_reward, 1.0);
    }

    #[test]
    fn test_repeated_wins_approach_reward_without_overshoot() {
        let (store, mut learner, actions) = setup();
        let state_id = make_state(&store, 2);

        let mut prev_q = 0.0;
        for i in 0..400 {
            learner.start_episode(&format!("g-{i}")).unwrap();
            learner.record_state_action(state_id, actions[2].id);
            learner.end_episode(BetOutcome::Win, 1.0, 0).unwrap();

            let q = store
                .get_q_value(state_id, actions[2].id)
                .unwrap()
                .unwrap()
                .q_value;
            assert!(q <= 1.0 + 1e-9, "Q overshot the terminal reward: {q}");
            assert!(q >= prev_q - 1e-9, "Q must climb monotonically here");
            prev_q = q;
        }

        assert!(prev_q > 0.99, "Q should converge toward 1, got {prev_q}");
    }

    #[test]
    fn test_multi_step_rewards_and_sequences() {
        let (store, mut learner, actions) = setup();
        let s1 = make_state(&store, 1);
        let s2 = make_state(&store, 2);
        let s3 = make_state(&store, 3);

        learner.start_episode("g-1").unwrap();
        learner.record_state_action(s1, actions[0].id);
        learner.record_state_action(s2, actions[0].id);
        learner.record_state_action(s3, actions[2].id);
        let record = learner
            .end_episode(BetOutcome::Win, 0.08, 123)
            .unwrap()
            .unwrap();

        assert_eq!(record.length, 3);
        assert_eq!(record.state_sequence.len(), record.action_sequence.len());
        assert_eq!(record.action_sequence.len(), record.reward_sequence.len());
        assert_eq!(record.reward_sequence[0], -0.01);
        assert_eq!(record.reward_sequence[1], -0.01);
        assert!((record.reward_sequence[2] - 0.08).abs() < 1e-12);
        assert!((record.total_reward - 0.06).abs() < 1e-12);

        // Non-terminal steps propagate discounted successor value.
        let q2 = store.get_q_value(s2, actions[0].id).unwrap().unwrap();
        let q3 = store.get_q_value(s3, actions[2].id).unwrap().unwrap();
        let expected_q3 = 0.1 * 0.08;
        let expected_q2 = 0.1 * (-0.01 + 0.95 * expected_q3);
        assert!((q3.q_value - expected_q3).abs() < 1e-12);
        assert!((q2.q_value - expected_q2).abs() < 1e-12);
    }

    #[test]
    fn test_loss_terminal_reward_is_minus_one() {
        let (store, mut learner, actions) = setup();
        let state_id = make_state(&store, 4);

        learner.start_episode("g-1").unwrap();
        learner.record_state_action(state_id, actions[3].id);
        let record = learner
            .end_episode(BetOutcome::Loss, 0.0, 0)
            .unwrap()
            .unwrap();

        assert_eq!(record.reward_sequence, vec![-1.0]);
        let q = store.get_q_value(state_id, actions[3].id).unwrap().unwrap();
        assert!((q.q_value - (-0.1)).abs() < 1e-12);
    }

    #[test]
    fn test_epsilon_decay_law_and_floor() {
        let (_store, mut learner, _actions) = setup();
        let cfg = LearningConfig::default();

        let eps0 = learner.epsilon();
        for n in 1..=40u32 {
            learner.start_episode(&format!("g-{n}")).unwrap();
            learner.end_episode(BetOutcome::Loss, 0.0, 0).unwrap();

            let expected = (eps0 * cfg.epsilon_decay.powi(n as i32)).max(cfg.epsilon_min);
            assert!(
                (learner.epsilon() - expected).abs() < 1e-12,
                "after {n} decays"
            );
        }
        assert!(learner.epsilon() >= cfg.epsilon_min);
    }

    #[test]
    fn test_epsilon_persists_across_learners() {
        let store = Arc::new(MemoryStore::new());
        seed_actions(store.as_ref(), &BetConfig::default()).unwrap();

        let mut learner = QLearner::new(store.clone(), LearningConfig::default()).unwrap();
        for i in 0..10 {
            learner.start_episode(&format!("g-{i}")).unwrap();
            learner.end_episode(BetOutcome::Loss, 0.0, 0).unwrap();
        }
        let decayed = learner.epsilon();
        assert!(decayed < LearningConfig::default().epsilon);

        // A fresh learner over the same store resumes where we left off.
        let revived = QLearner::new(store.clone(), LearningConfig::default()).unwrap();
        assert!((revived.epsilon() - decayed).abs() < 1e-12);
        assert_eq!(revived.episodes_started(), 10);
    }

    #[test]
    fn test_disabled_learning_freezes_values_and_epsilon() {
        let store = Arc::new(MemoryStore::new());
        let actions = seed_actions(store.as_ref(), &BetConfig::default()).unwrap();
        let cfg = LearningConfig {
            enabled: false,
            ..LearningConfig::default()
        };
        let mut learner = QLearner::new(store.clone(), cfg).unwrap();
        let state_id = make_state(&store, 2);

        learner.start_episode("g-1").unwrap();
        learner.record_state_action(state_id, actions[2].id);
        let record = learner.end_episode(BetOutcome::Win, 1.0, 0).unwrap();

        assert!(record.is_some(), "episode history still accumulates");
        assert!(
            store.get_q_value(state_id, actions[2].id).unwrap().is_none(),
            "no Q update while disabled"
        );
        assert_eq!(learner.epsilon(), LearningConfig::default().epsilon);
    }
}
