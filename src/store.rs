// src/store.rs
//
// Storage contract for learned state.
//
// The engine persists Q-states, Q-values, training episodes, side bets,
// model parameters, and performance metrics through the narrow
// `LearningStore` trait. The surrounding application may back it with a
// relational database; `MemoryStore` here is the synthetic in-process
// implementation used by tests and the simulation harness.
//
// All mutating operations are atomic per key: `MemoryStore` serializes
// every table behind one mutex, so concurrent get-or-create and Q-value
// upserts cannot lose updates.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoder::{state_hash, GameStateFeatures};
use crate::types::{ActionType, BetOutcome, SideBet, TimestampMs};

/// Storage-layer error. Propagates unchanged to callers: masking
/// persistence failures would corrupt learning state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown state id {0}")]
    UnknownState(i64),

    #[error("unknown action id {0}")]
    UnknownAction(i64),

    #[error("no side bet recorded for game {0}")]
    UnknownSideBet(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Canonical state row: one per distinct feature tuple, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QState {
    pub id: i64,
    /// Canonical SHA-256 digest of the feature tuple.
    pub state_hash: String,
    /// Number of times this state has been encountered.
    pub visit_count: u64,
    pub last_seen_ms: TimestampMs,
}

/// One member of the fixed action set. Seeded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QAction {
    pub id: i64,
    pub action_type: ActionType,
    pub bet_size_multiplier: f64,
}

/// Learned value of one (state, action) pair. Created lazily on first
/// update; visit_count is monotone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QValue {
    pub state_id: i64,
    pub action_id: i64,
    pub q_value: f64,
    pub visit_count: u64,
    pub last_reward: f64,
}

/// Immutable record of one closed learning episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub game_id: String,
    pub state_sequence: Vec<i64>,
    pub action_sequence: Vec<i64>,
    pub reward_sequence: Vec<f64>,
    pub total_reward: f64,
    pub length: usize,
    pub outcome: BetOutcome,
    /// ε in effect while the episode ran (pre-decay).
    pub exploration_rate: f64,
    /// α in effect while the episode ran.
    pub learning_rate: f64,
    pub closed_at_ms: TimestampMs,
}

/// One aggregated performance sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub name: String,
    pub value: f64,
    pub recorded_at_ms: TimestampMs,
}

/// Narrow persistence contract consumed by the engine.
///
/// Implementations must apply get-or-create and update operations
/// atomically per key (single-writer per (state, action)).
pub trait LearningStore: Send + Sync {
    /// Fetch the row for a feature tuple, creating it on first
    /// encounter. Existing rows get their visit count incremented and
    /// `last_seen_ms` refreshed; a duplicate row is never created.
    fn get_or_create_q_state(
        &self,
        features: &GameStateFeatures,
        now_ms: TimestampMs,
    ) -> Result<QState, StoreError>;

    /// The seeded action set, in creation order.
    fn q_actions(&self) -> Result<Vec<QAction>, StoreError>;

    /// Register one action. Called once per action at startup.
    fn create_q_action(
        &self,
        action_type: ActionType,
        bet_size_multiplier: f64,
    ) -> Result<QAction, StoreError>;

    /// Learned value for a pair, or None if never updated.
    fn get_q_value(&self, state_id: i64, action_id: i64) -> Result<Option<QValue>, StoreError>;

    /// Upsert the learned value for a pair. Creates the row lazily;
    /// increments its visit count; records the driving reward if given.
    fn update_q_value(
        &self,
        state_id: i64,
        action_id: i64,
        new_value: f64,
        reward: Option<f64>,
    ) -> Result<QValue, StoreError>;

    /// Append one closed episode to the append-only history.
    fn save_training_episode(&self, episode: EpisodeRecord) -> Result<(), StoreError>;

    /// Number of episodes persisted so far.
    fn training_episode_count(&self) -> Result<u64, StoreError>;

    /// Named scalar model parameter (exploration rate, episode counter).
    fn get_model_parameter(&self, name: &str) -> Result<Option<f64>, StoreError>;

    /// Persist a named scalar model parameter.
    fn set_model_parameter(&self, name: &str, value: f64) -> Result<(), StoreError>;

    /// Record a newly placed side bet.
    fn save_side_bet(&self, bet: SideBet) -> Result<(), StoreError>;

    /// Resolve the pending side bet for a game. Errors if the game has
    /// no pending bet; a bet resolves exactly once.
    fn update_side_bet(
        &self,
        game_id: &str,
        outcome: BetOutcome,
        payout: f64,
        profit: f64,
    ) -> Result<SideBet, StoreError>;

    /// All recorded side bets, in placement order.
    fn side_bets(&self) -> Result<Vec<SideBet>, StoreError>;

    /// Append one performance sample.
    fn save_performance_metric(
        &self,
        name: &str,
        value: f64,
        now_ms: TimestampMs,
    ) -> Result<(), StoreError>;
}

/// Ensure the fixed action set exists, seeding it from config on first
/// run. Returns the actions in declaration order.
pub fn seed_actions(
    store: &dyn LearningStore,
    betting: &crate::config::BetConfig,
) -> Result<Vec<QAction>, StoreError> {
    let existing = store.q_actions()?;
    if !existing.is_empty() {
        return Ok(existing);
    }

    let mut actions = Vec::with_capacity(ActionType::ALL.len());
    for action_type in ActionType::ALL {
        let action = store.create_q_action(action_type, betting.multiplier_for(action_type))?;
        actions.push(action);
    }
    Ok(actions)
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryTables {
    states_by_hash: HashMap<String, QState>,
    next_state_id: i64,
    actions: Vec<QAction>,
    next_action_id: i64,
    q_values: HashMap<(i64, i64), QValue>,
    episodes: Vec<EpisodeRecord>,
    parameters: HashMap<String, f64>,
    side_bets: Vec<SideBet>,
    metrics: Vec<PerformanceMetric>,
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryTables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("memory store mutex poisoned".to_string()))
    }

    /// All recorded performance metrics (test/diagnostic accessor).
    pub fn performance_metrics(&self) -> Result<Vec<PerformanceMetric>, StoreError> {
        Ok(self.lock()?.metrics.clone())
    }

    /// All persisted episodes (test/diagnostic accessor).
    pub fn training_episodes(&self) -> Result<Vec<EpisodeRecord>, StoreError> {
        Ok(self.lock()?.episodes.clone())
    }
}

impl LearningStore for MemoryStore {
    fn get_or_create_q_state(
        &self,
        features: &GameStateFeatures,
        now_ms: TimestampMs,
    ) -> Result<QState, StoreError> {
        let hash = state_hash(features);
        let mut tables = self.lock()?;

        if let Some(state) = tables.states_by_hash.get_mut(&hash) {
            state.visit_count += 1;
            state.last_seen_ms = now_ms;
            return Ok(state.clone());
        }

        tables.next_state_id += 1;
        let state = QState {
            id: tables.next_state_id,
            state_hash: hash.clone(),
            visit_count: 1,
            last_seen_ms: now_ms,
        };
        tables.states_by_hash.insert(hash, state.clone());
        Ok(state)
    }

    fn q_actions(&self) -> Result<Vec<QAction>, StoreError> {
        Ok(self.lock()?.actions.clone())
    }

    fn create_q_action(
        &self,
        action_type: ActionType,
        bet_size_multiplier: f64,
    ) -> Result<QAction, StoreError> {
        let mut tables = self.lock()?;
        tables.next_action_id += 1;
        let action = QAction {
            id: tables.next_action_id,
            action_type,
            bet_size_multiplier,
        };
        tables.actions.push(action.clone());
        Ok(action)
    }

    fn get_q_value(&self, state_id: i64, action_id: i64) -> Result<Option<QValue>, StoreError> {
        Ok(self.lock()?.q_values.get(&(state_id, action_id)).cloned())
    }

    fn update_q_value(
        &self,
        state_id: i64,
        action_id: i64,
        new_value: f64,
        reward: Option<f64>,
    ) -> Result<QValue, StoreError> {
        let mut tables = self.lock()?;

        if !tables.actions.iter().any(|a| a.id == action_id) {
            return Err(StoreError::UnknownAction(action_id));
        }
        if !tables.states_by_hash.values().any(|s| s.id == state_id) {
            return Err(StoreError::UnknownState(state_id));
        }

        let entry = tables
            .q_values
            .entry((state_id, action_id))
            .or_insert(QValue {
                state_id,
                action_id,
                q_value: 0.0,
                visit_count: 0,
                last_reward: 0.0,
            });

        entry.q_value = new_value;
        entry.visit_count += 1;
        if let Some(r) = reward {
            entry.last_reward = r;
        }
        Ok(entry.clone())
    }

    fn save_training_episode(&self, episode: EpisodeRecord) -> Result<(), StoreError> {
        self.lock()?.episodes.push(episode);
        Ok(())
    }

    fn training_episode_count(&self) -> Result<u64, StoreError> {
        Ok(self.lock()?.episodes.len() as u64)
    }

    fn get_model_parameter(&self, name: &str) -> Result<Option<f64>, StoreError> {
        Ok(self.lock()?.parameters.get(name).copied())
    }

    fn set_model_parameter(&self, name: &str, value: f64) -> Result<(), StoreError> {
        self.lock()?.parameters.insert(name.to_string(), value);
        Ok(())
    }

    fn save_side_bet(&self, bet: SideBet) -> Result<(), StoreError> {
        self.lock()?.side_bets.push(bet);
        Ok(())
    }

    fn update_side_bet(
        &self,
        game_id: &str,
        outcome: BetOutcome,
        payout: f64,
        profit: f64,
    ) -> Result<SideBet, StoreError> {
        let mut tables = self.lock()?;

        let bet = tables
            .side_bets
            .iter_mut()
            .rev()
            .find(|b| b.game_id == game_id && b.outcome == BetOutcome::Pending)
            .ok_or_else(|| StoreError::UnknownSideBet(game_id.to_string()))?;

        bet.outcome = outcome;
        bet.payout = payout;
        bet.profit = profit;
        Ok(bet.clone())
    }

    fn side_bets(&self) -> Result<Vec<SideBet>, StoreError> {
        Ok(self.lock()?.side_bets.clone())
    }

    fn save_performance_metric(
        &self,
        name: &str,
        value: f64,
        now_ms: TimestampMs,
    ) -> Result<(), StoreError> {
        self.lock()?.metrics.push(PerformanceMetric {
            name: name.to_string(),
            value,
            recorded_at_ms: now_ms,
        });
        Ok(())
    }
}
