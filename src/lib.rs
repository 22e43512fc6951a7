//! Rugpulse core library.
//!
//! This crate exposes the adaptive rug prediction and Q-learning
//! decision engine: timing model, probability model, state encoder,
//! storage contract, epsilon-greedy policy, episode learner, and the
//! decision service that orchestrates them. The binary (`src/main.rs`)
//! is just a thin simulation harness around these components.

pub mod config;
pub mod encoder;
pub mod learner;
pub mod logging;
pub mod metrics;
pub mod policy;
pub mod probability;
pub mod service;
pub mod store;
pub mod timing;
pub mod types;

// --- Re-exports for ergonomic external use ---------------------------------

pub use config::Config;

pub use encoder::{state_hash, GameStateFeatures, RecentPattern, StateEncoder, TickPhase};

pub use learner::QLearner;

pub use logging::{EngineEvent, EventRecord, EventSink, FileSink, NoopSink, VecSink};

pub use policy::{bet_amount, ActionCandidate, ActionSelection, EpsilonGreedy};

pub use probability::ProbabilityModel;

pub use service::{DecisionService, PerformanceSummary};

pub use store::{
    seed_actions, EpisodeRecord, LearningStore, MemoryStore, QAction, QState, QValue, StoreError,
};

pub use timing::{TickSample, TickTimingModel};

pub use types::{
    ActionType, BetOutcome, Decision, GameState, Prediction, SideBet, TimestampMs, TimingData,
    Zone,
};

// --- Cross-module sanity tests ----------------------------------------------
