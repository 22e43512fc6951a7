// src/main.rs
//
// Thin simulation harness around the Rugpulse library.
// Runs N synthetic seeded game rounds through the full decision service
// and prints a performance summary. All of the real logic lives in the
// lib crate (timing, probability, policy, learner, service).

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use rugpulse::{
    metrics::{OnlineStats, PerformanceTracker},
    Config, DecisionService, EventSink, FileSink, GameState, MemoryStore, NoopSink,
};

/// Command-line arguments for the Rugpulse simulation binary.
#[derive(Parser, Debug)]
#[command(name = "rugpulse")]
struct Cli {
    /// Number of synthetic rounds to run.
    #[arg(long, default_value_t = 100)]
    rounds: u64,

    /// Base RNG seed (round generator and policy exploration).
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Starting bankroll.
    #[arg(long, default_value_t = 1.0)]
    bankroll: f64,

    /// Override the initial exploration rate.
    #[arg(long)]
    epsilon: Option<f64>,

    /// Disable Q-learning updates (exploit-only evaluation run).
    #[arg(long)]
    freeze_learning: bool,

    /// Ticks between recommendation checks during a round.
    #[arg(long, default_value_t = 10)]
    decision_interval: u32,

    /// Optional JSONL path for the engine event log.
    #[arg(long)]
    log_jsonl: Option<String>,
}

/// Build the telemetry sink as a trait object so we can choose between
/// FileSink and NoopSink at runtime.
fn build_sink(log_jsonl: Option<&str>) -> Box<dyn EventSink> {
    if let Some(path) = log_jsonl {
        match FileSink::create(path) {
            Ok(s) => Box::new(s),
            Err(err) => {
                eprintln!(
                    "Failed to create log file ({path}), \
                     falling back to NoopSink: {err}"
                );
                Box::new(NoopSink)
            }
        }
    } else {
        Box::new(NoopSink)
    }
}

/// Build Config from defaults, then apply CLI + env research overrides.
///
/// This keeps src/config.rs as the single source of truth, while letting
/// research harnesses sweep hyperparameters via environment variables.
fn build_config_from_env_and_args(cli: &Cli) -> Config {
    let mut cfg = Config::default();

    // ---------- CLI overrides ----------

    if let Some(eps) = cli.epsilon {
        cfg.learning.epsilon = eps.clamp(0.0, 1.0);
    }
    if cli.freeze_learning {
        cfg.learning.enabled = false;
    }

    // ---------- Env overrides (research knobs) ----------

    // Learning rate α.
    if let Ok(raw) = std::env::var("RUGPULSE_ALPHA") {
        if let Ok(v) = raw.parse::<f64>() {
            cfg.learning.alpha = v;
        }
    }

    // Discount factor γ.
    if let Ok(raw) = std::env::var("RUGPULSE_GAMMA") {
        if let Ok(v) = raw.parse::<f64>() {
            cfg.learning.gamma = v;
        }
    }

    // Per-episode exploration decay.
    if let Ok(raw) = std::env::var("RUGPULSE_EPSILON_DECAY") {
        if let Ok(v) = raw.parse::<f64>() {
            cfg.learning.epsilon_decay = v;
        }
    }

    cfg
}

/// One synthetic round: a rug tick skewed toward earlier ticks plus a
/// multiplicative random-walk price path.
struct RoundSim {
    rug_tick: u32,
    rng: ChaCha8Rng,
    price: f64,
    peak: f64,
}

impl RoundSim {
    fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        // Power-skewed duration: most rounds die young, a few run long.
        let u: f64 = rng.gen();
        let rug_tick = 5 + (600.0 * u.powf(1.8)) as u32;
        Self {
            rug_tick,
            rng,
            price: 1.0,
            peak: 1.0,
        }
    }

    /// Advance the price path by one tick.
    fn step(&mut self) {
        let drift: f64 = self.rng.gen::<f64>() - 0.45;
        self.price = (self.price * (1.0 + 0.03 * drift)).max(0.01);
        if self.price > self.peak {
            self.peak = self.price;
        }
    }

    /// Jittered wall-clock delta for this tick, in milliseconds.
    fn tick_interval_ms(&mut self) -> i64 {
        250 + self.rng.gen_range(-60..=120)
    }
}

fn main() -> anyhow::Result<()> {
    // 0) Parse CLI args.
    let cli = Cli::parse();

    // 1) Build config with CLI + env overrides.
    let cfg = build_config_from_env_and_args(&cli);

    // 2) In-process store + telemetry sink.
    let store = Arc::new(MemoryStore::new());
    let sink = build_sink(cli.log_jsonl.as_deref());

    // 3) Build the decision service.
    let mut service = DecisionService::new(cfg, store, sink)
        .context("failed to build decision service")?
        .with_policy_seed(cli.seed);

    let mut bankroll = cli.bankroll;
    let initial_bankroll = cli.bankroll;
    let mut perf = PerformanceTracker::new();
    perf.update_bankroll(bankroll);
    let mut round_profit_stats = OnlineStats::default();
    let mut prev_total_profit = 0.0;

    let mut now_ms: i64 = 1_000;

    // 4) Run the synthetic rounds.
    for round in 0..cli.rounds {
        let game_id = format!("sim-{round:05}");
        let mut sim = RoundSim::new(cli.seed.wrapping_add(round.wrapping_mul(12345)));

        service.start_game(&game_id)?;

        for tick in 0..=sim.rug_tick {
            now_ms += sim.tick_interval_ms();
            let game_state = GameState {
                tick_count: tick,
                price: sim.price,
                active: true,
                cooldown_timer: 0,
                peak_price: sim.peak,
                game_id: Some(game_id.clone()),
                timestamp_ms: Some(now_ms),
            };

            service.record_tick(&game_state)?;

            if tick > 0 && tick % cli.decision_interval == 0 {
                let timing = service.timing_snapshot();
                let decision = service.get_recommendation(&game_state, &timing, bankroll)?;
                service.execute_bet(&game_id, &decision, &game_state)?;
            }

            sim.step();
        }

        if let Some(resolved) = service.end_game(&game_id, sim.rug_tick)? {
            bankroll += resolved.profit;
            perf.record(resolved.profit > 0.0, resolved.profit);
        }

        // Window-expired bets resolve inside record_tick; reconcile the
        // bankroll against the store's view of total profit.
        let summary = service.performance_summary()?;
        bankroll = initial_bankroll + summary.total_profit;
        perf.update_bankroll(bankroll);
        round_profit_stats.add(summary.total_profit - prev_total_profit);
        prev_total_profit = summary.total_profit;
    }

    // 5) Final summary.
    let summary = service.performance_summary()?;
    println!("rounds                = {}", cli.rounds);
    println!("bets placed           = {}", summary.total_bets);
    println!(
        "wins / losses         = {} / {}",
        summary.wins, summary.losses
    );
    println!("win rate              = {:.3}", summary.win_rate);
    println!("total profit          = {:+.4}", summary.total_profit);
    println!(
        "profit / round        = {:+.5} (sd {:.5})",
        round_profit_stats.mean(),
        round_profit_stats.stddev_sample()
    );
    println!("final bankroll        = {:.4}", bankroll);
    println!("max drawdown          = {:.4}", perf.max_drawdown());
    println!("episodes recorded     = {}", summary.episodes_recorded);
    println!("exploration rate      = {:.4}", summary.exploration_rate);
    println!(
        "learning              = {}",
        if summary.learning_enabled { "on" } else { "frozen" }
    );

    Ok(())
}
