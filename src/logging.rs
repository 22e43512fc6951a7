// src/logging.rs
//
// Telemetry sinks for the decision engine.
// - EventSink: trait used by the decision service
// - NoopSink:  discards all events
// - FileSink:  one JSON line per engine event, for replay / analysis

use std::fs::File;
use std::io::{self, BufWriter, Write};

use serde::{Deserialize, Serialize};

use crate::types::{ActionType, BetOutcome, TimestampMs, Zone};

/// One engine event worth recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum EngineEvent {
    Prediction {
        game_id: Option<String>,
        tick: u32,
        rug_probability: f64,
        expected_value: f64,
        confidence: f64,
        zone: Zone,
    },
    Decision {
        game_id: Option<String>,
        tick: u32,
        action: ActionType,
        q_value: f64,
        confidence: f64,
        explored: bool,
        bet_amount: Option<f64>,
    },
    BetPlaced {
        game_id: String,
        start_tick: u32,
        end_tick: u32,
        bet_amount: f64,
    },
    BetResolved {
        game_id: String,
        outcome: BetOutcome,
        payout: f64,
        profit: f64,
        final_tick: u32,
    },
    EpisodeClosed {
        game_id: String,
        length: usize,
        total_reward: f64,
        outcome: BetOutcome,
        exploration_rate: f64,
    },
}

/// One normalized telemetry record (JSONL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub now_ms: TimestampMs,
    pub event: EngineEvent,
}

/// Abstract sink for engine telemetry.
pub trait EventSink {
    fn log_event(&mut self, record: &EventRecord);
}

/// Sink that discards all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log_event(&mut self, _record: &EventRecord) {
        // intentionally no-op
    }
}

/// JSONL file sink. Each event is one JSON object on its own line.
pub struct FileSink {
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create a new sink writing to `path`.
    pub fn create(path: &str) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl EventSink for FileSink {
    fn log_event(&mut self, record: &EventRecord) {
        // If telemetry fails we don't want to crash the engine, so I/O
        // errors are deliberately ignored.
        if let Ok(line) = serde_json::to_string(record) {
            let _ = writeln!(self.writer, "{}", line);
            let _ = self.writer.flush();
        }
    }
}

/// In-memory sink capturing events, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct VecSink {
    pub records: Vec<EventRecord>,
}

impl EventSink for VecSink {
    fn log_event(&mut self, record: &EventRecord) {
        self.records.push(record.clone());
    }
}
