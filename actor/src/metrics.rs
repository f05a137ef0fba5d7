//! Prometheus metrics for self-play and training.
//!
//! Everything is registered on a crate-local [`REGISTRY`]; the binary
//! renders it with [`encode_metrics`].

use engine_core::{Outcome, Player};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Once;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ========== Episode Counters ==========

    /// Self-play episodes whose records reached the replay buffer
    pub static ref EPISODES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("selfplay_episodes_total", "Self-play episodes completed")
    ).unwrap();

    /// Episodes discarded after an agent failure or the move guard
    pub static ref EPISODES_ABORTED: IntCounter = IntCounter::with_opts(
        Opts::new("selfplay_episodes_aborted_total", "Self-play episodes discarded")
    ).unwrap();

    pub static ref FIRST_WINS: IntCounter = IntCounter::with_opts(
        Opts::new("selfplay_first_wins_total", "Episodes won by the first player")
    ).unwrap();

    pub static ref SECOND_WINS: IntCounter = IntCounter::with_opts(
        Opts::new("selfplay_second_wins_total", "Episodes won by the second player")
    ).unwrap();

    pub static ref DRAWS: IntCounter = IntCounter::with_opts(
        Opts::new("selfplay_draws_total", "Episodes ending in a draw")
    ).unwrap();

    // ========== Episode Histograms ==========

    pub static ref EPISODE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("selfplay_episode_duration_seconds", "Time to complete one episode")
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 180.0, 600.0])
    ).unwrap();

    pub static ref EPISODE_MOVES: Histogram = Histogram::with_opts(
        HistogramOpts::new("selfplay_episode_moves", "Moves per episode")
            .buckets(vec![5.0, 9.0, 20.0, 40.0, 60.0, 80.0, 120.0, 200.0])
    ).unwrap();

    // ========== MCTS Metrics ==========

    pub static ref MCTS_SEARCHES_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("selfplay_mcts_searches_total", "MCTS searches performed")
    ).unwrap();

    pub static ref MCTS_ITERATIONS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("selfplay_mcts_iterations_total", "MCTS iterations performed")
    ).unwrap();

    // ========== Replay Metrics ==========

    pub static ref RECORDS_PUSHED: IntCounter = IntCounter::with_opts(
        Opts::new("replay_records_pushed_total", "Training records written to the replay buffer")
    ).unwrap();

    pub static ref REPLAY_BUFFER_SIZE: IntGauge = IntGauge::with_opts(
        Opts::new("replay_buffer_size", "Records currently held by the replay buffer")
    ).unwrap();

    pub static ref FILES_INGESTED: IntCounter = IntCounter::with_opts(
        Opts::new("replay_files_ingested_total", "Recorded-game files consumed")
    ).unwrap();

    // ========== Model / Training Metrics ==========

    pub static ref MODEL_VERSION: IntGauge = IntGauge::with_opts(
        Opts::new("model_version", "Version of the evaluator new episodes bind to")
    ).unwrap();

    pub static ref TRAINING_STEPS: IntCounter = IntCounter::with_opts(
        Opts::new("training_steps_total", "Training steps completed")
    ).unwrap();

    pub static ref LEARNING_RATE_MULTIPLIER: Gauge = Gauge::with_opts(
        Opts::new("training_lr_multiplier", "Current KL-controlled learning rate multiplier")
    ).unwrap();

    pub static ref TRAINING_KL: Gauge = Gauge::with_opts(
        Opts::new("training_kl", "KL divergence of the last training step")
    ).unwrap();

    pub static ref PROMOTIONS: IntCounter = IntCounter::with_opts(
        Opts::new("training_promotions_total", "Candidates promoted by the gate")
    ).unwrap();

    pub static ref REJECTIONS: IntCounter = IntCounter::with_opts(
        Opts::new("training_rejections_total", "Candidates rejected by the gate")
    ).unwrap();
}

static INIT: Once = Once::new();

/// Register all metrics with the registry.
/// Safe to call multiple times - only initializes once.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(EPISODES_TOTAL.clone()),
            Box::new(EPISODES_ABORTED.clone()),
            Box::new(FIRST_WINS.clone()),
            Box::new(SECOND_WINS.clone()),
            Box::new(DRAWS.clone()),
            Box::new(EPISODE_DURATION.clone()),
            Box::new(EPISODE_MOVES.clone()),
            Box::new(MCTS_SEARCHES_TOTAL.clone()),
            Box::new(MCTS_ITERATIONS_TOTAL.clone()),
            Box::new(RECORDS_PUSHED.clone()),
            Box::new(REPLAY_BUFFER_SIZE.clone()),
            Box::new(FILES_INGESTED.clone()),
            Box::new(MODEL_VERSION.clone()),
            Box::new(TRAINING_STEPS.clone()),
            Box::new(LEARNING_RATE_MULTIPLIER.clone()),
            Box::new(TRAINING_KL.clone()),
            Box::new(PROMOTIONS.clone()),
            Box::new(REJECTIONS.clone()),
        ];
        for collector in collectors {
            REGISTRY.register(collector).unwrap();
        }
    });
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record a finished episode
pub fn record_episode(outcome: Outcome, moves: u32, seconds: f64) {
    EPISODES_TOTAL.inc();
    EPISODE_MOVES.observe(moves as f64);
    EPISODE_DURATION.observe(seconds);
    match outcome.winner() {
        Some(Player::First) => FIRST_WINS.inc(),
        Some(Player::Second) => SECOND_WINS.inc(),
        None => DRAWS.inc(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init_is_idempotent() {
        init_metrics();
        init_metrics();
    }

    #[test]
    fn test_encode_metrics() {
        init_metrics();
        EPISODES_TOTAL.inc_by(0);
        let output = encode_metrics();
        assert!(output.contains("selfplay_episodes_total"));
        assert!(output.contains("replay_buffer_size"));
        assert!(output.contains("training_lr_multiplier"));
    }

    #[test]
    fn test_record_episode_counts_outcomes() {
        let before = (FIRST_WINS.get(), SECOND_WINS.get(), DRAWS.get());
        record_episode(Outcome::Win(Player::First), 7, 0.1);
        record_episode(Outcome::Win(Player::Second), 8, 0.1);
        record_episode(Outcome::Draw, 9, 0.1);
        assert!(FIRST_WINS.get() >= before.0 + 1);
        assert!(SECOND_WINS.get() >= before.1 + 1);
        assert!(DRAWS.get() >= before.2 + 1);
    }
}
