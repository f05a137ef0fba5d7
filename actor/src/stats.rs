//! Self-play statistics tracking and persistence.
//!
//! Counters are atomics so every worker can update them without a lock.
//! A JSON snapshot is written to `<data_dir>/actor_stats.json` for
//! inspection while a run is in progress.

use engine_core::Outcome;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Aggregated self-play statistics, designed for lock-free updates.
#[derive(Debug)]
pub struct ActorStats {
    episodes_completed: AtomicU64,
    episodes_aborted: AtomicU64,
    total_moves: AtomicU64,
    first_wins: AtomicU64,
    second_wins: AtomicU64,
    draws: AtomicU64,
    records_pushed: AtomicU64,
    records_ingested: AtomicU64,
    searches: AtomicU64,
    search_iterations: AtomicU64,
    start_time: Instant,
    stats_path: PathBuf,
    env_id: String,
}

/// Serializable stats for JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorStatsSnapshot {
    pub env_id: String,
    pub episodes_completed: u64,
    pub episodes_aborted: u64,
    pub total_moves: u64,
    pub first_wins: u64,
    pub second_wins: u64,
    pub draws: u64,
    pub records_pushed: u64,
    pub records_ingested: u64,
    pub avg_episode_length: f64,
    pub avg_iterations_per_search: f64,
    pub episodes_per_second: f64,
    pub runtime_seconds: f64,
    pub timestamp: u64,
}

impl ActorStats {
    /// Create a new tracker writing to `<data_dir>/actor_stats.json`.
    pub fn new(data_dir: impl AsRef<Path>, env_id: &str) -> Self {
        let data_dir = data_dir.as_ref();
        if let Err(e) = fs::create_dir_all(data_dir) {
            warn!("Failed to create data directory: {}", e);
        }

        Self {
            episodes_completed: AtomicU64::new(0),
            episodes_aborted: AtomicU64::new(0),
            total_moves: AtomicU64::new(0),
            first_wins: AtomicU64::new(0),
            second_wins: AtomicU64::new(0),
            draws: AtomicU64::new(0),
            records_pushed: AtomicU64::new(0),
            records_ingested: AtomicU64::new(0),
            searches: AtomicU64::new(0),
            search_iterations: AtomicU64::new(0),
            start_time: Instant::now(),
            stats_path: data_dir.join("actor_stats.json"),
            env_id: env_id.to_string(),
        }
    }

    /// Record a finished episode whose records were pushed.
    pub fn record_episode(&self, moves: u32, outcome: Outcome, records: usize) {
        self.episodes_completed.fetch_add(1, Ordering::Relaxed);
        self.total_moves.fetch_add(moves as u64, Ordering::Relaxed);
        self.records_pushed
            .fetch_add(records as u64, Ordering::Relaxed);

        let counter = match outcome.winner() {
            Some(engine_core::Player::First) => &self.first_wins,
            Some(engine_core::Player::Second) => &self.second_wins,
            None => &self.draws,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an episode discarded because of an agent failure or the move guard.
    pub fn record_aborted(&self) {
        self.episodes_aborted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record searches performed during an episode.
    pub fn record_searches(&self, searches: u32, iterations: u64) {
        self.searches.fetch_add(searches as u64, Ordering::Relaxed);
        self.search_iterations
            .fetch_add(iterations, Ordering::Relaxed);
    }

    /// Record records taken from recorded-game files.
    pub fn record_ingested(&self, records: usize) {
        self.records_ingested
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn episodes_completed(&self) -> u64 {
        self.episodes_completed.load(Ordering::Relaxed)
    }

    /// Get a snapshot of current stats.
    pub fn snapshot(&self) -> ActorStatsSnapshot {
        let episodes = self.episodes_completed.load(Ordering::Relaxed);
        let moves = self.total_moves.load(Ordering::Relaxed);
        let searches = self.searches.load(Ordering::Relaxed);
        let iterations = self.search_iterations.load(Ordering::Relaxed);
        let runtime = self.start_time.elapsed().as_secs_f64();

        let ratio = |num: u64, den: u64| {
            if den > 0 {
                num as f64 / den as f64
            } else {
                0.0
            }
        };

        let episodes_per_second = if runtime > 0.0 {
            episodes as f64 / runtime
        } else {
            0.0
        };

        ActorStatsSnapshot {
            env_id: self.env_id.clone(),
            episodes_completed: episodes,
            episodes_aborted: self.episodes_aborted.load(Ordering::Relaxed),
            total_moves: moves,
            first_wins: self.first_wins.load(Ordering::Relaxed),
            second_wins: self.second_wins.load(Ordering::Relaxed),
            draws: self.draws.load(Ordering::Relaxed),
            records_pushed: self.records_pushed.load(Ordering::Relaxed),
            records_ingested: self.records_ingested.load(Ordering::Relaxed),
            avg_episode_length: ratio(moves, episodes),
            avg_iterations_per_search: ratio(iterations, searches),
            episodes_per_second,
            runtime_seconds: runtime,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }

    /// Write stats to JSON file (atomic write-then-rename).
    pub fn write_stats(&self) {
        let snapshot = self.snapshot();

        let json = match serde_json::to_string_pretty(&snapshot) {
            Ok(j) => j,
            Err(e) => {
                warn!("Failed to serialize actor stats: {}", e);
                return;
            }
        };

        let temp_path = self.stats_path.with_extension("json.tmp");
        match fs::File::create(&temp_path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(json.as_bytes()) {
                    warn!("Failed to write actor stats: {}", e);
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to create temp stats file: {}", e);
                return;
            }
        }

        if let Err(e) = fs::rename(&temp_path, &self.stats_path) {
            warn!("Failed to rename stats file: {}", e);
            let _ = fs::remove_file(&temp_path);
            return;
        }

        debug!("Wrote actor stats to {}", self.stats_path.display());
    }

    pub fn stats_path(&self) -> &Path {
        &self.stats_path
    }
}
