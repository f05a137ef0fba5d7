//! Concurrent self-play workers
//!
//! `process_num` workers run on tokio's blocking pool. Each owns its agents
//! and RNG, binds the current model snapshot at the start of every episode,
//! and pushes finished episodes into the shared replay buffer in one batch.
//! Aborted episodes are logged and dropped.

use anyhow::{anyhow, Result};
use engine_config::{AgentSpec, CentralConfig};
use engine_core::Game;
use model_watcher::ModelSlot;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agent::Agent;
use crate::config::{build_agents, temperature_schedule, AgentSettings};
use crate::episode::{play_episode, EpisodeConfig, TemperatureSchedule, TrainingRecord};
use crate::metrics;
use crate::replay::ReplayBuffer;
use crate::stats::ActorStats;

/// Seat assignments handed out to workers in rotation.
///
/// - one agent: it plays both seats
/// - two or more: every ordered pair `(i, j)` with `i != j`, so each pair
///   meets with both colour assignments
#[derive(Debug)]
pub struct PairingSchedule {
    pairs: Vec<[usize; 2]>,
    next: AtomicUsize,
}

impl PairingSchedule {
    pub fn new(num_agents: usize) -> Self {
        let pairs = if num_agents <= 1 {
            vec![[0, 0]]
        } else {
            (0..num_agents)
                .flat_map(|i| (0..num_agents).filter(move |&j| j != i).map(move |j| [i, j]))
                .collect()
        };
        Self {
            pairs,
            next: AtomicUsize::new(0),
        }
    }

    pub fn pairs(&self) -> &[[usize; 2]] {
        &self.pairs
    }

    /// Next seat assignment; safe to call from any worker.
    pub fn next(&self) -> [usize; 2] {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        self.pairs[i % self.pairs.len()]
    }
}

/// Static worker pool parameters.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub process_num: usize,
    pub seed: u64,
    pub max_moves: u32,
    pub temperature: TemperatureSchedule,
    /// Stop after this many episodes have been started; `None` = until shutdown
    pub episode_limit: Option<u64>,
}

impl PoolSettings {
    /// Settings from `[data]` and the `[mcts]` temperature schedule; no
    /// episode limit.
    pub fn from_config(config: &CentralConfig) -> Self {
        Self {
            process_num: config.data.process_num,
            seed: config.data.seed,
            max_moves: config.data.max_moves,
            temperature: temperature_schedule(&config.mcts),
            episode_limit: None,
        }
    }
}

/// Totals returned when all workers have stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub episodes: u64,
    pub aborted: u64,
    pub records: u64,
}

/// Self-play worker pool.
pub struct WorkerPool<G: Game> {
    game: Arc<G>,
    agents: Vec<AgentSpec>,
    agent_settings: AgentSettings,
    settings: PoolSettings,
    slot: Arc<ModelSlot<G>>,
    buffer: Arc<ReplayBuffer<TrainingRecord<G::State>>>,
    stats: Arc<ActorStats>,
    schedule: PairingSchedule,
    started: AtomicU64,
}

impl<G: Game> WorkerPool<G> {
    pub fn new(
        game: Arc<G>,
        agents: Vec<AgentSpec>,
        agent_settings: AgentSettings,
        settings: PoolSettings,
        slot: Arc<ModelSlot<G>>,
        buffer: Arc<ReplayBuffer<TrainingRecord<G::State>>>,
        stats: Arc<ActorStats>,
    ) -> Self {
        let agents = crate::config::resolve_agents(&agents);
        let schedule = PairingSchedule::new(agents.len());
        Self {
            game,
            agents,
            agent_settings,
            settings,
            slot,
            buffer,
            stats,
            schedule,
            started: AtomicU64::new(0),
        }
    }

    pub fn schedule(&self) -> &PairingSchedule {
        &self.schedule
    }

    /// Run all workers until `shutdown` is set or the episode limit is reached.
    ///
    /// Agent construction errors are reported before any worker starts.
    pub async fn run(self: Arc<Self>, shutdown: Arc<AtomicBool>) -> Result<PoolSummary> {
        // Fail fast on bad agent configuration
        build_agents::<G>(&self.agents, &self.agent_settings)?;

        info!(
            workers = self.settings.process_num,
            agents = self.agents.len(),
            pairings = self.schedule.pairs().len(),
            "Starting self-play workers"
        );

        let handles: Vec<_> = (0..self.settings.process_num)
            .map(|worker_id| {
                let pool = Arc::clone(&self);
                let shutdown = Arc::clone(&shutdown);
                tokio::task::spawn_blocking(move || pool.worker_loop(worker_id, &shutdown))
            })
            .collect();

        let mut summary = PoolSummary::default();
        for handle in handles {
            let worker = handle
                .await
                .map_err(|e| anyhow!("self-play worker panicked: {}", e))??;
            summary.episodes += worker.episodes;
            summary.aborted += worker.aborted;
            summary.records += worker.records;
        }

        self.stats.write_stats();
        info!(
            episodes = summary.episodes,
            aborted = summary.aborted,
            records = summary.records,
            "Self-play workers stopped"
        );
        Ok(summary)
    }

    /// Claim the next episode slot, or `false` when the limit is reached.
    fn claim_episode(&self) -> bool {
        match self.settings.episode_limit {
            Some(limit) => self.started.fetch_add(1, Ordering::Relaxed) < limit,
            None => true,
        }
    }

    fn worker_loop(&self, worker_id: usize, shutdown: &AtomicBool) -> Result<PoolSummary> {
        let mut agents: Vec<Agent<G>> = build_agents(&self.agents, &self.agent_settings)?;
        let mut rng = ChaCha20Rng::seed_from_u64(self.settings.seed);
        rng.set_stream(worker_id as u64);
        let mut summary = PoolSummary::default();

        debug!(worker_id, "Self-play worker started");

        while !shutdown.load(Ordering::Relaxed) && self.claim_episode() {
            let seats = self.schedule.next();
            let config = EpisodeConfig {
                seats,
                temperature: self.settings.temperature,
                max_moves: self.settings.max_moves,
            };

            // Read-only for the whole episode
            let (model_version, evaluator) = self.slot.snapshot_with_version();
            for agent in agents.iter_mut() {
                agent.bind_evaluator(&evaluator);
            }

            match play_episode(self.game.as_ref(), &mut agents, &config, &mut rng) {
                Ok(result) => {
                    let records = self.buffer.push_batch(result.records);
                    summary.episodes += 1;
                    summary.records += records as u64;

                    self.stats.record_episode(result.moves, result.outcome, records);
                    self.stats
                        .record_searches(result.searches, result.search_iterations);
                    metrics::record_episode(result.outcome, result.moves, result.elapsed.as_secs_f64());
                    metrics::RECORDS_PUSHED.inc_by(records as u64);
                    metrics::MCTS_SEARCHES_TOTAL.inc_by(result.searches as u64);
                    metrics::MCTS_ITERATIONS_TOTAL.inc_by(result.search_iterations);
                    metrics::REPLAY_BUFFER_SIZE.set(self.buffer.len() as i64);

                    debug!(
                        worker_id,
                        model_version,
                        first = %agents[seats[0]].name(),
                        second = %agents[seats[1]].name(),
                        moves = result.moves,
                        outcome = ?result.outcome,
                        records,
                        elapsed_ms = result.elapsed.as_millis() as u64,
                        "Episode complete"
                    );

                    let completed = self.stats.episodes_completed();
                    if completed % 100 == 0 {
                        self.stats.write_stats();
                    }
                }
                Err(e) => {
                    summary.aborted += 1;
                    self.stats.record_aborted();
                    metrics::EPISODES_ABORTED.inc();
                    warn!(worker_id, "Episode aborted: {}", e);
                }
            }
        }

        debug!(worker_id, episodes = summary.episodes, "Self-play worker stopped");
        Ok(summary)
    }
}
