//! zeroloop - self-play and training in one process
//!
//! 1. Loads config.toml (plus `ZEROLOOP_*` env vars and CLI flags)
//! 2. Ingests recorded games from `data.data_path` into the replay buffer
//! 3. Runs `process_num` self-play workers feeding the buffer
//! 4. Trains on the buffer, gating each candidate model against the accepted
//!    one and publishing promoted models to the workers
//!
//! With `--self-play-only` no training runs; the workers follow the `latest`
//! checkpoint written by another process instead.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use actor::metrics::{self, FILES_INGESTED};
use actor::{ActorStats, AgentSettings, DataIngestor, PoolSettings, ReplayBuffer, WorkerPool};
use anyhow::{anyhow, Context, Result};
use clap::Parser;
use engine_config::CentralConfig;
use games_gomoku::Gomoku;
use mcts::{Evaluator, UniformEvaluator};
use model_watcher::{ModelLoader, ModelSlot, ModelWatcher};
use tokio::signal;
use tracing::{error, info, warn};
use trainer::{
    load_evaluator, Cli, FileCheckpointStore, LinearModel, TrainingLoop, TrainingSettings,
};

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

type Buffer = ReplayBuffer<actor::TrainingRecord<<Gomoku as engine_core::Game>::State>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load()?;

    init_tracing(&config.common.log_level)?;
    info!(
        env_id = %config.common.env_id,
        process_num = config.data.process_num,
        max_steps = config.training.max_steps,
        self_play_only = cli.self_play_only,
        "zeroloop starting"
    );

    let game = Arc::new(
        Gomoku::from_env_id(&config.common.env_id)
            .ok_or_else(|| anyhow!("unknown env_id {:?}", config.common.env_id))?,
    );
    metrics::init_metrics();

    let buffer: Arc<Buffer> = Arc::new(ReplayBuffer::new(
        config.data.buffer_size,
        config.data.min_fill,
    ));
    let stats = Arc::new(ActorStats::new(
        &config.common.data_dir,
        &config.common.env_id,
    ));

    let report = DataIngestor::new(&config.data.data_path).ingest_all(
        game.as_ref(),
        &config.data.data_files,
        &buffer,
    );
    stats.record_ingested(report.records);
    FILES_INGESTED.inc_by(report.files_ingested as u64);

    let slot = Arc::new(ModelSlot::new(
        Arc::new(UniformEvaluator::new()) as Arc<dyn Evaluator<Gomoku>>
    ));
    let pool = Arc::new(WorkerPool::new(
        Arc::clone(&game),
        config.data.agents.clone(),
        AgentSettings::from_config(&config),
        PoolSettings::from_config(&config),
        Arc::clone(&slot),
        Arc::clone(&buffer),
        Arc::clone(&stats),
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_flag = Arc::clone(&shutdown);
    let signal_handle = tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for ctrl+c: {}", e);
            return;
        }
        info!("Shutdown signal received, stopping...");
        signal_flag.store(true, Ordering::Relaxed);
    });

    let result = if cli.self_play_only {
        run_self_play(&config, pool, slot, Arc::clone(&shutdown)).await
    } else {
        run_training(&config, &cli, game, pool, buffer, slot, Arc::clone(&shutdown)).await
    };

    signal_handle.abort();
    write_metrics(Path::new(&config.common.data_dir));

    match result {
        Ok(()) => {
            info!("zeroloop finished");
            Ok(())
        }
        Err(e) => {
            error!("zeroloop failed: {:#}", e);
            Err(e)
        }
    }
}

/// Self-play plus training; training decides when the run ends.
async fn run_training(
    config: &CentralConfig,
    cli: &Cli,
    game: Arc<Gomoku>,
    pool: Arc<WorkerPool<Gomoku>>,
    buffer: Arc<Buffer>,
    slot: Arc<ModelSlot<Gomoku>>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let store = Arc::new(
        FileCheckpointStore::new(&config.training.model_path, &config.training.model_file)
            .context("opening checkpoint directory")?,
    );
    let mut settings = TrainingSettings::from_config(config);
    settings.show_progress = cli.progress && std::io::IsTerminal::is_terminal(&std::io::stderr());

    let model = LinearModel::for_game(game.as_ref());
    let mut training = TrainingLoop::new(game, model, buffer, store, slot, settings)?;

    let pool_handle = tokio::spawn(pool.run(Arc::clone(&shutdown)));

    let training_flag = Arc::clone(&shutdown);
    let training_result = tokio::task::spawn_blocking(move || training.run(&training_flag))
        .await
        .map_err(|e| anyhow!("training task panicked: {}", e))?;

    // Training is done (or failed): stop the workers either way
    shutdown.store(true, Ordering::Relaxed);
    let pool_summary = pool_handle
        .await
        .map_err(|e| anyhow!("self-play pool panicked: {}", e))??;

    let summary = training_result?;
    info!(
        steps = summary.steps,
        promotions = summary.promotions,
        rejections = summary.rejections,
        accepted_version = summary.accepted_version,
        episodes = pool_summary.episodes,
        aborted = pool_summary.aborted,
        records = pool_summary.records,
        "Run complete"
    );
    Ok(())
}

/// Self-play only, reloading the model whenever the `latest` checkpoint changes.
async fn run_self_play(
    config: &CentralConfig,
    pool: Arc<WorkerPool<Gomoku>>,
    slot: Arc<ModelSlot<Gomoku>>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let loader: ModelLoader<Gomoku> = Arc::new(|path: &Path| load_evaluator::<Gomoku>(path));
    let watcher = ModelWatcher::new(
        &config.training.model_path,
        config.training.model_file.clone(),
        slot,
        loader,
    );
    match watcher.try_load_existing() {
        Ok(true) => {}
        Ok(false) => warn!(
            "No model at {}, self-play starts with uniform priors",
            watcher.model_path().display()
        ),
        Err(e) => warn!("Failed to load {}: {:#}", watcher.model_path().display(), e),
    }

    let mut updates = watcher.start_watching().await?;
    let updates_handle = tokio::spawn(async move {
        while let Some(version) = updates.recv().await {
            info!(slot_version = version, "Model updated, next episodes use the new model");
        }
    });

    let summary = pool.run(shutdown).await;
    updates_handle.abort();
    let summary = summary?;
    info!(
        episodes = summary.episodes,
        aborted = summary.aborted,
        records = summary.records,
        "Self-play complete"
    );
    Ok(())
}

/// Leave a Prometheus text snapshot next to the stats file.
fn write_metrics(data_dir: &Path) {
    let path = data_dir.join("metrics.prom");
    if let Err(e) = std::fs::create_dir_all(data_dir)
        .and_then(|_| std::fs::write(&path, metrics::encode_metrics()))
    {
        warn!("Failed to write {}: {}", path.display(), e);
    }
}
