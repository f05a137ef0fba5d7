//! Training loop
//!
//! ```text
//! Idle -> Sampling -> Updating -> Sampling -> ...
//!            |            |
//!            v            v  (every eval_period steps)
//!         Waiting     Evaluating -> promote | reject -> Sampling
//! ```
//!
//! `Waiting` is entered while the replay buffer is below `min_fill` and is
//! not an error. The loop ends in `Stopped` on shutdown or at `max_steps`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use actor::config::evaluation_search_config;
use actor::metrics::{
    LEARNING_RATE_MULTIPLIER, MODEL_VERSION, PROMOTIONS, REJECTIONS, TRAINING_KL, TRAINING_STEPS,
};
use actor::{EpisodeError, ReplayBuffer, TrainingRecord};
use engine_config::CentralConfig;
use engine_core::Game;
use indicatif::{ProgressBar, ProgressStyle};
use mcts::Evaluator;
use model_watcher::ModelSlot;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tracing::{debug, info};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::gate::{run_gate, GateResult, GateSettings};
use crate::kl::{mean_kl, KlController};
use crate::model::{ModelError, StepLoss, TrainableModel};

/// RNG stream for the trainer; self-play workers use streams `0..process_num`.
const TRAINER_STREAM: u64 = 1 << 32;

/// Longest single sleep while waiting, so shutdown is noticed promptly.
const WAIT_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Evaluation game failed: {0}")]
    Evaluation(#[from] EpisodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Sampling,
    Waiting,
    Updating,
    Evaluating,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct TrainingSettings {
    pub batch_size: usize,
    pub num_epoches: u32,
    pub learning_rate: f64,
    pub momentum: f64,
    pub kl_target: f64,
    /// Steps between promotion gates; 0 disables the gate
    pub eval_period: u64,
    pub step_limit: Option<u64>,
    pub wait_interval: Duration,
    pub gate: GateSettings,
    pub seed: u64,
    pub show_progress: bool,
}

impl TrainingSettings {
    pub fn from_config(config: &CentralConfig) -> Self {
        let t = &config.training;
        Self {
            batch_size: t.batch_size,
            num_epoches: t.num_epoches,
            learning_rate: t.learning_rate,
            momentum: t.momentum,
            kl_target: t.kl_target,
            eval_period: t.eval_period,
            step_limit: t.step_limit(),
            wait_interval: t.wait_interval(),
            gate: GateSettings {
                rounds: t.eval_rounds,
                opening_moves: t.eval_opening_moves,
                search: evaluation_search_config(&config.mcts),
                max_moves: config.data.max_moves,
            },
            seed: config.data.seed,
            show_progress: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    pub step: u64,
    pub loss: StepLoss,
    /// KL(old || new) on the held-out batch after the last epoch
    pub kl: f64,
    /// Epochs actually run; fewer than `num_epoches` after an early stop
    pub epochs: u32,
    pub learning_rate: f64,
    pub lr_multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrainingSummary {
    pub steps: u64,
    pub promotions: u64,
    pub rejections: u64,
    pub accepted_version: u64,
}

pub struct TrainingLoop<G: Game, M: TrainableModel<G>> {
    game: Arc<G>,
    model: M,
    buffer: Arc<ReplayBuffer<TrainingRecord<G::State>>>,
    store: Arc<dyn CheckpointStore>,
    slot: Arc<ModelSlot<G>>,
    settings: TrainingSettings,
    kl: KlController,
    rng: ChaCha20Rng,
    state: LoopState,
    steps: u64,
    promotions: u64,
    rejections: u64,
    accepted_version: u64,
    accepted: Arc<dyn Evaluator<G>>,
}

impl<G: Game, M: TrainableModel<G>> TrainingLoop<G, M> {
    /// Resume from the newest checkpoint in `store`, or save the initial
    /// parameters as version 0. The accepted model is published to `slot`.
    pub fn new(
        game: Arc<G>,
        mut model: M,
        buffer: Arc<ReplayBuffer<TrainingRecord<G::State>>>,
        store: Arc<dyn CheckpointStore>,
        slot: Arc<ModelSlot<G>>,
        settings: TrainingSettings,
    ) -> Result<Self, TrainingError> {
        let accepted_version = match store.latest_version()? {
            Some(version) => {
                let bytes = store.load(&version.to_string())?;
                model.load_parameters(&bytes)?;
                info!(version, "Resuming from checkpoint");
                version
            }
            None => {
                store.save(0, &model.save_parameters()?)?;
                info!("No checkpoint found, saved initial model as version 0");
                0
            }
        };

        let accepted = model.snapshot();
        slot.publish(Arc::clone(&accepted));
        MODEL_VERSION.set(accepted_version as i64);

        let mut rng = ChaCha20Rng::seed_from_u64(settings.seed);
        rng.set_stream(TRAINER_STREAM);

        Ok(Self {
            game,
            model,
            buffer,
            store,
            slot,
            kl: KlController::new(settings.kl_target),
            settings,
            rng,
            state: LoopState::Idle,
            steps: 0,
            promotions: 0,
            rejections: 0,
            accepted_version,
            accepted,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn accepted_version(&self) -> u64 {
        self.accepted_version
    }

    pub fn kl_controller(&self) -> &KlController {
        &self.kl
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// One training step. `Ok(None)` means the buffer is not ready yet.
    pub fn train_step(&mut self) -> Result<Option<StepReport>, TrainingError> {
        self.state = LoopState::Sampling;
        let (batch, held_out) = match self.buffer.sample_split(
            self.settings.batch_size,
            self.settings.batch_size,
            &mut self.rng,
        ) {
            Ok(split) => split,
            Err(underrun) => {
                self.state = LoopState::Waiting;
                debug!(len = underrun.len, min_fill = underrun.min_fill, "Waiting for data");
                return Ok(None);
            }
        };
        let game = self.game.as_ref();
        // A single buffered record leaves nothing to hold out
        let reference = if held_out.is_empty() { &batch } else { &held_out };
        let held_out_states: Vec<&G::State> = reference.iter().map(|r| &r.state).collect();
        let old = self.model.policies(game, &held_out_states)?;

        self.state = LoopState::Updating;
        let learning_rate = self.kl.learning_rate(self.settings.learning_rate);
        let mut loss = StepLoss::default();
        let mut kl = 0.0;
        let mut epochs = 0;
        for _ in 0..self.settings.num_epoches.max(1) {
            loss = self
                .model
                .train_step(game, &batch, learning_rate, self.settings.momentum)?;
            epochs += 1;
            let new = self.model.policies(game, &held_out_states)?;
            kl = mean_kl(&old, &new);
            if kl > self.kl.early_stop_kl() {
                debug!(epochs, kl, "KL early stop");
                break;
            }
        }
        let lr_multiplier = self.kl.update(kl);
        self.steps += 1;

        TRAINING_STEPS.inc();
        TRAINING_KL.set(kl);
        LEARNING_RATE_MULTIPLIER.set(lr_multiplier);

        let report = StepReport {
            step: self.steps,
            loss,
            kl,
            epochs,
            learning_rate,
            lr_multiplier,
        };
        debug!(
            step = report.step,
            loss = report.loss.total,
            policy_loss = report.loss.policy_loss,
            value_loss = report.loss.value_loss,
            kl,
            epochs,
            lr_multiplier,
            "Training step"
        );
        Ok(Some(report))
    }

    /// Play the current parameters against the accepted model.
    pub fn evaluate_candidate(&mut self) -> Result<GateResult, TrainingError> {
        self.state = LoopState::Evaluating;
        let candidate = self.model.snapshot();
        let result = run_gate(
            self.game.as_ref(),
            candidate,
            Arc::clone(&self.accepted),
            &self.settings.gate,
            &mut self.rng,
        )?;
        Ok(result)
    }

    /// Promote the candidate or roll the model back to the accepted
    /// checkpoint.
    pub fn apply_gate_result(&mut self, result: &GateResult) -> Result<(), TrainingError> {
        if result.promoted {
            let version = self.accepted_version + 1;
            self.store.save(version, &self.model.save_parameters()?)?;
            self.accepted = self.model.snapshot();
            let published = self.slot.publish(Arc::clone(&self.accepted));
            self.accepted_version = version;
            self.promotions += 1;
            PROMOTIONS.inc();
            MODEL_VERSION.set(version as i64);
            info!(
                version,
                slot_version = published,
                wins = result.candidate_wins,
                losses = result.accepted_wins,
                draws = result.draws,
                "Candidate promoted"
            );
        } else {
            let bytes = self.store.load(&self.accepted_version.to_string())?;
            self.model.load_parameters(&bytes)?;
            self.rejections += 1;
            REJECTIONS.inc();
            info!(
                accepted_version = self.accepted_version,
                wins = result.candidate_wins,
                losses = result.accepted_wins,
                draws = result.draws,
                "Candidate rejected, continuing from accepted model"
            );
        }
        Ok(())
    }

    fn summary(&self) -> TrainingSummary {
        TrainingSummary {
            steps: self.steps,
            promotions: self.promotions,
            rejections: self.rejections,
            accepted_version: self.accepted_version,
        }
    }

    fn wait(&self, shutdown: &AtomicBool) {
        let deadline = Instant::now() + self.settings.wait_interval;
        while !shutdown.load(Ordering::Relaxed) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }

    fn progress_bar(&self) -> Option<ProgressBar> {
        if !self.settings.show_progress {
            return None;
        }
        let pb = match self.settings.step_limit {
            Some(limit) => {
                let pb = ProgressBar::new(limit);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} steps ({eta}) {msg}")
                {
                    pb.set_style(style.progress_chars("#>-"));
                }
                pb
            }
            None => ProgressBar::new_spinner(),
        };
        Some(pb)
    }

    /// Blocking loop until `shutdown` is set or the step limit is reached.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<TrainingSummary, TrainingError> {
        info!(
            batch_size = self.settings.batch_size,
            num_epoches = self.settings.num_epoches,
            eval_period = self.settings.eval_period,
            step_limit = ?self.settings.step_limit,
            accepted_version = self.accepted_version,
            "Training loop starting"
        );
        let progress = self.progress_bar();

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping training");
                break;
            }
            if let Some(limit) = self.settings.step_limit {
                if self.steps >= limit {
                    info!(steps = self.steps, "Reached step limit");
                    break;
                }
            }

            let report = match self.train_step()? {
                Some(report) => report,
                None => {
                    self.wait(shutdown);
                    continue;
                }
            };
            if let Some(ref pb) = progress {
                pb.inc(1);
                pb.set_message(format!("kl {:.4} loss {:.3}", report.kl, report.loss.total));
            }

            if self.settings.eval_period > 0 && report.step % self.settings.eval_period == 0 {
                let result = self.evaluate_candidate()?;
                self.apply_gate_result(&result)?;
            }
        }

        self.state = LoopState::Stopped;
        if let Some(pb) = progress {
            pb.finish_and_clear();
        }
        let summary = self.summary();
        info!(
            steps = summary.steps,
            promotions = summary.promotions,
            rejections = summary.rejections,
            accepted_version = summary.accepted_version,
            "Training loop stopped"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{FileCheckpointStore, MemoryCheckpointStore};
    use crate::linear::LinearModel;
    use engine_core::one_hot_policy;
    use games_gomoku::{Gomoku, Position};
    use mcts::{MctsConfig, UniformEvaluator};

    type Buffer = ReplayBuffer<TrainingRecord<<Gomoku as Game>::State>>;

    fn settings() -> TrainingSettings {
        TrainingSettings {
            batch_size: 8,
            num_epoches: 3,
            learning_rate: 0.05,
            momentum: 0.9,
            kl_target: 0.02,
            eval_period: 0,
            step_limit: None,
            wait_interval: Duration::from_millis(10),
            gate: GateSettings {
                rounds: 2,
                opening_moves: 1,
                search: MctsConfig::for_testing().with_iterations(16),
                max_moves: 16,
            },
            seed: 5,
            show_progress: false,
        }
    }

    fn fill(game: &Gomoku, buffer: &Buffer, n: usize) {
        let start = game.initial_state();
        let corner = game.action_index(Position::new(0, 0));
        let records = (0..n)
            .map(|_| TrainingRecord {
                state: start.clone(),
                policy: one_hot_policy(game.num_actions(), corner),
                outcome: 1.0,
            })
            .collect();
        buffer.push_batch(records);
    }

    struct Fixture {
        game: Arc<Gomoku>,
        buffer: Arc<Buffer>,
        store: Arc<MemoryCheckpointStore>,
        slot: Arc<ModelSlot<Gomoku>>,
    }

    fn fixture(min_fill: usize) -> Fixture {
        Fixture {
            game: Arc::new(Gomoku::tictactoe()),
            buffer: Arc::new(ReplayBuffer::new(100, min_fill)),
            store: Arc::new(MemoryCheckpointStore::new()),
            slot: Arc::new(ModelSlot::new(
                Arc::new(UniformEvaluator::new()) as Arc<dyn Evaluator<Gomoku>>
            )),
        }
    }

    fn training_loop(f: &Fixture, settings: TrainingSettings) -> TrainingLoop<Gomoku, LinearModel> {
        TrainingLoop::new(
            Arc::clone(&f.game),
            LinearModel::for_game(f.game.as_ref()),
            Arc::clone(&f.buffer),
            f.store.clone(),
            Arc::clone(&f.slot),
            settings,
        )
        .unwrap()
    }

    fn initial_policy(tl: &TrainingLoop<Gomoku, LinearModel>, game: &Gomoku) -> Vec<Vec<f32>> {
        let state = game.initial_state();
        tl.model().policies(game, &[&state]).unwrap()
    }

    #[test]
    fn test_new_saves_version_zero_and_publishes() {
        let f = fixture(4);
        let tl = training_loop(&f, settings());
        assert_eq!(tl.state(), LoopState::Idle);
        assert_eq!(tl.accepted_version(), 0);
        assert_eq!(f.store.latest_version().unwrap(), Some(0));
        assert_eq!(f.slot.version(), 1);
    }

    #[test]
    fn test_new_resumes_from_latest_checkpoint() {
        let f = fixture(4);
        fill(&f.game, &f.buffer, 8);
        let mut first = training_loop(&f, settings());
        first.train_step().unwrap().unwrap();
        let params = TrainableModel::<Gomoku>::save_parameters(first.model()).unwrap();
        f.store.save(3, &params).unwrap();

        let resumed = training_loop(&f, settings());
        assert_eq!(resumed.accepted_version(), 3);
        assert_eq!(
            initial_policy(&resumed, &f.game),
            initial_policy(&first, &f.game)
        );
    }

    #[test]
    fn test_underrun_waits() {
        let f = fixture(4);
        fill(&f.game, &f.buffer, 3);
        let mut tl = training_loop(&f, settings());
        assert!(tl.train_step().unwrap().is_none());
        assert_eq!(tl.state(), LoopState::Waiting);
        assert_eq!(tl.steps(), 0);
    }

    #[test]
    fn test_single_record_uses_batch_as_kl_reference() {
        let f = fixture(1);
        fill(&f.game, &f.buffer, 1);
        let mut tl = training_loop(&f, settings());

        let report = tl.train_step().unwrap().unwrap();
        assert_eq!(report.step, 1);
        assert!(report.kl > 0.0);
        assert!(report.kl.is_finite());
    }

    #[test]
    fn test_step_updates_model_and_reports_kl() {
        let f = fixture(4);
        fill(&f.game, &f.buffer, 8);
        let mut tl = training_loop(&f, settings());
        let before = initial_policy(&tl, &f.game);

        let report = tl.train_step().unwrap().unwrap();
        assert_eq!(report.step, 1);
        assert!(report.epochs >= 1 && report.epochs <= 3);
        assert!(report.kl > 0.0);
        assert_eq!(tl.state(), LoopState::Updating);
        assert_ne!(initial_policy(&tl, &f.game), before);
    }

    #[test]
    fn test_large_kl_stops_epochs_early_and_lowers_lr() {
        let f = fixture(4);
        fill(&f.game, &f.buffer, 8);
        let mut s = settings();
        s.kl_target = 1e-9;
        s.num_epoches = 5;
        let mut tl = training_loop(&f, s);

        let report = tl.train_step().unwrap().unwrap();
        assert_eq!(report.epochs, 1);
        assert!(report.lr_multiplier < 1.0);
        assert!(tl.kl_controller().multiplier() < 1.0);
    }

    #[test]
    fn test_rejection_restores_accepted_parameters() {
        let f = fixture(4);
        fill(&f.game, &f.buffer, 8);
        let mut tl = training_loop(&f, settings());
        let accepted = initial_policy(&tl, &f.game);
        tl.train_step().unwrap().unwrap();
        assert_ne!(initial_policy(&tl, &f.game), accepted);

        let rejected = GateResult {
            candidate_wins: 1,
            accepted_wins: 1,
            draws: 0,
            rounds: 2,
            promoted: false,
        };
        tl.apply_gate_result(&rejected).unwrap();
        assert_eq!(initial_policy(&tl, &f.game), accepted);
        assert_eq!(tl.accepted_version(), 0);
        assert_eq!(f.store.latest_version().unwrap(), Some(0));
        assert_eq!(f.slot.version(), 1);
    }

    #[test]
    fn test_promotion_saves_and_publishes() {
        let f = fixture(4);
        fill(&f.game, &f.buffer, 8);
        let mut tl = training_loop(&f, settings());
        tl.train_step().unwrap().unwrap();
        let trained = initial_policy(&tl, &f.game);

        let promoted = GateResult {
            candidate_wins: 2,
            accepted_wins: 0,
            draws: 0,
            rounds: 2,
            promoted: true,
        };
        tl.apply_gate_result(&promoted).unwrap();
        assert_eq!(tl.accepted_version(), 1);
        assert_eq!(f.store.latest_version().unwrap(), Some(1));
        assert_eq!(f.slot.version(), 2);

        // The published snapshot plays with the trained parameters
        let state = f.game.initial_state();
        let published = f.slot.snapshot().evaluate(&f.game, &state).unwrap();
        assert_eq!(published.policy, trained[0]);
    }

    #[test]
    fn test_run_to_step_limit_with_gate() {
        let f = fixture(4);
        fill(&f.game, &f.buffer, 8);
        let mut s = settings();
        s.step_limit = Some(3);
        s.eval_period = 2;
        let mut tl = training_loop(&f, s);

        let summary = tl.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(summary.steps, 3);
        assert_eq!(summary.promotions + summary.rejections, 1);
        assert_eq!(tl.state(), LoopState::Stopped);
        assert_eq!(
            f.store.latest_version().unwrap(),
            Some(summary.accepted_version)
        );
    }

    #[test]
    fn test_run_stops_on_shutdown_while_waiting() {
        let f = fixture(4);
        let mut tl = training_loop(&f, settings());
        let shutdown = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&shutdown);
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::Relaxed);
        });
        let summary = tl.run(&shutdown).unwrap();
        stopper.join().unwrap();

        assert_eq!(summary.steps, 0);
        assert_eq!(tl.state(), LoopState::Stopped);
    }

    #[test]
    fn test_file_store_round_trip_through_loop() {
        let dir = tempfile::tempdir().unwrap();
        let game = Arc::new(Gomoku::tictactoe());
        let buffer: Arc<Buffer> = Arc::new(ReplayBuffer::new(100, 4));
        fill(&game, &buffer, 8);
        let store = Arc::new(FileCheckpointStore::new(dir.path(), "latest").unwrap());
        let slot = Arc::new(ModelSlot::new(
            Arc::new(UniformEvaluator::new()) as Arc<dyn Evaluator<Gomoku>>
        ));

        let mut tl = TrainingLoop::new(
            Arc::clone(&game),
            LinearModel::for_game(game.as_ref()),
            buffer,
            store.clone(),
            slot,
            settings(),
        )
        .unwrap();
        tl.train_step().unwrap().unwrap();
        tl.apply_gate_result(&GateResult {
            candidate_wins: 2,
            accepted_wins: 0,
            draws: 0,
            rounds: 2,
            promoted: true,
        })
        .unwrap();

        assert!(store.alias_path().exists());
        assert!(dir.path().join("model_000001.ckpt").exists());
        assert_eq!(store.load("latest").unwrap(), store.load("1").unwrap());
    }
}
