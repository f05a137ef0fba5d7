//! Trainable model interface
//!
//! The training loop only needs to update parameters from a batch, read the
//! policy on a set of states, freeze the current parameters into an
//! [`Evaluator`] for search, and move parameters in and out of checkpoints.

use std::sync::Arc;

use actor::TrainingRecord;
use engine_core::Game;
use mcts::Evaluator;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Observation has {got} values, model expects {expected}")]
    ObservationSize { expected: usize, got: usize },

    #[error("Policy target has {got} entries, model expects {expected}")]
    TargetSize { expected: usize, got: usize },

    #[error("Empty training batch")]
    EmptyBatch,

    #[error("Parameters are not finite after update")]
    Diverged,

    #[error("Invalid parameters: {0}")]
    Parameters(String),

    #[error("Failed to (de)serialize parameters: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Mean losses of one update over a batch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StepLoss {
    /// Cross-entropy against the search policy target
    pub policy_loss: f64,
    /// Squared error against the game outcome
    pub value_loss: f64,
    pub total: f64,
}

pub trait TrainableModel<G: Game>: Send {
    /// One gradient step on `batch`.
    fn train_step(
        &mut self,
        game: &G,
        batch: &[Arc<TrainingRecord<G::State>>],
        learning_rate: f64,
        momentum: f64,
    ) -> Result<StepLoss, ModelError>;

    /// Current policy for each state, masked to its legal actions.
    fn policies(&self, game: &G, states: &[&G::State]) -> Result<Vec<Vec<f32>>, ModelError>;

    /// Immutable copy of the current parameters usable by the search.
    fn snapshot(&self) -> Arc<dyn Evaluator<G>>;

    fn save_parameters(&self) -> Result<Vec<u8>, ModelError>;

    fn load_parameters(&mut self, bytes: &[u8]) -> Result<(), ModelError>;
}
