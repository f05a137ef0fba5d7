//! Training side of zeroloop
//!
//! - [`training`]: the sample / update / evaluate loop
//! - [`kl`]: learning rate control from the policy shift per step
//! - [`gate`]: candidate vs accepted model matches
//! - [`checkpoint`]: versioned parameter storage with a `latest` alias
//! - [`model`] and [`linear`]: the trainable model interface and a linear
//!   reference model

pub mod checkpoint;
pub mod config;
pub mod gate;
pub mod kl;
pub mod linear;
pub mod model;
pub mod training;

pub use checkpoint::{CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::Cli;
pub use gate::{run_gate, GateResult, GateSettings};
pub use kl::{mean_kl, KlController};
pub use linear::{load_evaluator, LinearEvaluator, LinearModel, LinearParams};
pub use model::{ModelError, StepLoss, TrainableModel};
pub use training::{
    LoopState, StepReport, TrainingError, TrainingLoop, TrainingSettings, TrainingSummary,
};
