//! Configuration struct definitions.
//!
//! All config structs deserialize with per-section defaults, so a config.toml
//! only needs the keys it changes.

use std::time::Duration;

use crate::defaults;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Root configuration structure matching config.toml
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct CentralConfig {
    #[serde(default)]
    pub common: CommonConfig,
    #[serde(default)]
    pub mcts: MctsConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Common configuration shared by all components
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CommonConfig {
    pub data_dir: String,
    pub env_id: String,
    pub log_level: String,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir().into(),
            env_id: defaults::env_id().into(),
            log_level: defaults::log_level().into(),
        }
    }
}

/// Search configuration used by self-play and evaluation games
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MctsConfig {
    pub c_puct: f64,
    /// Iterations per move, 0 = no iteration limit
    pub c_iterations: u32,
    /// Milliseconds per move, 0 = no time limit
    pub c_duration: u64,
    pub dirichlet_alpha: f64,
    pub dirichlet_epsilon: f64,
    pub temperature: f64,
    pub temp_threshold: u32,
    pub late_temperature: f64,
    pub reuse_tree: bool,
}

impl Default for MctsConfig {
    fn default() -> Self {
        Self {
            c_puct: defaults::c_puct(),
            c_iterations: defaults::c_iterations(),
            c_duration: defaults::c_duration(),
            dirichlet_alpha: defaults::dirichlet_alpha(),
            dirichlet_epsilon: defaults::dirichlet_epsilon(),
            temperature: defaults::temperature(),
            temp_threshold: defaults::temp_threshold(),
            late_temperature: defaults::late_temperature(),
            reuse_tree: defaults::reuse_tree(),
        }
    }
}

impl MctsConfig {
    pub fn iteration_limit(&self) -> Option<u32> {
        (self.c_iterations > 0).then_some(self.c_iterations)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        (self.c_duration > 0).then(|| Duration::from_millis(self.c_duration))
    }
}

/// Move-selection strategy of a configured agent
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentVariant {
    Random,
    Botzone,
    DefaultMcts,
    AlphaZero,
}

/// One entry of `data.agents`
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AgentSpec {
    pub variant: AgentVariant,
    /// botzone: executable followed by its arguments;
    /// default_mcts: optional rollout seed; ignored otherwise
    #[serde(default)]
    pub args: Vec<String>,
}

/// Self-play and data ingestion configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub agents: Vec<AgentSpec>,
    pub process_num: usize,
    pub buffer_size: usize,
    pub min_fill: usize,
    pub data_path: String,
    pub data_files: Vec<String>,
    pub botzone_timeout_ms: u64,
    pub max_moves: u32,
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            agents: defaults::agents().to_vec(),
            process_num: defaults::process_num(),
            buffer_size: defaults::buffer_size(),
            min_fill: defaults::min_fill(),
            data_path: defaults::data_path().into(),
            data_files: defaults::data_files().to_vec(),
            botzone_timeout_ms: defaults::botzone_timeout_ms(),
            max_moves: defaults::max_moves(),
            seed: defaults::seed(),
        }
    }
}

impl DataConfig {
    pub fn botzone_timeout(&self) -> Duration {
        Duration::from_millis(self.botzone_timeout_ms)
    }
}

/// Training loop configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    pub num_epoches: u32,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub kl_target: f64,
    pub eval_period: u64,
    pub eval_rounds: u32,
    pub eval_opening_moves: u32,
    pub model_file: String,
    pub model_path: String,
    /// -1 = run until shutdown
    pub max_steps: i64,
    pub wait_interval_ms: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epoches: defaults::num_epoches(),
            batch_size: defaults::batch_size(),
            learning_rate: defaults::learning_rate(),
            momentum: defaults::momentum(),
            kl_target: defaults::kl_target(),
            eval_period: defaults::eval_period(),
            eval_rounds: defaults::eval_rounds(),
            eval_opening_moves: defaults::eval_opening_moves(),
            model_file: defaults::model_file().into(),
            model_path: defaults::model_path().into(),
            max_steps: defaults::max_steps(),
            wait_interval_ms: defaults::wait_interval_ms(),
        }
    }
}

impl TrainingConfig {
    pub fn step_limit(&self) -> Option<u64> {
        u64::try_from(self.max_steps).ok()
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

impl CentralConfig {
    /// Reject configurations that cannot run. Called once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.mcts;
        if m.iteration_limit().is_none() && m.time_limit().is_none() {
            return Err(invalid(
                "mcts.c_iterations and mcts.c_duration cannot both be 0",
            ));
        }
        if !(m.c_puct >= 0.0) {
            return Err(invalid(format!("mcts.c_puct must be >= 0, got {}", m.c_puct)));
        }
        if m.dirichlet_alpha < 0.0 || !(0.0..=1.0).contains(&m.dirichlet_epsilon) {
            return Err(invalid(format!(
                "mcts Dirichlet noise out of range (alpha={}, epsilon={})",
                m.dirichlet_alpha, m.dirichlet_epsilon
            )));
        }
        if m.temperature < 0.0 || m.late_temperature < 0.0 {
            return Err(invalid("mcts temperatures must be >= 0"));
        }

        let d = &self.data;
        if d.process_num == 0 {
            return Err(invalid("data.process_num must be >= 1"));
        }
        if d.buffer_size == 0 {
            return Err(invalid("data.buffer_size must be >= 1"));
        }
        if d.max_moves == 0 {
            return Err(invalid("data.max_moves must be >= 1"));
        }
        for (i, agent) in d.agents.iter().enumerate() {
            match agent.variant {
                AgentVariant::Botzone if agent.args.is_empty() => {
                    return Err(invalid(format!(
                        "data.agents[{}]: botzone needs an executable",
                        i
                    )));
                }
                AgentVariant::DefaultMcts => {
                    if let Some(seed) = agent.args.first() {
                        seed.parse::<u64>().map_err(|_| {
                            invalid(format!(
                                "data.agents[{}]: rollout seed {:?} is not an integer",
                                i, seed
                            ))
                        })?;
                    }
                }
                _ => {}
            }
        }

        let t = &self.training;
        if t.batch_size == 0 || t.num_epoches == 0 {
            return Err(invalid(
                "training.batch_size and training.num_epoches must be >= 1",
            ));
        }
        if !(t.learning_rate > 0.0) {
            return Err(invalid("training.learning_rate must be > 0"));
        }
        if !(0.0..1.0).contains(&t.momentum) {
            return Err(invalid("training.momentum must be in [0, 1)"));
        }
        if !(t.kl_target > 0.0) {
            return Err(invalid("training.kl_target must be > 0"));
        }
        if t.eval_period == 0 || t.eval_rounds == 0 {
            return Err(invalid(
                "training.eval_period and training.eval_rounds must be >= 1",
            ));
        }
        if t.model_file.is_empty() {
            return Err(invalid("training.model_file must not be empty"));
        }
        Ok(())
    }
}
