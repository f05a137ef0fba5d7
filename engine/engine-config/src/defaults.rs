//! Default configuration values loaded from config.defaults.toml.
//!
//! The defaults file is embedded at compile time so the binary and the
//! checked-in documentation of every key never disagree.

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::structs::AgentSpec;

/// The embedded defaults TOML file (loaded at compile time)
const DEFAULTS_TOML: &str = include_str!("../../../config.defaults.toml");

/// Parsed defaults structure (parsed once at first use)
static DEFAULTS: Lazy<DefaultsConfig> = Lazy::new(|| {
    toml::from_str(DEFAULTS_TOML).expect("config.defaults.toml should be valid TOML")
});

// ============================================================================
// Internal structs for parsing config.defaults.toml
// ============================================================================

#[derive(Debug, Deserialize)]
struct DefaultsConfig {
    common: CommonDefaults,
    mcts: MctsDefaults,
    data: DataDefaults,
    training: TrainingDefaults,
}

#[derive(Debug, Deserialize)]
struct CommonDefaults {
    data_dir: String,
    env_id: String,
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct MctsDefaults {
    c_puct: f64,
    c_iterations: u32,
    c_duration: u64,
    dirichlet_alpha: f64,
    dirichlet_epsilon: f64,
    temperature: f64,
    temp_threshold: u32,
    late_temperature: f64,
    reuse_tree: bool,
}

#[derive(Debug, Deserialize)]
struct DataDefaults {
    agents: Vec<AgentSpec>,
    process_num: usize,
    buffer_size: usize,
    min_fill: usize,
    data_path: String,
    data_files: Vec<String>,
    botzone_timeout_ms: u64,
    max_moves: u32,
    seed: u64,
}

#[derive(Debug, Deserialize)]
struct TrainingDefaults {
    num_epoches: u32,
    batch_size: usize,
    learning_rate: f64,
    momentum: f64,
    kl_target: f64,
    eval_period: u64,
    eval_rounds: u32,
    eval_opening_moves: u32,
    model_file: String,
    model_path: String,
    max_steps: i64,
    wait_interval_ms: u64,
}

// ============================================================================
// Public accessor functions
// ============================================================================

// Common
pub fn data_dir() -> &'static str {
    &DEFAULTS.common.data_dir
}
pub fn env_id() -> &'static str {
    &DEFAULTS.common.env_id
}
pub fn log_level() -> &'static str {
    &DEFAULTS.common.log_level
}

// MCTS
pub fn c_puct() -> f64 {
    DEFAULTS.mcts.c_puct
}
pub fn c_iterations() -> u32 {
    DEFAULTS.mcts.c_iterations
}
pub fn c_duration() -> u64 {
    DEFAULTS.mcts.c_duration
}
pub fn dirichlet_alpha() -> f64 {
    DEFAULTS.mcts.dirichlet_alpha
}
pub fn dirichlet_epsilon() -> f64 {
    DEFAULTS.mcts.dirichlet_epsilon
}
pub fn temperature() -> f64 {
    DEFAULTS.mcts.temperature
}
pub fn temp_threshold() -> u32 {
    DEFAULTS.mcts.temp_threshold
}
pub fn late_temperature() -> f64 {
    DEFAULTS.mcts.late_temperature
}
pub fn reuse_tree() -> bool {
    DEFAULTS.mcts.reuse_tree
}

// Data
pub fn agents() -> &'static [AgentSpec] {
    &DEFAULTS.data.agents
}
pub fn process_num() -> usize {
    DEFAULTS.data.process_num
}
pub fn buffer_size() -> usize {
    DEFAULTS.data.buffer_size
}
pub fn min_fill() -> usize {
    DEFAULTS.data.min_fill
}
pub fn data_path() -> &'static str {
    &DEFAULTS.data.data_path
}
pub fn data_files() -> &'static [String] {
    &DEFAULTS.data.data_files
}
pub fn botzone_timeout_ms() -> u64 {
    DEFAULTS.data.botzone_timeout_ms
}
pub fn max_moves() -> u32 {
    DEFAULTS.data.max_moves
}
pub fn seed() -> u64 {
    DEFAULTS.data.seed
}

// Training
pub fn num_epoches() -> u32 {
    DEFAULTS.training.num_epoches
}
pub fn batch_size() -> usize {
    DEFAULTS.training.batch_size
}
pub fn learning_rate() -> f64 {
    DEFAULTS.training.learning_rate
}
pub fn momentum() -> f64 {
    DEFAULTS.training.momentum
}
pub fn kl_target() -> f64 {
    DEFAULTS.training.kl_target
}
pub fn eval_period() -> u64 {
    DEFAULTS.training.eval_period
}
pub fn eval_rounds() -> u32 {
    DEFAULTS.training.eval_rounds
}
pub fn eval_opening_moves() -> u32 {
    DEFAULTS.training.eval_opening_moves
}
pub fn model_file() -> &'static str {
    &DEFAULTS.training.model_file
}
pub fn model_path() -> &'static str {
    &DEFAULTS.training.model_path
}
pub fn max_steps() -> i64 {
    DEFAULTS.training.max_steps
}
pub fn wait_interval_ms() -> u64 {
    DEFAULTS.training.wait_interval_ms
}
