//! Configuration loading logic.
//!
//! Handles loading config from files and applying environment variable overrides.

use crate::{CentralConfig, ConfigError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Standard locations to search for config.toml
pub const CONFIG_SEARCH_PATHS: &[&str] = &[
    "config.toml",    // Current directory
    "../config.toml", // Parent directory (when running from subdirectory)
];

/// Load the central configuration.
///
/// Searches for config.toml in the following order:
/// 1. Path specified by the ZEROLOOP_CONFIG environment variable
/// 2. Current directory (config.toml)
/// 3. Parent directory (../config.toml)
///
/// Falls back to the built-in defaults when no file exists. A file that
/// exists but cannot be read or parsed is an error. Environment variable
/// overrides are applied last.
pub fn load_config() -> Result<CentralConfig, ConfigError> {
    if let Ok(path) = std::env::var("ZEROLOOP_CONFIG") {
        let path = PathBuf::from(&path);
        if path.exists() {
            info!("Loading config from ZEROLOOP_CONFIG: {}", path.display());
            return load_from_path(&path);
        }
        warn!(
            "ZEROLOOP_CONFIG={} not found, searching defaults",
            path.display()
        );
    }

    for path_str in CONFIG_SEARCH_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading config from {}", path.display());
            return load_from_path(&path);
        }
    }

    debug!("No config.toml found, using built-in defaults");
    Ok(apply_env_overrides(CentralConfig::default()))
}

/// Load configuration from a specific path.
pub fn load_from_path(path: &Path) -> Result<CentralConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let config: CentralConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    Ok(apply_env_overrides(config))
}

/// Macro to reduce env override boilerplate
macro_rules! env_override {
    // String field
    ($config:expr, $section:ident . $field:ident, $key:expr) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v;
        }
    };
    // Parseable field (u32, u64, f64, bool, etc.)
    ($config:expr, $section:ident . $field:ident, $key:expr, parse) => {
        if let Ok(raw) = std::env::var($key) {
            match raw.parse() {
                Ok(v) => $config.$section.$field = v,
                Err(_) => warn!("Ignoring {}={:?}: not a valid value", $key, raw),
            }
        }
    };
    // Comma-separated list of strings
    ($config:expr, $section:ident . $field:ident, $key:expr, list) => {
        if let Ok(v) = std::env::var($key) {
            $config.$section.$field = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    };
}

/// Apply environment variable overrides to a configuration.
///
/// Environment variables follow the pattern: ZEROLOOP_<SECTION>_<KEY>
pub fn apply_env_overrides(mut config: CentralConfig) -> CentralConfig {
    // Common
    env_override!(config, common.env_id, "ZEROLOOP_COMMON_ENV_ID");
    env_override!(config, common.data_dir, "ZEROLOOP_COMMON_DATA_DIR");
    env_override!(config, common.log_level, "ZEROLOOP_COMMON_LOG_LEVEL");

    // MCTS
    env_override!(config, mcts.c_puct, "ZEROLOOP_MCTS_C_PUCT", parse);
    env_override!(
        config,
        mcts.c_iterations,
        "ZEROLOOP_MCTS_C_ITERATIONS",
        parse
    );
    env_override!(config, mcts.c_duration, "ZEROLOOP_MCTS_C_DURATION", parse);
    env_override!(
        config,
        mcts.dirichlet_alpha,
        "ZEROLOOP_MCTS_DIRICHLET_ALPHA",
        parse
    );
    env_override!(
        config,
        mcts.dirichlet_epsilon,
        "ZEROLOOP_MCTS_DIRICHLET_EPSILON",
        parse
    );
    env_override!(config, mcts.temperature, "ZEROLOOP_MCTS_TEMPERATURE", parse);
    env_override!(
        config,
        mcts.temp_threshold,
        "ZEROLOOP_MCTS_TEMP_THRESHOLD",
        parse
    );
    env_override!(
        config,
        mcts.late_temperature,
        "ZEROLOOP_MCTS_LATE_TEMPERATURE",
        parse
    );
    env_override!(config, mcts.reuse_tree, "ZEROLOOP_MCTS_REUSE_TREE", parse);

    // Data
    env_override!(config, data.process_num, "ZEROLOOP_DATA_PROCESS_NUM", parse);
    env_override!(config, data.buffer_size, "ZEROLOOP_DATA_BUFFER_SIZE", parse);
    env_override!(config, data.min_fill, "ZEROLOOP_DATA_MIN_FILL", parse);
    env_override!(config, data.data_path, "ZEROLOOP_DATA_DATA_PATH");
    env_override!(config, data.data_files, "ZEROLOOP_DATA_DATA_FILES", list);
    env_override!(
        config,
        data.botzone_timeout_ms,
        "ZEROLOOP_DATA_BOTZONE_TIMEOUT_MS",
        parse
    );
    env_override!(config, data.max_moves, "ZEROLOOP_DATA_MAX_MOVES", parse);
    env_override!(config, data.seed, "ZEROLOOP_DATA_SEED", parse);

    // Training
    env_override!(
        config,
        training.num_epoches,
        "ZEROLOOP_TRAINING_NUM_EPOCHES",
        parse
    );
    env_override!(
        config,
        training.batch_size,
        "ZEROLOOP_TRAINING_BATCH_SIZE",
        parse
    );
    env_override!(
        config,
        training.learning_rate,
        "ZEROLOOP_TRAINING_LEARNING_RATE",
        parse
    );
    env_override!(
        config,
        training.momentum,
        "ZEROLOOP_TRAINING_MOMENTUM",
        parse
    );
    env_override!(
        config,
        training.kl_target,
        "ZEROLOOP_TRAINING_KL_TARGET",
        parse
    );
    env_override!(
        config,
        training.eval_period,
        "ZEROLOOP_TRAINING_EVAL_PERIOD",
        parse
    );
    env_override!(
        config,
        training.eval_rounds,
        "ZEROLOOP_TRAINING_EVAL_ROUNDS",
        parse
    );
    env_override!(
        config,
        training.eval_opening_moves,
        "ZEROLOOP_TRAINING_EVAL_OPENING_MOVES",
        parse
    );
    env_override!(config, training.model_file, "ZEROLOOP_TRAINING_MODEL_FILE");
    env_override!(config, training.model_path, "ZEROLOOP_TRAINING_MODEL_PATH");
    env_override!(
        config,
        training.max_steps,
        "ZEROLOOP_TRAINING_MAX_STEPS",
        parse
    );
    env_override!(
        config,
        training.wait_interval_ms,
        "ZEROLOOP_TRAINING_WAIT_INTERVAL_MS",
        parse
    );

    config
}
