//! Command line for the `zeroloop` binary
//!
//! The central config is loaded first (file, then `ZEROLOOP_*` env vars);
//! flags given on the command line override both.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use engine_config::{load_config, load_from_path, CentralConfig};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "zeroloop")]
#[command(about = "Self-play search and training loop")]
#[command(
    long_about = "Runs self-play workers that fill a replay buffer and a training loop that
consumes it, gating every new model against the accepted one.

Configuration is loaded from config.toml with ZEROLOOP_* environment variable
overrides. CLI arguments take highest priority."
)]
pub struct Cli {
    /// Path to config.toml (default: search ./config.toml, ../config.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Number of concurrent self-play workers
    #[arg(long)]
    pub process_num: Option<usize>,

    /// Stop training after this many steps (-1 for unlimited)
    #[arg(long, allow_hyphen_values = true)]
    pub max_steps: Option<i64>,

    /// Game to play (gomoku, tictactoe)
    #[arg(long)]
    pub env_id: Option<String>,

    /// Only run self-play, following checkpoints written by another trainer
    #[arg(long)]
    pub self_play_only: bool,

    /// Show a progress bar for bounded training runs
    #[arg(long)]
    pub progress: bool,
}

impl Cli {
    /// Load the configuration and apply command line overrides.
    pub fn load(&self) -> Result<CentralConfig> {
        let config = match &self.config {
            Some(path) => load_from_path(path)
                .with_context(|| format!("loading config from {}", path.display()))?,
            None => load_config().context("loading config")?,
        };
        let config = self.apply(config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, mut config: CentralConfig) -> CentralConfig {
        if let Some(level) = &self.log_level {
            config.common.log_level = level.clone();
        }
        if let Some(n) = self.process_num {
            config.data.process_num = n;
        }
        if let Some(steps) = self.max_steps {
            config.training.max_steps = steps;
        }
        if let Some(env_id) = &self.env_id {
            config.common.env_id = env_id.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "zeroloop",
            "--process-num",
            "7",
            "--max-steps",
            "-1",
            "--env-id",
            "tictactoe",
            "--log-level",
            "debug",
        ]);
        let config = cli.apply(CentralConfig::default());
        assert_eq!(config.data.process_num, 7);
        assert_eq!(config.training.max_steps, -1);
        assert_eq!(config.training.step_limit(), None);
        assert_eq!(config.common.env_id, "tictactoe");
        assert_eq!(config.common.log_level, "debug");
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let cli = Cli::parse_from(["zeroloop"]);
        let mut base = CentralConfig::default();
        base.training.max_steps = 12;
        let config = cli.apply(base.clone());
        assert_eq!(config.training.max_steps, 12);
        assert_eq!(config.data.process_num, base.data.process_num);
        assert!(!cli.self_play_only);
    }

    #[test]
    fn test_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[training]\nbatch_size = 64\n").unwrap();

        let cli = Cli {
            config: Some(path),
            max_steps: Some(3),
            ..Cli::default()
        };
        let config = cli.load().unwrap();
        assert_eq!(config.training.batch_size, 64);
        assert_eq!(config.training.step_limit(), Some(3));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let cli = Cli {
            config: Some(path),
            process_num: Some(0),
            ..Cli::default()
        };
        assert!(cli.load().is_err());
    }
}
