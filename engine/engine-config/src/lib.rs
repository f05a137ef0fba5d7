//! Centralized configuration loading from config.toml.
//!
//! This crate provides configuration structs and loading logic shared by the
//! self-play actor, the trainer and the `zeroloop` binary.
//!
//! # Configuration Priority
//!
//! Settings are loaded with the following priority (highest to lowest):
//! 1. Environment variables (`ZEROLOOP_<SECTION>_<KEY>`)
//! 2. config.toml file
//! 3. Built-in defaults (config.defaults.toml, embedded at compile time)
//!
//! # Environment Variable Override Pattern
//!
//! ```text
//! ZEROLOOP_<SECTION>_<KEY>=value
//!
//! Examples:
//!     ZEROLOOP_COMMON_ENV_ID=tictactoe
//!     ZEROLOOP_MCTS_C_ITERATIONS=800
//!     ZEROLOOP_DATA_PROCESS_NUM=8
//!     ZEROLOOP_DATA_DATA_FILES=game1.json,game2.json
//!     ZEROLOOP_TRAINING_KL_TARGET=0.01
//! ```
//!
//! `data.agents` can only be set in config.toml.

mod defaults;
mod loader;
mod structs;

pub use loader::{apply_env_overrides, load_config, load_from_path, CONFIG_SEARCH_PATHS};
pub use structs::*;
