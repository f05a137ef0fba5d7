//! Core traits and types for the zeroloop game engine
//!
//! This crate provides the fundamental abstractions shared by search,
//! self-play and training:
//! - `Game`: typed rules interface (immutable states, pure transitions)
//! - `Player` / `Outcome`: two-player zero-sum result handling
//! - `GameMetadata`: display and sizing information for a game

pub mod game_utils;
pub mod metadata;
pub mod typed;

// Re-export main types for convenience
pub use game_utils::{one_hot_policy, Outcome, Player};
pub use metadata::GameMetadata;
pub use typed::{Game, GameError};
