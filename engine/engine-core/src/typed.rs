//! Typed Game trait
//!
//! Games expose immutable states and pure transitions. Search, self-play and
//! training never mutate a state in place: `apply` returns the successor.

use crate::game_utils::{Outcome, Player};
use crate::metadata::GameMetadata;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Error type for transitions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Illegal action: {0}")]
    IllegalAction(String),
    #[error("Game is already over")]
    GameOver,
}

/// Main trait for game implementations
///
/// # Type Parameters
///
/// * `State` - Immutable position snapshot. Equality and hashing must cover
///   everything that affects future play.
/// * `Action` - Small copyable move. Serialized with serde when talking to
///   external engines and when reading recorded games.
///
/// Every action has a stable dense index in `0..num_actions()`, which is the
/// layout of evaluator policies and training targets.
pub trait Game: Send + Sync + Debug + 'static {
    /// Position snapshot
    type State: Clone + PartialEq + Eq + Hash + Debug + Send + Sync + 'static;

    /// Move type
    type Action: Copy
        + PartialEq
        + Eq
        + Hash
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Get game metadata
    fn metadata(&self) -> GameMetadata;

    /// Size of the dense action index space
    fn num_actions(&self) -> usize;

    /// The starting position
    fn initial_state(&self) -> Self::State;

    /// The player to move.
    ///
    /// In a terminal state this is the player who would have moved next, so
    /// the outcome seen from `current_player` of a won position is a loss.
    fn current_player(&self, state: &Self::State) -> Player;

    /// Legal actions in a fixed, deterministic order. Empty when terminal.
    fn legal_actions(&self, state: &Self::State) -> Vec<Self::Action>;

    /// Successor state after `action`
    fn apply(&self, state: &Self::State, action: Self::Action) -> Result<Self::State, GameError>;

    /// Final outcome, or `None` while the game is still running
    fn outcome(&self, state: &Self::State) -> Option<Outcome>;

    /// Moves played from the initial position to reach `state`, oldest first
    fn history<'s>(&self, state: &'s Self::State) -> &'s [Self::Action];

    /// Dense index of `action`
    fn action_index(&self, action: Self::Action) -> usize;

    /// Inverse of `action_index`
    fn action_from_index(&self, index: usize) -> Option<Self::Action>;

    /// Number of f32 values written by `encode_obs`
    fn obs_size(&self) -> usize;

    /// Encode the state from the perspective of the player to move
    fn encode_obs(&self, state: &Self::State, out: &mut Vec<f32>);

    /// Whether the game has finished
    fn is_terminal(&self, state: &Self::State) -> bool {
        self.outcome(state).is_some()
    }

    /// Whether `action` is legal in `state`
    fn is_legal(&self, state: &Self::State, action: Self::Action) -> bool {
        self.legal_actions(state).contains(&action)
    }
}
