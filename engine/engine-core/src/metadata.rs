//! Game metadata for logging and configuration
//!
//! Trainers and actors use this to size their buffers and to describe the
//! game they are running without hardcoding board dimensions.

use serde::{Deserialize, Serialize};

/// Metadata about a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMetadata {
    /// Environment identifier (e.g., "gomoku", "tictactoe")
    pub env_id: String,

    /// Human-readable display name
    pub display_name: String,

    /// Board width in cells
    pub board_width: usize,

    /// Board height in cells
    pub board_height: usize,

    /// Number of possible actions (size of dense policy vectors)
    pub num_actions: usize,

    /// Size of observation vector (number of f32 values)
    pub obs_size: usize,

    /// Number of players (always 2 for the zero-sum games supported here)
    pub player_count: usize,
}

impl GameMetadata {
    /// Create a new GameMetadata with required fields
    pub fn new(env_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            env_id: env_id.into(),
            display_name: display_name.into(),
            board_width: 0,
            board_height: 0,
            num_actions: 0,
            obs_size: 0,
            player_count: 2,
        }
    }

    /// Builder method for board dimensions
    pub fn with_board(mut self, width: usize, height: usize) -> Self {
        self.board_width = width;
        self.board_height = height;
        self
    }

    /// Builder method for action count
    pub fn with_actions(mut self, num_actions: usize) -> Self {
        self.num_actions = num_actions;
        self
    }

    /// Builder method for observation size
    pub fn with_observation(mut self, obs_size: usize) -> Self {
        self.obs_size = obs_size;
        self
    }

    /// Get the total number of board cells
    pub fn board_size(&self) -> usize {
        self.board_width * self.board_height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_fills_fields() {
        let meta = GameMetadata::new("gomoku", "Gomoku")
            .with_board(15, 15)
            .with_actions(225)
            .with_observation(675);

        assert_eq!(meta.env_id, "gomoku");
        assert_eq!(meta.board_size(), 225);
        assert_eq!(meta.num_actions, 225);
        assert_eq!(meta.obs_size, 675);
        assert_eq!(meta.player_count, 2);
    }

    #[test]
    fn test_metadata_serializes_to_json() {
        let meta = GameMetadata::new("tictactoe", "Tic-Tac-Toe").with_actions(9);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"env_id\":\"tictactoe\""));
        assert!(json.contains("\"num_actions\":9"));
    }
}
