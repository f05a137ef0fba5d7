//! Monte Carlo Tree Search (MCTS) implementation for AlphaZero-style game playing.
//!
//! This crate provides a game-agnostic MCTS implementation that works with any
//! game implementing the `engine-core` Game trait.
//!
//! # Overview
//!
//! Each iteration of the search consists of four phases:
//!
//! 1. **Selection**: Traverse the tree using UCB (Upper Confidence Bound) to
//!    balance exploration and exploitation
//! 2. **Expansion**: When reaching a leaf, expand it by adding children for
//!    each legal action, with priors renormalised over the legal actions
//! 3. **Evaluation**: The same evaluator call supplies the leaf value
//! 4. **Backpropagation**: Update visit counts and value sums along the
//!    path from leaf to root, negating the value at every ply
//!
//! The search stops when the iteration budget or the time budget runs out,
//! whichever comes first.
//!
//! # Usage
//!
//! ```rust
//! use engine_core::Game;
//! use games_gomoku::Gomoku;
//! use mcts::{run_mcts, MctsConfig, UniformEvaluator};
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//!
//! let game = Gomoku::tictactoe();
//! let mut rng = ChaCha20Rng::seed_from_u64(42);
//! let result = run_mcts(
//!     &game,
//!     &UniformEvaluator::new(),
//!     MctsConfig::for_testing(),
//!     game.initial_state(),
//!     &mut rng,
//! )
//! .unwrap();
//!
//! let policy = result.distribution.to_dense(&game);
//! assert!((policy.iter().sum::<f32>() - 1.0).abs() < 1e-5);
//! println!("Best action: {:?}", result.distribution.best());
//! ```
//!
//! # Evaluators
//!
//! - [`UniformEvaluator`]: uniform policy over legal moves, neutral value
//! - [`RolloutEvaluator`]: uniform policy, value from a deterministic random
//!   playout (model-free play)
//! - learned models implement [`Evaluator`] directly

pub mod config;
pub mod distribution;
pub mod evaluator;
pub mod node;
pub mod search;
pub mod tree;

// Re-export main types
pub use config::MctsConfig;
pub use distribution::{ActionVisits, VisitDistribution};
pub use evaluator::{
    uniform_policy, EvalResult, Evaluator, EvaluatorError, RolloutEvaluator, UniformEvaluator,
};
pub use node::{MctsNode, NodeId};
pub use search::{run_mcts, MctsSearch, SearchError, SearchResult};
pub use tree::{MctsTree, TreeStats};
