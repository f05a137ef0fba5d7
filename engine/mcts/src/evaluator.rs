//! Evaluator trait for position evaluation.
//!
//! The evaluator provides policy (action probabilities) and value estimates
//! for game states. In AlphaZero this is the learned model; for testing and
//! model-free play we provide a uniform evaluator and a rollout evaluator.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use engine_core::Game;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

/// Errors that can occur during evaluation.
#[derive(Debug, Clone, Error)]
pub enum EvaluatorError {
    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Invalid evaluator output: {0}")]
    InvalidOutput(String),

    #[error("Model error: {0}")]
    ModelError(String),
}

/// Result of evaluating a game state.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    /// Policy over the dense action index space (length `num_actions`).
    /// Mass on illegal actions is ignored by the search.
    pub policy: Vec<f32>,

    /// Value estimate for the player to move, in [-1, 1].
    pub value: f32,
}

impl EvalResult {
    /// Reject outputs the search cannot use.
    pub fn validate(&self, num_actions: usize) -> Result<(), EvaluatorError> {
        if self.policy.len() != num_actions {
            return Err(EvaluatorError::InvalidOutput(format!(
                "policy has {} entries, expected {}",
                self.policy.len(),
                num_actions
            )));
        }
        if let Some(p) = self.policy.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(EvaluatorError::InvalidOutput(format!(
                "policy contains {}",
                p
            )));
        }
        if !self.value.is_finite() || !(-1.0..=1.0).contains(&self.value) {
            return Err(EvaluatorError::InvalidOutput(format!(
                "value {} outside [-1, 1]",
                self.value
            )));
        }
        Ok(())
    }
}

/// Trait for position evaluators.
///
/// Implementations:
/// - `UniformEvaluator`: uniform priors, neutral value
/// - `RolloutEvaluator`: uniform priors, value from a random playout
/// - learned models published through the model slot
pub trait Evaluator<G: Game>: Send + Sync {
    /// Evaluate a single state from the perspective of its player to move.
    fn evaluate(&self, game: &G, state: &G::State) -> Result<EvalResult, EvaluatorError>;

    /// Batch evaluate multiple states (optional optimization).
    /// Default implementation calls evaluate() in a loop.
    fn evaluate_batch(
        &self,
        game: &G,
        states: &[&G::State],
    ) -> Result<Vec<EvalResult>, EvaluatorError> {
        states.iter().map(|s| self.evaluate(game, s)).collect()
    }
}

/// Uniform policy over the legal actions of `state`.
pub fn uniform_policy<G: Game>(game: &G, state: &G::State) -> Vec<f32> {
    let mut policy = vec![0.0; game.num_actions()];
    let legal = game.legal_actions(state);
    if legal.is_empty() {
        return policy;
    }
    let prob = 1.0 / legal.len() as f32;
    for action in legal {
        policy[game.action_index(action)] = prob;
    }
    policy
}

/// Uniform evaluator that assigns equal probability to all legal moves.
/// Value is always 0.0 (neutral). Useful for testing MCTS without a model.
#[derive(Debug, Clone, Default)]
pub struct UniformEvaluator;

impl UniformEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl<G: Game> Evaluator<G> for UniformEvaluator {
    fn evaluate(&self, game: &G, state: &G::State) -> Result<EvalResult, EvaluatorError> {
        Ok(EvalResult {
            policy: uniform_policy(game, state),
            value: 0.0,
        })
    }
}

/// Random rollout evaluator that plays random moves to a terminal state.
///
/// The playout RNG is seeded from the state hash mixed with `seed`, so the
/// same state always gets the same value.
#[derive(Debug, Clone)]
pub struct RolloutEvaluator {
    /// Mixed into every playout seed
    pub seed: u64,
    /// Maximum rollout depth; unfinished playouts score 0
    pub max_depth: u32,
}

impl Default for RolloutEvaluator {
    fn default() -> Self {
        Self {
            seed: 0,
            max_depth: 400,
        }
    }
}

impl RolloutEvaluator {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    fn playout_seed<S: Hash>(&self, state: &S) -> u64 {
        let mut hasher = DefaultHasher::new();
        state.hash(&mut hasher);
        hasher.finish() ^ self.seed
    }
}

impl<G: Game> Evaluator<G> for RolloutEvaluator {
    fn evaluate(&self, game: &G, state: &G::State) -> Result<EvalResult, EvaluatorError> {
        let player = game.current_player(state);
        let mut rng = ChaCha20Rng::seed_from_u64(self.playout_seed(state));
        let mut current = state.clone();

        for _ in 0..self.max_depth {
            if game.is_terminal(&current) {
                break;
            }
            let legal = game.legal_actions(&current);
            let Some(&action) = legal.choose(&mut rng) else {
                break;
            };
            current = game
                .apply(&current, action)
                .map_err(|e| EvaluatorError::EvaluationFailed(e.to_string()))?;
        }

        let value = game
            .outcome(&current)
            .map(|o| o.value_for(player))
            .unwrap_or(0.0);

        Ok(EvalResult {
            policy: uniform_policy(game, state),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_gomoku::{Gomoku, Position};

    #[test]
    fn test_uniform_evaluator() {
        let game = Gomoku::tictactoe();
        let mut state = game.initial_state();
        for (x, y) in [(0, 0), (1, 0), (2, 0), (0, 1), (2, 1)] {
            state = game.apply(&state, Position::new(x, y)).unwrap();
        }

        let result = UniformEvaluator::new().evaluate(&game, &state).unwrap();

        // 4 legal moves remain
        let expected_prob = 1.0 / 4.0;
        assert!((result.policy[4] - expected_prob).abs() < 1e-6);
        assert!((result.policy[8] - expected_prob).abs() < 1e-6);
        // Occupied squares get nothing
        assert!((result.policy[0]).abs() < 1e-6);
        assert!((result.value).abs() < 1e-6);
    }

    #[test]
    fn test_uniform_evaluator_terminal_state() {
        let game = Gomoku::tictactoe();
        let mut state = game.initial_state();
        for (x, y) in [(0, 0), (0, 1), (1, 0), (1, 1), (2, 0)] {
            state = game.apply(&state, Position::new(x, y)).unwrap();
        }

        let result = UniformEvaluator::new().evaluate(&game, &state).unwrap();
        assert!(result.policy.iter().all(|p| p.abs() < 1e-6));
    }

    #[test]
    fn test_rollout_evaluator_is_deterministic() {
        let game = Gomoku::tictactoe();
        let state = game.initial_state();
        let eval = RolloutEvaluator::new(7);

        let a = eval.evaluate(&game, &state).unwrap();
        let b = eval.evaluate(&game, &state).unwrap();
        assert_eq!(a, b);
        assert!((-1.0..=1.0).contains(&a.value));
        a.validate(game.num_actions()).unwrap();
    }

    #[test]
    fn test_rollout_evaluator_terminal_value() {
        let game = Gomoku::tictactoe();
        let mut state = game.initial_state();
        for (x, y) in [(0, 0), (0, 1), (1, 0), (1, 1), (2, 0)] {
            state = game.apply(&state, Position::new(x, y)).unwrap();
        }

        // Second player is to move and has lost
        let result = RolloutEvaluator::default().evaluate(&game, &state).unwrap();
        assert_eq!(result.value, -1.0);
    }

    #[test]
    fn test_validate_rejects_bad_outputs() {
        let ok = EvalResult {
            policy: vec![0.5, 0.5],
            value: 0.2,
        };
        assert!(ok.validate(2).is_ok());
        assert!(ok.validate(3).is_err());

        let nan = EvalResult {
            policy: vec![f32::NAN, 0.5],
            value: 0.0,
        };
        assert!(nan.validate(2).is_err());

        let out_of_range = EvalResult {
            policy: vec![0.5, 0.5],
            value: 1.5,
        };
        assert!(matches!(
            out_of_range.validate(2),
            Err(EvaluatorError::InvalidOutput(_))
        ));
    }
}
