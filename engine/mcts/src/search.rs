//! MCTS search implementation.
//!
//! Implements the core MCTS algorithm:
//! 1. Selection: Traverse tree using UCB to find a leaf
//! 2. Expansion: Add children to the leaf using the evaluator's policy
//! 3. Evaluation: Value estimate from the same evaluator call
//! 4. Backpropagation: Update statistics along the path

use std::time::{Duration, Instant};

use engine_core::{Game, GameError};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::MctsConfig;
use crate::distribution::VisitDistribution;
use crate::evaluator::{Evaluator, EvaluatorError};
use crate::node::NodeId;
use crate::tree::{MctsTree, TreeStats};

/// Errors that can occur during MCTS search.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid search configuration: {0}")]
    Config(String),

    #[error("Evaluator error: {0}")]
    Evaluation(#[from] EvaluatorError),

    #[error("Game error: {0}")]
    Game(#[from] GameError),

    #[error("No legal moves available in a non-terminal state")]
    NoLegalMoves,
}

/// Result of an MCTS search.
#[derive(Debug, Clone)]
pub struct SearchResult<A> {
    /// Root visit distribution, or the outcome when the root is terminal
    pub distribution: VisitDistribution<A>,

    /// Value estimate at root for the player to move
    pub value: f32,

    /// Iterations performed by this call (root expansion included)
    pub iterations: u32,

    /// Evaluator calls made by this call
    pub evaluations: u32,

    /// Wall-clock time spent
    pub elapsed: Duration,

    /// Shape of the tree after the search
    pub tree: TreeStats,
}

/// MCTS search state.
pub struct MctsSearch<'a, G: Game, E: Evaluator<G> + ?Sized> {
    game: &'a G,
    evaluator: &'a E,
    config: MctsConfig,
    tree: MctsTree<G::State, G::Action>,
    evaluations: u32,
}

impl<'a, G: Game, E: Evaluator<G> + ?Sized> MctsSearch<'a, G, E> {
    /// Create a new MCTS search from the given game state.
    pub fn new(
        game: &'a G,
        evaluator: &'a E,
        config: MctsConfig,
        root_state: G::State,
    ) -> Result<Self, SearchError> {
        Self::with_tree(game, evaluator, config, MctsTree::new(root_state))
    }

    /// Continue searching an existing (typically re-rooted) tree.
    pub fn with_tree(
        game: &'a G,
        evaluator: &'a E,
        config: MctsConfig,
        tree: MctsTree<G::State, G::Action>,
    ) -> Result<Self, SearchError> {
        config.validate()?;
        Ok(Self {
            game,
            evaluator,
            config,
            tree,
            evaluations: 0,
        })
    }

    /// Run the search until the iteration or time budget is exhausted.
    pub fn run(
        &mut self,
        rng: &mut ChaCha20Rng,
    ) -> Result<SearchResult<G::Action>, SearchError> {
        let start = Instant::now();
        self.evaluations = 0;
        let root_id = self.tree.root();

        let root_state = self.tree.root_state();
        if let Some(outcome) = self.game.outcome(root_state) {
            let value = outcome.value_for(self.game.current_player(root_state));
            return Ok(SearchResult {
                distribution: VisitDistribution::GameOver { outcome },
                value,
                iterations: 0,
                evaluations: 0,
                elapsed: start.elapsed(),
                tree: self.tree.stats(),
            });
        }

        let mut iterations = 0u32;
        if !self.tree.get(root_id).is_expanded() {
            let value = self.expand_node(root_id)?;
            self.tree.backpropagate(root_id, value);
            iterations += 1;
        }

        if self.config.dirichlet_alpha > 0.0 && self.config.dirichlet_epsilon > 0.0 {
            self.add_dirichlet_noise(rng);
        }

        while !self.budget_exhausted(iterations, start) {
            self.simulate()?;
            iterations += 1;
        }

        let root = self.tree.get(root_id);
        let distribution = VisitDistribution::Moves(self.tree.root_visits(self.config.temperature));
        let elapsed = start.elapsed();

        debug!(
            iterations,
            evaluations = self.evaluations,
            root_visits = root.visit_count,
            nodes = self.tree.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "MCTS search complete"
        );

        Ok(SearchResult {
            distribution,
            value: root.mean_value(),
            iterations,
            evaluations: self.evaluations,
            elapsed,
            tree: self.tree.stats(),
        })
    }

    fn budget_exhausted(&self, iterations: u32, start: Instant) -> bool {
        if let Some(limit) = self.config.iterations {
            if iterations >= limit {
                return true;
            }
        }
        if let Some(budget) = self.config.time_budget {
            if start.elapsed() >= budget {
                return true;
            }
        }
        false
    }

    /// Run a single simulation (select -> expand -> evaluate -> backpropagate).
    fn simulate(&mut self) -> Result<(), SearchError> {
        let (leaf_id, depth) = self.select();
        let leaf = self.tree.get(leaf_id);

        let value = if leaf.is_terminal {
            leaf.terminal_value
        } else {
            self.expand_node(leaf_id)?
        };

        self.tree.backpropagate(leaf_id, value);

        trace!(leaf = leaf_id.0, depth, value, "MCTS simulation complete");

        Ok(())
    }

    /// Select a leaf node by traversing the tree using UCB.
    /// Returns the leaf and its depth below the root.
    fn select(&self) -> (NodeId, usize) {
        let mut current = self.tree.root();
        let mut depth = 0;

        loop {
            let node = self.tree.get(current);
            if node.is_leaf() {
                break;
            }
            match self.tree.select_child(current, self.config.c_puct) {
                Some(child_id) => {
                    current = child_id;
                    depth += 1;
                }
                None => break,
            }
        }

        (current, depth)
    }

    /// Expand a node by adding all legal children.
    /// Returns the evaluator's value estimate for backpropagation.
    fn expand_node(&mut self, node_id: NodeId) -> Result<f32, SearchError> {
        let state = self.tree.get(node_id).state.clone();
        let legal = self.game.legal_actions(&state);
        if legal.is_empty() {
            return Err(SearchError::NoLegalMoves);
        }

        let eval = self.evaluator.evaluate(self.game, &state)?;
        self.evaluations += 1;
        eval.validate(self.game.num_actions())?;

        // Renormalise over the legal actions only
        let mut priors: Vec<f32> = legal
            .iter()
            .map(|&a| eval.policy[self.game.action_index(a)])
            .collect();
        let total: f32 = priors.iter().sum();
        if total > 0.0 {
            for p in &mut priors {
                *p /= total;
            }
        } else {
            priors.fill(1.0 / legal.len() as f32);
        }

        for (action, prior) in legal.into_iter().zip(priors) {
            let child_state = self.game.apply(&state, action)?;
            let terminal_value = self
                .game
                .outcome(&child_state)
                .map(|o| o.value_for(self.game.current_player(&child_state)));
            self.tree
                .add_child(node_id, action, prior, child_state, terminal_value);
        }

        Ok(eval.value)
    }

    /// Mix Dirichlet noise into the root priors.
    fn add_dirichlet_noise(&mut self, rng: &mut ChaCha20Rng) {
        let root_id = self.tree.root();
        let children: Vec<NodeId> = self
            .tree
            .get(root_id)
            .children
            .iter()
            .map(|&(_, id)| id)
            .collect();

        let noise = dirichlet_noise(children.len(), self.config.dirichlet_alpha, rng);
        if noise.len() != children.len() {
            return;
        }

        let eps = self.config.dirichlet_epsilon;
        for (child_id, n) in children.into_iter().zip(noise) {
            let child = self.tree.get_mut(child_id);
            child.prior = (1.0 - eps) * child.prior + eps * n;
        }
    }

    /// Get the search tree (for inspection/debugging).
    pub fn tree(&self) -> &MctsTree<G::State, G::Action> {
        &self.tree
    }

    /// Take the tree out for reuse on the next move.
    pub fn into_tree(self) -> MctsTree<G::State, G::Action> {
        self.tree
    }
}

/// Generate Dirichlet-distributed noise using Gamma variates.
/// Returns an empty vector when `alpha` is not a valid shape.
fn dirichlet_noise(n: usize, alpha: f32, rng: &mut ChaCha20Rng) -> Vec<f32> {
    use rand_distr::{Distribution, Gamma};

    let Ok(gamma) = Gamma::new(alpha as f64, 1.0) else {
        return Vec::new();
    };
    let mut samples: Vec<f32> = (0..n).map(|_| gamma.sample(rng) as f32).collect();

    let sum: f32 = samples.iter().sum();
    if sum > 0.0 {
        for s in &mut samples {
            *s /= sum;
        }
    }

    samples
}

/// Convenience function to run a single MCTS search.
pub fn run_mcts<G: Game, E: Evaluator<G> + ?Sized>(
    game: &G,
    evaluator: &E,
    config: MctsConfig,
    root_state: G::State,
    rng: &mut ChaCha20Rng,
) -> Result<SearchResult<G::Action>, SearchError> {
    let mut search = MctsSearch::new(game, evaluator, config, root_state)?;
    search.run(rng)
}
