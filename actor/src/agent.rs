//! Move-selection agents
//!
//! An [`Agent`] is one of four strategies. Search agents return their root
//! statistics with every move so self-play can use them as policy targets;
//! the others only return the move.

use engine_core::Game;
use mcts::{
    Evaluator, MctsConfig, MctsSearch, MctsTree, RolloutEvaluator, SearchError, UniformEvaluator,
};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

use crate::botzone::BotzoneBot;

/// Plies searched below the old root when looking for the reached position:
/// our own move plus the opponent's reply.
const REUSE_DEPTH: usize = 2;

#[derive(Debug, Error)]
pub enum AgentError {
    /// External engine misbehaved: spawn, timeout, bad reply or illegal move
    #[error("protocol failure in {agent}: {reason}")]
    Protocol { agent: String, reason: String },

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error("no legal move in the current position")]
    NoLegalMoves,
}

/// Root statistics of the search that produced a move.
#[derive(Debug, Clone)]
pub struct SearchSummary {
    /// Temperature-scaled root distribution over the dense action space;
    /// the same distribution the move was sampled from
    pub policy: Vec<f32>,
    /// Root value for the player to move
    pub value: f32,
    pub iterations: u32,
    pub evaluations: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct AgentMove<A> {
    pub action: A,
    pub search: Option<SearchSummary>,
}

/// MCTS player bound to an evaluator.
pub struct SearchPlayer<G: Game> {
    evaluator: Arc<dyn Evaluator<G>>,
    config: MctsConfig,
    reuse_tree: bool,
    tree: Option<MctsTree<G::State, G::Action>>,
}

impl<G: Game> SearchPlayer<G> {
    pub fn new(evaluator: Arc<dyn Evaluator<G>>, config: MctsConfig, reuse_tree: bool) -> Self {
        Self {
            evaluator,
            config,
            reuse_tree,
            tree: None,
        }
    }

    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    fn set_temperature(&mut self, temperature: f32) {
        self.config.temperature = temperature;
    }

    fn bind(&mut self, evaluator: Arc<dyn Evaluator<G>>) {
        self.evaluator = evaluator;
        self.tree = None;
    }

    /// Start from the subtree of the reached position when one was kept.
    fn starting_tree(&mut self, state: &G::State) -> MctsTree<G::State, G::Action> {
        if let Some(old) = self.tree.take() {
            if let Some(node) = old.find_descendant(state, REUSE_DEPTH) {
                trace!(reused_visits = old.get(node).visit_count, "Reusing search subtree");
                return old.rerooted(node);
            }
        }
        MctsTree::new(state.clone())
    }

    fn choose(
        &mut self,
        game: &G,
        state: &G::State,
        rng: &mut ChaCha20Rng,
    ) -> Result<AgentMove<G::Action>, AgentError> {
        let tree = self.starting_tree(state);
        let evaluator = Arc::clone(&self.evaluator);
        let mut search = MctsSearch::with_tree(game, evaluator.as_ref(), self.config.clone(), tree)?;
        let result = search.run(rng)?;

        let action = result
            .distribution
            .sample(rng)
            .or_else(|| result.distribution.best())
            .ok_or(AgentError::NoLegalMoves)?;

        let policy = result.distribution.to_dense(game);
        if self.reuse_tree {
            self.tree = Some(search.into_tree());
        }

        Ok(AgentMove {
            action,
            search: Some(SearchSummary {
                policy,
                value: result.value,
                iterations: result.iterations,
                evaluations: result.evaluations,
                elapsed: result.elapsed,
            }),
        })
    }
}

/// A configured player.
pub enum Agent<G: Game> {
    /// Uniformly random legal moves
    Random,
    /// External subprocess engine
    Botzone(BotzoneBot<G>),
    /// MCTS with random-rollout leaf values
    DefaultMcts(SearchPlayer<G>),
    /// MCTS with the current learned evaluator
    AlphaZero(SearchPlayer<G>),
}

impl<G: Game> Agent<G> {
    pub fn random() -> Self {
        Agent::Random
    }

    pub fn botzone(bot: BotzoneBot<G>) -> Self {
        Agent::Botzone(bot)
    }

    pub fn default_mcts(seed: u64, config: MctsConfig, reuse_tree: bool) -> Self {
        Agent::DefaultMcts(SearchPlayer::new(
            Arc::new(RolloutEvaluator::new(seed)),
            config,
            reuse_tree,
        ))
    }

    /// Learned-evaluator agent. Starts with a uniform evaluator until a
    /// model is bound.
    pub fn alpha_zero(config: MctsConfig, reuse_tree: bool) -> Self {
        Agent::AlphaZero(SearchPlayer::new(
            Arc::new(UniformEvaluator::new()),
            config,
            reuse_tree,
        ))
    }

    /// Learned-evaluator agent bound to `evaluator`.
    pub fn alpha_zero_with(evaluator: Arc<dyn Evaluator<G>>, config: MctsConfig) -> Self {
        Agent::AlphaZero(SearchPlayer::new(evaluator, config, false))
    }

    pub fn name(&self) -> String {
        match self {
            Agent::Random => "random".to_string(),
            Agent::Botzone(bot) => format!("botzone:{}", bot.program().display()),
            Agent::DefaultMcts(p) => format!("default_mcts:{}", budget_label(p.config())),
            Agent::AlphaZero(p) => format!("alpha_zero:{}", budget_label(p.config())),
        }
    }

    /// Whether the agent plays with the learned model
    pub fn is_learned(&self) -> bool {
        matches!(self, Agent::AlphaZero(_))
    }

    /// Drop per-game state (kept search trees).
    pub fn reset(&mut self) {
        match self {
            Agent::DefaultMcts(p) | Agent::AlphaZero(p) => p.tree = None,
            Agent::Random | Agent::Botzone(_) => {}
        }
    }

    /// Bind a model snapshot. No-op for agents that do not use one.
    pub fn bind_evaluator(&mut self, evaluator: &Arc<dyn Evaluator<G>>) {
        if let Agent::AlphaZero(p) = self {
            p.bind(Arc::clone(evaluator));
        }
    }

    /// Root temperature for the next move. Ignored by non-search agents.
    pub fn set_temperature(&mut self, temperature: f32) {
        if let Agent::DefaultMcts(p) | Agent::AlphaZero(p) = self {
            p.set_temperature(temperature);
        }
    }

    pub fn choose_move(
        &mut self,
        game: &G,
        state: &G::State,
        rng: &mut ChaCha20Rng,
    ) -> Result<AgentMove<G::Action>, AgentError> {
        match self {
            Agent::Random => {
                let legal = game.legal_actions(state);
                let action = *legal.choose(rng).ok_or(AgentError::NoLegalMoves)?;
                Ok(AgentMove {
                    action,
                    search: None,
                })
            }
            Agent::Botzone(bot) => {
                let action = bot
                    .request_move(game, state)
                    .map_err(|reason| AgentError::Protocol {
                        agent: format!("botzone:{}", bot.program().display()),
                        reason,
                    })?;
                Ok(AgentMove {
                    action,
                    search: None,
                })
            }
            Agent::DefaultMcts(p) | Agent::AlphaZero(p) => p.choose(game, state, rng),
        }
    }
}

fn budget_label(config: &MctsConfig) -> String {
    match (config.iterations, config.time_budget) {
        (Some(n), Some(t)) => format!("{}it/{}ms", n, t.as_millis()),
        (Some(n), None) => format!("{}it", n),
        (None, Some(t)) => format!("{}ms", t.as_millis()),
        (None, None) => "unbounded".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Game;
    use games_gomoku::{Gomoku, Position};
    use mcts::{EvalResult, EvaluatorError};
    use rand::SeedableRng;

    struct FailingEvaluator;

    impl Evaluator<Gomoku> for FailingEvaluator {
        fn evaluate(
            &self,
            _game: &Gomoku,
            _state: &games_gomoku::Board,
        ) -> Result<EvalResult, EvaluatorError> {
            Err(EvaluatorError::EvaluationFailed("model offline".into()))
        }
    }

    fn rng() -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(11)
    }

    #[test]
    fn test_random_agent_plays_legal_moves() {
        let game = Gomoku::tictactoe();
        let mut agent: Agent<Gomoku> = Agent::random();
        let mut rng = rng();
        let mut state = game.initial_state();
        while !game.is_terminal(&state) {
            let mv = agent.choose_move(&game, &state, &mut rng).unwrap();
            assert!(game.is_legal(&state, mv.action));
            assert!(mv.search.is_none());
            state = game.apply(&state, mv.action).unwrap();
        }
        assert!(agent.choose_move(&game, &state, &mut rng).is_err());
    }

    #[test]
    fn test_search_agent_emits_policy_target() {
        let game = Gomoku::tictactoe();
        let mut agent = Agent::default_mcts(3, MctsConfig::for_testing(), false);
        let mv = agent
            .choose_move(&game, &game.initial_state(), &mut rng())
            .unwrap();

        let summary = mv.search.unwrap();
        assert_eq!(summary.policy.len(), game.num_actions());
        assert!((summary.policy.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert_eq!(summary.iterations, 50);
        assert!(summary.policy[game.action_index(mv.action)] > 0.0);
    }

    #[test]
    fn test_greedy_agent_takes_winning_move() {
        let game = Gomoku::tictactoe();
        let state = [(0, 0), (0, 1), (1, 0), (1, 1)]
            .iter()
            .fold(game.initial_state(), |s, &(x, y)| {
                game.apply(&s, Position::new(x, y)).unwrap()
            });
        let mut agent = Agent::default_mcts(5, MctsConfig::for_testing().with_iterations(200), false);
        let mv = agent.choose_move(&game, &state, &mut rng()).unwrap();
        assert_eq!(mv.action, Position::new(2, 0));
    }

    #[test]
    fn test_tree_is_reused_across_moves() {
        let game = Gomoku::tictactoe();
        let mut agent = Agent::default_mcts(1, MctsConfig::for_testing().with_iterations(200), true);
        let mut rng = rng();

        let state = game.initial_state();
        let first = agent.choose_move(&game, &state, &mut rng).unwrap();
        let state = game.apply(&state, first.action).unwrap();

        // Reply with the opponent move the kept tree explored most
        let reply = match &agent {
            Agent::DefaultMcts(p) => {
                let kept = p.tree.as_ref().unwrap();
                let node = kept.find_descendant(&state, 1).unwrap();
                kept.get(node)
                    .children
                    .iter()
                    .max_by_key(|(_, child)| kept.get(*child).visit_count)
                    .map(|(action, _)| *action)
                    .unwrap()
            }
            _ => unreachable!(),
        };
        let state = game.apply(&state, reply).unwrap();

        match &mut agent {
            Agent::DefaultMcts(p) => {
                let tree = p.starting_tree(&state);
                assert!(tree.get(tree.root()).visit_count > 0);
                assert!(tree.len() > 1);
                assert_eq!(tree.root_state(), &state);
            }
            _ => unreachable!(),
        }

        agent.reset();
        match &agent {
            Agent::DefaultMcts(p) => assert!(p.tree.is_none()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_evaluator_failure_surfaces() {
        let game = Gomoku::tictactoe();
        let mut agent = Agent::alpha_zero(MctsConfig::for_testing(), false);
        let failing: Arc<dyn Evaluator<Gomoku>> = Arc::new(FailingEvaluator);
        agent.bind_evaluator(&failing);

        let err = agent
            .choose_move(&game, &game.initial_state(), &mut rng())
            .unwrap_err();
        assert!(matches!(err, AgentError::Search(SearchError::Evaluation(_))));
    }

    #[test]
    fn test_names_and_flags() {
        let az: Agent<Gomoku> = Agent::alpha_zero(MctsConfig::for_testing(), false);
        assert!(az.is_learned());
        assert_eq!(az.name(), "alpha_zero:50it");
        let rollout: Agent<Gomoku> = Agent::default_mcts(0, MctsConfig::default(), false);
        assert!(!rollout.is_learned());
        assert_eq!(rollout.name(), "default_mcts:400it/950ms");
        assert_eq!(Agent::<Gomoku>::random().name(), "random");
    }

    #[test]
    fn test_policy_target_matches_sampling_distribution() {
        let game = Gomoku::tictactoe();
        let config = MctsConfig::for_testing()
            .with_iterations(200)
            .with_temperature(0.5);

        let mut search_rng = rng();
        let result = mcts::run_mcts(
            &game,
            &UniformEvaluator::new(),
            config.clone(),
            game.initial_state(),
            &mut search_rng,
        )
        .unwrap();
        let sampling = result.distribution.to_dense(&game);

        let mut agent: Agent<Gomoku> =
            Agent::alpha_zero_with(Arc::new(UniformEvaluator::new()), config);
        let mv = agent
            .choose_move(&game, &game.initial_state(), &mut rng())
            .unwrap();
        assert_eq!(mv.search.unwrap().policy, sampling);
    }

    #[test]
    fn test_greedy_move_gets_one_hot_target() {
        let game = Gomoku::tictactoe();
        let config = MctsConfig::for_testing().with_temperature(0.0);
        let mut agent: Agent<Gomoku> =
            Agent::alpha_zero_with(Arc::new(UniformEvaluator::new()), config);
        let mv = agent
            .choose_move(&game, &game.initial_state(), &mut rng())
            .unwrap();

        let policy = mv.search.unwrap().policy;
        assert_eq!(policy.iter().filter(|&&p| p > 0.0).count(), 1);
        assert_eq!(policy[game.action_index(mv.action)], 1.0);
    }
}
