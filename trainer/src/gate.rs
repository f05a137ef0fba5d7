//! Promotion gate: candidate model vs the accepted model
//!
//! Both sides play as search agents with noise-free search. The first
//! `opening_moves` moves of each game are sampled at temperature 1 so the
//! rounds do not all repeat the same game; after that both sides play
//! greedily. Seats alternate, with the candidate opening on even rounds.

use std::sync::Arc;

use actor::{play_episode, Agent, EpisodeConfig, EpisodeError, TemperatureSchedule};
use engine_core::{Game, Outcome};
use mcts::{Evaluator, MctsConfig};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, warn};

const CANDIDATE: usize = 0;
const ACCEPTED: usize = 1;

#[derive(Debug, Clone)]
pub struct GateSettings {
    pub rounds: u32,
    pub opening_moves: u32,
    pub search: MctsConfig,
    pub max_moves: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateResult {
    pub candidate_wins: u32,
    pub accepted_wins: u32,
    pub draws: u32,
    pub rounds: u32,
    pub promoted: bool,
}

/// Promotion needs a strict majority of all rounds; draws count against.
pub fn promotes(candidate_wins: u32, rounds: u32) -> bool {
    rounds > 0 && candidate_wins * 2 > rounds
}

/// Seats for `round`: `[first, second]` agent indices.
fn seats(round: u32) -> [usize; 2] {
    if round % 2 == 0 {
        [CANDIDATE, ACCEPTED]
    } else {
        [ACCEPTED, CANDIDATE]
    }
}

pub fn run_gate<G: Game>(
    game: &G,
    candidate: Arc<dyn Evaluator<G>>,
    accepted: Arc<dyn Evaluator<G>>,
    settings: &GateSettings,
    rng: &mut ChaCha20Rng,
) -> Result<GateResult, EpisodeError> {
    let mut agents = vec![
        Agent::alpha_zero_with(candidate, settings.search.clone()),
        Agent::alpha_zero_with(accepted, settings.search.clone()),
    ];
    let temperature = TemperatureSchedule {
        initial: 1.0,
        late: 0.0,
        threshold_moves: settings.opening_moves,
    };

    let mut result = GateResult {
        candidate_wins: 0,
        accepted_wins: 0,
        draws: 0,
        rounds: settings.rounds,
        promoted: false,
    };

    for round in 0..settings.rounds {
        let config = EpisodeConfig {
            seats: seats(round),
            temperature,
            max_moves: settings.max_moves,
        };
        let outcome = match play_episode(game, &mut agents, &config, rng) {
            Ok(episode) => episode.outcome,
            Err(EpisodeError::MaxMoves(moves)) => {
                warn!(round, moves, "Evaluation game hit the move limit, scored as a draw");
                Outcome::Draw
            }
            Err(e) => return Err(e),
        };

        match outcome {
            Outcome::Win(player) if config.seats[player.index()] == CANDIDATE => {
                result.candidate_wins += 1
            }
            Outcome::Win(_) => result.accepted_wins += 1,
            Outcome::Draw => result.draws += 1,
        }
        debug!(round, ?outcome, candidate_first = round % 2 == 0, "Evaluation game finished");
    }

    result.promoted = promotes(result.candidate_wins, result.rounds);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_gomoku::Gomoku;
    use mcts::UniformEvaluator;
    use rand::SeedableRng;

    fn settings(rounds: u32) -> GateSettings {
        GateSettings {
            rounds,
            opening_moves: 2,
            search: MctsConfig::for_testing(),
            max_moves: 64,
        }
    }

    fn uniform() -> Arc<dyn Evaluator<Gomoku>> {
        Arc::new(UniformEvaluator::new())
    }

    #[test]
    fn test_promotion_needs_strict_majority() {
        assert!(promotes(6, 11));
        assert!(!promotes(5, 11));
        assert!(!promotes(2, 4));
        assert!(promotes(3, 4));
        assert!(!promotes(0, 0));
    }

    #[test]
    fn test_seats_alternate() {
        assert_eq!(seats(0), [CANDIDATE, ACCEPTED]);
        assert_eq!(seats(1), [ACCEPTED, CANDIDATE]);
        assert_eq!(seats(2), [CANDIDATE, ACCEPTED]);
    }

    #[test]
    fn test_first_mover_game_follows_seat_rotation() {
        // One stone in a row wins: whoever opens wins.
        let game = Gomoku::new("first-stone", 2, 1);
        let mut rng = ChaCha20Rng::seed_from_u64(3);

        let odd = run_gate(&game, uniform(), uniform(), &settings(3), &mut rng).unwrap();
        assert_eq!(odd.candidate_wins, 2);
        assert_eq!(odd.accepted_wins, 1);
        assert!(odd.promoted);

        let even = run_gate(&game, uniform(), uniform(), &settings(4), &mut rng).unwrap();
        assert_eq!(even.candidate_wins, 2);
        assert_eq!(even.accepted_wins, 2);
        assert!(!even.promoted, "a tie is not a majority");
    }

    #[test]
    fn test_results_cover_every_round() {
        let game = Gomoku::tictactoe();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let result = run_gate(&game, uniform(), uniform(), &settings(5), &mut rng).unwrap();
        assert_eq!(
            result.candidate_wins + result.accepted_wins + result.draws,
            result.rounds
        );
        assert_eq!(result.rounds, 5);
        assert_eq!(result.promoted, promotes(result.candidate_wins, 5));
    }

    #[test]
    fn test_move_limit_scores_draws() {
        let game = Gomoku::tictactoe();
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let mut short = settings(2);
        short.max_moves = 2;
        let result = run_gate(&game, uniform(), uniform(), &short, &mut rng).unwrap();
        assert_eq!(result.draws, 2);
        assert!(!result.promoted);
    }
}
