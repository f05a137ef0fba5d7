//! Playing one full game and turning it into training records

use engine_core::{one_hot_policy, Game, GameError, Outcome, Player};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

use crate::agent::{Agent, AgentError};

/// One training example.
///
/// `outcome` is the final result from the perspective of the player to move
/// in `state`: +1 win, -1 loss, 0 draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord<S> {
    pub state: S,
    /// Dense policy target, sums to 1, zero on illegal actions
    pub policy: Vec<f32>,
    pub outcome: f32,
}

/// Root temperature by move number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureSchedule {
    pub initial: f32,
    pub late: f32,
    /// Moves played at `initial` before switching to `late`
    pub threshold_moves: u32,
}

impl TemperatureSchedule {
    pub fn constant(temperature: f32) -> Self {
        Self {
            initial: temperature,
            late: temperature,
            threshold_moves: 0,
        }
    }

    /// Temperature for the move with 0-based index `move_number`
    pub fn at(&self, move_number: u32) -> f32 {
        if move_number < self.threshold_moves {
            self.initial
        } else {
            self.late
        }
    }
}

/// Setup of a single episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeConfig {
    /// Agent index for the first and the second seat
    pub seats: [usize; 2],
    pub temperature: TemperatureSchedule,
    /// Abort guard; a game still running after this many moves is discarded
    pub max_moves: u32,
}

#[derive(Debug, Error)]
pub enum EpisodeError {
    #[error("{agent} ({seat:?}) failed: {source}")]
    Agent {
        seat: Player,
        agent: String,
        #[source]
        source: AgentError,
    },

    #[error("{agent} ({seat:?}) played an illegal move: {source}")]
    Game {
        seat: Player,
        agent: String,
        #[source]
        source: GameError,
    },

    #[error("no result after {0} moves")]
    MaxMoves(u32),

    #[error("seat assignment {0:?} refers to a missing agent")]
    BadSeats([usize; 2]),
}

/// A finished game.
#[derive(Debug, Clone)]
pub struct EpisodeResult<G: Game> {
    pub records: Vec<TrainingRecord<G::State>>,
    pub outcome: Outcome,
    pub final_state: G::State,
    pub moves: u32,
    /// Moves chosen by a search
    pub searches: u32,
    /// Search iterations summed over all searched moves
    pub search_iterations: u64,
    pub elapsed: Duration,
}

/// Play one game between `agents[seats[0]]` and `agents[seats[1]]`.
///
/// Both seats may name the same agent (self-play). Agents are reset before
/// the first move. The outcome is back-filled into every record once the
/// game ends; on any error nothing is returned.
pub fn play_episode<G: Game>(
    game: &G,
    agents: &mut [Agent<G>],
    config: &EpisodeConfig,
    rng: &mut ChaCha20Rng,
) -> Result<EpisodeResult<G>, EpisodeError> {
    let start = Instant::now();
    let [first, second] = config.seats;
    if first >= agents.len() || second >= agents.len() {
        return Err(EpisodeError::BadSeats(config.seats));
    }
    agents[first].reset();
    agents[second].reset();

    let num_actions = game.num_actions();
    let mut state = game.initial_state();
    // (state, policy target, player to move)
    let mut pending: Vec<(G::State, Vec<f32>, Player)> = Vec::new();
    let mut moves = 0u32;
    let mut searches = 0u32;
    let mut search_iterations = 0u64;

    let outcome = loop {
        if let Some(outcome) = game.outcome(&state) {
            break outcome;
        }
        if moves >= config.max_moves {
            return Err(EpisodeError::MaxMoves(moves));
        }

        let seat = game.current_player(&state);
        let agent = &mut agents[config.seats[seat.index()]];
        agent.set_temperature(config.temperature.at(moves));

        let chosen = agent
            .choose_move(game, &state, rng)
            .map_err(|source| EpisodeError::Agent {
                seat,
                agent: agent.name(),
                source,
            })?;

        let policy = match chosen.search {
            Some(summary) => {
                searches += 1;
                search_iterations += summary.iterations as u64;
                summary.policy
            }
            None => one_hot_policy(num_actions, game.action_index(chosen.action)),
        };

        let next = game
            .apply(&state, chosen.action)
            .map_err(|source| EpisodeError::Game {
                seat,
                agent: agent.name(),
                source,
            })?;
        trace!(move_number = moves, ?seat, action = ?chosen.action, "Move played");

        pending.push((state, policy, seat));
        state = next;
        moves += 1;
    };

    Ok(EpisodeResult {
        records: backfill(pending, outcome),
        outcome,
        final_state: state,
        moves,
        searches,
        search_iterations,
        elapsed: start.elapsed(),
    })
}

/// Attach the final outcome to every (state, policy) pair.
pub fn backfill<S>(positions: Vec<(S, Vec<f32>, Player)>, outcome: Outcome) -> Vec<TrainingRecord<S>> {
    positions
        .into_iter()
        .map(|(state, policy, mover)| TrainingRecord {
            state,
            policy,
            outcome: outcome.value_for(mover),
        })
        .collect()
}
