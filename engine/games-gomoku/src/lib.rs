//! k-in-a-row board games for the zeroloop engine
//!
//! One rules implementation covers free-style Gomoku (15x15, five in a row)
//! and tic-tac-toe (3x3, three in a row). Moves are `Position { x, y }`
//! values, which serialize to the `{"x": .., "y": ..}` objects spoken by
//! Botzone Gomoku bots.
//!
//! # Usage
//!
//! ```rust
//! use engine_core::Game;
//! use games_gomoku::{Gomoku, Position};
//!
//! let game = Gomoku::tictactoe();
//! let state = game.initial_state();
//! let next = game.apply(&state, Position::new(1, 1)).unwrap();
//! assert_eq!(game.legal_actions(&next).len(), 8);
//! ```

use engine_core::{Game, GameError, GameMetadata, Outcome, Player};
use serde::{Deserialize, Serialize};
use std::fmt;

const EMPTY: u8 = 0;
const FIRST: u8 = 1;
const SECOND: u8 = 2;

/// A board coordinate (column `x`, row `y`, both 0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    /// Placeholder sent to Botzone bots when they make the first move.
    pub const NONE: Position = Position { x: -1, y: -1 };

    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Board state
///
/// Immutable from the outside: every move produces a new `Board`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Board {
    size: u8,
    /// Row-major cells: 0=empty, 1=first player, 2=second player
    cells: Vec<u8>,
    to_move: Player,
    moves: Vec<Position>,
    outcome: Option<Outcome>,
}

impl Board {
    fn empty(size: u8) -> Self {
        Self {
            size,
            cells: vec![EMPTY; size as usize * size as usize],
            to_move: Player::First,
            moves: Vec::new(),
            outcome: None,
        }
    }

    /// Stone at `pos`, if any.
    pub fn stone_at(&self, pos: Position) -> Option<Player> {
        let idx = self.index_of(pos)?;
        match self.cells[idx] {
            FIRST => Some(Player::First),
            SECOND => Some(Player::Second),
            _ => None,
        }
    }

    /// Number of stones on the board
    pub fn stones(&self) -> usize {
        self.moves.len()
    }

    fn in_bounds(&self, pos: Position) -> bool {
        let n = self.size as i32;
        pos.x >= 0 && pos.y >= 0 && pos.x < n && pos.y < n
    }

    fn index_of(&self, pos: Position) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| pos.y as usize * self.size as usize + pos.x as usize)
    }

    /// Length of the line through `pos` along (dx, dy) made of `stone`.
    fn line_length(&self, pos: Position, dx: i32, dy: i32, stone: u8) -> usize {
        let mut count = 1;
        for sign in [1, -1] {
            let mut p = Position::new(pos.x + sign * dx, pos.y + sign * dy);
            while let Some(idx) = self.index_of(p) {
                if self.cells[idx] != stone {
                    break;
                }
                count += 1;
                p = Position::new(p.x + sign * dx, p.y + sign * dy);
            }
        }
        count
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.cells.chunks(self.size as usize) {
            let line: String = row
                .iter()
                .map(|&c| match c {
                    FIRST => 'X',
                    SECOND => 'O',
                    _ => '.',
                })
                .collect();
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// k-in-a-row rules on a square board
#[derive(Debug, Clone)]
pub struct Gomoku {
    env_id: String,
    size: u8,
    win_length: u8,
}

impl Gomoku {
    /// Create a game on a `size`x`size` board won by `win_length` in a row.
    pub fn new(env_id: impl Into<String>, size: u8, win_length: u8) -> Self {
        Self {
            env_id: env_id.into(),
            size,
            win_length,
        }
    }

    /// Free-style Gomoku: 15x15, five in a row
    pub fn standard() -> Self {
        Self::new("gomoku", 15, 5)
    }

    /// Tic-tac-toe: 3x3, three in a row
    pub fn tictactoe() -> Self {
        Self::new("tictactoe", 3, 3)
    }

    /// Look up a game by environment id.
    pub fn from_env_id(env_id: &str) -> Option<Self> {
        match env_id {
            "gomoku" => Some(Self::standard()),
            "tictactoe" => Some(Self::tictactoe()),
            _ => None,
        }
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn win_length(&self) -> u8 {
        self.win_length
    }

    fn stone_of(player: Player) -> u8 {
        match player {
            Player::First => FIRST,
            Player::Second => SECOND,
        }
    }
}

impl Game for Gomoku {
    type State = Board;
    type Action = Position;

    fn metadata(&self) -> GameMetadata {
        let display_name = match self.env_id.as_str() {
            "tictactoe" => "Tic-Tac-Toe".to_string(),
            "gomoku" => "Gomoku".to_string(),
            other => other.to_string(),
        };
        GameMetadata::new(self.env_id.clone(), display_name)
            .with_board(self.size as usize, self.size as usize)
            .with_actions(self.num_actions())
            .with_observation(self.obs_size())
    }

    fn num_actions(&self) -> usize {
        self.size as usize * self.size as usize
    }

    fn initial_state(&self) -> Board {
        Board::empty(self.size)
    }

    fn current_player(&self, state: &Board) -> Player {
        state.to_move
    }

    fn legal_actions(&self, state: &Board) -> Vec<Position> {
        if state.outcome.is_some() {
            return Vec::new();
        }
        state
            .cells
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == EMPTY)
            .filter_map(|(idx, _)| self.action_from_index(idx))
            .collect()
    }

    fn apply(&self, state: &Board, action: Position) -> Result<Board, GameError> {
        if state.outcome.is_some() {
            return Err(GameError::GameOver);
        }
        let idx = state
            .index_of(action)
            .ok_or_else(|| GameError::IllegalAction(format!("{:?} is off the board", action)))?;
        if state.cells[idx] != EMPTY {
            return Err(GameError::IllegalAction(format!(
                "{:?} is already occupied",
                action
            )));
        }

        let stone = Self::stone_of(state.to_move);
        let mut next = state.clone();
        next.cells[idx] = stone;
        next.moves.push(action);

        let won = [(1, 0), (0, 1), (1, 1), (1, -1)]
            .iter()
            .any(|&(dx, dy)| next.line_length(action, dx, dy, stone) >= self.win_length as usize);

        next.outcome = if won {
            Some(Outcome::Win(state.to_move))
        } else if next.cells.iter().all(|&c| c != EMPTY) {
            Some(Outcome::Draw)
        } else {
            None
        };
        next.to_move = state.to_move.opponent();

        Ok(next)
    }

    fn outcome(&self, state: &Board) -> Option<Outcome> {
        state.outcome
    }

    fn history<'s>(&self, state: &'s Board) -> &'s [Position] {
        &state.moves
    }

    fn action_index(&self, action: Position) -> usize {
        action.y as usize * self.size as usize + action.x as usize
    }

    fn action_from_index(&self, index: usize) -> Option<Position> {
        let n = self.size as usize;
        (index < n * n).then(|| Position::new((index % n) as i32, (index / n) as i32))
    }

    /// Own stones plane, opponent stones plane, and a side-to-move flag.
    fn obs_size(&self) -> usize {
        2 * self.num_actions() + 1
    }

    fn encode_obs(&self, state: &Board, out: &mut Vec<f32>) {
        let own = Self::stone_of(state.to_move);
        let n = self.num_actions();
        let start = out.len();
        out.resize(start + 2 * n + 1, 0.0);
        for (i, &c) in state.cells.iter().enumerate() {
            if c == own {
                out[start + i] = 1.0;
            } else if c != EMPTY {
                out[start + n + i] = 1.0;
            }
        }
        if state.to_move == Player::First {
            out[start + 2 * n] = 1.0;
        }
    }
}
