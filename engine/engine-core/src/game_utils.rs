//! Shared utilities for two-player zero-sum games
//!
//! Seat identity, final outcomes and the conversions between them are used
//! by the search (terminal values), self-play (outcome back-filling) and the
//! promotion gate (win counting).

use serde::{Deserialize, Serialize};

/// One of the two seats in a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    /// The player who moves first (black in Gomoku, X in tic-tac-toe).
    First,
    /// The player who moves second.
    Second,
}

impl Player {
    /// The other seat.
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::First => Player::Second,
            Player::Second => Player::First,
        }
    }

    /// Seat index (0 for `First`, 1 for `Second`).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Player::First => 0,
            Player::Second => 1,
        }
    }
}

/// Final result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Win(Player),
    Draw,
}

impl Outcome {
    /// Game value from `player`'s perspective.
    ///
    /// # Example
    /// ```
    /// use engine_core::{Outcome, Player};
    ///
    /// assert_eq!(Outcome::Win(Player::First).value_for(Player::First), 1.0);
    /// assert_eq!(Outcome::Win(Player::First).value_for(Player::Second), -1.0);
    /// assert_eq!(Outcome::Draw.value_for(Player::Second), 0.0);
    /// ```
    #[inline]
    pub fn value_for(self, player: Player) -> f32 {
        match self {
            Outcome::Win(winner) if winner == player => 1.0,
            Outcome::Win(_) => -1.0,
            Outcome::Draw => 0.0,
        }
    }

    /// The winning seat, if any.
    pub fn winner(self) -> Option<Player> {
        match self {
            Outcome::Win(p) => Some(p),
            Outcome::Draw => None,
        }
    }
}

/// Dense policy vector with all mass on `index`.
///
/// Used as the policy target for moves that were not produced by a search
/// (random and external agents, recorded games).
pub fn one_hot_policy(num_actions: usize, index: usize) -> Vec<f32> {
    let mut policy = vec![0.0; num_actions];
    if let Some(p) = policy.get_mut(index) {
        *p = 1.0;
    }
    policy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opponent_is_involution() {
        assert_eq!(Player::First.opponent(), Player::Second);
        assert_eq!(Player::Second.opponent().opponent(), Player::Second);
    }

    #[test]
    fn test_player_index() {
        assert_eq!(Player::First.index(), 0);
        assert_eq!(Player::Second.index(), 1);
    }

    #[test]
    fn test_outcome_values_are_zero_sum() {
        for outcome in [
            Outcome::Win(Player::First),
            Outcome::Win(Player::Second),
            Outcome::Draw,
        ] {
            let sum = outcome.value_for(Player::First) + outcome.value_for(Player::Second);
            assert_eq!(sum, 0.0);
        }
    }

    #[test]
    fn test_winner() {
        assert_eq!(Outcome::Win(Player::Second).winner(), Some(Player::Second));
        assert_eq!(Outcome::Draw.winner(), None);
    }

    #[test]
    fn test_one_hot_policy() {
        let policy = one_hot_policy(5, 3);
        assert_eq!(policy, vec![0.0, 0.0, 0.0, 1.0, 0.0]);

        // Out-of-range index leaves the vector empty of mass
        let policy = one_hot_policy(3, 7);
        assert_eq!(policy.iter().sum::<f32>(), 0.0);
    }
}
