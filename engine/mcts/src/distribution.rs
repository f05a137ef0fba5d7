//! Root visit distributions returned by a search.

use engine_core::{Game, Outcome};
use rand::Rng;

/// Visit statistics for one root action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionVisits<A> {
    pub action: A,
    pub visits: u32,
    /// Temperature-scaled share of the root visits
    pub probability: f32,
}

/// What the search recommends at the root.
#[derive(Debug, Clone, PartialEq)]
pub enum VisitDistribution<A> {
    /// The root was already terminal; no moves exist.
    GameOver { outcome: Outcome },
    /// Root children in legal-move order.
    Moves(Vec<ActionVisits<A>>),
}

impl<A: Copy> VisitDistribution<A> {
    pub fn is_game_over(&self) -> bool {
        matches!(self, VisitDistribution::GameOver { .. })
    }

    /// Root entries (empty when the game is over)
    pub fn moves(&self) -> &[ActionVisits<A>] {
        match self {
            VisitDistribution::Moves(moves) => moves,
            VisitDistribution::GameOver { .. } => &[],
        }
    }

    /// Dense probability vector over the game's action index space.
    pub fn to_dense<G: Game<Action = A>>(&self, game: &G) -> Vec<f32> {
        let mut dense = vec![0.0; game.num_actions()];
        for entry in self.moves() {
            dense[game.action_index(entry.action)] = entry.probability;
        }
        dense
    }

    /// Sample an action proportionally to the probabilities.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<A> {
        let moves = self.moves();
        let r: f32 = rng.gen();
        let mut cumsum = 0.0;

        for entry in moves {
            cumsum += entry.probability;
            if r < cumsum {
                return Some(entry.action);
            }
        }

        // Fallback to last non-zero action (handles floating point issues)
        moves
            .iter()
            .rev()
            .find(|e| e.probability > 0.0)
            .map(|e| e.action)
    }

    /// Highest-probability action, first in legal-move order on ties.
    pub fn best(&self) -> Option<A> {
        let mut best: Option<&ActionVisits<A>> = None;
        for entry in self.moves() {
            let better = match best {
                None => true,
                Some(b) => {
                    entry.probability > b.probability
                        || (entry.probability == b.probability && entry.visits > b.visits)
                }
            };
            if better {
                best = Some(entry);
            }
        }
        best.map(|e| e.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_gomoku::{Gomoku, Position};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn moves(probs: &[f32]) -> VisitDistribution<u8> {
        VisitDistribution::Moves(
            probs
                .iter()
                .enumerate()
                .map(|(i, &p)| ActionVisits {
                    action: i as u8,
                    visits: (p * 100.0) as u32,
                    probability: p,
                })
                .collect(),
        )
    }

    #[test]
    fn test_sample_follows_probabilities() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let dist = moves(&[0.0, 0.5, 0.3, 0.2, 0.0]);

        let mut counts = [0u32; 5];
        for _ in 0..1000 {
            counts[dist.sample(&mut rng).unwrap() as usize] += 1;
        }

        assert_eq!(counts[0], 0);
        assert_eq!(counts[4], 0);
        assert!(counts[1] > counts[2]);
        assert!(counts[2] > counts[3]);
    }

    #[test]
    fn test_best_prefers_first_on_tie() {
        assert_eq!(moves(&[0.25, 0.5, 0.25]).best(), Some(1));
        assert_eq!(moves(&[0.5, 0.5]).best(), Some(0));
    }

    #[test]
    fn test_game_over_has_no_moves() {
        let dist: VisitDistribution<u8> = VisitDistribution::GameOver {
            outcome: Outcome::Draw,
        };
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert!(dist.is_game_over());
        assert!(dist.moves().is_empty());
        assert_eq!(dist.sample(&mut rng), None);
        assert_eq!(dist.best(), None);
    }

    #[test]
    fn test_to_dense_uses_action_index() {
        let game = Gomoku::tictactoe();
        let dist = VisitDistribution::Moves(vec![
            ActionVisits {
                action: Position::new(2, 0),
                visits: 3,
                probability: 0.75,
            },
            ActionVisits {
                action: Position::new(0, 2),
                visits: 1,
                probability: 0.25,
            },
        ]);

        let dense = dist.to_dense(&game);
        assert_eq!(dense.len(), 9);
        assert_eq!(dense[2], 0.75);
        assert_eq!(dense[6], 0.25);
        assert!((dense.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }
}
