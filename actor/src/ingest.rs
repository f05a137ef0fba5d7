//! Pre-recorded games as training data
//!
//! Files listed in `data.data_files` (relative to `data.data_path`) hold one
//! JSON game each: `{"moves": [<action>, ...]}`. A game is replayed through
//! the rules, every position gets a one-hot target for the move actually
//! played, and the final outcome is back-filled.
//!
//! After a successful read the file is renamed to `<name>.consumed`, so the
//! same file is never applied twice. Files that fail to parse or replay are
//! left untouched.

use engine_core::{one_hot_policy, Game, GameError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::episode::{backfill, TrainingRecord};
use crate::replay::ReplayBuffer;

/// Suffix appended to files that have been ingested.
pub const CONSUMED_SUFFIX: &str = ".consumed";

/// One recorded game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedGame<A> {
    pub moves: Vec<A>,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("move {index} of {path} cannot be replayed: {source}")]
    Replay {
        path: PathBuf,
        index: usize,
        #[source]
        source: GameError,
    },

    #[error("{path} ends before the game is decided")]
    Unfinished { path: PathBuf },
}

/// What one ingestion pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files_ingested: usize,
    pub files_already_consumed: usize,
    pub files_failed: usize,
    pub records: usize,
}

/// Reads recorded games from a data directory.
#[derive(Debug, Clone)]
pub struct DataIngestor {
    data_path: PathBuf,
}

impl DataIngestor {
    pub fn new(data_path: impl AsRef<Path>) -> Self {
        Self {
            data_path: data_path.as_ref().to_path_buf(),
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    fn consumed_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(CONSUMED_SUFFIX);
        PathBuf::from(name)
    }

    /// Replay a recorded game into training records without touching the file.
    pub fn read_game<G: Game>(
        &self,
        game: &G,
        path: &Path,
    ) -> Result<Vec<TrainingRecord<G::State>>, IngestError> {
        let text = std::fs::read_to_string(path).map_err(|source| IngestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let recorded: RecordedGame<G::Action> =
            serde_json::from_str(&text).map_err(|source| IngestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let num_actions = game.num_actions();
        let mut state = game.initial_state();
        let mut positions = Vec::with_capacity(recorded.moves.len());
        for (index, &action) in recorded.moves.iter().enumerate() {
            let next = game
                .apply(&state, action)
                .map_err(|source| IngestError::Replay {
                    path: path.to_path_buf(),
                    index,
                    source,
                })?;
            let mover = game.current_player(&state);
            positions.push((state, one_hot_policy(num_actions, game.action_index(action)), mover));
            state = next;
        }

        let outcome = game.outcome(&state).ok_or_else(|| IngestError::Unfinished {
            path: path.to_path_buf(),
        })?;
        Ok(backfill(positions, outcome))
    }

    /// Ingest one file into `buffer`.
    ///
    /// Returns `Ok(None)` when the file was consumed by an earlier pass. The
    /// file is marked consumed before its records are pushed as one batch,
    /// so it contributes either all of its records or none of them.
    pub fn ingest_file<G: Game>(
        &self,
        game: &G,
        name: &str,
        buffer: &ReplayBuffer<TrainingRecord<G::State>>,
    ) -> Result<Option<usize>, IngestError> {
        let path = self.data_path.join(name);
        let consumed = Self::consumed_path(&path);
        if !path.exists() && consumed.exists() {
            debug!("{} already consumed", path.display());
            return Ok(None);
        }

        let records = self.read_game(game, &path)?;
        std::fs::rename(&path, &consumed).map_err(|source| IngestError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Some(buffer.push_batch(records)))
    }

    /// Ingest every listed file, skipping failures.
    pub fn ingest_all<G: Game>(
        &self,
        game: &G,
        names: &[String],
        buffer: &ReplayBuffer<TrainingRecord<G::State>>,
    ) -> IngestReport {
        let mut report = IngestReport::default();
        for name in names {
            match self.ingest_file(game, name, buffer) {
                Ok(Some(records)) => {
                    report.files_ingested += 1;
                    report.records += records;
                }
                Ok(None) => report.files_already_consumed += 1,
                Err(e) => {
                    warn!("Skipping recorded game: {}", e);
                    report.files_failed += 1;
                }
            }
        }
        if !names.is_empty() {
            info!(
                ingested = report.files_ingested,
                already_consumed = report.files_already_consumed,
                failed = report.files_failed,
                records = report.records,
                "Recorded games ingested from {}",
                self.data_path.display()
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use games_gomoku::{Gomoku, Position};
    use tempfile::tempdir;

    // X wins on the top row
    const X_WINS: &str = r#"{"moves": [
        {"x": 0, "y": 0}, {"x": 0, "y": 1},
        {"x": 1, "y": 0}, {"x": 1, "y": 1},
        {"x": 2, "y": 0}
    ]}"#;

    fn setup(files: &[(&str, &str)]) -> (tempfile::TempDir, DataIngestor) {
        let dir = tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let ingestor = DataIngestor::new(dir.path());
        (dir, ingestor)
    }

    #[test]
    fn test_read_game_records() {
        let (dir, ingestor) = setup(&[("g.json", X_WINS)]);
        let game = Gomoku::tictactoe();
        let records = ingestor.read_game(&game, &dir.path().join("g.json")).unwrap();

        assert_eq!(records.len(), 5);
        let outcomes: Vec<f32> = records.iter().map(|r| r.outcome).collect();
        assert_eq!(outcomes, vec![1.0, -1.0, 1.0, -1.0, 1.0]);
        let first_move = game.action_index(Position::new(0, 0));
        assert_eq!(records[0].policy[first_move], 1.0);
        assert!(dir.path().join("g.json").exists());
    }

    #[test]
    fn test_ingest_marks_consumed_and_is_idempotent() {
        let (dir, ingestor) = setup(&[("g.json", X_WINS)]);
        let game = Gomoku::tictactoe();
        let buffer = ReplayBuffer::new(100, 1);
        let names = vec!["g.json".to_string()];

        let report = ingestor.ingest_all(&game, &names, &buffer);
        assert_eq!(report.files_ingested, 1);
        assert_eq!(report.records, 5);
        assert_eq!(buffer.len(), 5);
        assert!(!dir.path().join("g.json").exists());
        assert!(dir.path().join("g.json.consumed").exists());

        let report = ingestor.ingest_all(&game, &names, &buffer);
        assert_eq!(report.files_ingested, 0);
        assert_eq!(report.files_already_consumed, 1);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_bad_files_are_skipped_and_not_marked() {
        let (dir, ingestor) = setup(&[
            ("broken.json", "{\"moves\": [oops"),
            ("illegal.json", r#"{"moves": [{"x": 0, "y": 0}, {"x": 0, "y": 0}]}"#),
            ("short.json", r#"{"moves": [{"x": 1, "y": 1}]}"#),
            ("good.json", X_WINS),
        ]);
        let game = Gomoku::tictactoe();
        let buffer = ReplayBuffer::new(100, 1);
        let names: Vec<String> = ["broken.json", "illegal.json", "short.json", "missing.json", "good.json"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let report = ingestor.ingest_all(&game, &names, &buffer);
        assert_eq!(report.files_ingested, 1);
        assert_eq!(report.files_failed, 4);
        assert_eq!(buffer.len(), 5);
        for name in ["broken.json", "illegal.json", "short.json"] {
            assert!(dir.path().join(name).exists());
            assert!(!dir.path().join(format!("{}.consumed", name)).exists());
        }
    }

    #[test]
    fn test_error_kinds() {
        let (dir, ingestor) = setup(&[
            ("illegal.json", r#"{"moves": [{"x": 0, "y": 0}, {"x": 0, "y": 0}]}"#),
            ("short.json", r#"{"moves": []}"#),
        ]);
        let game = Gomoku::tictactoe();
        assert!(matches!(
            ingestor.read_game(&game, &dir.path().join("illegal.json")),
            Err(IngestError::Replay { index: 1, .. })
        ));
        assert!(matches!(
            ingestor.read_game(&game, &dir.path().join("short.json")),
            Err(IngestError::Unfinished { .. })
        ));
        assert!(matches!(
            ingestor.read_game(&game, &dir.path().join("nope.json")),
            Err(IngestError::Io { .. })
        ));
    }
}
