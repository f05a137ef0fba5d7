//! Self-play data generation
//!
//! - [`agent`]: the four move-selection strategies
//! - [`episode`]: one game to a list of [`TrainingRecord`]s
//! - [`pool`]: `process_num` concurrent workers feeding the replay buffer
//! - [`replay`]: bounded FIFO shared with the trainer
//! - [`ingest`]: pre-recorded games as extra training data
//! - [`stats`] and [`metrics`]: progress reporting

pub mod agent;
pub mod botzone;
pub mod config;
pub mod episode;
pub mod ingest;
pub mod metrics;
pub mod pool;
pub mod replay;
pub mod stats;

pub use agent::{Agent, AgentError, AgentMove, SearchPlayer, SearchSummary};
pub use botzone::BotzoneBot;
pub use config::{build_agent, build_agents, AgentSettings};
pub use episode::{
    play_episode, EpisodeConfig, EpisodeError, EpisodeResult, TemperatureSchedule, TrainingRecord,
};
pub use ingest::{DataIngestor, IngestError, IngestReport, RecordedGame};
pub use pool::{PairingSchedule, PoolSettings, PoolSummary, WorkerPool};
pub use replay::{BufferUnderrun, ReplayBuffer};
pub use stats::{ActorStats, ActorStatsSnapshot};
