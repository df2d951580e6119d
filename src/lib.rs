// Library crate for the statkeeper statistics engine
// This file exposes the public API for integration tests

pub mod api;
pub mod config;
pub mod events;
pub mod lifecycle;
pub mod maintenance;
pub mod persistence;
pub mod player;
pub mod rank;
pub mod shared;

// Re-export commonly used types for easier access in tests
pub use config::EngineConfig;
pub use events::{GameEvent, Side};
pub use lifecycle::{spawn_engine, EngineError, Mutation, StatsHandle};
pub use persistence::{InMemoryStatsStore, PostgresStatsStore, StatsGateway, StatsStore};
pub use player::{PlayerRecord, SettingName};
pub use rank::{RankTable, RankTier};
pub use shared::{AppError, AppState};
