// Public API - what other modules can use
pub use errors::StoreError;
pub use gateway::{LoadOutcome, SaveReport, StatsGateway};
pub use memory::InMemoryStatsStore;
pub use postgres::{PostgresStatsStore, MIGRATIONS};
pub use rows::{HitsRow, SettingsRow, StatsRow, StoredPlayer, WeaponRow};
pub use store::StatsStore;

// Internal modules
mod errors;
mod gateway;
mod memory;
mod postgres;
mod rows;
mod store;
