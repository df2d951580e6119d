use async_trait::async_trait;

use super::errors::StoreError;
use super::rows::{HitsRow, SettingsRow, StatsRow, WeaponRow};

/// Row-level read/write contract of the statistics tables.
///
/// Inserts must fail with `StoreError::Conflict` when the key exists; updates
/// return the number of rows touched. Merging is the gateway's job.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Creates tables and indexes if they are missing.
    async fn migrate(&self) -> Result<(), StoreError>;

    async fn fetch_stats(&self, steam: &str) -> Result<Option<StatsRow>, StoreError>;
    async fn insert_stats(&self, row: &StatsRow) -> Result<(), StoreError>;
    async fn update_stats(&self, row: &StatsRow) -> Result<u64, StoreError>;

    async fn fetch_settings(&self, steam: &str) -> Result<Option<SettingsRow>, StoreError>;
    async fn insert_settings(&self, row: &SettingsRow) -> Result<(), StoreError>;
    async fn update_settings(&self, row: &SettingsRow) -> Result<u64, StoreError>;

    async fn fetch_weapons(&self, steam: &str) -> Result<Vec<WeaponRow>, StoreError>;
    async fn insert_weapon(&self, row: &WeaponRow) -> Result<(), StoreError>;
    async fn update_weapon(&self, row: &WeaponRow) -> Result<u64, StoreError>;

    async fn fetch_hits(&self, steam: &str) -> Result<Option<HitsRow>, StoreError>;
    async fn insert_hits(&self, row: &HitsRow) -> Result<(), StoreError>;
    async fn update_hits(&self, row: &HitsRow) -> Result<u64, StoreError>;

    /// Number of rows with strictly more points than `points`.
    async fn count_above(&self, points: i32) -> Result<u64, StoreError>;
    async fn count_players(&self) -> Result<u64, StoreError>;
    async fn top_by_points(&self, limit: u32) -> Result<Vec<StatsRow>, StoreError>;
    async fn top_by_playtime(&self, limit: u32) -> Result<Vec<StatsRow>, StoreError>;

    /// Deletes identities with `0 < lastconnect < cutoff_epoch` together with
    /// their settings, weapon and hit rows. Returns the purged identity count.
    async fn delete_stale(&self, cutoff_epoch: i64) -> Result<u64, StoreError>;

    /// Zeroes the stats row in place. Returns rows touched.
    async fn reset_stats(&self, steam: &str, start_points: i32) -> Result<u64, StoreError>;
    async fn delete_weapons(&self, steam: &str) -> Result<u64, StoreError>;
    async fn delete_hits(&self, steam: &str) -> Result<u64, StoreError>;
}
