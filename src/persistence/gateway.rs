use chrono::Utc;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::errors::StoreError;
use super::rows::{HitsRow, SettingsRow, StatsRow, StoredPlayer, WeaponRow};
use super::store::StatsStore;
use crate::config::ModuleConfig;
use crate::player::{PlayerRecord, ResetScope, SyncedParts};

/// Result of reading one identity from storage.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Found(PlayerRecord),
    NotFound,
    /// Storage error. The identity may well exist.
    Failed,
}

/// What one save wrote, for reconciling with the live record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub identity: String,
    /// Revision of the record the save was taken from.
    pub revision: u64,
    pub last_seen_epoch: i64,
    pub written: SyncedParts,
    /// True when at least one table write failed.
    pub failed: bool,
}

impl SaveReport {
    fn for_record(record: &PlayerRecord) -> Self {
        Self {
            identity: record.identity.clone(),
            revision: record.revision(),
            last_seen_epoch: record.last_seen_epoch,
            written: SyncedParts::default(),
            failed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upserted {
    Inserted,
    Updated,
}

/// Insert first; on a duplicate key fall back to update. If the update finds
/// no row (deleted in between) the insert is retried once.
async fn upsert<'a, I, U>(insert: I, update: U) -> Result<Upserted, StoreError>
where
    I: Fn() -> BoxFuture<'a, Result<(), StoreError>>,
    U: Fn() -> BoxFuture<'a, Result<u64, StoreError>>,
{
    match insert().await {
        Ok(()) => return Ok(Upserted::Inserted),
        Err(StoreError::Conflict(_)) => {}
        Err(e) => return Err(e),
    }

    if update().await? > 0 {
        return Ok(Upserted::Updated);
    }

    debug!("Row vanished between insert and update, retrying insert");
    insert().await.map(|()| Upserted::Inserted)
}

/// Storage facade used by the lifecycle engine.
///
/// Every operation absorbs storage errors: they are logged and turned into
/// an empty, absent or zero result. Until `initialize` succeeds every
/// operation is a no-op.
pub struct StatsGateway {
    store: Arc<dyn StatsStore>,
    modules: ModuleConfig,
    start_points: i32,
    ready: AtomicBool,
}

impl StatsGateway {
    pub fn new(store: Arc<dyn StatsStore>, modules: ModuleConfig, start_points: i32) -> Self {
        Self {
            store,
            modules,
            start_points,
            ready: AtomicBool::new(false),
        }
    }

    /// Runs schema migrations. Returns whether the gateway is ready.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> bool {
        match self.store.migrate().await {
            Ok(()) => {
                self.ready.store(true, Ordering::SeqCst);
                info!("Statistics storage ready");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize statistics storage");
                false
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn start_points(&self) -> i32 {
        self.start_points
    }

    pub fn modules(&self) -> ModuleConfig {
        self.modules
    }

    // ------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------

    /// Reads the stored record with every enabled sub-record.
    #[instrument(skip(self))]
    pub async fn fetch(&self, identity: &str) -> LoadOutcome {
        if !self.is_ready() {
            warn!(identity = %identity, "Load requested before storage is ready");
            return LoadOutcome::Failed;
        }

        match self.fetch_stored(identity).await {
            Ok(Some(stored)) => {
                debug!(identity = %identity, "Stored record found");
                LoadOutcome::Found(stored.into_record())
            }
            Ok(None) => {
                debug!(identity = %identity, "No stored record");
                LoadOutcome::NotFound
            }
            Err(e) => {
                error!(error = %e, identity = %identity, "Failed to load player record");
                LoadOutcome::Failed
            }
        }
    }

    /// `fetch` without the failure distinction.
    pub async fn load(&self, identity: &str) -> Option<PlayerRecord> {
        match self.fetch(identity).await {
            LoadOutcome::Found(record) => Some(record),
            LoadOutcome::NotFound | LoadOutcome::Failed => None,
        }
    }

    async fn fetch_stored(&self, identity: &str) -> Result<Option<StoredPlayer>, StoreError> {
        let Some(stats) = self.store.fetch_stats(identity).await? else {
            return Ok(None);
        };

        let settings = self.store.fetch_settings(identity).await?;
        let weapons = if self.modules.weapon_stats {
            self.store.fetch_weapons(identity).await?
        } else {
            Vec::new()
        };
        let hits = if self.modules.hit_stats {
            self.store.fetch_hits(identity).await?
        } else {
            None
        };

        Ok(Some(StoredPlayer {
            stats,
            settings,
            weapons,
            hits,
        }))
    }

    // ------------------------------------------------------------------
    // Save
    // ------------------------------------------------------------------

    /// Writes every dirty part of `record` and clears the flags of the parts
    /// that were confirmed. No-op for a clean record.
    pub async fn save(&self, record: &mut PlayerRecord) -> SaveReport {
        self.save_at(record, Utc::now().timestamp()).await
    }

    /// Saves every loaded, dirty record with a shared last-seen stamp.
    /// Individual failures do not stop the batch.
    #[instrument(skip(self, records), fields(batch = records.len()))]
    pub async fn save_batch(&self, records: &mut [PlayerRecord]) -> Vec<SaveReport> {
        if !self.is_ready() {
            warn!("Batch save skipped, storage not ready");
            return Vec::new();
        }

        let now = Utc::now().timestamp();
        let mut reports = Vec::new();
        for record in records.iter_mut().filter(|r| r.is_loaded && r.is_dirty()) {
            reports.push(self.save_at(record, now).await);
        }

        let failed = reports.iter().filter(|report| report.failed).count();
        debug!(saved = reports.len() - failed, failed, "Batch save finished");
        reports
    }

    #[instrument(skip(self, record), fields(identity = %record.identity))]
    async fn save_at(&self, record: &mut PlayerRecord, now: i64) -> SaveReport {
        if !self.is_ready() {
            warn!("Save skipped, storage not ready");
            let mut report = SaveReport::for_record(record);
            report.failed = true;
            return report;
        }
        if !record.is_dirty() {
            return SaveReport::for_record(record);
        }

        record.last_seen_epoch = now;
        let mut report = SaveReport::for_record(record);

        let stats = StatsRow::from_record(record);
        match upsert(
            || self.store.insert_stats(&stats),
            || self.store.update_stats(&stats),
        )
        .await
        {
            Ok(outcome) => {
                debug!(?outcome, "Stats row written");
                report.written.stats = true;
            }
            Err(e) => {
                error!(error = %e, "Failed to save stats row");
                report.failed = true;
            }
        }

        if record.settings.is_dirty() {
            let settings = SettingsRow::from_record(record);
            match upsert(
                || self.store.insert_settings(&settings),
                || self.store.update_settings(&settings),
            )
            .await
            {
                Ok(_) => report.written.settings = true,
                Err(e) => {
                    error!(error = %e, "Failed to save settings");
                    report.failed = true;
                }
            }
        }

        if self.modules.weapon_stats {
            let rows: Vec<WeaponRow> = record
                .weapon_stats
                .dirty()
                .map(|stat| WeaponRow::from_stat(&record.identity, stat))
                .collect();
            for row in &rows {
                match upsert(
                    || self.store.insert_weapon(row),
                    || self.store.update_weapon(row),
                )
                .await
                {
                    Ok(_) => report.written.weapons.push(row.classname.clone()),
                    Err(e) => {
                        error!(error = %e, weapon = %row.classname, "Failed to save weapon stats");
                        report.failed = true;
                    }
                }
            }
        }

        if self.modules.hit_stats && record.hit_stats.is_dirty() {
            let hits = HitsRow::from_record(record);
            match upsert(
                || self.store.insert_hits(&hits),
                || self.store.update_hits(&hits),
            )
            .await
            {
                Ok(_) => report.written.hits = true,
                Err(e) => {
                    error!(error = %e, "Failed to save hit stats");
                    report.failed = true;
                }
            }
        }

        record.mark_synced(&report.written);
        report
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// 1 + number of stored identities with strictly more points.
    #[instrument(skip(self))]
    pub async fn query_rank_position(&self, identity: &str) -> Option<u64> {
        if !self.is_ready() {
            return None;
        }
        let stats = match self.store.fetch_stats(identity).await {
            Ok(Some(stats)) => stats,
            Ok(None) => return None,
            Err(e) => {
                error!(error = %e, identity = %identity, "Failed to read rank position");
                return None;
            }
        };
        match self.store.count_above(stats.value).await {
            Ok(above) => Some(above + 1),
            Err(e) => {
                error!(error = %e, identity = %identity, "Failed to read rank position");
                None
            }
        }
    }

    pub async fn query_total_count(&self) -> u64 {
        if !self.is_ready() {
            return 0;
        }
        self.store.count_players().await.unwrap_or_else(|e| {
            error!(error = %e, "Failed to count players");
            0
        })
    }

    /// Stats-only records ordered by points, descending.
    pub async fn query_top_by_points(&self, limit: u32) -> Vec<PlayerRecord> {
        if !self.is_ready() {
            return Vec::new();
        }
        match self.store.top_by_points(limit).await {
            Ok(rows) => rows.into_iter().map(StatsRow::into_record).collect(),
            Err(e) => {
                error!(error = %e, limit, "Failed to read top players by points");
                Vec::new()
            }
        }
    }

    /// Stats-only records ordered by playtime, descending.
    pub async fn query_top_by_playtime(&self, limit: u32) -> Vec<PlayerRecord> {
        if !self.is_ready() {
            return Vec::new();
        }
        match self.store.top_by_playtime(limit).await {
            Ok(rows) => rows.into_iter().map(StatsRow::into_record).collect(),
            Err(e) => {
                error!(error = %e, limit, "Failed to read top players by playtime");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------
    // Deletion
    // ------------------------------------------------------------------

    /// Purges identities last seen before `cutoff_epoch`. Rows that never
    /// recorded a last-seen time are kept.
    #[instrument(skip(self))]
    pub async fn delete_stale(&self, cutoff_epoch: i64) -> u64 {
        if !self.is_ready() {
            return 0;
        }
        match self.store.delete_stale(cutoff_epoch).await {
            Ok(purged) => {
                info!(purged, cutoff_epoch, "Stale identities purged");
                purged
            }
            Err(e) => {
                error!(error = %e, "Failed to purge stale identities");
                0
            }
        }
    }

    /// Zeroes the stored stats row and deletes the identity's weapon and hit
    /// rows. The returned scope names the parts that are now clear in
    /// storage; a disabled module counts as clear.
    #[instrument(skip(self))]
    pub async fn reset_identity(&self, identity: &str) -> ResetScope {
        let mut cleared = ResetScope {
            stats: false,
            weapons: false,
            hits: false,
        };
        if !self.is_ready() {
            return cleared;
        }

        match self.store.reset_stats(identity, self.start_points).await {
            Ok(_) => cleared.stats = true,
            Err(e) => {
                error!(error = %e, identity = %identity, "Failed to reset stats row");
            }
        }
        cleared.weapons = !self.modules.weapon_stats;
        if self.modules.weapon_stats {
            match self.store.delete_weapons(identity).await {
                Ok(_) => cleared.weapons = true,
                Err(e) => {
                    error!(error = %e, identity = %identity, "Failed to delete weapon stats");
                }
            }
        }
        cleared.hits = !self.modules.hit_stats;
        if self.modules.hit_stats {
            match self.store.delete_hits(identity).await {
                Ok(_) => cleared.hits = true,
                Err(e) => {
                    error!(error = %e, identity = %identity, "Failed to delete hit stats");
                }
            }
        }

        if cleared.is_complete() {
            info!(identity = %identity, "Player statistics reset in storage");
        } else {
            warn!(identity = %identity, ?cleared, "Player statistics only partly reset");
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::InMemoryStatsStore;
    use crate::player::SettingName;

    async fn ready_gateway(modules: ModuleConfig) -> (Arc<InMemoryStatsStore>, StatsGateway) {
        let store = Arc::new(InMemoryStatsStore::new());
        let gateway = StatsGateway::new(store.clone(), modules, 100);
        assert!(gateway.initialize().await);
        (store, gateway)
    }

    fn loaded(identity: &str) -> PlayerRecord {
        let mut record = PlayerRecord::seeded(identity, identity, 100);
        record.is_loaded = true;
        record
    }

    #[tokio::test]
    async fn operations_are_noops_before_initialize() {
        let store = Arc::new(InMemoryStatsStore::new());
        let gateway = StatsGateway::new(store.clone(), ModuleConfig::default(), 0);
        let mut record = loaded("early");

        let report = gateway.save(&mut record).await;

        assert!(report.failed);
        assert!(record.is_dirty());
        assert_eq!(store.stats_writes(), 0);
        assert!(matches!(gateway.fetch("early").await, LoadOutcome::Failed));
        assert_eq!(gateway.query_total_count().await, 0);
    }

    #[tokio::test]
    async fn clean_record_is_not_written() {
        let (store, gateway) = ready_gateway(ModuleConfig::default()).await;
        let mut record = PlayerRecord::empty("clean", "clean");

        let report = gateway.save(&mut record).await;

        assert!(report.written.is_empty());
        assert_eq!(store.stats_writes(), 0);
    }

    #[tokio::test]
    async fn second_save_updates_instead_of_duplicating() {
        let (store, gateway) = ready_gateway(ModuleConfig::default()).await;
        let mut record = loaded("dup");

        gateway.save(&mut record).await;
        record.apply_points(10);
        gateway.save(&mut record).await;

        assert_eq!(store.player_count().await, 1);
        assert_eq!(store.stats_inserts(), 1);
        let stored = gateway.load("dup").await.unwrap();
        assert_eq!(stored.points, 110);
    }

    #[tokio::test]
    async fn disabled_modules_keep_sub_records_dirty_and_unwritten() {
        let modules = ModuleConfig {
            weapon_stats: false,
            hit_stats: false,
        };
        let (store, gateway) = ready_gateway(modules).await;
        let mut record = loaded("nomods");
        record.record_weapon_kill("ak47", false);
        record.record_region_hit(1, 50, 0);

        let report = gateway.save(&mut record).await;

        assert!(report.written.stats);
        assert!(report.written.weapons.is_empty());
        assert!(!report.written.hits);
        assert_eq!(store.weapon_writes(), 0);
        assert!(!store.has_hits_row("nomods").await);
    }

    #[tokio::test]
    async fn failed_write_keeps_record_dirty() {
        let (store, gateway) = ready_gateway(ModuleConfig::default()).await;
        let mut record = loaded("offline");
        record.set_setting(SettingName::RoundSummary, true);
        store.set_offline(true);

        let report = gateway.save(&mut record).await;

        assert!(report.failed);
        assert!(record.is_dirty());
        assert!(record.stats_dirty());
        assert!(record.settings.is_dirty());
    }

    #[tokio::test]
    async fn fetch_distinguishes_failure_from_absence() {
        let (store, gateway) = ready_gateway(ModuleConfig::default()).await;
        assert!(matches!(gateway.fetch("nobody").await, LoadOutcome::NotFound));

        store.set_offline(true);
        assert!(matches!(gateway.fetch("nobody").await, LoadOutcome::Failed));
        assert!(gateway.load("nobody").await.is_none());
    }

    #[tokio::test]
    async fn rank_position_counts_strictly_greater_points() {
        let (_store, gateway) = ready_gateway(ModuleConfig::default()).await;
        for (identity, points) in [("a", 500), ("b", 300), ("c", 300), ("d", 100)] {
            let mut record = loaded(identity);
            record.set_points(points);
            gateway.save(&mut record).await;
        }

        assert_eq!(gateway.query_rank_position("a").await, Some(1));
        assert_eq!(gateway.query_rank_position("b").await, Some(2));
        assert_eq!(gateway.query_rank_position("c").await, Some(2));
        assert_eq!(gateway.query_rank_position("d").await, Some(4));
        assert_eq!(gateway.query_rank_position("zz").await, None);
        assert_eq!(gateway.query_total_count().await, 4);
    }
}
