use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{watch, RwLock};
use tracing::{debug, instrument};

use super::errors::StoreError;
use super::rows::{HitsRow, SettingsRow, StatsRow, WeaponRow};
use super::store::StatsStore;

/// Parks calls while held so a test can act while a load or save is in
/// flight.
struct Gate {
    held: watch::Sender<bool>,
    waiting: AtomicUsize,
}

impl Gate {
    fn new() -> Self {
        Self {
            held: watch::channel(false).0,
            waiting: AtomicUsize::new(0),
        }
    }

    fn set(&self, held: bool) {
        self.held.send_replace(held);
    }

    async fn pass(&self) {
        if !*self.held.borrow() {
            return;
        }
        self.waiting.fetch_add(1, Ordering::SeqCst);
        let mut released = self.held.subscribe();
        // The sender outlives every receiver.
        let _ = released.wait_for(|held| !*held).await;
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }

    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Tables {
    /// Stats rows with their insertion sequence, used as the tie order.
    stats: HashMap<String, (u64, StatsRow)>,
    settings: HashMap<String, SettingsRow>,
    weapons: HashMap<(String, String), WeaponRow>,
    hits: HashMap<String, HitsRow>,
    next_seq: u64,
}

/// In-memory implementation of `StatsStore` for development and testing.
///
/// Behaves like the relational store: inserts conflict on existing keys and
/// updates report the rows they touched. `set_offline(true)` makes every
/// call fail with `StoreError::Unavailable`. `hold_loads` and `hold_saves`
/// park stats reads or writes until released.
pub struct InMemoryStatsStore {
    tables: RwLock<Tables>,
    offline: AtomicBool,
    sub_record_deletes_failing: AtomicBool,
    load_gate: Gate,
    save_gate: Gate,
    stats_inserts: AtomicUsize,
    stats_updates: AtomicUsize,
    weapon_writes: AtomicUsize,
}

impl Default for InMemoryStatsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStatsStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            offline: AtomicBool::new(false),
            sub_record_deletes_failing: AtomicBool::new(false),
            load_gate: Gate::new(),
            save_gate: Gate::new(),
            stats_inserts: AtomicUsize::new(0),
            stats_updates: AtomicUsize::new(0),
            weapon_writes: AtomicUsize::new(0),
        }
    }

    /// Creates a store with pre-populated stats rows
    pub fn with_rows(rows: Vec<StatsRow>) -> Self {
        let mut tables = Tables::default();
        for row in rows {
            let seq = tables.next_seq;
            tables.next_seq += 1;
            tables.stats.insert(row.steam.clone(), (seq, row));
        }
        Self {
            tables: RwLock::new(tables),
            ..Self::new()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Weapon and hit deletes fail while stats resets still succeed.
    pub fn set_sub_record_deletes_failing(&self, failing: bool) {
        self.sub_record_deletes_failing.store(failing, Ordering::SeqCst);
    }

    pub fn hold_loads(&self, held: bool) {
        self.load_gate.set(held);
    }

    pub fn hold_saves(&self, held: bool) {
        self.save_gate.set(held);
    }

    /// Stats reads currently parked by `hold_loads`.
    pub fn held_loads(&self) -> usize {
        self.load_gate.waiting()
    }

    /// Stats writes currently parked by `hold_saves`.
    pub fn held_saves(&self) -> usize {
        self.save_gate.waiting()
    }

    /// Successful stats-row inserts plus updates that touched a row.
    pub fn stats_writes(&self) -> usize {
        self.stats_inserts.load(Ordering::SeqCst) + self.stats_updates.load(Ordering::SeqCst)
    }

    pub fn stats_inserts(&self) -> usize {
        self.stats_inserts.load(Ordering::SeqCst)
    }

    pub fn weapon_writes(&self) -> usize {
        self.weapon_writes.load(Ordering::SeqCst)
    }

    pub async fn player_count(&self) -> usize {
        self.tables.read().await.stats.len()
    }

    pub async fn has_weapon_rows(&self, steam: &str) -> bool {
        self.tables.read().await.weapons.keys().any(|(owner, _)| owner == steam)
    }

    pub async fn has_hits_row(&self, steam: &str) -> bool {
        self.tables.read().await.hits.contains_key(steam)
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is offline".to_string()));
        }
        Ok(())
    }

    fn check_sub_record_deletes(&self) -> Result<(), StoreError> {
        self.check_online()?;
        if self.sub_record_deletes_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("sub-record deletes are failing".to_string()));
        }
        Ok(())
    }

    fn sorted_stats(tables: &Tables, key: impl Fn(&StatsRow) -> i64, limit: u32) -> Vec<StatsRow> {
        let mut rows: Vec<&(u64, StatsRow)> = tables.stats.values().collect();
        rows.sort_by_key(|(seq, row)| (Reverse(key(row)), *seq));
        rows.into_iter()
            .take(limit as usize)
            .map(|(_, row)| row.clone())
            .collect()
    }
}

#[async_trait]
impl StatsStore for InMemoryStatsStore {
    async fn migrate(&self) -> Result<(), StoreError> {
        self.check_online()
    }

    async fn fetch_stats(&self, steam: &str) -> Result<Option<StatsRow>, StoreError> {
        self.load_gate.pass().await;
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(tables.stats.get(steam).map(|(_, row)| row.clone()))
    }

    #[instrument(skip(self, row), fields(steam = %row.steam))]
    async fn insert_stats(&self, row: &StatsRow) -> Result<(), StoreError> {
        self.save_gate.pass().await;
        self.check_online()?;
        let mut tables = self.tables.write().await;
        if tables.stats.contains_key(&row.steam) {
            debug!("Stats row already exists in memory");
            return Err(StoreError::Conflict(format!("lvl_base.steam = {}", row.steam)));
        }
        let seq = tables.next_seq;
        tables.next_seq += 1;
        tables.stats.insert(row.steam.clone(), (seq, row.clone()));
        self.stats_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_stats(&self, row: &StatsRow) -> Result<u64, StoreError> {
        self.save_gate.pass().await;
        self.check_online()?;
        let mut tables = self.tables.write().await;
        match tables.stats.get_mut(&row.steam) {
            Some((_, stored)) => {
                *stored = row.clone();
                self.stats_updates.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn fetch_settings(&self, steam: &str) -> Result<Option<SettingsRow>, StoreError> {
        self.check_online()?;
        Ok(self.tables.read().await.settings.get(steam).cloned())
    }

    async fn insert_settings(&self, row: &SettingsRow) -> Result<(), StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        if tables.settings.contains_key(&row.steam) {
            return Err(StoreError::Conflict(format!("lvl_base_settings.steam = {}", row.steam)));
        }
        tables.settings.insert(row.steam.clone(), row.clone());
        Ok(())
    }

    async fn update_settings(&self, row: &SettingsRow) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        match tables.settings.get_mut(&row.steam) {
            Some(stored) => {
                *stored = row.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn fetch_weapons(&self, steam: &str) -> Result<Vec<WeaponRow>, StoreError> {
        self.check_online()?;
        let tables = self.tables.read().await;
        let mut rows: Vec<WeaponRow> = tables
            .weapons
            .values()
            .filter(|row| row.steam == steam)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.classname.cmp(&b.classname));
        Ok(rows)
    }

    async fn insert_weapon(&self, row: &WeaponRow) -> Result<(), StoreError> {
        self.check_online()?;
        let key = (row.steam.clone(), row.classname.clone());
        let mut tables = self.tables.write().await;
        if tables.weapons.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "lvl_base_weapons = ({}, {})",
                row.steam, row.classname
            )));
        }
        tables.weapons.insert(key, row.clone());
        self.weapon_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_weapon(&self, row: &WeaponRow) -> Result<u64, StoreError> {
        self.check_online()?;
        let key = (row.steam.clone(), row.classname.clone());
        let mut tables = self.tables.write().await;
        match tables.weapons.get_mut(&key) {
            Some(stored) => {
                *stored = row.clone();
                self.weapon_writes.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn fetch_hits(&self, steam: &str) -> Result<Option<HitsRow>, StoreError> {
        self.check_online()?;
        Ok(self.tables.read().await.hits.get(steam).cloned())
    }

    async fn insert_hits(&self, row: &HitsRow) -> Result<(), StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        if tables.hits.contains_key(&row.steam_id) {
            return Err(StoreError::Conflict(format!("lvl_base_hits.SteamID = {}", row.steam_id)));
        }
        tables.hits.insert(row.steam_id.clone(), row.clone());
        Ok(())
    }

    async fn update_hits(&self, row: &HitsRow) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        match tables.hits.get_mut(&row.steam_id) {
            Some(stored) => {
                *stored = row.clone();
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn count_above(&self, points: i32) -> Result<u64, StoreError> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(tables.stats.values().filter(|(_, row)| row.value > points).count() as u64)
    }

    async fn count_players(&self) -> Result<u64, StoreError> {
        self.check_online()?;
        Ok(self.tables.read().await.stats.len() as u64)
    }

    async fn top_by_points(&self, limit: u32) -> Result<Vec<StatsRow>, StoreError> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(Self::sorted_stats(&tables, |row| i64::from(row.value), limit))
    }

    async fn top_by_playtime(&self, limit: u32) -> Result<Vec<StatsRow>, StoreError> {
        self.check_online()?;
        let tables = self.tables.read().await;
        Ok(Self::sorted_stats(&tables, |row| row.playtime, limit))
    }

    #[instrument(skip(self))]
    async fn delete_stale(&self, cutoff_epoch: i64) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;

        let stale: Vec<String> = tables
            .stats
            .values()
            .filter(|(_, row)| {
                let seen = row.lastconnect;
                seen > 0 && seen < cutoff_epoch
            })
            .map(|(_, row)| row.steam.clone())
            .collect();

        for steam in &stale {
            tables.stats.remove(steam);
            tables.settings.remove(steam);
            tables.hits.remove(steam);
        }
        tables.weapons.retain(|(owner, _), _| !stale.contains(owner));

        debug!(purged = stale.len(), "Stale identities removed from memory");
        Ok(stale.len() as u64)
    }

    async fn reset_stats(&self, steam: &str, start_points: i32) -> Result<u64, StoreError> {
        self.check_online()?;
        let mut tables = self.tables.write().await;
        match tables.stats.get_mut(steam) {
            Some((_, stored)) => {
                *stored = stored.zeroed(start_points);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_weapons(&self, steam: &str) -> Result<u64, StoreError> {
        self.check_sub_record_deletes()?;
        let mut tables = self.tables.write().await;
        let before = tables.weapons.len();
        tables.weapons.retain(|(owner, _), _| owner != steam);
        Ok((before - tables.weapons.len()) as u64)
    }

    async fn delete_hits(&self, steam: &str) -> Result<u64, StoreError> {
        self.check_sub_record_deletes()?;
        let mut tables = self.tables.write().await;
        Ok(u64::from(tables.hits.remove(steam).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(steam: &str, value: i32, playtime: i64, lastconnect: i64) -> StatsRow {
        let mut row = StatsRow::from_record(&crate::player::PlayerRecord::empty(steam, steam));
        row.value = value;
        row.playtime = playtime;
        row.lastconnect = lastconnect;
        row
    }

    #[tokio::test]
    async fn insert_conflicts_on_existing_key() {
        let store = InMemoryStatsStore::new();
        store.insert_stats(&row("a", 0, 0, 0)).await.unwrap();

        let err = store.insert_stats(&row("a", 5, 0, 0)).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.stats_inserts(), 1);
    }

    #[tokio::test]
    async fn update_reports_missing_rows() {
        let store = InMemoryStatsStore::new();
        assert_eq!(store.update_stats(&row("ghost", 1, 0, 0)).await.unwrap(), 0);
        assert_eq!(store.stats_writes(), 0);
    }

    #[tokio::test]
    async fn top_lists_break_ties_by_insertion_order() {
        let store = InMemoryStatsStore::with_rows(vec![
            row("first", 100, 30, 0),
            row("second", 100, 90, 0),
            row("third", 200, 10, 0),
        ]);

        let by_points: Vec<String> = store
            .top_by_points(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.steam)
            .collect();
        assert_eq!(by_points, vec!["third", "first", "second"]);

        let by_playtime = store.top_by_playtime(1).await.unwrap();
        assert_eq!(by_playtime[0].steam, "second");
    }

    #[tokio::test]
    async fn held_loads_wait_for_release() {
        let store = std::sync::Arc::new(InMemoryStatsStore::with_rows(vec![row("a", 7, 0, 0)]));
        store.hold_loads(true);

        let reader = store.clone();
        let fetch = tokio::spawn(async move { reader.fetch_stats("a").await });
        while store.held_loads() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!fetch.is_finished());

        store.hold_loads(false);
        let fetched = fetch.await.unwrap().unwrap().unwrap();
        assert_eq!(fetched.value, 7);
        assert_eq!(store.held_loads(), 0);
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = InMemoryStatsStore::new();
        store.set_offline(true);

        assert!(matches!(
            store.fetch_stats("a").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.count_players().await.is_err());

        store.set_offline(false);
        assert_eq!(store.count_players().await.unwrap(), 0);
    }
}
