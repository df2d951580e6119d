use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{HitGroup, HitRecord, PlayerSettings, SettingName, WeaponStats};

/// Round-scoped counters. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundState {
    pub round_points: i32,
    pub kill_streak: u32,
    pub last_kill_at: Option<DateTime<Utc>>,
}

/// Which parts of a record a save actually wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncedParts {
    pub stats: bool,
    pub settings: bool,
    pub weapons: Vec<String>,
    pub hits: bool,
}

impl SyncedParts {
    pub fn is_empty(&self) -> bool {
        !self.stats && !self.settings && self.weapons.is_empty() && !self.hits
    }
}

/// Which parts of a record a statistics reset cleared in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetScope {
    pub stats: bool,
    pub weapons: bool,
    pub hits: bool,
}

impl ResetScope {
    pub fn all() -> Self {
        Self {
            stats: true,
            weapons: true,
            hits: true,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stats && self.weapons && self.hits
    }

    pub fn is_empty(&self) -> bool {
        !self.stats && !self.weapons && !self.hits
    }
}

/// The live statistics record of one player identity.
///
/// Counter fields are public for reading. Mutations go through the methods
/// below so the dirty flags and the revision counter stay truthful.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerRecord {
    pub identity: String,
    pub display_name: String,
    pub points: i32,
    pub rank_id: i32,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub shots_fired: i64,
    pub hits_landed: i64,
    pub headshots: i32,
    pub rounds_won: i32,
    pub rounds_lost: i32,
    pub rounds_played: i32,
    pub games_won: i32,
    pub games_lost: i32,
    pub games_played: i32,
    pub damage_dealt: i64,
    pub playtime_seconds: i64,
    pub last_seen_epoch: i64,
    pub settings: PlayerSettings,
    pub weapon_stats: WeaponStats,
    pub hit_stats: HitRecord,

    #[serde(skip)]
    pub is_loaded: bool,
    #[serde(skip)]
    pub session_started_at: DateTime<Utc>,
    #[serde(skip)]
    pub round: RoundState,
    #[serde(skip)]
    dirty: bool,
    #[serde(skip)]
    revision: u64,
}

impl PlayerRecord {
    /// Fresh record for an identity with no stored row. It starts dirty so
    /// the first flush inserts it.
    pub fn seeded(identity: &str, display_name: &str, start_points: i32) -> Self {
        let mut record = Self::empty(identity, display_name);
        record.points = start_points;
        record.dirty = true;
        record
    }

    /// Blank, clean record. Used as the base when assembling stored rows.
    pub fn empty(identity: &str, display_name: &str) -> Self {
        Self {
            identity: identity.to_string(),
            display_name: display_name.to_string(),
            points: 0,
            rank_id: 0,
            kills: 0,
            deaths: 0,
            assists: 0,
            shots_fired: 0,
            hits_landed: 0,
            headshots: 0,
            rounds_won: 0,
            rounds_lost: 0,
            rounds_played: 0,
            games_won: 0,
            games_lost: 0,
            games_played: 0,
            damage_dealt: 0,
            playtime_seconds: 0,
            last_seen_epoch: 0,
            settings: PlayerSettings::default(),
            weapon_stats: WeaponStats::default(),
            hit_stats: HitRecord::default(),
            is_loaded: false,
            session_started_at: Utc::now(),
            round: RoundState::default(),
            dirty: false,
            revision: 0,
        }
    }

    // ------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------

    /// True when anything persisted has changed since the last confirmed write.
    pub fn is_dirty(&self) -> bool {
        self.dirty
            || self.settings.is_dirty()
            || self.weapon_stats.any_dirty()
            || self.hit_stats.is_dirty()
    }

    /// True when the main stats row has unsaved changes.
    pub fn stats_dirty(&self) -> bool {
        self.dirty
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Marks the main stats row dirty and bumps the revision.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.bump();
    }

    /// Clears the dirty flags of exactly the parts that were written.
    pub fn mark_synced(&mut self, parts: &SyncedParts) {
        if parts.stats {
            self.dirty = false;
        }
        if parts.settings {
            self.settings.mark_clean();
        }
        for key in &parts.weapons {
            self.weapon_stats.mark_clean(key);
        }
        if parts.hits {
            self.hit_stats.mark_clean();
        }
    }

    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // ------------------------------------------------------------------
    // Points and counters
    // ------------------------------------------------------------------

    pub fn apply_points(&mut self, delta: i32) {
        self.points = self.points.saturating_add(delta);
        self.round.round_points = self.round.round_points.saturating_add(delta);
        self.mark_dirty();
    }

    pub fn set_points(&mut self, value: i32) {
        self.points = value;
        self.mark_dirty();
    }

    pub fn set_rank_id(&mut self, rank_id: i32) {
        if self.rank_id != rank_id {
            self.rank_id = rank_id;
            self.mark_dirty();
        }
    }

    pub fn set_display_name(&mut self, display_name: &str) {
        if self.display_name != display_name {
            self.display_name = display_name.to_string();
            self.mark_dirty();
        }
    }

    pub fn record_kill(&mut self, headshot: bool, at: DateTime<Utc>) {
        self.kills += 1;
        if headshot {
            self.headshots += 1;
        }
        self.round.kill_streak += 1;
        self.round.last_kill_at = Some(at);
        self.mark_dirty();
    }

    pub fn record_death(&mut self) {
        self.deaths += 1;
        self.round.kill_streak = 0;
        self.round.last_kill_at = None;
        self.mark_dirty();
    }

    pub fn record_assist(&mut self) {
        self.assists += 1;
        self.mark_dirty();
    }

    pub fn record_shot(&mut self) {
        self.shots_fired += 1;
        self.mark_dirty();
    }

    /// Counts a landed hit and its damage on the main row.
    pub fn record_hit(&mut self, health_damage: i32) {
        self.hits_landed += 1;
        self.damage_dealt += i64::from(health_damage.max(0));
        self.mark_dirty();
    }

    pub fn record_round_result(&mut self, won: bool) {
        self.rounds_played += 1;
        if won {
            self.rounds_won += 1;
        } else {
            self.rounds_lost += 1;
        }
        self.mark_dirty();
    }

    pub fn record_game_result(&mut self, won: bool) {
        self.games_played += 1;
        if won {
            self.games_won += 1;
        } else {
            self.games_lost += 1;
        }
        self.mark_dirty();
    }

    /// Moves elapsed session time into `playtime_seconds` and restarts the
    /// session clock at `now`.
    pub fn accrue_playtime(&mut self, now: DateTime<Utc>) {
        let elapsed = (now - self.session_started_at).num_seconds();
        self.session_started_at = now;
        if elapsed > 0 {
            self.playtime_seconds += elapsed;
            self.mark_dirty();
        }
    }

    // ------------------------------------------------------------------
    // Sub-records
    // ------------------------------------------------------------------

    pub fn record_region_hit(
        &mut self,
        region_code: i32,
        health_damage: i32,
        armor_damage: i32,
    ) -> HitGroup {
        let group = self.hit_stats.record_hit(region_code, health_damage, armor_damage);
        self.bump();
        group
    }

    pub fn record_weapon_shot(&mut self, weapon: &str) {
        self.weapon_stats.record_shot(weapon);
        self.bump();
    }

    pub fn record_weapon_hit(&mut self, weapon: &str, damage: i32) {
        self.weapon_stats.record_hit(weapon, damage);
        self.bump();
    }

    pub fn record_weapon_kill(&mut self, weapon: &str, headshot: bool) {
        self.weapon_stats.record_kill(weapon, headshot);
        self.bump();
    }

    pub fn record_weapon_death(&mut self, weapon: &str) {
        self.weapon_stats.record_death(weapon);
        self.bump();
    }

    /// Sets a setting. Marks the settings sub-record dirty.
    pub fn set_setting(&mut self, name: SettingName, value: bool) {
        self.settings.set(name, value);
        self.bump();
    }

    /// Flips a setting and returns its new value. Marks the settings dirty.
    pub fn toggle_setting(&mut self, name: SettingName) -> bool {
        let value = self.settings.toggle(name);
        self.bump();
        value
    }

    // ------------------------------------------------------------------
    // Derived ratios
    // ------------------------------------------------------------------

    /// Kills per death, rounded to two decimals; equals kills with no deaths.
    pub fn kill_death_ratio(&self) -> f64 {
        if self.deaths == 0 {
            return f64::from(self.kills);
        }
        round_to(f64::from(self.kills) / f64::from(self.deaths), 2)
    }

    /// Headshot kills as a percentage of kills, one decimal.
    pub fn headshot_percentage(&self) -> f64 {
        if self.kills == 0 {
            return 0.0;
        }
        round_to(f64::from(self.headshots) / f64::from(self.kills) * 100.0, 1)
    }

    /// Hits as a percentage of shots fired, one decimal.
    pub fn accuracy_percentage(&self) -> f64 {
        if self.shots_fired == 0 {
            return 0.0;
        }
        round_to(self.hits_landed as f64 / self.shots_fired as f64 * 100.0, 1)
    }

    // ------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------

    pub fn reset_round_scoped(&mut self) {
        self.round = RoundState::default();
    }

    /// Zeroes every counter, reseeds points and clears the sub-tables.
    ///
    /// The result counts as already synced: every dirty flag is cleared.
    /// Identity, display name, settings and last-seen are kept.
    pub fn reset(&mut self, start_points: i32) {
        self.reset_parts(start_points, ResetScope::all());
    }

    /// Zeroes only the parts in `scope`. Parts outside it keep their live
    /// values and dirty flags.
    pub fn reset_parts(&mut self, start_points: i32, scope: ResetScope) {
        if scope.stats {
            self.points = start_points;
            self.rank_id = 0;
            self.kills = 0;
            self.deaths = 0;
            self.assists = 0;
            self.shots_fired = 0;
            self.hits_landed = 0;
            self.headshots = 0;
            self.rounds_won = 0;
            self.rounds_lost = 0;
            self.rounds_played = 0;
            self.games_won = 0;
            self.games_lost = 0;
            self.games_played = 0;
            self.damage_dealt = 0;
            self.playtime_seconds = 0;
            self.reset_round_scoped();
            self.dirty = false;
        }
        if scope.weapons {
            self.weapon_stats.clear();
        }
        if scope.hits {
            self.hit_stats.reset();
        }
        if !scope.is_empty() {
            self.bump();
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
