use sqlx::FromRow;

use crate::player::{HitRecord, PlayerRecord, PlayerSettings, WeaponStat, WeaponStats};

/// `lvl_base` row. Field names are the column names.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StatsRow {
    pub steam: String,
    pub name: String,
    pub value: i32,
    pub rank: i32,
    pub kills: i32,
    pub deaths: i32,
    pub shoots: i64,
    pub hits: i64,
    pub headshots: i32,
    pub assists: i32,
    pub round_win: i32,
    pub round_lose: i32,
    pub playtime: i64,
    /// Unix seconds. 0 means never seen.
    pub lastconnect: i64,
    pub game_wins: i32,
    pub game_losses: i32,
    pub games_played: i32,
    pub rounds_played: i32,
    pub damage: i64,
}

impl StatsRow {
    pub fn from_record(record: &PlayerRecord) -> Self {
        Self {
            steam: record.identity.clone(),
            name: record.display_name.clone(),
            value: record.points,
            rank: record.rank_id,
            kills: record.kills,
            deaths: record.deaths,
            shoots: record.shots_fired,
            hits: record.hits_landed,
            headshots: record.headshots,
            assists: record.assists,
            round_win: record.rounds_won,
            round_lose: record.rounds_lost,
            playtime: record.playtime_seconds,
            lastconnect: record.last_seen_epoch,
            game_wins: record.games_won,
            game_losses: record.games_lost,
            games_played: record.games_played,
            rounds_played: record.rounds_played,
            damage: record.damage_dealt,
        }
    }

    /// Clean record holding only the main row; sub-records are defaults.
    pub fn into_record(self) -> PlayerRecord {
        let mut record = PlayerRecord::empty(&self.steam, &self.name);
        record.points = self.value;
        record.rank_id = self.rank;
        record.kills = self.kills;
        record.deaths = self.deaths;
        record.shots_fired = self.shoots;
        record.hits_landed = self.hits;
        record.headshots = self.headshots;
        record.assists = self.assists;
        record.rounds_won = self.round_win;
        record.rounds_lost = self.round_lose;
        record.playtime_seconds = self.playtime;
        record.last_seen_epoch = self.lastconnect;
        record.games_won = self.game_wins;
        record.games_lost = self.game_losses;
        record.games_played = self.games_played;
        record.rounds_played = self.rounds_played;
        record.damage_dealt = self.damage;
        record
    }

    /// Same row with every counter zeroed and points reseeded.
    /// Name and last-seen are kept.
    pub fn zeroed(&self, start_points: i32) -> Self {
        Self {
            steam: self.steam.clone(),
            name: self.name.clone(),
            value: start_points,
            rank: 0,
            kills: 0,
            deaths: 0,
            shoots: 0,
            hits: 0,
            headshots: 0,
            assists: 0,
            round_win: 0,
            round_lose: 0,
            playtime: 0,
            lastconnect: self.lastconnect,
            game_wins: 0,
            game_losses: 0,
            games_played: 0,
            rounds_played: 0,
            damage: 0,
        }
    }
}

/// `lvl_base_settings` row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct SettingsRow {
    pub steam: String,
    pub messages: bool,
    pub summary: bool,
    pub rankchanges: bool,
}

impl SettingsRow {
    pub fn from_record(record: &PlayerRecord) -> Self {
        Self {
            steam: record.identity.clone(),
            messages: record.settings.messages_enabled,
            summary: record.settings.round_summary_enabled,
            rankchanges: record.settings.rank_change_notify_enabled,
        }
    }

    pub fn into_settings(self) -> PlayerSettings {
        PlayerSettings::stored(self.messages, self.summary, self.rankchanges)
    }
}

/// `lvl_base_weapons` row, keyed by (steam, classname).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct WeaponRow {
    pub steam: String,
    pub classname: String,
    pub kills: i32,
    pub deaths: i32,
    pub headshots: i32,
    pub hits: i64,
    pub shots: i64,
    pub damage: i64,
}

impl WeaponRow {
    pub fn from_stat(identity: &str, stat: &WeaponStat) -> Self {
        Self {
            steam: identity.to_string(),
            classname: stat.key.clone(),
            kills: stat.kills,
            deaths: stat.deaths,
            headshots: stat.headshots,
            hits: stat.hits,
            shots: stat.shots,
            damage: stat.damage,
        }
    }

    pub fn into_stat(self) -> WeaponStat {
        WeaponStat::stored(
            &self.classname,
            self.kills,
            self.deaths,
            self.headshots,
            self.hits,
            self.shots,
            self.damage,
        )
    }
}

/// `lvl_base_hits` row. Column names are case-sensitive in this table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct HitsRow {
    #[sqlx(rename = "SteamID")]
    pub steam_id: String,
    #[sqlx(rename = "DmgHealth")]
    pub dmg_health: i64,
    #[sqlx(rename = "DmgArmor")]
    pub dmg_armor: i64,
    #[sqlx(rename = "Head")]
    pub head: i32,
    #[sqlx(rename = "Chest")]
    pub chest: i32,
    #[sqlx(rename = "Belly")]
    pub belly: i32,
    #[sqlx(rename = "LeftArm")]
    pub left_arm: i32,
    #[sqlx(rename = "RightArm")]
    pub right_arm: i32,
    #[sqlx(rename = "LeftLeg")]
    pub left_leg: i32,
    #[sqlx(rename = "RightLeg")]
    pub right_leg: i32,
    // Historical column name, kept for schema compatibility.
    #[sqlx(rename = "Neak")]
    pub neck: i32,
}

impl HitsRow {
    pub fn from_record(record: &PlayerRecord) -> Self {
        let hits = &record.hit_stats;
        Self {
            steam_id: record.identity.clone(),
            dmg_health: hits.health_damage,
            dmg_armor: hits.armor_damage,
            head: hits.head,
            chest: hits.chest,
            belly: hits.belly,
            left_arm: hits.left_arm,
            right_arm: hits.right_arm,
            left_leg: hits.left_leg,
            right_leg: hits.right_leg,
            neck: hits.neck,
        }
    }

    pub fn into_hit_record(self) -> HitRecord {
        let mut hits = HitRecord::default();
        hits.health_damage = self.dmg_health;
        hits.armor_damage = self.dmg_armor;
        hits.head = self.head;
        hits.chest = self.chest;
        hits.belly = self.belly;
        hits.left_arm = self.left_arm;
        hits.right_arm = self.right_arm;
        hits.left_leg = self.left_leg;
        hits.right_leg = self.right_leg;
        hits.neck = self.neck;
        hits
    }
}

/// Everything stored for one identity.
#[derive(Debug, Clone)]
pub struct StoredPlayer {
    pub stats: StatsRow,
    pub settings: Option<SettingsRow>,
    pub weapons: Vec<WeaponRow>,
    pub hits: Option<HitsRow>,
}

impl StoredPlayer {
    /// Assembles a clean record from the stored rows.
    pub fn into_record(self) -> PlayerRecord {
        let mut record = self.stats.into_record();
        if let Some(settings) = self.settings {
            record.settings = settings.into_settings();
        }
        record.weapon_stats =
            WeaponStats::from_entries(self.weapons.into_iter().map(WeaponRow::into_stat));
        if let Some(hits) = self.hits {
            record.hit_stats = hits.into_hit_record();
        }
        record
    }
}
