use serde::{Deserialize, Serialize};

use crate::player::{
    format_playtime, HitRecord, PlayerRecord, PlayerSettings, WeaponCatalog, WeaponCategory,
};
use crate::rank::{RankTable, RankTier};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage_ready: bool,
    pub active_players: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankResponse {
    pub id: i32,
    pub label: String,
    pub min_points: i32,
    pub color_tag: String,
    pub tag_text: String,
}

impl From<&RankTier> for RankResponse {
    fn from(tier: &RankTier) -> Self {
        Self {
            id: tier.id,
            label: tier.label.clone(),
            // The unranked tier has no real threshold.
            min_points: if tier.id == 0 { 0 } else { tier.min_points },
            color_tag: tier.color_tag.clone(),
            tag_text: tier.tag_text.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WeaponStatResponse {
    pub key: String,
    pub display_name: String,
    pub category: WeaponCategory,
    pub kills: i32,
    pub deaths: i32,
    pub headshots: i32,
    pub hits: i64,
    pub shots: i64,
    pub damage: i64,
}

/// Live record of a connected player with derived values.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlayerResponse {
    pub identity: String,
    pub display_name: String,
    pub points: i32,
    pub rank: RankResponse,
    pub next_rank: Option<RankResponse>,
    pub points_to_next_rank: Option<i32>,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub headshots: i32,
    pub shots_fired: i64,
    pub hits_landed: i64,
    pub damage_dealt: i64,
    pub rounds_won: i32,
    pub rounds_lost: i32,
    pub games_won: i32,
    pub games_lost: i32,
    pub games_played: i32,
    pub kill_death_ratio: f64,
    pub headshot_percentage: f64,
    pub accuracy_percentage: f64,
    pub playtime_seconds: i64,
    pub playtime: String,
    pub settings: PlayerSettings,
    pub weapons: Vec<WeaponStatResponse>,
    pub hits: HitRecord,
}

impl PlayerResponse {
    pub fn build(record: &PlayerRecord, ranks: &RankTable, catalog: &WeaponCatalog) -> Self {
        let next = ranks.next_tier(record.points);

        let mut weapons: Vec<WeaponStatResponse> = record
            .weapon_stats
            .iter()
            .map(|stat| {
                let info = catalog.describe(&stat.key);
                WeaponStatResponse {
                    key: stat.key.clone(),
                    display_name: info.display_name,
                    category: info.category,
                    kills: stat.kills,
                    deaths: stat.deaths,
                    headshots: stat.headshots,
                    hits: stat.hits,
                    shots: stat.shots,
                    damage: stat.damage,
                }
            })
            .collect();
        weapons.sort_by(|a, b| b.kills.cmp(&a.kills).then_with(|| a.key.cmp(&b.key)));

        Self {
            identity: record.identity.clone(),
            display_name: record.display_name.clone(),
            points: record.points,
            rank: ranks.resolve(record.points).into(),
            next_rank: next.map(RankResponse::from),
            points_to_next_rank: next.map(|tier| tier.min_points.saturating_sub(record.points)),
            kills: record.kills,
            deaths: record.deaths,
            assists: record.assists,
            headshots: record.headshots,
            shots_fired: record.shots_fired,
            hits_landed: record.hits_landed,
            damage_dealt: record.damage_dealt,
            rounds_won: record.rounds_won,
            rounds_lost: record.rounds_lost,
            games_won: record.games_won,
            games_lost: record.games_lost,
            games_played: record.games_played,
            kill_death_ratio: record.kill_death_ratio(),
            headshot_percentage: record.headshot_percentage(),
            accuracy_percentage: record.accuracy_percentage(),
            playtime_seconds: record.playtime_seconds,
            playtime: format_playtime(record.playtime_seconds),
            settings: record.settings.clone(),
            weapons,
            hits: record.hit_stats.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionResponse {
    pub identity: String,
    pub position: u64,
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub total: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardOrder {
    #[default]
    Points,
    Playtime,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
    #[serde(default)]
    pub by: LeaderboardOrder,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub position: usize,
    pub identity: String,
    pub display_name: String,
    pub points: i32,
    pub rank: String,
    pub playtime_seconds: i64,
    pub playtime: String,
}
