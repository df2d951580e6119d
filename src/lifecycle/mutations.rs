use chrono::Utc;
use tracing::{debug, info};

use crate::config::ModuleConfig;
use crate::player::{PlayerRecord, SettingName};
use crate::rank::{RankChange, RankTable};

/// One change to an active record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    AddPoints { delta: i32, reason: String },
    SetPoints(i32),
    Kill { headshot: bool },
    Death,
    Assist,
    Shot,
    /// Landed hit. `region` is the engine hitgroup code.
    Hit {
        region: i32,
        health_damage: i32,
        armor_damage: i32,
    },
    WeaponShot { weapon: String },
    WeaponHit { weapon: String, damage: i32 },
    WeaponKill { weapon: String, headshot: bool },
    WeaponDeath { weapon: String },
    SetSetting { name: SettingName, value: bool },
    ToggleSetting(SettingName),
    RoundResult { won: bool },
    GameResult { won: bool },
    ResetRoundScoped,
}

impl Mutation {
    pub fn add_points(delta: i32, reason: &str) -> Self {
        Mutation::AddPoints {
            delta,
            reason: reason.to_string(),
        }
    }

    fn changes_points(&self) -> bool {
        matches!(self, Mutation::AddPoints { .. } | Mutation::SetPoints(_))
    }
}

/// Applies `mutation` to a loaded record.
///
/// Points changes recompute the cached rank id; a resulting tier change is
/// logged and returned. Weapon mutations do nothing when the weapon module is
/// off, and hits skip the region bucket when the hit module is off.
pub fn apply_mutation(
    record: &mut PlayerRecord,
    mutation: Mutation,
    ranks: &RankTable,
    modules: ModuleConfig,
) -> Option<RankChange> {
    let points_before = record.points;
    let recompute_rank = mutation.changes_points();

    match mutation {
        Mutation::AddPoints { delta, reason } => {
            debug!(identity = %record.identity, delta, reason = %reason, "Applying points");
            record.apply_points(delta);
        }
        Mutation::SetPoints(value) => record.set_points(value),
        Mutation::Kill { headshot } => record.record_kill(headshot, Utc::now()),
        Mutation::Death => record.record_death(),
        Mutation::Assist => record.record_assist(),
        Mutation::Shot => record.record_shot(),
        Mutation::Hit {
            region,
            health_damage,
            armor_damage,
        } => {
            record.record_hit(health_damage);
            if modules.hit_stats {
                record.record_region_hit(region, health_damage, armor_damage);
            }
        }
        Mutation::WeaponShot { weapon } if modules.weapon_stats => {
            record.record_weapon_shot(&weapon)
        }
        Mutation::WeaponHit { weapon, damage } if modules.weapon_stats => {
            record.record_weapon_hit(&weapon, damage)
        }
        Mutation::WeaponKill { weapon, headshot } if modules.weapon_stats => {
            record.record_weapon_kill(&weapon, headshot)
        }
        Mutation::WeaponDeath { weapon } if modules.weapon_stats => {
            record.record_weapon_death(&weapon)
        }
        Mutation::WeaponShot { .. }
        | Mutation::WeaponHit { .. }
        | Mutation::WeaponKill { .. }
        | Mutation::WeaponDeath { .. } => {}
        Mutation::SetSetting { name, value } => record.set_setting(name, value),
        Mutation::ToggleSetting(name) => {
            record.toggle_setting(name);
        }
        Mutation::RoundResult { won } => record.record_round_result(won),
        Mutation::GameResult { won } => record.record_game_result(won),
        Mutation::ResetRoundScoped => record.reset_round_scoped(),
    }

    if !recompute_rank {
        return None;
    }
    record.set_rank_id(ranks.resolve(record.points).id);

    let change = ranks.change(points_before, record.points)?;
    info!(
        identity = %record.identity,
        from = %change.from.label,
        to = %change.to.label,
        promotion = change.is_promotion(),
        "Rank changed"
    );
    Some(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::HitGroup;
    use crate::rank::RankTier;
    use rstest::rstest;

    fn ranks() -> RankTable {
        let tier = |min_points: i32, label: &str| RankTier {
            id: 0,
            min_points,
            label: label.to_string(),
            color_tag: String::new(),
            tag_text: String::new(),
        };
        RankTable::new(vec![tier(0, "Bronze"), tier(100, "Silver"), tier(200, "Gold")])
    }

    fn record(points: i32) -> PlayerRecord {
        let mut record = PlayerRecord::empty("STEAM_1:1:7", "bob");
        record.points = points;
        record.is_loaded = true;
        record
    }

    #[test]
    fn points_change_recomputes_rank_and_reports_promotion() {
        let ranks = ranks();
        let mut record = record(90);
        record.rank_id = ranks.resolve(90).id;

        let change = apply_mutation(
            &mut record,
            Mutation::add_points(15, "kill"),
            &ranks,
            ModuleConfig::default(),
        )
        .unwrap();

        assert!(change.is_promotion());
        assert_eq!(record.points, 105);
        assert_eq!(record.rank_id, 2);
        assert!(record.stats_dirty());
    }

    #[test]
    fn points_within_a_tier_report_no_change() {
        let ranks = ranks();
        let mut record = record(110);

        let change = apply_mutation(
            &mut record,
            Mutation::SetPoints(150),
            &ranks,
            ModuleConfig::default(),
        );

        assert!(change.is_none());
        assert_eq!(record.rank_id, 2);
    }

    #[test]
    fn hit_counts_damage_and_region() {
        let mut record = record(0);
        apply_mutation(
            &mut record,
            Mutation::Hit {
                region: 1,
                health_damage: 40,
                armor_damage: 10,
            },
            &ranks(),
            ModuleConfig::default(),
        );

        assert_eq!(record.hits_landed, 1);
        assert_eq!(record.damage_dealt, 40);
        assert_eq!(record.hit_stats.count(HitGroup::Head), 1);
        assert_eq!(record.hit_stats.armor_damage, 10);
    }

    #[rstest]
    #[case(Mutation::WeaponShot { weapon: "ak47".into() })]
    #[case(Mutation::WeaponHit { weapon: "ak47".into(), damage: 27 })]
    #[case(Mutation::WeaponKill { weapon: "ak47".into(), headshot: true })]
    #[case(Mutation::WeaponDeath { weapon: "ak47".into() })]
    fn weapon_mutations_are_ignored_with_module_off(#[case] mutation: Mutation) {
        let modules = ModuleConfig {
            weapon_stats: false,
            hit_stats: true,
        };
        let mut record = record(0);
        let revision = record.revision();

        apply_mutation(&mut record, mutation, &ranks(), modules);

        assert!(record.weapon_stats.is_empty());
        assert_eq!(record.revision(), revision);
        assert!(!record.is_dirty());
    }

    #[test]
    fn hit_with_module_off_skips_region_bucket_only() {
        let modules = ModuleConfig {
            weapon_stats: true,
            hit_stats: false,
        };
        let mut record = record(0);
        apply_mutation(
            &mut record,
            Mutation::Hit {
                region: 3,
                health_damage: 20,
                armor_damage: 0,
            },
            &ranks(),
            modules,
        );

        assert_eq!(record.hits_landed, 1);
        assert_eq!(record.hit_stats.total_hits(), 0);
        assert!(!record.hit_stats.is_dirty());
    }

    #[test]
    fn reset_round_scoped_clears_streak() {
        let mut record = record(0);
        let ranks = ranks();
        let modules = ModuleConfig::default();
        apply_mutation(&mut record, Mutation::Kill { headshot: false }, &ranks, modules);
        apply_mutation(&mut record, Mutation::Kill { headshot: true }, &ranks, modules);
        assert_eq!(record.round.kill_streak, 2);

        apply_mutation(&mut record, Mutation::ResetRoundScoped, &ranks, modules);

        assert_eq!(record.round.kill_streak, 0);
        assert_eq!(record.kills, 2);
        assert_eq!(record.headshots, 1);
    }
}
