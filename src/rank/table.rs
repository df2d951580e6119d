use serde::{Deserialize, Serialize};
use tracing::warn;

/// One bracket of the point scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankTier {
    /// Ordinal stored in the `rank` column; 0 is the unranked tier.
    #[serde(default)]
    pub id: i32,
    pub min_points: i32,
    pub label: String,
    #[serde(default)]
    pub color_tag: String,
    #[serde(default)]
    pub tag_text: String,
}

impl RankTier {
    pub fn unranked() -> Self {
        Self {
            id: 0,
            min_points: i32::MIN,
            label: "Unranked".to_string(),
            color_tag: "#FFFFFF".to_string(),
            tag_text: "-".to_string(),
        }
    }
}

/// A rank transition caused by a points change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankChange {
    pub from: RankTier,
    pub to: RankTier,
}

impl RankChange {
    pub fn is_promotion(&self) -> bool {
        self.to.id > self.from.id
    }
}

/// Static mapping from point thresholds to tiers.
///
/// Lookups never fail: an empty or broken table resolves everything to the
/// unranked tier.
#[derive(Debug, Clone)]
pub struct RankTable {
    /// Ascending by `min_points`, indexed by `id - 1`.
    tiers: Vec<RankTier>,
    default_tier: RankTier,
}

impl Default for RankTable {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl RankTable {
    pub fn new(configured: Vec<RankTier>) -> Self {
        let mut tiers: Vec<RankTier> = configured
            .into_iter()
            .filter(|tier| {
                let usable = !tier.label.trim().is_empty();
                if !usable {
                    warn!(min_points = tier.min_points, "Skipping rank tier with empty label");
                }
                usable
            })
            .collect();

        // Stable sort: among equal thresholds the earlier configured tier
        // stays first and is the one dedup keeps.
        tiers.sort_by_key(|tier| tier.min_points);
        tiers.dedup_by_key(|tier| tier.min_points);
        for (index, tier) in tiers.iter_mut().enumerate() {
            tier.id = index as i32 + 1;
        }

        Self {
            tiers,
            default_tier: RankTier::unranked(),
        }
    }

    /// The tier with the greatest `min_points <= points`, or unranked.
    pub fn resolve(&self, points: i32) -> &RankTier {
        self.tiers
            .iter()
            .rev()
            .find(|tier| tier.min_points <= points)
            .unwrap_or(&self.default_tier)
    }

    /// Tier for a stored `rank` ordinal, unranked when out of range.
    pub fn by_id(&self, id: i32) -> &RankTier {
        usize::try_from(id.saturating_sub(1))
            .ok()
            .and_then(|index| self.tiers.get(index))
            .unwrap_or(&self.default_tier)
    }

    /// Rank change between two point values, if the tier differs.
    pub fn change(&self, before: i32, after: i32) -> Option<RankChange> {
        let from = self.resolve(before);
        let to = self.resolve(after);
        (from.id != to.id).then(|| RankChange {
            from: from.clone(),
            to: to.clone(),
        })
    }

    /// The next tier above `points`, if any.
    pub fn next_tier(&self, points: i32) -> Option<&RankTier> {
        let current = self.resolve(points).id;
        usize::try_from(current)
            .ok()
            .and_then(|index| self.tiers.get(index))
    }

    /// Tiers in ascending order.
    pub fn tiers(&self) -> &[RankTier] {
        &self.tiers
    }

    pub fn default_tier(&self) -> &RankTier {
        &self.default_tier
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tier(min_points: i32, label: &str) -> RankTier {
        RankTier {
            id: 0,
            min_points,
            label: label.to_string(),
            color_tag: "#AAAAAA".to_string(),
            tag_text: label.chars().take(3).collect(),
        }
    }

    fn sample_table() -> RankTable {
        RankTable::new(vec![
            tier(1000, "Gold"),
            tier(0, "Iron"),
            tier(500, "Silver"),
            tier(2500, "Diamond"),
        ])
    }

    #[rstest]
    #[case(-50, "Unranked")]
    #[case(0, "Iron")]
    #[case(499, "Iron")]
    #[case(500, "Silver")]
    #[case(999, "Silver")]
    #[case(1000, "Gold")]
    #[case(2500, "Diamond")]
    #[case(i32::MAX, "Diamond")]
    fn resolves_greatest_threshold_not_above_points(#[case] points: i32, #[case] expected: &str) {
        assert_eq!(sample_table().resolve(points).label, expected);
    }

    #[test]
    fn ids_follow_ascending_thresholds() {
        let table = sample_table();
        assert_eq!(table.resolve(0).id, 1);
        assert_eq!(table.resolve(600).id, 2);
        assert_eq!(table.resolve(1200).id, 3);
        assert_eq!(table.resolve(9000).id, 4);
        assert_eq!(table.resolve(-1).id, 0);
        assert_eq!(table.by_id(3).label, "Gold");
        assert_eq!(table.by_id(42).label, "Unranked");
    }

    #[test]
    fn resolution_is_monotonic() {
        let table = sample_table();
        let mut previous = table.resolve(-5_000).id;
        for points in (-5_000..5_000).step_by(7) {
            let id = table.resolve(points).id;
            assert!(id >= previous, "rank dropped at {points}");
            previous = id;
        }
    }

    #[test]
    fn earlier_tier_wins_on_equal_threshold() {
        let table = RankTable::new(vec![tier(100, "First"), tier(100, "Second"), tier(0, "Base")]);
        assert_eq!(table.resolve(150).label, "First");
        assert_eq!(table.tiers().len(), 2);
    }

    #[test]
    fn empty_or_broken_table_returns_default() {
        let empty = RankTable::default();
        assert_eq!(empty.resolve(10_000).label, "Unranked");

        let broken = RankTable::new(vec![tier(0, "  ")]);
        assert!(broken.is_empty());
        assert_eq!(broken.resolve(0), broken.default_tier());
    }

    #[test]
    fn change_reports_promotions_and_demotions() {
        let table = sample_table();
        assert!(table.change(100, 200).is_none());

        let promotion = table.change(450, 520).unwrap();
        assert!(promotion.is_promotion());
        assert_eq!(promotion.to.label, "Silver");

        let demotion = table.change(1000, 990).unwrap();
        assert!(!demotion.is_promotion());
    }

    #[test]
    fn next_tier_stops_at_the_top() {
        let table = sample_table();
        assert_eq!(table.next_tier(0).unwrap().label, "Silver");
        assert!(table.next_tier(3000).is_none());
        assert_eq!(table.next_tier(-10).unwrap().label, "Iron");
    }
}
