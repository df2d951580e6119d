use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Body region buckets tracked in `lvl_base_hits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize)]
pub enum HitGroup {
    Head,
    Chest,
    Belly,
    LeftArm,
    RightArm,
    LeftLeg,
    RightLeg,
    Neck,
}

impl HitGroup {
    /// Maps an engine hitgroup code to a bucket.
    ///
    /// Codes 1..=8 map to head, chest, belly, left arm, right arm, left leg,
    /// right leg and neck. Every other code, including 0 (generic), is
    /// counted as chest.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => HitGroup::Head,
            2 => HitGroup::Chest,
            3 => HitGroup::Belly,
            4 => HitGroup::LeftArm,
            5 => HitGroup::RightArm,
            6 => HitGroup::LeftLeg,
            7 => HitGroup::RightLeg,
            8 => HitGroup::Neck,
            _ => HitGroup::Chest,
        }
    }
}

/// Per-region hit counters plus cumulative damage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRecord {
    pub health_damage: i64,
    pub armor_damage: i64,
    pub head: i32,
    pub chest: i32,
    pub belly: i32,
    pub left_arm: i32,
    pub right_arm: i32,
    pub left_leg: i32,
    pub right_leg: i32,
    pub neck: i32,
    #[serde(skip)]
    dirty: bool,
}

impl HitRecord {
    /// Counts one hit in the bucket for `region_code` and adds the damage.
    pub fn record_hit(
        &mut self,
        region_code: i32,
        health_damage: i32,
        armor_damage: i32,
    ) -> HitGroup {
        let group = HitGroup::from_code(region_code);
        self.health_damage += i64::from(health_damage.max(0));
        self.armor_damage += i64::from(armor_damage.max(0));
        *self.bucket_mut(group) += 1;
        self.dirty = true;
        group
    }

    pub fn count(&self, group: HitGroup) -> i32 {
        match group {
            HitGroup::Head => self.head,
            HitGroup::Chest => self.chest,
            HitGroup::Belly => self.belly,
            HitGroup::LeftArm => self.left_arm,
            HitGroup::RightArm => self.right_arm,
            HitGroup::LeftLeg => self.left_leg,
            HitGroup::RightLeg => self.right_leg,
            HitGroup::Neck => self.neck,
        }
    }

    pub fn total_hits(&self) -> i64 {
        [
            self.head,
            self.chest,
            self.belly,
            self.left_arm,
            self.right_arm,
            self.left_leg,
            self.right_leg,
            self.neck,
        ]
        .iter()
        .map(|count| i64::from(*count))
        .sum()
    }

    /// Zeroes every counter. Leaves the dirty flag clear.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    fn bucket_mut(&mut self, group: HitGroup) -> &mut i32 {
        match group {
            HitGroup::Head => &mut self.head,
            HitGroup::Chest => &mut self.chest,
            HitGroup::Belly => &mut self.belly,
            HitGroup::LeftArm => &mut self.left_arm,
            HitGroup::RightArm => &mut self.right_arm,
            HitGroup::LeftLeg => &mut self.left_leg,
            HitGroup::RightLeg => &mut self.right_leg,
            HitGroup::Neck => &mut self.neck,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use strum::IntoEnumIterator;

    #[rstest]
    #[case(1, HitGroup::Head)]
    #[case(2, HitGroup::Chest)]
    #[case(3, HitGroup::Belly)]
    #[case(4, HitGroup::LeftArm)]
    #[case(5, HitGroup::RightArm)]
    #[case(6, HitGroup::LeftLeg)]
    #[case(7, HitGroup::RightLeg)]
    #[case(8, HitGroup::Neck)]
    fn known_codes_hit_exactly_one_bucket(#[case] code: i32, #[case] expected: HitGroup) {
        let mut hits = HitRecord::default();
        assert_eq!(hits.record_hit(code, 10, 2), expected);

        for group in HitGroup::iter() {
            let want = if group == expected { 1 } else { 0 };
            assert_eq!(hits.count(group), want, "bucket {group}");
        }
        assert_eq!(hits.total_hits(), 1);
        assert!(hits.is_dirty());
    }

    #[rstest]
    #[case(0)]
    #[case(9)]
    #[case(-3)]
    #[case(10)]
    fn unknown_codes_fall_back_to_chest(#[case] code: i32) {
        let mut hits = HitRecord::default();
        hits.record_hit(code, 5, 0);
        assert_eq!(hits.chest, 1);
        assert_eq!(hits.total_hits(), 1);
    }

    #[test]
    fn total_is_sum_of_all_buckets() {
        let mut hits = HitRecord::default();
        for code in 1..=8 {
            hits.record_hit(code, 20, 5);
        }
        hits.record_hit(0, 20, 5);

        assert_eq!(hits.total_hits(), 9);
        assert_eq!(hits.chest, 2);
        assert_eq!(hits.health_damage, 180);
        assert_eq!(hits.armor_damage, 45);
    }

    #[test]
    fn reset_zeroes_without_dirtying() {
        let mut hits = HitRecord::default();
        hits.record_hit(1, 100, 0);
        hits.reset();
        assert_eq!(hits, HitRecord::default());
        assert!(!hits.is_dirty());
    }
}
