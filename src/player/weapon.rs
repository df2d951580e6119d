use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::Display;

const WEAPON_PREFIX: &str = "weapon_";

/// Canonical weapon key: lower-cased and `weapon_` prefixed.
///
/// `"AK47"`, `"ak47"` and `"weapon_ak47"` all become `"weapon_ak47"`.
pub fn normalize_weapon_key(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    if lowered.starts_with(WEAPON_PREFIX) {
        lowered
    } else {
        format!("{WEAPON_PREFIX}{lowered}")
    }
}

/// Counters for one weapon of one player (`lvl_base_weapons` row).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeaponStat {
    pub key: String,
    pub kills: i32,
    pub deaths: i32,
    pub headshots: i32,
    pub hits: i64,
    pub shots: i64,
    pub damage: i64,
    #[serde(skip)]
    dirty: bool,
}

impl WeaponStat {
    fn new(key: String) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }

    /// Builds an entry read back from storage (clean). The key is normalized.
    pub fn stored(
        key: &str,
        kills: i32,
        deaths: i32,
        headshots: i32,
        hits: i64,
        shots: i64,
        damage: i64,
    ) -> Self {
        Self {
            key: normalize_weapon_key(key),
            kills,
            deaths,
            headshots,
            hits,
            shots,
            damage,
            dirty: false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// All weapon entries of one player, keyed by normalized weapon key.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WeaponStats {
    entries: HashMap<String, WeaponStat>,
}

impl WeaponStats {
    pub fn from_entries(entries: impl IntoIterator<Item = WeaponStat>) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats.entries.insert(entry.key.clone(), entry);
        }
        stats
    }

    pub fn get(&self, raw_key: &str) -> Option<&WeaponStat> {
        self.entries.get(&normalize_weapon_key(raw_key))
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeaponStat> {
        self.entries.values()
    }

    pub fn dirty(&self) -> impl Iterator<Item = &WeaponStat> {
        self.entries.values().filter(|stat| stat.dirty)
    }

    pub fn any_dirty(&self) -> bool {
        self.entries.values().any(|stat| stat.dirty)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn record_shot(&mut self, raw_key: &str) {
        let stat = self.entry(raw_key);
        stat.shots += 1;
        stat.dirty = true;
    }

    pub fn record_hit(&mut self, raw_key: &str, damage: i32) {
        let stat = self.entry(raw_key);
        stat.hits += 1;
        stat.damage += i64::from(damage.max(0));
        stat.dirty = true;
    }

    pub fn record_kill(&mut self, raw_key: &str, headshot: bool) {
        let stat = self.entry(raw_key);
        stat.kills += 1;
        if headshot {
            stat.headshots += 1;
        }
        stat.dirty = true;
    }

    pub fn record_death(&mut self, raw_key: &str) {
        let stat = self.entry(raw_key);
        stat.deaths += 1;
        stat.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self, key: &str) {
        if let Some(stat) = self.entries.get_mut(key) {
            stat.dirty = false;
        }
    }

    fn entry(&mut self, raw_key: &str) -> &mut WeaponStat {
        let key = normalize_weapon_key(raw_key);
        self.entries
            .entry(key.clone())
            .or_insert_with(|| WeaponStat::new(key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponCategory {
    Knife,
    Pistol,
    Smg,
    Rifle,
    Sniper,
    Shotgun,
    MachineGun,
    Grenade,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponInfo {
    pub display_name: String,
    pub category: WeaponCategory,
}

/// Weapon metadata lookup, built once at startup and shared by `Arc`.
#[derive(Debug, Clone, Default)]
pub struct WeaponCatalog {
    weapons: HashMap<String, WeaponInfo>,
}

impl WeaponCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog preloaded with the stock weapon set.
    pub fn with_defaults() -> Self {
        use WeaponCategory::*;

        let defaults = [
            ("knife", "Knife", Knife),
            ("glock", "Glock-18", Pistol),
            ("usp_silencer", "USP-S", Pistol),
            ("hkp2000", "P2000", Pistol),
            ("p250", "P250", Pistol),
            ("deagle", "Desert Eagle", Pistol),
            ("elite", "Dual Berettas", Pistol),
            ("fiveseven", "Five-SeveN", Pistol),
            ("tec9", "Tec-9", Pistol),
            ("cz75a", "CZ75-Auto", Pistol),
            ("revolver", "R8 Revolver", Pistol),
            ("mac10", "MAC-10", Smg),
            ("mp9", "MP9", Smg),
            ("mp7", "MP7", Smg),
            ("mp5sd", "MP5-SD", Smg),
            ("ump45", "UMP-45", Smg),
            ("p90", "P90", Smg),
            ("bizon", "PP-Bizon", Smg),
            ("ak47", "AK-47", Rifle),
            ("m4a1", "M4A4", Rifle),
            ("m4a1_silencer", "M4A1-S", Rifle),
            ("famas", "FAMAS", Rifle),
            ("galilar", "Galil AR", Rifle),
            ("aug", "AUG", Rifle),
            ("sg556", "SG 553", Rifle),
            ("awp", "AWP", Sniper),
            ("ssg08", "SSG 08", Sniper),
            ("scar20", "SCAR-20", Sniper),
            ("g3sg1", "G3SG1", Sniper),
            ("nova", "Nova", Shotgun),
            ("xm1014", "XM1014", Shotgun),
            ("mag7", "MAG-7", Shotgun),
            ("sawedoff", "Sawed-Off", Shotgun),
            ("m249", "M249", MachineGun),
            ("negev", "Negev", MachineGun),
            ("hegrenade", "HE Grenade", Grenade),
            ("molotov", "Molotov", Grenade),
            ("incgrenade", "Incendiary Grenade", Grenade),
        ];

        let mut catalog = Self::new();
        for (key, name, category) in defaults {
            catalog.insert(key, name, category);
        }
        catalog
    }

    pub fn insert(&mut self, raw_key: &str, display_name: &str, category: WeaponCategory) {
        self.weapons.insert(
            normalize_weapon_key(raw_key),
            WeaponInfo {
                display_name: display_name.to_string(),
                category,
            },
        );
    }

    pub fn get(&self, raw_key: &str) -> Option<&WeaponInfo> {
        self.weapons.get(&normalize_weapon_key(raw_key))
    }

    /// Metadata for a key, falling back to the key itself and `Unknown`.
    pub fn describe(&self, raw_key: &str) -> WeaponInfo {
        let key = normalize_weapon_key(raw_key);
        self.weapons.get(&key).cloned().unwrap_or_else(|| WeaponInfo {
            display_name: key.trim_start_matches(WEAPON_PREFIX).to_string(),
            category: WeaponCategory::Unknown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("AK47", "weapon_ak47")]
    #[case("ak47", "weapon_ak47")]
    #[case("weapon_ak47", "weapon_ak47")]
    #[case("WEAPON_AWP", "weapon_awp")]
    #[case(" deagle ", "weapon_deagle")]
    fn normalizes_weapon_keys(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_weapon_key(raw), expected);
    }

    #[test]
    fn different_spellings_share_one_entry() {
        let mut stats = WeaponStats::default();
        stats.record_kill("AK47", false);
        stats.record_kill("weapon_ak47", true);

        assert_eq!(stats.len(), 1);
        let ak = stats.get("Ak47").unwrap();
        assert_eq!(ak.kills, 2);
        assert_eq!(ak.headshots, 1);
        assert!(ak.is_dirty());
    }

    #[test]
    fn mark_clean_only_touches_named_entry() {
        let mut stats = WeaponStats::default();
        stats.record_shot("awp");
        stats.record_hit("deagle", 40);

        stats.mark_clean("weapon_awp");

        assert!(!stats.get("awp").unwrap().is_dirty());
        assert!(stats.get("deagle").unwrap().is_dirty());
        assert_eq!(stats.dirty().count(), 1);
    }

    #[test]
    fn catalog_describes_known_and_unknown_weapons() {
        let catalog = WeaponCatalog::with_defaults();
        assert_eq!(catalog.describe("AK47").display_name, "AK-47");
        assert_eq!(catalog.describe("weapon_awp").category, WeaponCategory::Sniper);

        let unknown = catalog.describe("weapon_taser");
        assert_eq!(unknown.display_name, "taser");
        assert_eq!(unknown.category, WeaponCategory::Unknown);
    }
}
