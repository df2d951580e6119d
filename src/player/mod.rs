// Player statistics record and its sub-records.
//
// Everything in here is plain in-memory data: no I/O, no locking. The
// lifecycle engine owns the live records and the persistence gateway turns
// them into rows.

pub use hits::{HitGroup, HitRecord};
pub use models::{PlayerRecord, ResetScope, RoundState, SyncedParts};
pub use playtime::format_playtime;
pub use settings::{PlayerSettings, SettingName};
pub use weapon::{
    normalize_weapon_key, WeaponCatalog, WeaponCategory, WeaponInfo, WeaponStat, WeaponStats,
};

mod hits;
pub mod models;
mod playtime;
mod settings;
mod weapon;
