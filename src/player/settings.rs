use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Names of the per-player toggles, as typed by players and stored in
/// `lvl_base_settings`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum SettingName {
    #[strum(serialize = "messages")]
    Messages,
    #[strum(serialize = "summary")]
    RoundSummary,
    #[strum(serialize = "rankchanges")]
    RankChanges,
}

/// Player preferences, persisted separately from the stats row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSettings {
    pub messages_enabled: bool,
    pub round_summary_enabled: bool,
    pub rank_change_notify_enabled: bool,
    #[serde(skip)]
    dirty: bool,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            messages_enabled: true,
            round_summary_enabled: false,
            rank_change_notify_enabled: true,
            dirty: false,
        }
    }
}

impl PlayerSettings {
    /// Builds settings read back from storage (clean).
    pub fn stored(messages: bool, summary: bool, rank_changes: bool) -> Self {
        Self {
            messages_enabled: messages,
            round_summary_enabled: summary,
            rank_change_notify_enabled: rank_changes,
            dirty: false,
        }
    }

    pub fn get(&self, name: SettingName) -> bool {
        match name {
            SettingName::Messages => self.messages_enabled,
            SettingName::RoundSummary => self.round_summary_enabled,
            SettingName::RankChanges => self.rank_change_notify_enabled,
        }
    }

    /// Sets a toggle and marks the settings dirty.
    pub fn set(&mut self, name: SettingName, value: bool) {
        match name {
            SettingName::Messages => self.messages_enabled = value,
            SettingName::RoundSummary => self.round_summary_enabled = value,
            SettingName::RankChanges => self.rank_change_notify_enabled = value,
        }
        self.dirty = true;
    }

    /// Sets the point-message toggle. Marks the settings dirty.
    pub fn set_messages_enabled(&mut self, value: bool) {
        self.set(SettingName::Messages, value);
    }

    /// Sets the round-summary toggle. Marks the settings dirty.
    pub fn set_round_summary_enabled(&mut self, value: bool) {
        self.set(SettingName::RoundSummary, value);
    }

    /// Sets the rank-change notification toggle. Marks the settings dirty.
    pub fn set_rank_change_notify_enabled(&mut self, value: bool) {
        self.set(SettingName::RankChanges, value);
    }

    /// Flips a toggle, marks the settings dirty and returns the new value.
    pub fn toggle(&mut self, name: SettingName) -> bool {
        let value = !self.get(name);
        self.set(name, value);
        value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn defaults_match_stored_schema_defaults() {
        let settings = PlayerSettings::default();
        assert!(settings.messages_enabled);
        assert!(!settings.round_summary_enabled);
        assert!(settings.rank_change_notify_enabled);
        assert!(!settings.is_dirty());
    }

    #[test]
    fn setters_mark_dirty() {
        let mut settings = PlayerSettings::default();
        settings.set_round_summary_enabled(true);
        assert!(settings.is_dirty());
        assert!(settings.round_summary_enabled);
    }

    #[test]
    fn toggle_returns_new_value() {
        let mut settings = PlayerSettings::default();
        assert!(!settings.toggle(SettingName::Messages));
        assert!(settings.toggle(SettingName::Messages));
    }

    #[test]
    fn parses_setting_names_case_insensitively() {
        assert_eq!(
            SettingName::from_str("RankChanges").unwrap(),
            SettingName::RankChanges
        );
        assert_eq!(
            SettingName::from_str("summary").unwrap(),
            SettingName::RoundSummary
        );
        assert!(SettingName::from_str("volume").is_err());
    }
}
