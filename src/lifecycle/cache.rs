use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::player::PlayerRecord;

/// Lifecycle stage of one identity in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Loading,
    Active,
    /// Part of an in-flight batch save.
    Saving,
    /// Final save in flight; removed when it completes.
    Evicting,
    /// Storage reset in flight.
    Resetting,
}

/// Cache entry. `record` is `None` only while loading.
#[derive(Debug)]
pub struct Slot {
    pub state: SlotState,
    pub display_name: String,
    pub record: Option<PlayerRecord>,
    pub load_attempts: u32,
    /// Disconnect arrived while the slot was busy.
    pub disconnect_requested: bool,
    /// Reconnect arrived during the final save.
    pub reconnected: bool,
    /// Playtime was closed off at disconnect. Retried final saves must not
    /// accrue again.
    pub session_closed: bool,
    pub waiters: Vec<oneshot::Sender<()>>,
    /// Resets requested while the slot was busy.
    pub pending_resets: Vec<oneshot::Sender<bool>>,
}

impl Slot {
    fn loading(display_name: &str) -> Self {
        Self {
            state: SlotState::Loading,
            display_name: display_name.to_string(),
            record: None,
            load_attempts: 0,
            disconnect_requested: false,
            reconnected: false,
            session_closed: false,
            waiters: Vec::new(),
            pending_resets: Vec::new(),
        }
    }

    pub fn accepts_mutations(&self) -> bool {
        match self.state {
            SlotState::Active | SlotState::Saving => true,
            SlotState::Evicting => self.reconnected,
            SlotState::Loading | SlotState::Resetting => false,
        }
    }

    /// Moves session time into playtime unless the session was already
    /// closed by a disconnect.
    pub fn accrue_playtime(&mut self, now: DateTime<Utc>) {
        if self.session_closed {
            return;
        }
        if let Some(record) = self.record.as_mut() {
            record.accrue_playtime(now);
        }
    }

    /// Stops the session clock at `now`.
    pub fn close_session(&mut self, now: DateTime<Utc>) {
        self.accrue_playtime(now);
        self.session_closed = true;
    }

    /// Restarts the session clock after a reconnect.
    pub fn reopen_session(&mut self, now: DateTime<Utc>) {
        if !self.session_closed {
            return;
        }
        self.session_closed = false;
        if let Some(record) = self.record.as_mut() {
            record.session_started_at = now;
        }
    }

    /// Wakes every disconnect waiter.
    pub fn notify_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

/// Active records keyed by identity. At most one slot per identity.
#[derive(Debug, Default)]
pub struct RecordCache {
    slots: HashMap<String, Slot>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a loading slot. Returns false when the identity is present.
    pub fn begin_load(&mut self, identity: &str, display_name: &str) -> bool {
        if self.slots.contains_key(identity) {
            return false;
        }
        self.slots
            .insert(identity.to_string(), Slot::loading(display_name));
        true
    }

    pub fn slot(&self, identity: &str) -> Option<&Slot> {
        self.slots.get(identity)
    }

    pub fn slot_mut(&mut self, identity: &str) -> Option<&mut Slot> {
        self.slots.get_mut(identity)
    }

    pub fn remove(&mut self, identity: &str) -> Option<Slot> {
        self.slots.remove(identity)
    }

    /// The live record, if the identity is loaded and may be mutated.
    pub fn mutable_record(&mut self, identity: &str) -> Option<&mut PlayerRecord> {
        self.slots
            .get_mut(identity)
            .filter(|slot| slot.accepts_mutations())
            .and_then(|slot| slot.record.as_mut())
    }

    /// The live record of a loaded identity, whatever it is doing.
    pub fn record(&self, identity: &str) -> Option<&PlayerRecord> {
        self.slots
            .get(identity)
            .and_then(|slot| slot.record.as_ref())
    }

    pub fn identities_in(&self, state: SlotState) -> Vec<String> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.state == state)
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Slot)> {
        self.slots.iter_mut()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = (String, Slot)> + '_ {
        self.slots.drain()
    }

    /// Number of identities with a loaded record.
    pub fn loaded_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| slot.record.as_ref().is_some_and(|record| record.is_loaded))
            .count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_slot_per_identity() {
        let mut cache = RecordCache::new();
        assert!(cache.begin_load("a", "alice"));
        assert!(!cache.begin_load("a", "alice again"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn loading_slot_rejects_mutations() {
        let mut cache = RecordCache::new();
        cache.begin_load("a", "alice");
        assert!(cache.mutable_record("a").is_none());

        let slot = cache.slot_mut("a").unwrap();
        slot.record = Some(PlayerRecord::empty("a", "alice"));
        slot.state = SlotState::Active;
        assert!(cache.mutable_record("a").is_some());
    }

    #[test]
    fn evicting_slot_accepts_mutations_only_after_reconnect() {
        let mut cache = RecordCache::new();
        cache.begin_load("a", "alice");
        let slot = cache.slot_mut("a").unwrap();
        slot.record = Some(PlayerRecord::empty("a", "alice"));
        slot.state = SlotState::Evicting;
        assert!(cache.mutable_record("a").is_none());

        cache.slot_mut("a").unwrap().reconnected = true;
        assert!(cache.mutable_record("a").is_some());
    }

    #[test]
    fn closed_session_accrues_no_more_playtime() {
        let start = Utc::now();
        let mut record = PlayerRecord::empty("a", "alice");
        record.session_started_at = start;
        let mut cache = RecordCache::new();
        cache.begin_load("a", "alice");
        let slot = cache.slot_mut("a").unwrap();
        slot.record = Some(record);

        slot.close_session(start + chrono::Duration::seconds(30));
        slot.accrue_playtime(start + chrono::Duration::seconds(600));
        slot.close_session(start + chrono::Duration::seconds(900));
        assert_eq!(slot.record.as_ref().unwrap().playtime_seconds, 30);

        slot.reopen_session(start + chrono::Duration::seconds(1000));
        slot.accrue_playtime(start + chrono::Duration::seconds(1010));
        assert_eq!(slot.record.as_ref().unwrap().playtime_seconds, 40);
    }

    #[tokio::test]
    async fn notify_wakes_every_waiter() {
        let mut cache = RecordCache::new();
        cache.begin_load("a", "alice");
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        let slot = cache.slot_mut("a").unwrap();
        slot.waiters.push(tx1);
        slot.waiters.push(tx2);

        slot.notify_waiters();

        assert!(rx1.await.is_ok());
        assert!(rx2.await.is_ok());
    }
}
