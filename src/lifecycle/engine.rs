use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::cache::{RecordCache, SlotState};
use super::handle::StatsHandle;
use super::mutations::{apply_mutation, Mutation};
use crate::config::{LifecycleConfig, PointsConfig};
use crate::events::GameEvent;
use crate::persistence::{LoadOutcome, SaveReport, StatsGateway};
use crate::player::{PlayerRecord, ResetScope};
use crate::rank::RankTable;

/// Requests accepted by the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    Connect {
        identity: String,
        display_name: String,
    },
    Disconnect {
        identity: String,
        done: Option<oneshot::Sender<()>>,
    },
    Event(GameEvent),
    Mutate {
        identity: String,
        mutation: Mutation,
    },
    GetRecord {
        identity: String,
        reply: oneshot::Sender<Option<PlayerRecord>>,
    },
    ResetPlayer {
        identity: String,
        reply: oneshot::Sender<bool>,
    },
    /// Flushes every dirty active record. Replies with the number saved.
    SaveAll {
        reply: Option<oneshot::Sender<usize>>,
    },
    ActiveCount {
        reply: oneshot::Sender<usize>,
    },
    Shutdown {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Results of background storage work, applied by the engine task.
enum Completion {
    Loaded {
        identity: String,
        outcome: LoadOutcome,
    },
    BatchSaved {
        identities: Vec<String>,
        reports: Vec<SaveReport>,
        reply: Option<oneshot::Sender<usize>>,
    },
    FinalSaved {
        identity: String,
        report: SaveReport,
    },
    Reset {
        identity: String,
        cleared: ResetScope,
        replies: Vec<oneshot::Sender<bool>>,
    },
}

/// Starts the engine task and returns a handle to it.
pub fn spawn_engine(
    gateway: Arc<StatsGateway>,
    ranks: Arc<RankTable>,
    points: PointsConfig,
    config: LifecycleConfig,
) -> (StatsHandle, JoinHandle<()>) {
    let config = config.sanitized();
    let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer);
    let (completions_tx, completions_rx) = mpsc::unbounded_channel();

    let engine = StatsEngine {
        cache: RecordCache::new(),
        gateway: gateway.clone(),
        ranks: ranks.clone(),
        points,
        config,
        commands: commands_rx,
        completions_tx,
        completions_rx,
        in_flight: 0,
        shutting_down: false,
        shutdown_waiters: Vec::new(),
    };

    let task = tokio::spawn(engine.run());
    (StatsHandle::new(commands_tx, gateway, ranks), task)
}

/// Owns the record cache. Only this task touches records; storage work runs
/// in spawned tasks that report back through the completion channel.
struct StatsEngine {
    cache: RecordCache,
    gateway: Arc<StatsGateway>,
    ranks: Arc<RankTable>,
    points: PointsConfig,
    config: LifecycleConfig,
    commands: mpsc::Receiver<EngineCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    /// Spawned storage tasks whose completion has not been applied yet.
    in_flight: usize,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl StatsEngine {
    async fn run(mut self) {
        let period = self.config.save_interval;
        let mut flush = interval_at(Instant::now() + period, period);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            save_interval_secs = period.as_secs(),
            "Statistics engine started"
        );

        loop {
            tokio::select! {
                Some(completion) = self.completions_rx.recv() => self.on_completion(completion),
                command = self.commands.recv(), if !self.shutting_down => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        info!("All engine handles dropped");
                        self.begin_shutdown(None);
                    }
                },
                _ = flush.tick(), if !self.shutting_down => self.flush_dirty(None),
            }

            if self.shutting_down && self.in_flight == 0 {
                self.final_flush().await;
                break;
            }
        }

        info!("Statistics engine stopped");
    }

    fn on_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Connect {
                identity,
                display_name,
            } => self.connect(identity, display_name),
            EngineCommand::Disconnect { identity, done } => self.disconnect(&identity, done),
            EngineCommand::Event(event) => self.on_event(event),
            EngineCommand::Mutate { identity, mutation } => self.mutate(&identity, mutation),
            EngineCommand::GetRecord { identity, reply } => {
                let record = self
                    .cache
                    .record(&identity)
                    .filter(|record| record.is_loaded)
                    .cloned();
                let _ = reply.send(record);
            }
            EngineCommand::ResetPlayer { identity, reply } => self.reset_player(identity, reply),
            EngineCommand::SaveAll { reply } => self.flush_dirty(reply),
            EngineCommand::ActiveCount { reply } => {
                let _ = reply.send(self.cache.loaded_count());
            }
            EngineCommand::Shutdown { reply } => self.begin_shutdown(reply),
        }
    }

    fn on_event(&mut self, event: GameEvent) {
        debug!(event_type = event.event_type(), "Game event received");
        match event {
            GameEvent::Connect {
                identity,
                display_name,
            } => self.connect(identity, display_name),
            GameEvent::Disconnect { identity } => self.disconnect(&identity, None),
            GameEvent::ServerShutdown => self.begin_shutdown(None),
            other => {
                for (identity, mutation) in other.mutations(&self.points) {
                    self.mutate(&identity, mutation);
                }
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match completion {
            Completion::Loaded { identity, outcome } => self.on_loaded(identity, outcome),
            Completion::BatchSaved {
                identities,
                reports,
                reply,
            } => self.on_batch_saved(identities, reports, reply),
            Completion::FinalSaved { identity, report } => self.on_final_saved(identity, report),
            Completion::Reset {
                identity,
                cleared,
                replies,
            } => self.on_reset(identity, cleared, replies),
        }
    }

    // ------------------------------------------------------------------
    // Connect and load
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    fn connect(&mut self, identity: String, display_name: String) {
        if self.shutting_down {
            debug!("Ignoring connect during shutdown");
            return;
        }
        if self.cache.begin_load(&identity, &display_name) {
            debug!("Loading player record");
            self.spawn_load(identity, None);
            return;
        }

        let Some(slot) = self.cache.slot_mut(&identity) else {
            return;
        };
        slot.disconnect_requested = false;
        slot.display_name = display_name;
        if slot.state == SlotState::Evicting {
            slot.reconnected = true;
        }
        slot.reopen_session(Utc::now());
        if let Some(record) = slot.record.as_mut() {
            record.set_display_name(&slot.display_name);
        }
        debug!(state = ?slot.state, "Player already cached");
    }

    fn spawn_load(&mut self, identity: String, delay: Option<Duration>) {
        self.in_flight += 1;
        let gateway = self.gateway.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let outcome = gateway.fetch(&identity).await;
            let _ = completions.send(Completion::Loaded { identity, outcome });
        });
    }

    fn on_loaded(&mut self, identity: String, outcome: LoadOutcome) {
        let start_points = self.gateway.start_points();
        let Some(slot) = self.cache.slot_mut(&identity) else {
            return;
        };
        if slot.state != SlotState::Loading {
            return;
        }

        let mut record = match outcome {
            LoadOutcome::Found(record) => record,
            LoadOutcome::NotFound => {
                info!(identity = %identity, start_points, "New player, seeding record");
                PlayerRecord::seeded(&identity, &slot.display_name, start_points)
            }
            LoadOutcome::Failed => {
                if !self.shutting_down && slot.load_attempts < self.config.load_retries {
                    slot.load_attempts += 1;
                    warn!(
                        identity = %identity,
                        attempt = slot.load_attempts,
                        "Loading player record failed, retrying"
                    );
                    let delay = self.config.load_retry_delay;
                    self.spawn_load(identity, Some(delay));
                } else {
                    error!(identity = %identity, "Giving up loading player record");
                    self.drop_slot(&identity);
                }
                return;
            }
        };

        record.set_display_name(&slot.display_name);
        record.set_rank_id(self.ranks.resolve(record.points).id);
        record.is_loaded = true;
        record.session_started_at = Utc::now();
        record.reset_round_scoped();

        info!(identity = %identity, points = record.points, "Player record active");
        slot.record = Some(record);
        slot.state = SlotState::Active;
        self.settle(&identity);
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    fn mutate(&mut self, identity: &str, mutation: Mutation) {
        let Some(record) = self.cache.mutable_record(identity) else {
            debug!(identity = %identity, "Dropping mutation for inactive player");
            return;
        };
        apply_mutation(record, mutation, &self.ranks, self.gateway.modules());
    }

    // ------------------------------------------------------------------
    // Saving
    // ------------------------------------------------------------------

    /// Snapshots every dirty active record and saves the batch in the
    /// background. Disconnects whose final save failed are retried here.
    fn flush_dirty(&mut self, reply: Option<oneshot::Sender<usize>>) {
        for identity in self.cache.identities_in(SlotState::Active) {
            let retry_disconnect = self
                .cache
                .slot(&identity)
                .is_some_and(|slot| slot.disconnect_requested);
            if retry_disconnect {
                self.begin_final_save(&identity);
            }
        }

        let now = Utc::now();
        let mut snapshots = Vec::new();
        for (_, slot) in self.cache.iter_mut() {
            if slot.state != SlotState::Active {
                continue;
            }
            let dirty = slot
                .record
                .as_ref()
                .is_some_and(|record| record.is_loaded && record.is_dirty());
            if !dirty {
                continue;
            }
            slot.accrue_playtime(now);
            snapshots.extend(slot.record.clone());
            slot.state = SlotState::Saving;
        }

        if snapshots.is_empty() {
            if let Some(reply) = reply {
                let _ = reply.send(0);
            }
            return;
        }

        debug!(batch = snapshots.len(), "Flushing dirty records");
        let identities = snapshots.iter().map(|r| r.identity.clone()).collect();
        self.in_flight += 1;
        let gateway = self.gateway.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let reports = gateway.save_batch(&mut snapshots).await;
            let _ = completions.send(Completion::BatchSaved {
                identities,
                reports,
                reply,
            });
        });
    }

    fn on_batch_saved(
        &mut self,
        identities: Vec<String>,
        reports: Vec<SaveReport>,
        reply: Option<oneshot::Sender<usize>>,
    ) {
        let saved = reports
            .iter()
            .filter(|report| !report.failed && !report.written.is_empty())
            .count();

        for identity in identities {
            let Some(slot) = self.cache.slot_mut(&identity) else {
                continue;
            };
            if slot.state != SlotState::Saving {
                continue;
            }
            if let (Some(record), Some(report)) = (
                slot.record.as_mut(),
                reports.iter().find(|report| report.identity == identity),
            ) {
                reconcile(record, report);
            }
            slot.state = SlotState::Active;
            self.settle(&identity);
        }

        if let Some(reply) = reply {
            let _ = reply.send(saved);
        }
    }

    // ------------------------------------------------------------------
    // Disconnect and eviction
    // ------------------------------------------------------------------

    #[instrument(skip(self, done))]
    fn disconnect(&mut self, identity: &str, done: Option<oneshot::Sender<()>>) {
        let Some(slot) = self.cache.slot_mut(identity) else {
            debug!("Disconnect for unknown player");
            if let Some(done) = done {
                let _ = done.send(());
            }
            return;
        };
        slot.waiters.extend(done);

        let state = slot.state;
        match state {
            SlotState::Active => self.begin_final_save(identity),
            SlotState::Loading | SlotState::Saving | SlotState::Resetting => {
                debug!(state = ?state, "Deferring disconnect");
                slot.disconnect_requested = true;
            }
            SlotState::Evicting => slot.reconnected = false,
        }
    }

    fn begin_final_save(&mut self, identity: &str) {
        let Some(slot) = self.cache.slot_mut(identity) else {
            return;
        };
        if slot.record.is_none() {
            return;
        }
        slot.close_session(Utc::now());
        let Some(mut snapshot) = slot.record.clone() else {
            return;
        };
        slot.state = SlotState::Evicting;
        slot.disconnect_requested = false;
        slot.reconnected = false;

        self.in_flight += 1;
        let identity = identity.to_string();
        let gateway = self.gateway.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let report = gateway.save(&mut snapshot).await;
            let _ = completions.send(Completion::FinalSaved { identity, report });
        });
    }

    fn on_final_saved(&mut self, identity: String, report: SaveReport) {
        let Some(slot) = self.cache.slot_mut(&identity) else {
            return;
        };
        if slot.state != SlotState::Evicting {
            return;
        }
        if let Some(record) = slot.record.as_mut() {
            reconcile(record, &report);
        }

        if slot.reconnected {
            debug!(identity = %identity, "Player reconnected during final save, keeping record");
            slot.reconnected = false;
            slot.state = SlotState::Active;
            slot.notify_waiters();
            self.settle(&identity);
            return;
        }

        if report.failed {
            error!(identity = %identity, "Final save failed, keeping record for retry");
            slot.state = SlotState::Active;
            slot.disconnect_requested = true;
            slot.notify_waiters();
            return;
        }

        let still_dirty = slot.record.as_ref().is_some_and(PlayerRecord::is_dirty);
        if still_dirty {
            self.begin_final_save(&identity);
            return;
        }

        debug!(identity = %identity, "Player record evicted");
        self.drop_slot(&identity);
    }

    /// Removes a slot, waking its waiters. Resets queued on it still run
    /// against storage.
    fn drop_slot(&mut self, identity: &str) {
        let Some(mut slot) = self.cache.remove(identity) else {
            return;
        };
        slot.notify_waiters();
        let replies = std::mem::take(&mut slot.pending_resets);
        if !replies.is_empty() {
            self.spawn_reset(identity.to_string(), replies);
        }
    }

    /// Runs work deferred while the slot was busy. Only acts on active slots.
    fn settle(&mut self, identity: &str) {
        let Some(slot) = self.cache.slot_mut(identity) else {
            return;
        };
        if slot.state != SlotState::Active {
            return;
        }

        if !slot.pending_resets.is_empty() {
            let replies = std::mem::take(&mut slot.pending_resets);
            slot.state = SlotState::Resetting;
            self.spawn_reset(identity.to_string(), replies);
        } else if slot.disconnect_requested {
            self.begin_final_save(identity);
        }
    }

    // ------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------

    #[instrument(skip(self, reply))]
    fn reset_player(&mut self, identity: String, reply: oneshot::Sender<bool>) {
        match self.cache.slot_mut(&identity) {
            None => self.spawn_reset(identity, vec![reply]),
            Some(slot) if slot.state == SlotState::Active => {
                slot.state = SlotState::Resetting;
                self.spawn_reset(identity, vec![reply]);
            }
            Some(slot) => {
                debug!(state = ?slot.state, "Queueing reset until the record settles");
                slot.pending_resets.push(reply);
            }
        }
    }

    fn spawn_reset(&mut self, identity: String, replies: Vec<oneshot::Sender<bool>>) {
        self.in_flight += 1;
        let gateway = self.gateway.clone();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let cleared = gateway.reset_identity(&identity).await;
            let _ = completions.send(Completion::Reset {
                identity,
                cleared,
                replies,
            });
        });
    }

    /// Mirrors into the live record exactly what storage cleared, so live
    /// and stored values agree even after a partial failure.
    fn on_reset(
        &mut self,
        identity: String,
        cleared: ResetScope,
        replies: Vec<oneshot::Sender<bool>>,
    ) {
        let start_points = self.gateway.start_points();
        if let Some(slot) = self.cache.slot_mut(&identity) {
            if slot.state == SlotState::Resetting {
                if let Some(record) = slot.record.as_mut() {
                    record.reset_parts(start_points, cleared);
                    if cleared.is_complete() {
                        info!(identity = %identity, "Live record reset");
                    } else if !cleared.is_empty() {
                        warn!(identity = %identity, ?cleared, "Live record partly reset");
                    }
                }
                slot.state = SlotState::Active;
            }
        }

        let ok = cleared.is_complete();
        for reply in replies {
            let _ = reply.send(ok);
        }
        self.settle(&identity);
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    fn begin_shutdown(&mut self, reply: Option<oneshot::Sender<()>>) {
        self.shutdown_waiters.extend(reply);
        if !self.shutting_down {
            info!(
                cached = self.cache.len(),
                in_flight = self.in_flight,
                "Shutdown requested, draining storage work"
            );
            self.shutting_down = true;
        }
    }

    /// Saves every loaded record in parallel and wakes every waiter.
    async fn final_flush(&mut self) {
        let now = Utc::now();
        let mut slots: Vec<_> = self.cache.drain().map(|(_, slot)| slot).collect();

        for slot in &mut slots {
            slot.accrue_playtime(now);
        }
        let records: Vec<&mut PlayerRecord> = slots
            .iter_mut()
            .filter_map(|slot| slot.record.as_mut())
            .filter(|record| record.is_loaded)
            .collect();

        let gateway = self.gateway.clone();
        let reports = join_all(records.into_iter().map(|record| gateway.save(record))).await;
        let failed = reports.iter().filter(|report| report.failed).count();
        if failed > 0 {
            error!(failed, "Final flush left records unsaved");
        }
        info!(records = reports.len(), failed, "Final flush complete");

        for slot in &mut slots {
            slot.notify_waiters();
            for reply in slot.pending_resets.drain(..) {
                let _ = reply.send(false);
            }
        }
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

/// Applies a save report to the live record. Dirty flags are cleared only
/// when nothing changed since the snapshot was taken.
fn reconcile(record: &mut PlayerRecord, report: &SaveReport) {
    if report.written.stats {
        record.last_seen_epoch = report.last_seen_epoch;
    }
    if record.revision() == report.revision {
        record.mark_synced(&report.written);
    } else if !report.written.is_empty() {
        debug!(
            identity = %record.identity,
            saved_revision = report.revision,
            live_revision = record.revision(),
            "Record changed during save, keeping it dirty"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::SyncedParts;

    fn report_for(record: &PlayerRecord, written: SyncedParts) -> SaveReport {
        SaveReport {
            identity: record.identity.clone(),
            revision: record.revision(),
            last_seen_epoch: 1_700_000_000,
            written,
            failed: false,
        }
    }

    fn stats_only() -> SyncedParts {
        SyncedParts {
            stats: true,
            ..SyncedParts::default()
        }
    }

    #[test]
    fn reconcile_clears_dirty_when_revision_matches() {
        let mut record = PlayerRecord::seeded("a", "a", 0);
        let report = report_for(&record, stats_only());

        reconcile(&mut record, &report);

        assert!(!record.is_dirty());
        assert_eq!(record.last_seen_epoch, 1_700_000_000);
    }

    #[test]
    fn reconcile_keeps_dirty_after_racing_mutation() {
        let mut record = PlayerRecord::seeded("a", "a", 0);
        let report = report_for(&record, stats_only());
        record.apply_points(3);

        reconcile(&mut record, &report);

        assert!(record.is_dirty());
        assert_eq!(record.last_seen_epoch, 1_700_000_000);
    }

    #[test]
    fn reconcile_with_empty_report_changes_nothing() {
        let mut record = PlayerRecord::seeded("a", "a", 0);
        let report = report_for(&record, SyncedParts::default());

        reconcile(&mut record, &report);

        assert!(record.is_dirty());
        assert_eq!(record.last_seen_epoch, 0);
    }
}
