use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::engine::EngineCommand;
use super::errors::EngineError;
use super::mutations::Mutation;
use crate::events::GameEvent;
use crate::persistence::StatsGateway;
use crate::player::{PlayerRecord, SettingName};
use crate::rank::{RankTable, RankTier};

/// Cloneable handle to the engine task.
///
/// Writes are queued on the engine channel and applied in order. Storage
/// queries go straight to the gateway.
#[derive(Clone)]
pub struct StatsHandle {
    commands: mpsc::Sender<EngineCommand>,
    gateway: Arc<StatsGateway>,
    ranks: Arc<RankTable>,
}

impl StatsHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<EngineCommand>,
        gateway: Arc<StatsGateway>,
        ranks: Arc<RankTable>,
    ) -> Self {
        Self {
            commands,
            gateway,
            ranks,
        }
    }

    async fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.commands.send(command).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub async fn connect(&self, identity: &str, display_name: &str) -> Result<(), EngineError> {
        self.send(EngineCommand::Connect {
            identity: identity.to_string(),
            display_name: display_name.to_string(),
        })
        .await
    }

    /// Disconnects a player and waits until the final save has completed
    /// and the record has left the cache.
    pub async fn disconnect(&self, identity: &str) -> Result<(), EngineError> {
        let (done, finished) = oneshot::channel();
        self.send(EngineCommand::Disconnect {
            identity: identity.to_string(),
            done: Some(done),
        })
        .await?;
        finished.await?;
        Ok(())
    }

    /// Queues a disconnect without waiting for the final save.
    pub async fn disconnect_nowait(&self, identity: &str) -> Result<(), EngineError> {
        self.send(EngineCommand::Disconnect {
            identity: identity.to_string(),
            done: None,
        })
        .await
    }

    pub async fn send_event(&self, event: GameEvent) -> Result<(), EngineError> {
        self.send(EngineCommand::Event(event)).await
    }

    /// Saves every dirty active record now. Returns how many were written.
    pub async fn save_all(&self) -> Result<usize, EngineError> {
        let (reply, saved) = oneshot::channel();
        self.send(EngineCommand::SaveAll { reply: Some(reply) }).await?;
        Ok(saved.await?)
    }

    /// Resets the player's stored statistics and then the parts of the live
    /// record that storage cleared. Returns false unless every part cleared.
    pub async fn reset_player(&self, identity: &str) -> Result<bool, EngineError> {
        let (reply, done) = oneshot::channel();
        self.send(EngineCommand::ResetPlayer {
            identity: identity.to_string(),
            reply,
        })
        .await?;
        Ok(done.await?)
    }

    /// Drains in-flight storage work, saves every loaded record and stops
    /// the engine. Returns once everything has been flushed.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (reply, done) = oneshot::channel();
        if self
            .send(EngineCommand::Shutdown { reply: Some(reply) })
            .await
            .is_err()
        {
            debug!("Engine already stopped");
            return Ok(());
        }
        Ok(done.await?)
    }

    // ------------------------------------------------------------------
    // Mutation API
    // ------------------------------------------------------------------

    pub async fn mutate(&self, identity: &str, mutation: Mutation) -> Result<(), EngineError> {
        self.send(EngineCommand::Mutate {
            identity: identity.to_string(),
            mutation,
        })
        .await
    }

    pub async fn add_points(
        &self,
        identity: &str,
        delta: i32,
        reason: &str,
    ) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::add_points(delta, reason)).await
    }

    pub async fn set_points(&self, identity: &str, value: i32) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::SetPoints(value)).await
    }

    pub async fn record_kill(&self, identity: &str, headshot: bool) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::Kill { headshot }).await
    }

    pub async fn record_death(&self, identity: &str) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::Death).await
    }

    pub async fn record_assist(&self, identity: &str) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::Assist).await
    }

    pub async fn record_shot(&self, identity: &str) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::Shot).await
    }

    pub async fn record_hit(
        &self,
        identity: &str,
        region: i32,
        health_damage: i32,
        armor_damage: i32,
    ) -> Result<(), EngineError> {
        self.mutate(
            identity,
            Mutation::Hit {
                region,
                health_damage,
                armor_damage,
            },
        )
        .await
    }

    pub async fn record_weapon_shot(
        &self,
        identity: &str,
        weapon: &str,
    ) -> Result<(), EngineError> {
        let weapon = weapon.to_string();
        self.mutate(identity, Mutation::WeaponShot { weapon }).await
    }

    pub async fn record_weapon_hit(
        &self,
        identity: &str,
        weapon: &str,
        damage: i32,
    ) -> Result<(), EngineError> {
        let weapon = weapon.to_string();
        self.mutate(identity, Mutation::WeaponHit { weapon, damage }).await
    }

    pub async fn record_weapon_kill(
        &self,
        identity: &str,
        weapon: &str,
        headshot: bool,
    ) -> Result<(), EngineError> {
        let weapon = weapon.to_string();
        self.mutate(identity, Mutation::WeaponKill { weapon, headshot }).await
    }

    pub async fn record_weapon_death(
        &self,
        identity: &str,
        weapon: &str,
    ) -> Result<(), EngineError> {
        let weapon = weapon.to_string();
        self.mutate(identity, Mutation::WeaponDeath { weapon }).await
    }

    pub async fn record_round_result(&self, identity: &str, won: bool) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::RoundResult { won }).await
    }

    pub async fn record_game_result(&self, identity: &str, won: bool) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::GameResult { won }).await
    }

    pub async fn set_setting(
        &self,
        identity: &str,
        name: SettingName,
        value: bool,
    ) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::SetSetting { name, value }).await
    }

    pub async fn toggle_setting(
        &self,
        identity: &str,
        name: SettingName,
    ) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::ToggleSetting(name)).await
    }

    pub async fn reset_round_scoped(&self, identity: &str) -> Result<(), EngineError> {
        self.mutate(identity, Mutation::ResetRoundScoped).await
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Copy of the live record, if the player is loaded.
    pub async fn get_active_record(
        &self,
        identity: &str,
    ) -> Result<Option<PlayerRecord>, EngineError> {
        let (reply, record) = oneshot::channel();
        self.send(EngineCommand::GetRecord {
            identity: identity.to_string(),
            reply,
        })
        .await?;
        Ok(record.await?)
    }

    pub async fn active_count(&self) -> Result<usize, EngineError> {
        let (reply, count) = oneshot::channel();
        self.send(EngineCommand::ActiveCount { reply }).await?;
        Ok(count.await?)
    }

    pub fn get_rank(&self, points: i32) -> &RankTier {
        self.ranks.resolve(points)
    }

    pub fn ranks(&self) -> &RankTable {
        &self.ranks
    }

    pub fn gateway(&self) -> &StatsGateway {
        &self.gateway
    }

    pub async fn top_players(&self, limit: u32) -> Vec<PlayerRecord> {
        self.gateway.query_top_by_points(limit).await
    }

    pub async fn rank_position(&self, identity: &str) -> Option<u64> {
        self.gateway.query_rank_position(identity).await
    }
}
