use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::rank::RankTier;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine configuration. Every section falls back to its defaults when
/// omitted, so `{}` is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub rank: RankConfig,
    pub points: PointsConfig,
    pub modules: ModuleConfig,
    pub lifecycle: LifecycleConfig,
    pub maintenance: MaintenanceConfig,
    pub http: HttpConfig,
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Applies `DATABASE_URL` and `STATKEEPER_BIND` when they are set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database.url = Some(url);
            }
        }
        if let Ok(bind) = std::env::var("STATKEEPER_BIND") {
            info!(bind = %bind, "Using bind address from environment");
            self.http.bind_address = bind;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. The in-memory store is used when unset.
    pub url: Option<String>,
    /// Identities unseen for this many days are purged. 0 disables purging.
    pub purge_days: i64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            purge_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    pub start_points: i32,
    pub tiers: Vec<RankTier>,
}

/// Point awards and penalties applied by game events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    pub kill: i32,
    pub headshot: i32,
    pub assist: i32,
    pub death: i32,
    pub suicide: i32,
    pub teamkill: i32,
    pub round_win: i32,
    pub round_lose: i32,
    pub game_win: i32,
    pub game_lose: i32,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            kill: 8,
            headshot: 5,
            assist: 3,
            death: -5,
            suicide: -5,
            teamkill: -10,
            round_win: 5,
            round_lose: -2,
            game_win: 20,
            game_lose: -10,
        }
    }
}

/// Optional statistics tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub weapon_stats: bool,
    pub hit_stats: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            weapon_stats: true,
            hit_stats: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How often dirty records are flushed
    #[serde(with = "duration_secs")]
    pub save_interval: Duration,
    /// Extra load attempts after a failed load
    pub load_retries: u32,
    #[serde(with = "duration_secs")]
    pub load_retry_delay: Duration,
    /// Capacity of the engine command channel
    pub command_buffer: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            save_interval: Duration::from_secs(60),
            load_retries: 3,
            load_retry_delay: Duration::from_secs(2),
            command_buffer: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// How often the stale-identity sweep runs after the startup pass
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(6 * 60 * 60), // 6 hours
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind_address: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

impl LifecycleConfig {
    /// Clamps values that would stall the engine.
    pub fn sanitized(mut self) -> Self {
        if self.save_interval.is_zero() {
            warn!("save_interval of 0 is not allowed, using 1s");
            self.save_interval = Duration::from_secs(1);
        }
        if self.command_buffer == 0 {
            self.command_buffer = 1;
        }
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
