use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, instrument};

use crate::persistence::StatsGateway;

/// Configuration for the stale-identity sweeper
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to run the sweep after the startup pass
    pub sweep_interval: Duration,
    /// Identities unseen for this many days are purged; <= 0 disables purging
    pub purge_days: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(6 * 60 * 60), // 6 hours
            purge_days: 30,
        }
    }
}

/// Epoch second before which an identity counts as stale.
pub fn staleness_cutoff(now: DateTime<Utc>, purge_days: i64) -> i64 {
    (now - ChronoDuration::days(purge_days)).timestamp()
}

/// Purges identities unseen for `purge_days`. Returns the number removed.
#[instrument(skip(gateway))]
pub async fn purge_stale(gateway: &StatsGateway, purge_days: i64) -> u64 {
    if purge_days <= 0 {
        debug!("Purging disabled");
        return 0;
    }
    let cutoff = staleness_cutoff(Utc::now(), purge_days);
    gateway.delete_stale(cutoff).await
}

/// Starts the background sweeper. The first pass runs immediately.
#[instrument(skip(gateway))]
pub async fn start_sweeper_task(gateway: Arc<StatsGateway>, config: SweeperConfig) {
    if config.purge_days <= 0 {
        info!("Stale-identity purging disabled, sweeper not started");
        return;
    }

    info!(
        sweep_interval_secs = config.sweep_interval.as_secs(),
        purge_days = config.purge_days,
        "Starting stale-identity sweeper"
    );

    let mut sweep_interval = interval(config.sweep_interval);

    loop {
        sweep_interval.tick().await;

        if !gateway.is_ready() {
            debug!("Storage not ready, skipping sweep");
            continue;
        }

        let purged = purge_stale(&gateway, config.purge_days).await;
        info!(purged, "Stale-identity sweep completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleConfig;
    use crate::persistence::{InMemoryStatsStore, StatsRow};
    use crate::player::PlayerRecord;
    use chrono::TimeZone;
    use rstest::rstest;

    fn row(steam: &str, lastconnect: i64) -> StatsRow {
        let mut row = StatsRow::from_record(&PlayerRecord::empty(steam, steam));
        row.lastconnect = lastconnect;
        row
    }

    #[test]
    fn cutoff_is_days_before_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(staleness_cutoff(now, 30), expected.timestamp());
    }

    #[rstest]
    #[case(0)]
    #[case(-7)]
    #[tokio::test]
    async fn non_positive_retention_purges_nothing(#[case] days: i64) {
        let store = Arc::new(InMemoryStatsStore::with_rows(vec![row("ancient", 1)]));
        let gateway = StatsGateway::new(store.clone(), ModuleConfig::default(), 0);
        gateway.initialize().await;

        assert_eq!(purge_stale(&gateway, days).await, 0);
        assert_eq!(store.player_count().await, 1);
    }

    #[tokio::test]
    async fn purge_keeps_recent_and_never_seen_rows() {
        let now = Utc::now().timestamp();
        let store = Arc::new(InMemoryStatsStore::with_rows(vec![
            row("stale", now - 40 * 86_400),
            row("recent", now - 86_400),
            row("never_seen", 0),
        ]));
        let gateway = StatsGateway::new(store.clone(), ModuleConfig::default(), 0);
        gateway.initialize().await;

        assert_eq!(purge_stale(&gateway, 30).await, 1);
        assert_eq!(store.player_count().await, 2);
        assert!(gateway.load("stale").await.is_none());
        assert!(gateway.load("never_seen").await.is_some());
    }
}
