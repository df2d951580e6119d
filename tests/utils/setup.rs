use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use statkeeper::{
    config::{LifecycleConfig, ModuleConfig, PointsConfig},
    persistence::{InMemoryStatsStore, StatsGateway, StatsRow},
    spawn_engine, PlayerRecord, RankTable, RankTier, StatsHandle,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub store: Arc<InMemoryStatsStore>,
    pub gateway: Arc<StatsGateway>,
    pub stats: StatsHandle,
    pub engine_task: JoinHandle<()>,
}

pub struct TestSetupBuilder {
    rows: Vec<StatsRow>,
    modules: ModuleConfig,
    lifecycle: LifecycleConfig,
    points: PointsConfig,
    start_points: i32,
    offline: bool,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            rows: vec![],
            modules: ModuleConfig::default(),
            // Flushes only happen when a test asks for them.
            lifecycle: LifecycleConfig {
                save_interval: Duration::from_secs(3600),
                load_retries: 0,
                load_retry_delay: Duration::from_millis(10),
                command_buffer: 64,
            },
            points: PointsConfig::default(),
            start_points: 0,
            offline: false,
        }
    }

    pub fn with_rows(mut self, rows: Vec<StatsRow>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_modules(mut self, modules: ModuleConfig) -> Self {
        self.modules = modules;
        self
    }

    pub fn with_start_points(mut self, start_points: i32) -> Self {
        self.start_points = start_points;
        self
    }

    pub fn with_load_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.lifecycle.load_retries = retries;
        self.lifecycle.load_retry_delay = delay;
        self
    }

    /// Storage goes offline right after the schema step succeeded.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    pub async fn build(self) -> TestSetup {
        let store = Arc::new(InMemoryStatsStore::with_rows(self.rows));
        let gateway = Arc::new(StatsGateway::new(
            store.clone(),
            self.modules,
            self.start_points,
        ));
        assert!(gateway.initialize().await);
        store.set_offline(self.offline);

        let (stats, engine_task) = spawn_engine(
            gateway.clone(),
            Arc::new(RankTable::new(default_tiers())),
            self.points,
            self.lifecycle,
        );

        TestSetup {
            store,
            gateway,
            stats,
            engine_task,
        }
    }
}

impl Default for TestSetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn default_tiers() -> Vec<RankTier> {
    [(0, "Bronze"), (500, "Silver"), (1500, "Gold")]
        .into_iter()
        .map(|(min_points, label)| RankTier {
            id: 0,
            min_points,
            label: label.to_string(),
            color_tag: "#FFFFFF".to_string(),
            tag_text: label.to_uppercase(),
        })
        .collect()
}

/// Stored row whose name and rank match what a connect would set, so the
/// loaded record starts clean.
pub fn stored_row(steam: &str, points: i32) -> StatsRow {
    let mut row = StatsRow::from_record(&PlayerRecord::empty(steam, steam));
    row.value = points;
    row.rank = RankTable::new(default_tiers()).resolve(points).id;
    row
}

/// Polls `check` until it holds or a second has passed.
pub async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Waits until the identity's record is loaded and returns it.
pub async fn wait_for_active(stats: &StatsHandle, identity: &str) -> PlayerRecord {
    for _ in 0..100 {
        if let Some(record) = stats.get_active_record(identity).await.unwrap() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{identity} never became active");
}
