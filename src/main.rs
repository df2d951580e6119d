use std::sync::Arc;

use statkeeper::{
    api,
    config::EngineConfig,
    maintenance::{start_sweeper_task, SweeperConfig},
    persistence::{InMemoryStatsStore, PostgresStatsStore, StatsGateway, StatsStore},
    player::WeaponCatalog,
    rank::RankTable,
    spawn_engine, AppState, StatsHandle,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn load_config() -> EngineConfig {
    let config = match std::env::var("STATKEEPER_CONFIG") {
        Ok(path) => match std::fs::read_to_string(&path) {
            Ok(raw) => match EngineConfig::from_json_str(&raw) {
                Ok(config) => {
                    info!(path = %path, "Loaded configuration");
                    config
                }
                Err(e) => {
                    error!(path = %path, error = %e, "Invalid configuration, using defaults");
                    EngineConfig::default()
                }
            },
            Err(e) => {
                error!(path = %path, error = %e, "Cannot read configuration, using defaults");
                EngineConfig::default()
            }
        },
        Err(_) => EngineConfig::default(),
    };
    config.with_env_overrides()
}

async fn build_store(config: &EngineConfig) -> Result<Arc<dyn StatsStore>, sqlx::Error> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("No database configured, statistics are kept in memory only");
        return Ok(Arc::new(InMemoryStatsStore::new()));
    };

    let pool = sqlx::PgPool::connect(url).await?;
    info!("Connected to PostgreSQL");
    Ok(Arc::new(PostgresStatsStore::new(pool)))
}

async fn shutdown_signal(stats: StatsHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown requested, flushing player records");
    if let Err(e) = stats.shutdown().await {
        error!(error = %e, "Engine stopped before the final flush");
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statkeeper=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting statkeeper");

    let config = load_config();
    let store = match build_store(&config).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to connect to database");
            return;
        }
    };
    let gateway = Arc::new(StatsGateway::new(
        store,
        config.modules,
        config.rank.start_points,
    ));
    if !gateway.initialize().await {
        warn!("Statistics storage unavailable, records will not be loaded or saved");
    }

    tokio::spawn(start_sweeper_task(
        gateway.clone(),
        SweeperConfig {
            sweep_interval: config.maintenance.sweep_interval,
            purge_days: config.database.purge_days,
        },
    ));

    let ranks = Arc::new(RankTable::new(config.rank.tiers.clone()));
    let (stats, engine_task) = spawn_engine(
        gateway,
        ranks,
        config.points.clone(),
        config.lifecycle.clone(),
    );

    let app = api::router(AppState::new(
        stats.clone(),
        Arc::new(WeaponCatalog::with_defaults()),
    ));

    let listener = match tokio::net::TcpListener::bind(&config.http.bind_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %config.http.bind_address, error = %e, "Failed to bind");
            if let Err(e) = stats.shutdown().await {
                error!(error = %e, "Engine stopped before the final flush");
            }
            return;
        }
    };
    info!("Server running on http://{}", config.http.bind_address);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(stats))
        .await
    {
        error!(error = %e, "Server error");
    }

    if let Err(e) = engine_task.await {
        error!(error = %e, "Engine task panicked");
    }
    info!("Statkeeper stopped");
}
