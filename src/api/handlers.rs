use axum::{
    extract::{Path, Query, State},
    Json,
};
use tracing::{debug, instrument};

use super::types::{
    CountResponse, HealthResponse, LeaderboardEntry, LeaderboardOrder, LeaderboardQuery,
    PlayerResponse, PositionResponse, RankResponse,
};
use crate::player::format_playtime;
use crate::shared::{AppError, AppState};

const DEFAULT_LEADERBOARD_LIMIT: u32 = 10;
const MAX_LEADERBOARD_LIMIT: u32 = 100;

/// GET /health
#[instrument(name = "health", skip(state))]
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let storage_ready = state.stats.gateway().is_ready();
    let active_players = state.stats.active_count().await?;
    let status = if storage_ready { "ok" } else { "degraded" };

    Ok(Json(HealthResponse {
        status: status.to_string(),
        storage_ready,
        active_players,
    }))
}

/// GET /ranks
/// Returns configured tiers in ascending order
#[instrument(name = "list_ranks", skip(state))]
pub async fn list_ranks(State(state): State<AppState>) -> Json<Vec<RankResponse>> {
    let tiers = state
        .stats
        .ranks()
        .tiers()
        .iter()
        .map(RankResponse::from)
        .collect();
    Json(tiers)
}

/// GET /players/:identity
/// Returns the live record of a connected player
#[instrument(name = "get_player", skip(state))]
pub async fn get_player(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<PlayerResponse>, AppError> {
    let record = state
        .stats
        .get_active_record(&identity)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Player {identity} is not online")))?;

    debug!(identity = %identity, points = record.points, "Serving live record");
    Ok(Json(PlayerResponse::build(
        &record,
        state.stats.ranks(),
        &state.weapons,
    )))
}

/// GET /players/:identity/position
/// Position among stored players by points
#[instrument(name = "get_position", skip(state))]
pub async fn get_position(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Result<Json<PositionResponse>, AppError> {
    let position = state
        .stats
        .rank_position(&identity)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No stored statistics for {identity}")))?;
    let total = state.stats.gateway().query_total_count().await;

    Ok(Json(PositionResponse {
        identity,
        position,
        total,
    }))
}

/// GET /players/count
#[instrument(name = "player_count", skip(state))]
pub async fn player_count(State(state): State<AppState>) -> Json<CountResponse> {
    Json(CountResponse {
        total: state.stats.gateway().query_total_count().await,
    })
}

/// GET /leaderboard?limit=&by=points|playtime
#[instrument(name = "leaderboard", skip(state))]
pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    if limit == 0 || limit > MAX_LEADERBOARD_LIMIT {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_LEADERBOARD_LIMIT}"
        )));
    }

    let gateway = state.stats.gateway();
    let records = match query.by {
        LeaderboardOrder::Points => gateway.query_top_by_points(limit).await,
        LeaderboardOrder::Playtime => gateway.query_top_by_playtime(limit).await,
    };

    let ranks = state.stats.ranks();
    let entries = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| LeaderboardEntry {
            position: index + 1,
            rank: ranks.resolve(record.points).label.clone(),
            playtime: format_playtime(record.playtime_seconds),
            identity: record.identity,
            display_name: record.display_name,
            points: record.points,
            playtime_seconds: record.playtime_seconds,
        })
        .collect();

    Ok(Json(entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{InMemoryStatsStore, StatsRow};
    use crate::player::PlayerRecord;
    use crate::shared::test_utils::AppStateBuilder;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use serde::de::DeserializeOwned;
    use std::sync::Arc;
    use tower::ServiceExt; // for `oneshot`

    fn stored(steam: &str, points: i32, playtime: i64) -> StatsRow {
        let mut row = StatsRow::from_record(&PlayerRecord::empty(steam, steam));
        row.value = points;
        row.playtime = playtime;
        row
    }

    async fn app_with_rows(rows: Vec<StatsRow>) -> Router {
        let store = Arc::new(InMemoryStatsStore::with_rows(rows));
        let state = AppStateBuilder::new().with_store(store).build().await;
        crate::api::router(state)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    fn parse<T: DeserializeOwned>(body: &[u8]) -> T {
        serde_json::from_slice(body).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_ready_storage() {
        let (status, body) = get(app_with_rows(vec![]).await, "/health").await;

        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = parse(&body);
        assert!(health.storage_ready);
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_players, 0);
    }

    #[tokio::test]
    async fn test_ranks_are_listed_in_ascending_order() {
        let (status, body) = get(app_with_rows(vec![]).await, "/ranks").await;

        assert_eq!(status, StatusCode::OK);
        let ranks: Vec<RankResponse> = parse(&body);
        let labels: Vec<&str> = ranks.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Bronze", "Silver", "Gold"]);
        assert_eq!(ranks[0].id, 1);
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_points_by_default() {
        let app = app_with_rows(vec![
            stored("low", 100, 9_000),
            stored("high", 2_000, 60),
            stored("mid", 700, 120),
        ])
        .await;

        let (status, body) = get(app, "/leaderboard?limit=2").await;

        assert_eq!(status, StatusCode::OK);
        let entries: Vec<LeaderboardEntry> = parse(&body);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identity, "high");
        assert_eq!(entries[0].rank, "Gold");
        assert_eq!(entries[1].identity, "mid");
        assert_eq!(entries[1].position, 2);
    }

    #[tokio::test]
    async fn test_leaderboard_by_playtime() {
        let app = app_with_rows(vec![stored("low", 100, 9_000), stored("high", 2_000, 60)]).await;

        let (_, body) = get(app, "/leaderboard?by=playtime").await;

        let entries: Vec<LeaderboardEntry> = parse(&body);
        assert_eq!(entries[0].identity, "low");
        assert_eq!(entries[0].playtime, "2h 30m");
    }

    #[tokio::test]
    async fn test_leaderboard_rejects_out_of_range_limit() {
        let (status, _) = get(app_with_rows(vec![]).await, "/leaderboard?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_position_and_count() {
        let app = app_with_rows(vec![
            stored("a", 300, 0),
            stored("b", 200, 0),
            stored("c", 100, 0),
        ])
        .await;

        let (status, body) = get(app.clone(), "/players/b/position").await;
        assert_eq!(status, StatusCode::OK);
        let position: PositionResponse = parse(&body);
        assert_eq!(position.position, 2);
        assert_eq!(position.total, 3);

        let (_, body) = get(app, "/players/count").await;
        let count: CountResponse = parse(&body);
        assert_eq!(count.total, 3);
    }

    #[tokio::test]
    async fn test_unknown_player_is_not_found() {
        let app = app_with_rows(vec![]).await;

        let (status, _) = get(app.clone(), "/players/nobody").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(app, "/players/nobody/position").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_connected_player_shows_live_record() {
        let store = Arc::new(InMemoryStatsStore::with_rows(vec![stored("live", 450, 0)]));
        let state = AppStateBuilder::new().with_store(store).build().await;
        let stats = state.stats.clone();
        let app = crate::api::router(state);

        stats.connect("live", "Live Player").await.unwrap();
        // Mutations are dropped until the load has finished.
        for _ in 0..50 {
            if stats.get_active_record("live").await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        stats.record_weapon_kill("live", "ak47", true).await.unwrap();

        let (status, body) = get(app, "/players/live").await;

        assert_eq!(status, StatusCode::OK);
        let player: PlayerResponse = parse(&body);
        assert_eq!(player.display_name, "Live Player");
        assert_eq!(player.points, 450);
        assert_eq!(player.rank.label, "Bronze");
        assert_eq!(player.next_rank.unwrap().label, "Silver");
        assert_eq!(player.points_to_next_rank, Some(50));
        assert_eq!(player.weapons.len(), 1);
        assert_eq!(player.weapons[0].display_name, "AK-47");
        assert_eq!(player.weapons[0].kills, 1);
    }
}
