// Read-only HTTP surface over the live cache and stored statistics.
pub use handlers::{get_player, get_position, health, leaderboard, list_ranks, player_count};
pub use types::{
    CountResponse, HealthResponse, LeaderboardEntry, LeaderboardOrder, LeaderboardQuery,
    PlayerResponse, PositionResponse, RankResponse, WeaponStatResponse,
};

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::shared::AppState;

mod handlers;
mod types;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ranks", get(list_ranks))
        .route("/leaderboard", get(leaderboard))
        .route("/players/count", get(player_count))
        .route("/players/:identity", get(get_player))
        .route("/players/:identity/position", get(get_position))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
