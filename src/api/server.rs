use anyhow::Result;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::leaderboard::Leaderboard;
use crate::progress::ProgressTracker;
use crate::session::SessionBuilder;
use crate::stats::StatsAggregator;
use crate::store::Store;
use crate::user_locks::UserLocks;

use super::auth::{self, AuthState};
use super::game::{self, GameState};
use super::jwt::JwtManager;
use super::leaderboard::{self as leaderboard_api, LeaderboardState};
use super::middleware::auth_middleware;
use super::rate_limit::{rate_limit_layer, rate_limit_middleware};
use super::stats::{self as stats_api, StatsState};

/// Builds the full application router. `fallback` is the secondary catalog
/// store consulted when the primary has no matching questions.
pub fn build_router(
    store: Arc<dyn Store>,
    fallback: Option<Arc<dyn Store>>,
    jwt_secret: &str,
) -> Router {
    let jwt_manager = Arc::new(JwtManager::new(jwt_secret));

    let auth_state = AuthState {
        store: store.clone(),
        jwt_manager: jwt_manager.clone(),
    };

    let leaderboard = Arc::new(Leaderboard::new(store.clone()));
    let game_state = GameState {
        store: store.clone(),
        tracker: Arc::new(ProgressTracker::new(store.clone(), fallback)),
        sessions: Arc::new(SessionBuilder::new(store.clone())),
        stats: Arc::new(StatsAggregator::new(store.clone())),
        leaderboard: leaderboard.clone(),
        user_locks: Arc::new(UserLocks::new()),
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Registration gets a per-IP limiter (10 requests per minute)
    let register_limiter = rate_limit_layer(10, 60);

    let auth_routes = Router::new()
        .route(
            "/api/auth/register",
            post(auth::register).layer(middleware::from_fn_with_state(
                register_limiter,
                rate_limit_middleware,
            )),
        )
        .route("/api/auth/login", post(auth::login))
        .route(
            "/api/auth/me",
            get(auth::get_current_user).layer(middleware::from_fn_with_state(
                jwt_manager.clone(),
                auth_middleware,
            )),
        )
        .with_state(auth_state);

    let protected_game_routes = Router::new()
        .route("/api/game/questions", post(game::start_game))
        .route("/api/game/complete", post(game::complete_game))
        .layer(middleware::from_fn_with_state(
            jwt_manager.clone(),
            auth_middleware,
        ))
        .with_state(game_state.clone());

    let open_game_routes = Router::new()
        .route("/api/questions", post(game::question_batch))
        .route("/api/check-answer", post(game::check_answer))
        .with_state(game_state);

    let leaderboard_routes = Router::new()
        .route("/api/leaderboard", get(leaderboard_api::get_leaderboard))
        .with_state(LeaderboardState { leaderboard });

    let stats_routes = Router::new()
        .route("/api/stats/:username", get(stats_api::get_user_stats))
        .with_state(StatsState { store });

    Router::new()
        .route("/api/health", get(health_check))
        .merge(auth_routes)
        .merge(protected_game_routes)
        .merge(open_game_routes)
        .merge(leaderboard_routes)
        .merge(stats_routes)
        .layer(cors)
}

pub async fn run_api_server(
    addr: &str,
    store: Arc<dyn Store>,
    fallback: Option<Arc<dyn Store>>,
    jwt_secret: &str,
) -> Result<()> {
    let app = build_router(store, fallback, jwt_secret);

    let listener = TcpListener::bind(addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Received shutdown signal, stopping API server");
        })
        .await
        .map_err(|e| anyhow::anyhow!("API server error: {}", e))
}

async fn health_check() -> &'static str {
    "OK"
}
