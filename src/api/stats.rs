use axum::{Json, extract::{Path, State}};
use serde::Serialize;
use std::sync::Arc;

use crate::store::models::Stats;
use crate::store::{Store, bounded};

use super::auth::AppError;

#[derive(Clone)]
pub struct StatsState {
    pub store: Arc<dyn Store>,
}

/// Per-user stats in wire format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsPayload {
    pub username: String,
    pub games_played: u32,
    pub games_completed: u32,
    pub total_prize: i64,
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub accuracy: i64,
}

impl From<Stats> for StatsPayload {
    fn from(stats: Stats) -> Self {
        Self {
            username: stats.username,
            games_played: stats.games_played,
            games_completed: stats.games_completed,
            total_prize: stats.total_prize,
            questions_answered: stats.questions_answered,
            correct_answers: stats.correct_answers,
            accuracy: stats.accuracy,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub stats: StatsPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// GET /api/stats/:username — a user with no recorded games gets a zeroed
/// default with an informational marker rather than an error.
pub async fn get_user_stats(
    State(state): State<StatsState>,
    Path(username): Path<String>,
) -> Result<Json<StatsResponse>, AppError> {
    let user = bounded(state.store.get_user_by_username(&username)).await?;

    let stats = match &user {
        Some(user) => bounded(state.store.get_stats(&user.id)).await?,
        None => None,
    };

    match stats {
        Some(stats) => Ok(Json(StatsResponse {
            stats: stats.into(),
            message: None,
        })),
        None => {
            let user_id = user.map(|u| u.id).unwrap_or_default();
            Ok(Json(StatsResponse {
                stats: Stats::zeroed(&user_id, &username).into(),
                message: Some("no stats found".to_string()),
            }))
        }
    }
}
