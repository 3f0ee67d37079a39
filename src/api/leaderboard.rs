use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::leaderboard::Leaderboard;
use crate::store::models::LeaderboardEntry;

use super::auth::AppError;

#[derive(Clone)]
pub struct LeaderboardState {
    pub leaderboard: Arc<Leaderboard>,
}

/// Leaderboard entry response format for frontend
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntryResponse {
    pub rank: usize,
    pub player_name: String,
    pub prize_won: i64,
    pub questions_answered: u32,
    pub total_questions: u32,
    pub completion_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntryResponse>,
}

/// GET /api/leaderboard — the top 100, descending by prize. A snapshot:
/// writes landing mid-read are not reflected.
pub async fn get_leaderboard(
    State(state): State<LeaderboardState>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let entries = state.leaderboard.get().await?;

    let leaderboard = entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| to_response(idx + 1, entry))
        .collect();

    Ok(Json(LeaderboardResponse { leaderboard }))
}

fn to_response(rank: usize, entry: LeaderboardEntry) -> LeaderboardEntryResponse {
    LeaderboardEntryResponse {
        rank,
        player_name: entry.player_name,
        prize_won: entry.prize_won,
        questions_answered: entry.questions_answered,
        total_questions: entry.total_questions,
        completion_date: entry.completion_date,
        completion_time: entry.completion_time,
    }
}
