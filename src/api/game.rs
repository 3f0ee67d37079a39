use anyhow::Result;
use axum::{Extension, Json, extract::State};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::leaderboard::{Leaderboard, Submission};
use crate::progress::ProgressTracker;
use crate::session::{GAME_STRUCTURE, SessionBuilder, SessionQuestion, SessionSlot};
use crate::stats::{CompletionDelta, StatsAggregator};
use crate::store::models::{Tier, User};
use crate::store::{Store, StoreError, bounded};
use crate::user_locks::UserLocks;

use super::auth::AppError;
use super::middleware::AuthUser;
use super::stats::StatsPayload;

#[derive(Clone)]
pub struct GameState {
    pub store: Arc<dyn Store>,
    pub tracker: Arc<ProgressTracker>,
    pub sessions: Arc<SessionBuilder>,
    pub stats: Arc<StatsAggregator>,
    pub leaderboard: Arc<Leaderboard>,
    pub user_locks: Arc<UserLocks>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPayload {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: usize,
    pub question_number: u32,
    pub time_limit: u32,
    pub level: Tier,
    pub prize_value: i64,
}

impl From<SessionQuestion> for QuestionPayload {
    fn from(sq: SessionQuestion) -> Self {
        Self {
            id: sq.question.id,
            question: sq.question.text,
            options: sq.question.options,
            answer_index: sq.answer_index,
            question_number: sq.question_number,
            time_limit: sq.time_limit,
            level: sq.level,
            prize_value: sq.prize_value,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartGameRequest {
    #[allow(dead_code)] // identity comes from the token; body kept for old clients
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameResponse {
    pub success: bool,
    pub questions: Vec<QuestionPayload>,
    pub total_questions: usize,
    pub game_structure: &'static [SessionSlot],
}

/// POST /api/game/questions — assemble a full tiered game for the caller.
pub async fn start_game(
    State(state): State<GameState>,
    Extension(auth): Extension<AuthUser>,
    Json(_req): Json<StartGameRequest>,
) -> Result<Json<StartGameResponse>, AppError> {
    let user = resolve_user(&state, &auth).await?;

    // Serialize with other requests for this user so two sessions cannot
    // draw against the same served-id snapshot.
    let _guard = state.user_locks.acquire(&user.id).await;

    let mut rng = StdRng::from_entropy();
    let session = state.sessions.build_for_user(&user, &mut rng).await?;

    info!(
        "Built game session of {} questions for {}",
        session.len(),
        user.username
    );

    let questions: Vec<QuestionPayload> = session.into_iter().map(Into::into).collect();
    Ok(Json(StartGameResponse {
        success: true,
        total_questions: questions.len(),
        questions,
        game_structure: GAME_STRUCTURE.as_slice(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct QuestionBatchRequest {
    pub username: String,
    pub count: usize,
    pub level: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchQuestionPayload {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: usize,
    pub level: Tier,
}

#[derive(Debug, Serialize)]
pub struct QuestionBatchResponse {
    pub success: bool,
    pub questions: Vec<BatchQuestionPayload>,
}

/// POST /api/questions — legacy batch mode, identified by username in the
/// body. Never re-serves a question the user has already received.
pub async fn question_batch(
    State(state): State<GameState>,
    Json(req): Json<QuestionBatchRequest>,
) -> Result<Json<QuestionBatchResponse>, AppError> {
    if req.count == 0 {
        return Err(anyhow::anyhow!("Invalid count: must be at least 1").into());
    }
    let tier = parse_tier(req.level.as_deref())?;

    let user = state.tracker.ensure_user(&req.username).await?;

    // Serialize with other requests for this user so concurrent batches
    // never overlap.
    let _guard = state.user_locks.acquire(&user.id).await;
    let batch = state.tracker.next_batch(&user, tier, req.count).await?;

    let questions = batch
        .into_iter()
        .filter_map(|q| {
            let answer_index = q.answer_index()?;
            Some(BatchQuestionPayload {
                id: q.id,
                question: q.text,
                options: q.options,
                answer_index,
                level: q.tier,
            })
        })
        .collect();

    Ok(Json(QuestionBatchResponse {
        success: true,
        questions,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAnswerRequest {
    pub level: String,
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAnswerResponse {
    pub correct: bool,
    /// The answer text, revealed only when the guess was wrong.
    pub correct_answer: Option<String>,
}

/// POST /api/check-answer — an unknown id, or an id outside the stated
/// tier, is a hard not-found rather than a false "incorrect".
pub async fn check_answer(
    State(state): State<GameState>,
    Json(req): Json<CheckAnswerRequest>,
) -> Result<Json<CheckAnswerResponse>, AppError> {
    let tier = Tier::from_str(&req.level)
        .map_err(|e| anyhow::anyhow!("Invalid level: {}", e))?;

    let question = bounded(state.store.get_question(&req.question_id))
        .await?
        .filter(|q| q.tier == tier)
        .ok_or_else(|| StoreError::NotFound(format!("question {}", req.question_id)))?;

    if question.correct_answer == req.answer {
        Ok(Json(CheckAnswerResponse {
            correct: true,
            correct_answer: None,
        }))
    } else {
        Ok(Json(CheckAnswerResponse {
            correct: false,
            correct_answer: Some(question.correct_answer),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteGameRequest {
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub final_prize: i64,
    pub completion_time: Option<i64>,
    pub game_completed: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteGameResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaderboard_position: Option<usize>,
    pub stats: StatsPayload,
}

/// POST /api/game/complete — merge the result into the caller's stats and,
/// for completed runs, offer it to the leaderboard. The per-user lock makes
/// the two writes one logical step.
pub async fn complete_game(
    State(state): State<GameState>,
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<CompleteGameRequest>,
) -> Result<Json<CompleteGameResponse>, AppError> {
    if req.correct_answers > req.questions_answered {
        return Err(anyhow::anyhow!(
            "Invalid completion: correct answers exceed questions answered"
        )
        .into());
    }
    if req.final_prize < 0 {
        return Err(anyhow::anyhow!("Invalid completion: negative prize").into());
    }

    let user = resolve_user(&state, &auth).await?;

    let _guard = state.user_locks.acquire(&user.id).await;

    let delta = CompletionDelta {
        questions_answered: req.questions_answered,
        correct_answers: req.correct_answers,
        prize_won: req.final_prize,
        completed: req.game_completed,
    };
    let stats = state
        .stats
        .record_completion(&user.id, &user.username, &delta)
        .await?;

    let leaderboard_position = if req.game_completed {
        state
            .leaderboard
            .submit(&Submission {
                user_id: user.id.clone(),
                player_name: user.username.clone(),
                prize_won: req.final_prize,
                questions_answered: req.questions_answered,
                total_questions: req.total_questions,
                completion_time: req.completion_time,
            })
            .await?
    } else {
        None
    };

    Ok(Json(CompleteGameResponse {
        success: true,
        leaderboard_position,
        stats: stats.into(),
    }))
}

fn parse_tier(level: Option<&str>) -> Result<Option<Tier>, AppError> {
    match level {
        None => Ok(None),
        Some(raw) => Tier::from_str(raw)
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid level: {}", e).into()),
    }
}

/// Auth tokens normally reference a stored user; tokens minted before a
/// store reset resolve by username instead.
async fn resolve_user(state: &GameState, auth: &AuthUser) -> Result<User, AppError> {
    if let Some(user) = bounded(state.store.get_user_by_id(&auth.user_id)).await? {
        return Ok(user);
    }
    Ok(state.tracker.ensure_user(&auth.username).await?)
}
