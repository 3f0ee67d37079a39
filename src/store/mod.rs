pub mod jsonfile;
pub mod memory;
pub mod models;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use models::*;

/// How long a single store call may take before it is surfaced as a
/// retryable failure instead of a hang.
pub const STORE_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store call timed out")]
    Timeout,
}

/// Runs a store call under [`STORE_CALL_TIMEOUT`]. An elapsed timer becomes
/// [`StoreError::Timeout`], which callers surface as a retryable server
/// error.
pub async fn bounded<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(STORE_CALL_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout.into()),
    }
}

/// Document-store interface shared by the primary store and the JSON-file
/// fallback. Point query, exclusion query, idempotent insert, upsert, and
/// whole-list read/write for the leaderboard singleton.
#[async_trait]
pub trait Store: Send + Sync {
    // User operations
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn insert_user(&self, user: &User) -> Result<()>;
    /// Extends the user's served-question set. The set only ever grows.
    async fn append_answered_questions(
        &self,
        user_id: &str,
        question_ids: &[String],
    ) -> Result<()>;

    // Question catalog operations
    async fn get_question(&self, question_id: &str) -> Result<Option<Question>>;
    /// Idempotent insert: returns false and leaves the catalog untouched
    /// when a question with this id already exists.
    async fn insert_question_if_absent(&self, question: &Question) -> Result<bool>;
    /// Up to `limit` questions from `tier` (all tiers when None) whose ids
    /// are not in `exclude`.
    async fn query_questions_excluding(
        &self,
        tier: Option<Tier>,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<Question>>;
    async fn all_questions(&self) -> Result<Vec<Question>>;

    // Stats operations
    async fn get_stats(&self, user_id: &str) -> Result<Option<Stats>>;
    async fn put_stats(&self, stats: &Stats) -> Result<()>;

    // Leaderboard singleton
    async fn get_leaderboard(&self) -> Result<Vec<LeaderboardEntry>>;
    async fn put_leaderboard(&self, entries: &[LeaderboardEntry]) -> Result<()>;
}
