use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::models::*;
use super::{Store, StoreError};

/// Primary document store backed by in-process maps. Insertion order of the
/// catalog is preserved so exclusion queries return questions in a stable
/// order.
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    questions: RwLock<Vec<Question>>,
    stats: RwLock<HashMap<String, Stats>>,
    leaderboard: RwLock<Vec<LeaderboardEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            questions: RwLock::new(Vec::new()),
            stats: RwLock::new(HashMap::new()),
            leaderboard: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::AlreadyExists(user.username.clone()).into());
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn append_answered_questions(
        &self,
        user_id: &str,
        question_ids: &[String],
    ) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        for id in question_ids {
            if !user.answered_question_ids.contains(id) {
                user.answered_question_ids.push(id.clone());
            }
        }
        Ok(())
    }

    async fn get_question(&self, question_id: &str) -> Result<Option<Question>> {
        Ok(self
            .questions
            .read()
            .await
            .iter()
            .find(|q| q.id == question_id)
            .cloned())
    }

    async fn insert_question_if_absent(&self, question: &Question) -> Result<bool> {
        let mut questions = self.questions.write().await;
        if questions.iter().any(|q| q.id == question.id) {
            return Ok(false);
        }
        questions.push(question.clone());
        Ok(true)
    }

    async fn query_questions_excluding(
        &self,
        tier: Option<Tier>,
        exclude: &HashSet<String>,
        limit: usize,
    ) -> Result<Vec<Question>> {
        Ok(self
            .questions
            .read()
            .await
            .iter()
            .filter(|q| tier.map_or(true, |t| q.tier == t))
            .filter(|q| !exclude.contains(&q.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn all_questions(&self) -> Result<Vec<Question>> {
        Ok(self.questions.read().await.clone())
    }

    async fn get_stats(&self, user_id: &str) -> Result<Option<Stats>> {
        Ok(self.stats.read().await.get(user_id).cloned())
    }

    async fn put_stats(&self, stats: &Stats) -> Result<()> {
        self.stats
            .write()
            .await
            .insert(stats.user_id.clone(), stats.clone());
        Ok(())
    }

    async fn get_leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        Ok(self.leaderboard.read().await.clone())
    }

    async fn put_leaderboard(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        *self.leaderboard.write().await = entries.to_vec();
        Ok(())
    }
}
