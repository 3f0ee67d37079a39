use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

use super::models::*;
use super::{Store, StoreError};

/// JSON-file-backed fallback store. Each collection lives in its own file
/// under the data directory and is rewritten whole on every mutation, via a
/// temp file and rename so readers never observe a partial write.
pub struct JsonFileStore {
    dir: PathBuf,
    users: RwLock<Vec<User>>,
    questions: RwLock<Vec<Question>>,
    stats: RwLock<Vec<Stats>>,
    leaderboard: RwLock<Vec<LeaderboardEntry>>,
}

fn load_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_collection<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let raw = serde_json::to_string_pretty(items).context("Failed to serialize collection")?;
    std::fs::write(&tmp, raw).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

        let users: Vec<User> = load_collection(&dir.join("users.json"))?;
        let questions: Vec<Question> = load_collection(&dir.join("questions.json"))?;
        let stats: Vec<Stats> = load_collection(&dir.join("stats.json"))?;
        let leaderboard: Vec<LeaderboardEntry> = load_collection(&dir.join("leaderboard.json"))?;

        info!(
            "Opened JSON file store at {} ({} users, {} questions, {} stats, {} leaderboard entries)",
            dir.display(),
            users.len(),
            questions.len(),
            stats.len(),
            leaderboard.len()
        );

        Ok(Self {
            dir,
            users: RwLock::new(users),
            questions: RwLock::new(questions),
            stats: RwLock::new(stats),
            leaderboard: RwLock::new(leaderboard),
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.id == user_id)
            .cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::AlreadyExists(user.username.clone()).into());
        }
        users.push(user.clone());
        save_collection(&self.path("users.json"), &users)
    }

    async fn append_answered_questions(
        &self,
        user_id: &str,
        question_ids: &[String],
    ) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| StoreError::NotFound(format!("user {}", user_id)))?;
        for id in question_ids {
            if !user.answered_question_ids.contains(id) {
                user.answered_question_ids.push(id.clone());
            }
        }
        save_collection(&self.path("users.json"), &users)
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
        save_collection(&self.path("questions.json"), &questions)?;
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
        Ok(self
            .stats
            .read()
            .await
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn put_stats(&self, stats: &Stats) -> Result<()> {
        let mut all = self.stats.write().await;
        match all.iter_mut().find(|s| s.user_id == stats.user_id) {
            Some(existing) => *existing = stats.clone(),
            None => all.push(stats.clone()),
        }
        save_collection(&self.path("stats.json"), &all)
    }

    async fn get_leaderboard(&self) -> Result<Vec<LeaderboardEntry>> {
        Ok(self.leaderboard.read().await.clone())
    }

    async fn put_leaderboard(&self, entries: &[LeaderboardEntry]) -> Result<()> {
        let mut board = self.leaderboard.write().await;
        *board = entries.to_vec();
        save_collection(&self.path("leaderboard.json"), &board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("trivia-store-{}", uuid::Uuid::new_v4()))
    }

    fn question(id: &str, tier: Tier) -> Question {
        Question {
            id: id.to_string(),
            text: format!("question {}", id),
            options: vec!["a".into(), "b".into()],
            correct_answer: "b".into(),
            tier,
        }
    }

    #[tokio::test]
    async fn collections_survive_reopen() -> Result<()> {
        let dir = temp_dir();

        {
            let store = JsonFileStore::open(&dir)?;
            store.insert_question_if_absent(&question("q1", Tier::Easy)).await?;
            store.insert_user(&User::new("carol", None)).await?;
            store
                .put_stats(&Stats {
                    games_played: 3,
                    ..Stats::zeroed("u1", "carol")
                })
                .await?;
        }

        let store = JsonFileStore::open(&dir)?;
        assert_eq!(store.all_questions().await?.len(), 1);
        assert!(store.get_user_by_username("carol").await?.is_some());
        assert_eq!(store.get_stats("u1").await?.unwrap().games_played, 3);

        std::fs::remove_dir_all(&dir).ok();
        Ok(())
    }

    #[tokio::test]
    async fn missing_files_read_as_empty() -> Result<()> {
        let dir = temp_dir();
        let store = JsonFileStore::open(&dir)?;
        assert!(store.all_questions().await?.is_empty());
        assert!(store.get_leaderboard().await?.is_empty());
        std::fs::remove_dir_all(&dir).ok();
        Ok(())
    }
}
