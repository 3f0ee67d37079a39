use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::store::models::{Question, Tier, User};
use crate::store::{Store, StoreError, bounded};

/// Serves question batches while guaranteeing a user never sees the same
/// question twice as long as unseen alternatives exist in the requested
/// tier. When the primary store has no matches (typically because its
/// catalog has not been populated yet) the tracker falls back to the
/// secondary catalog and backfills the primary with whatever it finds.
pub struct ProgressTracker {
    primary: Arc<dyn Store>,
    fallback: Option<Arc<dyn Store>>,
}

impl ProgressTracker {
    pub fn new(primary: Arc<dyn Store>, fallback: Option<Arc<dyn Store>>) -> Self {
        Self { primary, fallback }
    }

    /// Looks up a user by name, creating a passwordless record on first
    /// contact. Legacy routes identify callers by username alone.
    pub async fn ensure_user(&self, username: &str) -> Result<User> {
        if let Some(user) = bounded(self.primary.get_user_by_username(username)).await? {
            return Ok(user);
        }

        let user = User::new(username, None);
        match bounded(self.primary.insert_user(&user)).await {
            Ok(()) => {
                info!("Created user record for {}", username);
                Ok(user)
            }
            Err(err) => {
                // Lost a first-contact race: another request created the
                // record between our lookup and insert. Return the winner's.
                if matches!(
                    err.downcast_ref::<StoreError>(),
                    Some(StoreError::AlreadyExists(_))
                ) {
                    if let Some(existing) =
                        bounded(self.primary.get_user_by_username(username)).await?
                    {
                        return Ok(existing);
                    }
                }
                Err(err)
            }
        }
    }

    /// Returns up to `count` questions from `tier` not yet served to the
    /// user, and immediately extends the user's served set with them.
    /// Callers holding only a username serialize through the per-user lock;
    /// the served set is re-read here so a batch handed out since the
    /// caller's snapshot was taken is still excluded.
    pub async fn next_batch(
        &self,
        user: &User,
        tier: Option<Tier>,
        count: usize,
    ) -> Result<Vec<Question>> {
        let answered = match bounded(self.primary.get_user_by_id(&user.id)).await? {
            Some(current) => current.answered_question_ids,
            None => user.answered_question_ids.clone(),
        };
        let exclude: HashSet<String> = answered.into_iter().collect();

        let mut questions =
            bounded(self.primary.query_questions_excluding(tier, &exclude, count)).await?;
        drop_malformed(&mut questions);

        if questions.is_empty() {
            if let Some(fallback) = &self.fallback {
                questions =
                    bounded(fallback.query_questions_excluding(tier, &exclude, count)).await?;
                drop_malformed(&mut questions);
                if !questions.is_empty() {
                    debug!(
                        "Primary store had no matches, serving {} questions from fallback",
                        questions.len()
                    );
                    self.backfill(&questions).await?;
                }
            }
        }

        let served: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        if !served.is_empty() {
            bounded(self.primary.append_answered_questions(&user.id, &served)).await?;
        }

        Ok(questions)
    }

    /// Copies fallback questions into the primary store. Inserts skip
    /// existing ids, so two requests discovering the same questions race
    /// harmlessly.
    async fn backfill(&self, questions: &[Question]) -> Result<()> {
        let mut inserted = 0;
        for question in questions {
            if bounded(self.primary.insert_question_if_absent(question)).await? {
                inserted += 1;
            }
        }
        if inserted > 0 {
            info!("Backfilled {} questions into the primary store", inserted);
        }
        Ok(())
    }
}

/// A row that cannot be delivered must not be marked served either.
fn drop_malformed(questions: &mut Vec<Question>) {
    questions.retain(|q| {
        if q.answer_index().is_none() {
            warn!("Dropping malformed question {}: answer not among options", q.id);
            return false;
        }
        true
    });
}
