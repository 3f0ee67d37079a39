use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::store::models::LeaderboardEntry;
use crate::store::{Store, bounded};

/// Entries beyond this rank are dropped for good after every write.
pub const LEADERBOARD_CAPACITY: usize = 100;

/// A qualifying game result offered to the leaderboard. Keyed on `user_id`,
/// ranked on `prize_won`; legacy "score" submissions map onto `prize_won`.
#[derive(Debug, Clone)]
pub struct Submission {
    pub user_id: String,
    pub player_name: String,
    pub prize_won: i64,
    pub questions_answered: u32,
    pub total_questions: u32,
    pub completion_time: Option<i64>,
}

/// Merges one submission into the ranked list: replace the user's entry only
/// on a strictly greater prize, insert when absent, then stable-sort
/// descending and truncate to capacity. Returns the new list and the 1-based
/// rank of the user's entry if it survived truncation.
pub fn merge_submission(
    mut entries: Vec<LeaderboardEntry>,
    submission: &Submission,
    now: DateTime<Utc>,
) -> (Vec<LeaderboardEntry>, Option<usize>) {
    let existing = entries
        .iter()
        .position(|e| e.user_id == submission.user_id);

    match existing {
        Some(idx) if entries[idx].prize_won >= submission.prize_won => {
            // Inferior or equal result: the stored entry stands.
        }
        _ => {
            if let Some(idx) = existing {
                entries.remove(idx);
            }
            let next_id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
            entries.push(LeaderboardEntry {
                id: next_id,
                user_id: submission.user_id.clone(),
                player_name: submission.player_name.clone(),
                prize_won: submission.prize_won,
                questions_answered: submission.questions_answered,
                total_questions: submission.total_questions,
                completion_date: now,
                completion_time: submission.completion_time,
            });
        }
    }

    // Stable sort keeps earlier submissions ahead on equal prizes.
    entries.sort_by(|a, b| b.prize_won.cmp(&a.prize_won));
    entries.truncate(LEADERBOARD_CAPACITY);

    let rank = entries
        .iter()
        .position(|e| e.user_id == submission.user_id)
        .map(|idx| idx + 1);
    (entries, rank)
}

/// The global top-100 list. All writes funnel through one mutex so the
/// read-merge-write cycle never interleaves.
pub struct Leaderboard {
    store: Arc<dyn Store>,
    write_lock: Mutex<()>,
}

impl Leaderboard {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the 1-based rank of the submitting user's entry, or None when
    /// it fell outside the top 100.
    pub async fn submit(&self, submission: &Submission) -> Result<Option<usize>> {
        let _guard = self.write_lock.lock().await;

        let entries = bounded(self.store.get_leaderboard()).await?;
        let (merged, rank) = merge_submission(entries, submission, Utc::now());
        bounded(self.store.put_leaderboard(&merged)).await?;

        match rank {
            Some(rank) => info!(
                "Leaderboard submission for {} ranked #{} (prize: {})",
                submission.player_name, rank, submission.prize_won
            ),
            None => info!(
                "Leaderboard submission for {} fell outside the top {}",
                submission.player_name, LEADERBOARD_CAPACITY
            ),
        }
        Ok(rank)
    }

    /// Snapshot of the current ordered list.
    pub async fn get(&self) -> Result<Vec<LeaderboardEntry>> {
        bounded(self.store.get_leaderboard()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(user_id: &str, prize: i64) -> Submission {
        Submission {
            user_id: user_id.to_string(),
            player_name: user_id.to_string(),
            prize_won: prize,
            questions_answered: 16,
            total_questions: 16,
            completion_time: None,
        }
    }

    fn apply(entries: Vec<LeaderboardEntry>, sub: &Submission) -> (Vec<LeaderboardEntry>, Option<usize>) {
        merge_submission(entries, sub, Utc::now())
    }

    #[test]
    fn inferior_replay_is_a_no_op() {
        let (entries, rank) = apply(Vec::new(), &submission("a", 100));
        assert_eq!(rank, Some(1));

        let (entries, rank) = apply(entries, &submission("a", 50));
        assert_eq!(rank, Some(1));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].prize_won, 100);
    }

    #[test]
    fn equal_score_keeps_the_existing_entry() {
        let (entries, _) = apply(Vec::new(), &submission("a", 100));
        let original_id = entries[0].id;

        let (entries, _) = apply(entries, &submission("a", 100));
        assert_eq!(entries[0].id, original_id);
    }

    #[test]
    fn superior_score_replaces_and_reranks() {
        let (entries, _) = apply(Vec::new(), &submission("a", 100));
        let (entries, _) = apply(entries, &submission("b", 200));
        assert_eq!(entries[0].user_id, "b");

        let (entries, rank) = apply(entries, &submission("a", 300));
        assert_eq!(rank, Some(1));
        assert_eq!(entries[0].user_id, "a");
        assert_eq!(entries[0].prize_won, 300);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn list_is_truncated_to_capacity() {
        let mut entries = Vec::new();
        for i in 0..105 {
            let (next, _) = apply(entries, &submission(&format!("user{}", i), 1_000 + i as i64));
            entries = next;
        }

        assert_eq!(entries.len(), LEADERBOARD_CAPACITY);
        // The five lowest original scores (1_000..1_004) were dropped.
        assert!(entries.iter().all(|e| e.prize_won >= 1_005));
        assert_eq!(entries[0].prize_won, 1_104);
        assert!(entries.windows(2).all(|w| w[0].prize_won >= w[1].prize_won));
    }

    #[test]
    fn submission_below_the_cut_is_unranked() {
        let mut entries = Vec::new();
        for i in 0..LEADERBOARD_CAPACITY {
            let (next, _) = apply(entries, &submission(&format!("user{}", i), 10_000 + i as i64));
            entries = next;
        }

        let (entries, rank) = apply(entries, &submission("late", 1));
        assert_eq!(rank, None);
        assert_eq!(entries.len(), LEADERBOARD_CAPACITY);
        assert!(entries.iter().all(|e| e.user_id != "late"));
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let (entries, _) = apply(Vec::new(), &submission("first", 500));
        let (entries, rank) = apply(entries, &submission("second", 500));
        assert_eq!(entries[0].user_id, "first");
        assert_eq!(rank, Some(2));
    }

    #[test]
    fn entry_ids_are_monotonic() {
        let (entries, _) = apply(Vec::new(), &submission("a", 100));
        let (entries, _) = apply(entries, &submission("b", 200));
        let (entries, _) = apply(entries, &submission("a", 300));

        let replaced = entries.iter().find(|e| e.user_id == "a").unwrap();
        let other = entries.iter().find(|e| e.user_id == "b").unwrap();
        assert!(replaced.id > other.id);
    }
}
