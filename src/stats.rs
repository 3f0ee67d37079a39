use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::store::models::Stats;
use crate::store::{Store, bounded};

/// What one finished (or abandoned) game contributes to a user's totals.
#[derive(Debug, Clone, Copy)]
pub struct CompletionDelta {
    pub questions_answered: u32,
    pub correct_answers: u32,
    pub prize_won: i64,
    pub completed: bool,
}

fn accuracy(correct: u32, answered: u32) -> i64 {
    if answered == 0 {
        return 0;
    }
    (100.0 * correct as f64 / answered as f64).round() as i64
}

/// Folds a completion delta into the user's stats. Creates the record from
/// the delta when none exists; games_played always increments,
/// games_completed only for completed runs, and accuracy is recomputed from
/// the cumulative counters.
pub fn merge_completion(
    existing: Option<Stats>,
    user_id: &str,
    username: &str,
    delta: &CompletionDelta,
) -> Stats {
    let mut stats = existing.unwrap_or_else(|| Stats::zeroed(user_id, username));
    stats.games_played += 1;
    if delta.completed {
        stats.games_completed += 1;
    }
    stats.total_prize += delta.prize_won;
    stats.questions_answered += delta.questions_answered;
    stats.correct_answers += delta.correct_answers;
    stats.accuracy = accuracy(stats.correct_answers, stats.questions_answered);
    stats
}

/// Applies completion events as a single logical read-modify-write per
/// user. Callers must hold the per-user lock so two concurrent completions
/// for the same user serialize (see [`crate::user_locks::UserLocks`]).
pub struct StatsAggregator {
    store: Arc<dyn Store>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn record_completion(
        &self,
        user_id: &str,
        username: &str,
        delta: &CompletionDelta,
    ) -> Result<Stats> {
        let existing = bounded(self.store.get_stats(user_id)).await?;
        let stats = merge_completion(existing, user_id, username, delta);
        bounded(self.store.put_stats(&stats)).await?;

        info!(
            "Recorded completion for {} (games: {}, completed: {}, prize: {}, accuracy: {}%)",
            username, stats.games_played, stats.games_completed, stats.total_prize, stats.accuracy
        );
        Ok(stats)
    }

    pub async fn stats_for(&self, user_id: &str) -> Result<Option<Stats>> {
        bounded(self.store.get_stats(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(answered: u32, correct: u32, prize: i64, completed: bool) -> CompletionDelta {
        CompletionDelta {
            questions_answered: answered,
            correct_answers: correct,
            prize_won: prize,
            completed,
        }
    }

    #[test]
    fn first_completion_initializes_from_delta() {
        let stats = merge_completion(None, "u1", "bob", &delta(10, 8, 3_000, true));
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.games_completed, 1);
        assert_eq!(stats.total_prize, 3_000);
        assert_eq!(stats.questions_answered, 10);
        assert_eq!(stats.accuracy, 80);
    }

    #[test]
    fn cumulative_accuracy_is_recomputed() {
        let first = merge_completion(None, "u1", "bob", &delta(10, 8, 0, true));
        let second = merge_completion(Some(first), "u1", "bob", &delta(10, 5, 0, false));

        assert_eq!(second.games_played, 2);
        assert_eq!(second.games_completed, 1);
        assert_eq!(second.questions_answered, 20);
        assert_eq!(second.correct_answers, 13);
        assert_eq!(second.accuracy, 65);
    }

    #[test]
    fn zero_answered_guards_divide_by_zero() {
        let stats = merge_completion(None, "u1", "bob", &delta(0, 0, 0, false));
        assert_eq!(stats.accuracy, 0);
    }

    #[test]
    fn incomplete_games_still_count_as_played() {
        let stats = merge_completion(None, "u1", "bob", &delta(4, 2, 2_000, false));
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.games_completed, 0);
        assert_eq!(stats.total_prize, 2_000);
    }
}
