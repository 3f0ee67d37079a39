use anyhow::Result;
use once_cell::sync::Lazy;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

use crate::store::models::{Question, Tier, User};
use crate::store::{Store, bounded};

/// Number of positions in a full game.
pub const SESSION_LENGTH: usize = 16;

/// One position in the fixed game structure: the difficulty label, answer
/// time limit and prize value are a function of the position alone.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSlot {
    pub question_number: u32,
    pub level: Tier,
    pub time_limit: u32,
    pub prize_value: i64,
}

/// Positions 1-3 easy (10s), 4-9 medium (20s), 10-16 hard (30s), with the
/// prize ladder climbing from 1,000 to 700,000,000.
pub static GAME_STRUCTURE: Lazy<Vec<SessionSlot>> = Lazy::new(|| {
    let tiers: [(Tier, u32, &[i64]); 3] = [
        (Tier::Easy, 10, &[1_000, 2_000, 3_000]),
        (
            Tier::Medium,
            20,
            &[5_000, 10_000, 25_000, 50_000, 100_000, 200_000],
        ),
        (
            Tier::Hard,
            30,
            &[
                500_000,
                1_000_000,
                5_000_000,
                25_000_000,
                100_000_000,
                300_000_000,
                700_000_000,
            ],
        ),
    ];

    let mut slots = Vec::with_capacity(SESSION_LENGTH);
    let mut number = 1;
    for (level, time_limit, prizes) in tiers {
        for &prize_value in prizes {
            slots.push(SessionSlot {
                question_number: number,
                level,
                time_limit,
                prize_value,
            });
            number += 1;
        }
    }
    slots
});

/// A question placed at a session position. Carries the zero-based index of
/// the correct option rather than the answer text.
#[derive(Debug, Clone)]
pub struct SessionQuestion {
    pub question: Question,
    pub answer_index: usize,
    pub question_number: u32,
    pub time_limit: u32,
    pub level: Tier,
    pub prize_value: i64,
}

/// Draws up to `count` questions from `pool` at random without replacement,
/// skipping any id already in `chosen`. Malformed rows (answer text missing
/// from the options) are dropped with a warning.
fn draw_questions<R: Rng + ?Sized>(
    pool: &[Question],
    count: usize,
    chosen: &mut HashSet<String>,
    rng: &mut R,
) -> Vec<Question> {
    let mut candidates: Vec<&Question> = pool
        .iter()
        .filter(|q| !chosen.contains(&q.id))
        .filter(|q| {
            if q.answer_index().is_none() {
                warn!("Skipping malformed question {}: answer not among options", q.id);
                return false;
            }
            true
        })
        .collect();
    candidates.shuffle(rng);

    let mut picked = Vec::new();
    for question in candidates {
        if picked.len() == count {
            break;
        }
        if chosen.insert(question.id.clone()) {
            picked.push(question.clone());
        }
    }
    picked
}

/// Assembles an ordered session from the catalog. Questions the user has
/// already seen are drawn only when the unseen pool runs dry; when the whole
/// catalog is exhausted the session is simply shorter than 16. Tier labels,
/// time limits and prizes come from the position, never from the question's
/// own difficulty tag.
pub fn assemble_session<R: Rng + ?Sized>(
    catalog: &[Question],
    answered: &HashSet<String>,
    rng: &mut R,
) -> Vec<SessionQuestion> {
    let unseen: Vec<Question> = catalog
        .iter()
        .filter(|q| !answered.contains(&q.id))
        .cloned()
        .collect();
    let seen: Vec<Question> = catalog
        .iter()
        .filter(|q| answered.contains(&q.id))
        .cloned()
        .collect();

    let mut chosen_ids = HashSet::new();
    let mut picked = draw_questions(&unseen, SESSION_LENGTH, &mut chosen_ids, rng);
    if picked.len() < SESSION_LENGTH {
        let padding = draw_questions(&seen, SESSION_LENGTH - picked.len(), &mut chosen_ids, rng);
        picked.extend(padding);
    }

    picked
        .into_iter()
        .zip(GAME_STRUCTURE.iter())
        .map(|(question, slot)| {
            // draw_questions already dropped rows without a valid index
            let answer_index = question.answer_index().unwrap_or(0);
            SessionQuestion {
                question,
                answer_index,
                question_number: slot.question_number,
                time_limit: slot.time_limit,
                level: slot.level,
                prize_value: slot.prize_value,
            }
        })
        .collect()
}

/// Builds full game sessions against the question store and records served
/// ids in the user's progress.
pub struct SessionBuilder {
    store: Arc<dyn Store>,
}

impl SessionBuilder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn build_for_user<R: Rng + ?Sized>(
        &self,
        user: &User,
        rng: &mut R,
    ) -> Result<Vec<SessionQuestion>> {
        let catalog = bounded(self.store.all_questions()).await?;
        // The caller's snapshot may predate a concurrent batch; exclude
        // against the stored served set, not the snapshot.
        let answered: HashSet<String> = match bounded(self.store.get_user_by_id(&user.id)).await? {
            Some(current) => current.answered_question_ids.into_iter().collect(),
            None => user.answered_question_ids.iter().cloned().collect(),
        };

        let session = assemble_session(&catalog, &answered, rng);

        let served: Vec<String> = session.iter().map(|sq| sq.question.id.clone()).collect();
        if !served.is_empty() {
            bounded(self.store.append_answered_questions(&user.id, &served)).await?;
        }

        Ok(session)
    }
}
