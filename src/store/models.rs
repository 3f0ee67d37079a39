use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Difficulty bucket for a question. Also used to label session positions,
/// independently of the question's own tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Easy => write!(f, "easy"),
            Tier::Medium => write!(f, "medium"),
            Tier::Hard => write!(f, "hard"),
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Tier::Easy),
            "medium" => Ok(Tier::Medium),
            "hard" => Ok(Tier::Hard),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub tier: Tier,
}

impl Question {
    /// Zero-based index of the correct option, if the catalog row is
    /// well-formed.
    pub fn answer_index(&self) -> Option<usize> {
        self.options.iter().position(|o| o == &self.correct_answer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: Option<String>,
    /// Ids of questions already served to this user. Append-only.
    pub answered_question_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(username: &str, password_hash: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash,
            answered_question_ids: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Per-user running totals, one record per user, upserted on every
/// completion event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub user_id: String,
    pub username: String,
    pub games_played: u32,
    pub games_completed: u32,
    pub total_prize: i64,
    pub questions_answered: u32,
    pub correct_answers: u32,
    /// round(100 * correct_answers / questions_answered), 0 when nothing
    /// has been answered.
    pub accuracy: i64,
}

impl Stats {
    pub fn zeroed(user_id: &str, username: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: username.to_string(),
            games_played: 0,
            games_completed: 0,
            total_prize: 0,
            questions_answered: 0,
            correct_answers: 0,
            accuracy: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: u64,
    pub user_id: String,
    pub player_name: String,
    pub prize_won: i64,
    pub questions_answered: u32,
    pub total_questions: u32,
    pub completion_date: DateTime<Utc>,
    /// Seconds the run took, when the client reported it.
    pub completion_time: Option<i64>,
}
