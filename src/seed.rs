use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::store::Store;
use crate::store::models::{Question, Tier};

/// Seed-file row. Field aliases keep old catalog exports importable.
#[derive(Debug, Deserialize)]
struct SeedQuestion {
    id: String,
    #[serde(alias = "question")]
    text: String,
    options: Vec<String>,
    #[serde(alias = "correctAnswer", alias = "answer")]
    correct_answer: String,
    #[serde(alias = "level")]
    tier: Tier,
}

/// Imports the question catalog from a JSON file. Rows whose answer is not
/// among the options are skipped; rows already present are left untouched.
/// Returns the number of newly inserted questions.
pub async fn seed_questions(store: &dyn Store, path: &Path) -> Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let rows: Vec<SeedQuestion> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))?;

    let mut inserted = 0;
    for row in rows {
        if !row.options.contains(&row.correct_answer) {
            warn!(
                "Skipping seed question {}: correct answer not among options",
                row.id
            );
            continue;
        }
        let question = Question {
            id: row.id,
            text: row.text,
            options: row.options,
            correct_answer: row.correct_answer,
            tier: row.tier,
        };
        if store.insert_question_if_absent(&question).await? {
            inserted += 1;
        }
    }

    info!("Seeded {} new questions from {}", inserted, path.display());
    Ok(inserted)
}
