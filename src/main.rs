use anyhow::{Context, Result};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use trivia_server::api::run_api_server;
use trivia_server::seed::seed_questions;
use trivia_server::store::Store;
use trivia_server::store::jsonfile::JsonFileStore;
use trivia_server::store::memory::MemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if exists
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let jwt_secret = env::var("TRIVIA_JWT_SECRET")
        .context("TRIVIA_JWT_SECRET must be set in environment or .env file")?;

    let port = env::var("TRIVIA_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);

    let data_dir = env::var("TRIVIA_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let store_kind = env::var("TRIVIA_STORE").unwrap_or_else(|_| "memory".to_string());

    // The primary store serves all reads and writes; with the in-memory
    // primary, the JSON file store doubles as the catalog fallback.
    let (store, fallback): (Arc<dyn Store>, Option<Arc<dyn Store>>) =
        match store_kind.as_str() {
            "file" => {
                let file_store = Arc::new(JsonFileStore::open(&data_dir)?);
                info!("Using JSON file store at {}", data_dir);
                (file_store, None)
            }
            "memory" => {
                let file_store: Option<Arc<dyn Store>> = if Path::new(&data_dir).exists() {
                    Some(Arc::new(JsonFileStore::open(&data_dir)?))
                } else {
                    None
                };
                info!("Using in-memory store (file fallback: {})", file_store.is_some());
                (Arc::new(MemoryStore::new()), file_store)
            }
            other => anyhow::bail!("Unknown TRIVIA_STORE value: {}", other),
        };

    // Seed the catalog before serving the first request
    if let Ok(seed_file) = env::var("TRIVIA_QUESTIONS_FILE") {
        let inserted = seed_questions(store.as_ref(), Path::new(&seed_file)).await?;
        info!("Question seed complete ({} new questions)", inserted);
    }

    run_api_server(&addr, store, fallback, &jwt_secret).await
}
