use anyhow::Result;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tower::ServiceExt;

use trivia_server::api::build_router;
use trivia_server::store::Store;
use trivia_server::store::memory::MemoryStore;
use trivia_server::store::models::{Question, Tier};

async fn test_app(question_count: usize) -> (Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for i in 0..question_count {
        let tier = match i % 3 {
            0 => Tier::Easy,
            1 => Tier::Medium,
            _ => Tier::Hard,
        };
        store
            .insert_question_if_absent(&Question {
                id: format!("q{}", i),
                text: format!("question {}", i),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: "b".into(),
                tier,
            })
            .await
            .unwrap();
    }
    let app = build_router(store.clone(), None, "test-secret");
    (app, store)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, body)
}

fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn register(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        post_json(
            "/api/auth/register",
            json!({ "username": username, "password": "hunter22" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (app, _) = test_app(0).await;
    let (status, body) = send(&app, get_req("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));
}

#[tokio::test]
async fn game_questions_require_auth() {
    let (app, _) = test_app(20).await;
    let (status, _) = send(
        &app,
        post_json("/api/game/questions", json!({ "username": "alice" }), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_game_round_trip() -> Result<()> {
    let (app, _) = test_app(30).await;
    let token = register(&app, "alice").await;

    // Start a game
    let (status, body) = send(
        &app,
        post_json(
            "/api/game/questions",
            json!({ "username": "alice" }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["totalQuestions"], json!(16));

    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 16);
    assert_eq!(questions[0]["level"], json!("easy"));
    assert_eq!(questions[0]["timeLimit"], json!(10));
    assert_eq!(questions[3]["level"], json!("medium"));
    assert_eq!(questions[9]["level"], json!("hard"));
    assert_eq!(questions[15]["prizeValue"], json!(700_000_000i64));
    assert_eq!(body["gameStructure"].as_array().unwrap().len(), 16);

    // Every payload carries an answer index, never the answer text
    for q in questions {
        assert!(q["answerIndex"].is_number());
        assert!(q.get("correctAnswer").is_none());
    }

    // Report the finished game
    let (status, body) = send(
        &app,
        post_json(
            "/api/game/complete",
            json!({
                "questionsAnswered": 16,
                "correctAnswers": 12,
                "totalQuestions": 16,
                "finalPrize": 200000,
                "completionTime": 300,
                "gameCompleted": true
            }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["leaderboardPosition"], json!(1));
    assert_eq!(body["stats"]["gamesCompleted"], json!(1));
    assert_eq!(body["stats"]["accuracy"], json!(75));

    // The leaderboard shows the run
    let (status, body) = send(&app, get_req("/api/leaderboard")).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["leaderboard"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["playerName"], json!("alice"));
    assert_eq!(entries[0]["prizeWon"], json!(200000));
    assert_eq!(entries[0]["rank"], json!(1));

    // So do the stats
    let (status, body) = send(&app, get_req("/api/stats/alice")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["totalPrize"], json!(200000));
    assert!(body.get("message").is_none());
    Ok(())
}

#[tokio::test]
async fn legacy_question_batches_exclude_served_ids() -> Result<()> {
    let (app, _) = test_app(12).await;

    let (status, first) = send(
        &app,
        post_json(
            "/api/questions",
            json!({ "username": "bob", "count": 3, "level": "easy" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let first_ids: Vec<String> = first["questions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["id"].as_str().unwrap().to_string())
        .collect();
    assert!(!first_ids.is_empty());

    let (status, second) = send(
        &app,
        post_json(
            "/api/questions",
            json!({ "username": "bob", "count": 3, "level": "easy" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    for q in second["questions"].as_array().unwrap() {
        assert!(!first_ids.contains(&q["id"].as_str().unwrap().to_string()));
    }
    Ok(())
}

#[tokio::test]
async fn concurrent_batches_for_one_user_never_overlap() -> Result<()> {
    // 12 questions seeded round-robin across tiers leaves 4 easy ones,
    // enough for two batches of 2 with no slack for repeats.
    let (app, _) = test_app(12).await;

    let mut handles = Vec::new();
    for _ in 0..2 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            send(
                &app,
                post_json(
                    "/api/questions",
                    json!({ "username": "gus", "count": 2, "level": "easy" }),
                    None,
                ),
            )
            .await
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        let (status, body) = handle.await?;
        assert_eq!(status, StatusCode::OK);
        for q in body["questions"].as_array().unwrap() {
            let id = q["id"].as_str().unwrap().to_string();
            assert!(seen.insert(id), "question served twice across batches");
        }
    }
    assert_eq!(seen.len(), 4);
    Ok(())
}

#[tokio::test]
async fn check_answer_paths() -> Result<()> {
    let (app, store) = test_app(0).await;
    store
        .insert_question_if_absent(&Question {
            id: "capital".into(),
            text: "Capital of France?".into(),
            options: vec!["Berlin".into(), "Paris".into(), "Rome".into()],
            correct_answer: "Paris".into(),
            tier: Tier::Easy,
        })
        .await?;

    let (status, body) = send(
        &app,
        post_json(
            "/api/check-answer",
            json!({ "level": "easy", "questionId": "capital", "answer": "Paris" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correct"], json!(true));
    assert_eq!(body["correctAnswer"], Value::Null);

    let (status, body) = send(
        &app,
        post_json(
            "/api/check-answer",
            json!({ "level": "easy", "questionId": "capital", "answer": "Rome" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["correct"], json!(false));
    assert_eq!(body["correctAnswer"], json!("Paris"));

    // Unknown id: not found, never a false "correct"
    let (status, _) = send(
        &app,
        post_json(
            "/api/check-answer",
            json!({ "level": "easy", "questionId": "missing", "answer": "Paris" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Known id but wrong tier is also a not-found
    let (status, _) = send(
        &app,
        post_json(
            "/api/check-answer",
            json!({ "level": "hard", "questionId": "capital", "answer": "Paris" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn inferior_completion_does_not_displace_best_run() -> Result<()> {
    let (app, _) = test_app(16).await;
    let token = register(&app, "carol").await;

    let complete = |prize: i64| {
        json!({
            "questionsAnswered": 16,
            "correctAnswers": 10,
            "totalQuestions": 16,
            "finalPrize": prize,
            "gameCompleted": true
        })
    };

    let (_, body) = send(&app, post_json("/api/game/complete", complete(100_000), Some(&token))).await;
    assert_eq!(body["leaderboardPosition"], json!(1));

    let (_, body) = send(&app, post_json("/api/game/complete", complete(5_000), Some(&token))).await;
    // The weaker run still shows the user's standing rank.
    assert_eq!(body["leaderboardPosition"], json!(1));

    let (_, body) = send(&app, get_req("/api/leaderboard")).await;
    let entries = body["leaderboard"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["prizeWon"], json!(100_000));

    // But both games landed in the stats.
    let (_, body) = send(&app, get_req("/api/stats/carol")).await;
    assert_eq!(body["stats"]["gamesPlayed"], json!(2));
    assert_eq!(body["stats"]["totalPrize"], json!(105_000));
    Ok(())
}

#[tokio::test]
async fn unknown_user_stats_return_zeroed_default() {
    let (app, _) = test_app(0).await;
    let (status, body) = send(&app, get_req("/api/stats/nobody")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["gamesPlayed"], json!(0));
    assert_eq!(body["stats"]["accuracy"], json!(0));
    assert_eq!(body["message"], json!("no stats found"));
}

#[tokio::test]
async fn malformed_completion_is_rejected_before_storage() {
    let (app, store) = test_app(0).await;
    let token = register(&app, "dave").await;

    let (status, _) = send(
        &app,
        post_json(
            "/api/game/complete",
            json!({
                "questionsAnswered": 5,
                "correctAnswers": 9,
                "totalQuestions": 16,
                "finalPrize": 1000,
                "gameCompleted": true
            }),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // No partial write happened.
    let user = store.get_user_by_username("dave").await.unwrap().unwrap();
    assert!(store.get_stats(&user.id).await.unwrap().is_none());
    assert!(store.get_leaderboard().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let (app, _) = test_app(0).await;
    register(&app, "erin").await;

    let (status, _) = send(
        &app,
        post_json(
            "/api/auth/register",
            json!({ "username": "erin", "password": "hunter22" }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn empty_catalog_still_starts_a_game() {
    let (app, _) = test_app(0).await;
    let token = register(&app, "frank").await;

    let (status, body) = send(
        &app,
        post_json("/api/game/questions", json!({ "username": "frank" }), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["totalQuestions"], json!(0));
    assert!(body["questions"].as_array().unwrap().is_empty());
}
