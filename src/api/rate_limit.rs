use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::warn;

/// Sliding-window request limiter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    requests: Arc<Mutex<HashMap<String, Vec<Instant>>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            requests: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    pub async fn check_request(&self, ip: String) -> bool {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();

        let request_times = requests.entry(ip.clone()).or_insert_with(Vec::new);
        request_times.retain(|&time| now.duration_since(time) < self.window);

        if request_times.len() < self.max_requests {
            request_times.push(now);
            true
        } else {
            warn!("Rate limit exceeded for IP: {}", ip);
            false
        }
    }

    /// Drops IPs with no recent requests so the map does not grow forever.
    pub async fn cleanup(&self) {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();
        requests.retain(|_, times| {
            times.retain(|&time| now.duration_since(time) < self.window);
            !times.is_empty()
        });
    }
}

fn get_client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded_for) = headers.get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            if let Some(ip) = value.split(',').next() {
                return ip.trim().to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            return value.to_string();
        }
    }
    "unknown".to_string()
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let ip = get_client_ip(request.headers());

    if !limiter.check_request(ip).await {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Too many requests. Please try again later."
            })),
        )
            .into_response();
    }

    next.run(request).await
}

/// Creates a limiter for a route and spawns its periodic cleanup task.
pub fn rate_limit_layer(max_requests: usize, window_seconds: u64) -> RateLimiter {
    let limiter = RateLimiter::new(max_requests, Duration::from_secs(window_seconds));

    let cleanup_limiter = limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup().await;
        }
    });

    limiter
}
