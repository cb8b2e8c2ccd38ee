use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use super::messages::ErrorEnvelope;
use crate::config::RateLimitSettings;

pub const RATE_LIMITED_MESSAGE: &str = "Too many requests from this IP, please try again later.";

/// Outcome of counting one request against a client's window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

struct Window {
    started: Instant,
    hits: u32,
}

/// Fixed-window request counter keyed by client address.
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    clients: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            window: settings.window,
            max_requests: settings.max_requests,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, client: &str, now: Instant) -> RateDecision {
        let mut clients = match self.clients.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        // drop expired windows so idle clients do not accumulate
        clients.retain(|_, w| now.duration_since(w.started) < self.window);

        let window = clients.entry(client.to_string()).or_insert(Window {
            started: now,
            hits: 0,
        });
        window.hits = window.hits.saturating_add(1);

        RateDecision {
            allowed: window.hits <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(window.hits),
            reset_after: self.window.saturating_sub(now.duration_since(window.started)),
        }
    }
}

fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_key(&req);
    let decision = limiter.check(&client, Instant::now());

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        log::warn!("rate limit exceeded for {client}");
        (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorEnvelope::new(RATE_LIMITED_MESSAGE, None)),
        )
            .into_response()
    };

    let headers = response.headers_mut();
    headers.insert("ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert(
        "ratelimit-reset",
        HeaderValue::from(decision.reset_after.as_secs()),
    );
    response
}

/// One access log line per request.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start_time = Instant::now();

    let response = next.run(req).await;

    log::info!(
        "{method} {path} {} {:?}",
        response.status().as_u16(),
        start_time.elapsed()
    );
    response
}
