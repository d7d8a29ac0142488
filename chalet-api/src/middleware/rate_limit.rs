use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use chalet_store::redis_repo::rate_limit_key;
use chrono::Utc;
use std::net::SocketAddr;

use crate::{error::AppError, state::AppState};

const WINDOW_SECONDS: i64 = 60;

/// Per-IP fixed window backed by Redis. Fails open when Redis is unreachable.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(next.run(req).await);
    };

    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let window_start = Utc::now().timestamp() / WINDOW_SECONDS * WINDOW_SECONDS;
    let key = rate_limit_key(&client, window_start);
    let limit = state.business_rules.rate_limit_per_minute;

    match redis.check_rate_limit(&key, limit, WINDOW_SECONDS).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => {
            tracing::warn!(client, limit, "rate limit exceeded");
            Err(AppError::RateLimited)
        }
        Err(e) => {
            tracing::warn!(error = %e, "rate limiter unavailable");
            Ok(next.run(req).await)
        }
    }
}
