use axum::{extract::State, routing::post, Json, Router};
use chalet_core::{Actor, CoreError, Role};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, extract::AppJson, middleware::auth::issue_token, state::AppState};

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Fresh user id when omitted.
    pub user_id: Option<Uuid>,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub user_id: Uuid,
    pub role: Role,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/token", post(issue_dev_token))
}

/// Development stand-in for the external identity provider.
async fn issue_dev_token(
    State(state): State<AppState>,
    AppJson(body): AppJson<TokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    if !state.auth.allow_dev_tokens {
        return Err(CoreError::NotFound("token endpoint disabled".into()).into());
    }

    let actor = Actor::new(body.user_id.unwrap_or_else(Uuid::new_v4), body.role);
    let token = issue_token(&state.auth.secret, &actor, state.auth.expiration)?;
    tracing::info!(user_id = %actor.user_id, role = %actor.role, "issued development token");

    Ok(Json(TokenResponse {
        token,
        user_id: actor.user_id,
        role: actor.role,
    }))
}
