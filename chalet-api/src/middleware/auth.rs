use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use chalet_core::{Actor, CoreError, IdentityResolver, Role};
use chalet_shared::Masked;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

/// HS256 bearer tokens signed with the configured secret.
pub struct JwtIdentityResolver {
    secret: Masked<String>,
}

impl JwtIdentityResolver {
    pub fn new(secret: Masked<String>) -> Self {
        Self { secret }
    }
}

#[async_trait]
impl IdentityResolver for JwtIdentityResolver {
    async fn resolve(&self, token: &str) -> Result<Actor, CoreError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose().as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| CoreError::NotAuthorized(format!("invalid token: {}", e)))?;

        let user_id = Uuid::parse_str(&data.claims.sub)
            .map_err(|_| CoreError::NotAuthorized("token subject is not a user id".into()))?;
        let role: Role = data.claims.role.parse()?;
        Ok(Actor::new(user_id, role))
    }
}

pub fn issue_token(secret: &Masked<String>, actor: &Actor, ttl_seconds: u64) -> Result<String, AppError> {
    let claims = Claims {
        sub: actor.user_id.to_string(),
        role: actor.role.as_str().to_owned(),
        exp: (Utc::now() + Duration::seconds(ttl_seconds as i64)).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.expose().as_bytes()))
        .map_err(|e| AppError::Core(CoreError::BackendUnavailable(format!("token encoding failed: {}", e))))
}

/// Resolves the bearer token and stores the [`Actor`] in request extensions.
pub async fn actor_middleware(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(Authorization(bearer)) =
        bearer.map_err(|_| AppError::AuthenticationError("missing bearer token".into()))?;

    let actor = state
        .identity
        .resolve(bearer.token())
        .await
        .map_err(|e| AppError::AuthenticationError(e.to_string()))?;

    tracing::debug!(user_id = %actor.user_id, role = %actor.role, "request authenticated");
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}
