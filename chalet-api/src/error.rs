use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chalet_booking::{LedgerError, ReservationError, TransportError};
use chalet_core::CoreError;
use chalet_support::SupportError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing, malformed or expired credentials.
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error(transparent)]
    Core(CoreError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Core(err) => match err {
                CoreError::Validation(_) | CoreError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
                CoreError::BookingConflict(_) => StatusCode::CONFLICT,
                CoreError::NotFound(_) => StatusCode::NOT_FOUND,
                CoreError::NotAuthorized(_) => StatusCode::FORBIDDEN,
                CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                CoreError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::AuthenticationError(_) => "NOT_AUTHENTICATED",
            AppError::RateLimited => "RATE_LIMITED",
            AppError::Core(err) => err.kind(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        if status.is_server_error() {
            tracing::error!(kind, error = %self, "request failed");
        }
        let message = self.to_string();

        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        AppError::Core(err)
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        AppError::Core(err.into())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Core(err.into())
    }
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::Core(err.into())
    }
}

impl From<SupportError> for AppError {
    fn from(err: SupportError) -> Self {
        AppError::Core(err.into())
    }
}
