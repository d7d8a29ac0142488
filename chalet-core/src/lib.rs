pub mod events;
pub mod identity;
pub mod repository;

pub use events::{BroadcastPublisher, EventPublisher, NoopPublisher};
pub use identity::{Actor, IdentityResolver, Role, StaticIdentityResolver};
pub use repository::{RepoError, RepoResult};

/// Error kinds surfaced to callers of the booking core.
///
/// Every component error converts into one of these; the API layer turns them
/// into a status code plus `{ error, message }` body.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Booking conflict: {0}")]
    BookingConflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Timed out: {0}")]
    Timeout(String),
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

impl CoreError {
    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::BookingConflict(_) => "BOOKING_CONFLICT",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::NotAuthorized(_) => "NOT_AUTHORIZED",
            CoreError::InvalidAmount(_) => "INVALID_AMOUNT",
            CoreError::Timeout(_) => "TIMEOUT",
            CoreError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
        }
    }

    /// Read paths may retry these with backoff; write paths must re-check first.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::BackendUnavailable(_) | CoreError::Timeout(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(CoreError::BookingConflict("x".into()).kind(), "BOOKING_CONFLICT");
        assert_eq!(CoreError::InvalidAmount("x".into()).kind(), "INVALID_AMOUNT");
        assert!(CoreError::BackendUnavailable("db".into()).is_transient());
        assert!(!CoreError::Validation("dates".into()).is_transient());
    }
}
