/// Failure of the persistence/query service, independent of the backend used.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

impl From<RepoError> for crate::CoreError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(what) => crate::CoreError::NotFound(what),
            RepoError::Constraint(what) => crate::CoreError::Validation(what),
            RepoError::Unavailable(what) | RepoError::Corrupt(what) => {
                crate::CoreError::BackendUnavailable(what)
            }
        }
    }
}
