use chalet_core::RepoError;
use sqlx::error::ErrorKind;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

pub const EXCLUSION_VIOLATION: &str = "23P01";

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Maps driver failures onto the backend-neutral repository error.
pub(crate) fn repo_err(err: sqlx::Error) -> RepoError {
    match &err {
        sqlx::Error::RowNotFound => RepoError::NotFound(err.to_string()),
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => RepoError::Constraint(db.message().to_string()),
            _ if db.code().as_deref() == Some(EXCLUSION_VIOLATION) => RepoError::Constraint(db.message().to_string()),
            _ => RepoError::Unavailable(err.to_string()),
        },
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::TypeNotFound { .. } => {
            RepoError::Corrupt(err.to_string())
        }
        _ => RepoError::Unavailable(err.to_string()),
    }
}

/// Enum-as-text columns that fail to parse.
pub(crate) fn corrupt(column: &str, value: &str) -> RepoError {
    RepoError::Corrupt(format!("unexpected {} '{}'", column, value))
}

pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32, RepoError> {
    i32::try_from(value).map_err(|_| RepoError::Constraint(format!("{} {} out of range", column, value)))
}

pub(crate) fn to_u32(value: i32, column: &str) -> Result<u32, RepoError> {
    u32::try_from(value).map_err(|_| RepoError::Corrupt(format!("negative {} {}", column, value)))
}
