use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid database configuration: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Stored row is not readable: {0}")]
    InvalidRow(String),

    #[error(transparent)]
    Validation(#[from] core_types::CoreError),

    #[error("Conflicting row: {0}")]
    Conflict(String),

    #[error("The requested data was not found in the database.")]
    NotFound,
}
