use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database query error: {0}")]
    QueryError(String),
    #[error("Could not create new user account: {0}")]
    AccountCreationError(String),
    #[error("Account not found: {0}")]
    AccountNotFound(i64),
    #[error("Order not found: {0}")]
    OrderNotFound(i64),
    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}
