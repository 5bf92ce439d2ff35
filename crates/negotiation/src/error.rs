use repairlink_core::error::CoreError;

/// Errors surfaced by lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type NegotiationResult<T> = Result<T, NegotiationError>;
