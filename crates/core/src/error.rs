#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid job id: {0:?}")]
    InvalidJobId(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
