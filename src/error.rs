use thiserror::Error;

/// Error surface the engine exposes to its callers. The web layer maps
/// `Validation` to a bad-request response, `NotFound` to a missing-resource
/// response and everything else to an internal error.
#[derive(Debug, Error)]
pub enum StudyError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("projector invariant violated: {0}")]
    ProjectorInvariant(String),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

impl StudyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}
