use catalog_core::CoreError;
use catalog_db::DbError;
use catalog_media::MediaError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Rejected input; the message is shown to the caller as is.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// Another request holds the mutation lock for this title.
    #[error("product title repeated, please retry later")]
    Contention,

    #[error("{entity} record not found")]
    NotFound { entity: &'static str },

    #[error("database error: {0}")]
    Store(#[from] DbError),

    #[error("capability error: {0}")]
    Capability(String),

    #[error("media error: {0}")]
    Media(#[from] MediaError),
}

impl PipelineError {
    #[must_use]
    pub const fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        Self::Store(DbError::Sqlx(e))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Capability(format!("payload serialization failed: {e}"))
    }
}
