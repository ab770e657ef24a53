//! Database-specific error types and conversions.

use vela_core::error::VelaError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// A conditional write matched no rows because the supplied
    /// version was stale.
    #[error("Stale version for {entity} with id {id}")]
    StaleVersion { entity: String, id: String },
}

impl From<DbError> for VelaError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => VelaError::NotFound { entity, id },
            DbError::StaleVersion { entity, id } => VelaError::Conflict { entity, id },
            other => VelaError::Database(other.to_string()),
        }
    }
}
