use thiserror::Error;

/// Storage-specific error types for the keybus gateway.
///
/// Any of these raised while a floor is being initialized means the floor's
/// configuration is unavailable; the supervisor keeps the floor queued and
/// tries again later.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Stored data violates a domain rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn not_found(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }
}

impl From<keybus_core::Error> for StorageError {
    fn from(e: keybus_core::Error) -> Self {
        StorageError::Validation(e.to_string())
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
