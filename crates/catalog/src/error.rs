//! Error types for the catalog service.

use thiserror::Error;

/// Errors surfaced by the inventory stores and reservation engine.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Broker operation failed.
    #[error("Messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),
}

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;
