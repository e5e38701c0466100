//! Error types for the orders service.

use common::BookId;
use thiserror::Error;

/// Errors surfaced by the order stores, pricing and saga initiator.
#[derive(Debug, Error)]
pub enum OrdersError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Broker operation failed.
    #[error("Messaging error: {0}")]
    Messaging(#[from] messaging::MessagingError),

    /// An order must contain at least one line.
    #[error("Order contains no lines")]
    EmptyOrder,

    /// Quantities must be strictly positive.
    #[error("Invalid quantity {quantity} for book {book_id}")]
    InvalidQuantity { book_id: BookId, quantity: i64 },

    /// The catalog lookup for a book's price failed.
    #[error("Price lookup failed for book {book_id}: {message}")]
    PriceLookup { book_id: BookId, message: String },
}

/// Result type alias for order operations.
pub type Result<T> = std::result::Result<T, OrdersError>;
