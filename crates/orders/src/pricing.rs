//! Catalog price lookup collaborator.

use std::collections::HashMap;

use async_trait::async_trait;
use common::BookId;
use serde::Deserialize;

use crate::error::OrdersError;
use crate::Result;

/// Resolves the unit price of a book at order time.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// Returns the current price of the book.
    ///
    /// Any failure (unknown book, unreachable catalog) aborts order creation
    /// before anything is persisted or published.
    async fn price(&self, book_id: BookId) -> Result<f64>;
}

#[derive(Deserialize)]
struct BookResponse {
    price: f64,
}

/// HTTP price lookup against the catalog's book endpoint.
pub struct HttpPriceLookup {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceLookup {
    /// Creates a lookup against `GET {base_url}/books/{id}`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PriceLookup for HttpPriceLookup {
    async fn price(&self, book_id: BookId) -> Result<f64> {
        let url = format!("{}/books/{}", self.base_url, book_id);
        let lookup_err = |message: String| OrdersError::PriceLookup { book_id, message };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| lookup_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(lookup_err(format!("catalog returned {}", response.status())));
        }

        let book: BookResponse = response
            .json()
            .await
            .map_err(|e| lookup_err(e.to_string()))?;

        Ok(book.price)
    }
}

/// Fixed price table for tests and single-process wiring.
#[derive(Clone, Default)]
pub struct InMemoryPriceLookup {
    prices: HashMap<BookId, f64>,
}

impl InMemoryPriceLookup {
    /// Creates an empty price table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price for a book.
    pub fn set_price(&mut self, book_id: BookId, price: f64) {
        self.prices.insert(book_id, price);
    }
}

#[async_trait]
impl PriceLookup for InMemoryPriceLookup {
    async fn price(&self, book_id: BookId) -> Result<f64> {
        self.prices
            .get(&book_id)
            .copied()
            .ok_or_else(|| OrdersError::PriceLookup {
                book_id,
                message: "unknown book".to_string(),
            })
    }
}
