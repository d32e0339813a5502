// src/repositories/mod.rs
//! Store interfaces for batches and stock transactions.
//!
//! Handlers and services only see these traits; `main` builds the in-memory
//! implementations once and shares them through `AppState`.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::ApiResult;
use crate::models::{Batch, BatchCategory, BatchStatus, StockOutLine, StockTransaction, TransactionFilter};

pub mod memory;

pub use memory::{InMemoryBatchRepository, InMemoryTransactionRepository};

/// Query options for batch listings.
#[derive(Debug, Default, Clone)]
pub struct BatchFilter {
    pub category: Option<BatchCategory>,
    pub status: Option<BatchStatus>,
    pub product_code: Option<String>,
    /// Case-insensitive match on product name, product code or batch number.
    pub search: Option<String>,
}

impl BatchFilter {
    pub fn matches(&self, batch: &Batch) -> bool {
        if let Some(category) = self.category {
            if batch.category != category {
                return false;
            }
        }
        if let Some(status) = self.status {
            if batch.status != status {
                return false;
            }
        }
        if let Some(ref code) = self.product_code {
            if &batch.product_code != code {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.trim().to_lowercase();
            if !needle.is_empty()
                && !batch.product_name.to_lowercase().contains(&needle)
                && !batch.product_code.to_lowercase().contains(&needle)
                && !batch.batch_number.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Batches matching `filter`, ordered by product code then batch number.
    async fn list(&self, filter: &BatchFilter) -> ApiResult<Vec<Batch>>;

    async fn get(&self, id: &str) -> ApiResult<Option<Batch>>;

    /// Fails when `(product_code, batch_number)` is already taken.
    async fn insert(&self, batch: Batch) -> ApiResult<Batch>;

    async fn update(&self, batch: Batch) -> ApiResult<Batch>;

    async fn delete(&self, id: &str) -> ApiResult<Batch>;

    /// Compare-and-decrement for every line, all or nothing.
    ///
    /// Each batch must still hold exactly `expected_available`, be `available` and
    /// belong to `category`; otherwise nothing changes and a conflict is returned.
    /// With `expired_before` set, batches whose expiry date is before it are refused too.
    async fn apply_stock_out(
        &self,
        category: BatchCategory,
        lines: &[StockOutLine],
        expired_before: Option<NaiveDate>,
        updated_by: &str,
    ) -> ApiResult<Vec<Batch>>;

    /// Marks available or reserved batches whose expiry date is before `today` as expired.
    async fn expire_due(&self, today: NaiveDate) -> ApiResult<Vec<Batch>>;
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn record(&self, transactions: Vec<StockTransaction>) -> ApiResult<()>;

    /// Newest first.
    async fn list(&self, filter: &TransactionFilter) -> ApiResult<Vec<StockTransaction>>;
}
