// src/allocation.rs
//! Batch allocation for stock-out requests.
//!
//! `allocate` is a pure function over a snapshot of batches: it sorts the pool by the
//! strategy's date key and greedily takes from the earliest batch until the request is
//! covered. It never mutates the pool; committing a plan belongs to
//! [`crate::stock_transactions`].

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use strum::{AsRefStr, Display, EnumString};

use crate::models::{Batch, BatchCategory};

// ==================== STRATEGY ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStrategy {
    /// First expired, first out: ascending `expiry_date`.
    #[default]
    Fefo,
    /// First in, first out: ascending `manufacturing_date`.
    Fifo,
}

impl AllocationStrategy {
    fn sort_key(&self, batch: &Batch) -> NaiveDate {
        match self {
            AllocationStrategy::Fefo => batch.expiry_date,
            AllocationStrategy::Fifo => batch.manufacturing_date,
        }
    }

    fn compare(&self, a: &Batch, b: &Batch) -> Ordering {
        self.sort_key(a)
            .cmp(&self.sort_key(b))
            .then_with(|| a.batch_number.cmp(&b.batch_number))
            .then_with(|| a.id.cmp(&b.id))
    }
}

// ==================== ERRORS ====================

#[derive(Debug, Clone, PartialEq)]
pub enum InvalidRequestError {
    NonPositiveQuantity(Decimal),
    UnknownCategory(String),
}

impl fmt::Display for InvalidRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidRequestError::NonPositiveQuantity(q) => {
                write!(f, "requested quantity must be positive, got {}", q)
            }
            InvalidRequestError::UnknownCategory(c) => write!(f, "unknown category '{}'", c),
        }
    }
}

impl std::error::Error for InvalidRequestError {}

pub fn parse_category(value: &str) -> Result<BatchCategory, InvalidRequestError> {
    BatchCategory::from_str(value.trim())
        .map_err(|_| InvalidRequestError::UnknownCategory(value.to_string()))
}

// ==================== RESULT ====================

/// One line of a plan: which batch and how much of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub batch_id: String,
    pub batch_number: String,
    pub product_code: String,
    pub expiry_date: NaiveDate,
    pub manufacturing_date: NaiveDate,
    pub location: String,
    /// Batch quantity at planning time.
    pub available_quantity: Decimal,
    pub allocated_quantity: Decimal,
}

impl Allocation {
    fn from_batch(batch: &Batch, allocated_quantity: Decimal) -> Self {
        Self {
            batch_id: batch.id.clone(),
            batch_number: batch.batch_number.clone(),
            product_code: batch.product_code.clone(),
            expiry_date: batch.expiry_date,
            manufacturing_date: batch.manufacturing_date,
            location: batch.location.clone(),
            available_quantity: batch.quantity,
            allocated_quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub strategy: AllocationStrategy,
    pub requested_quantity: Decimal,
    pub allocations: Vec<Allocation>,
    pub shortage: Decimal,
}

impl AllocationResult {
    pub fn allocated_total(&self) -> Decimal {
        self.allocations.iter().map(|a| a.allocated_quantity).sum()
    }

    pub fn is_fully_allocated(&self) -> bool {
        self.shortage.is_zero()
    }
}

// ==================== ALLOCATOR ====================

/// Plans which batches satisfy `requested_quantity`, in strategy order.
///
/// The pool is expected to be pre-filtered (see [`allocatable_pool`]). Batches with no
/// positive quantity are skipped. An empty pool is not an error: the whole request
/// comes back as shortage.
pub fn allocate(
    pool: &[Batch],
    requested_quantity: Decimal,
    strategy: AllocationStrategy,
) -> Result<AllocationResult, InvalidRequestError> {
    if requested_quantity <= Decimal::ZERO {
        return Err(InvalidRequestError::NonPositiveQuantity(requested_quantity));
    }

    let mut ordered: Vec<&Batch> = pool.iter().collect();
    ordered.sort_by(|a, b| strategy.compare(a, b));

    let mut remaining = requested_quantity;
    let mut allocations = Vec::new();

    for batch in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        let allocated = batch.quantity.max(Decimal::ZERO).min(remaining);
        if allocated > Decimal::ZERO {
            allocations.push(Allocation::from_batch(batch, allocated));
            remaining -= allocated;
        }
    }

    Ok(AllocationResult {
        strategy,
        requested_quantity,
        allocations,
        shortage: remaining.max(Decimal::ZERO),
    })
}

/// Selects the batches of `category` that may be allocated on `today`.
pub fn allocatable_pool<'a, I>(
    batches: I,
    category: BatchCategory,
    product_code: Option<&str>,
    today: NaiveDate,
    exclude_expired: bool,
) -> Vec<Batch>
where
    I: IntoIterator<Item = &'a Batch>,
{
    batches
        .into_iter()
        .filter(|b| b.category == category)
        .filter(|b| product_code.map_or(true, |code| b.product_code == code))
        .filter(|b| b.is_allocatable(today, exclude_expired))
        .cloned()
        .collect()
}
