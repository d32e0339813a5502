// src/models/transaction.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use validator::Validate;

use super::batch::BatchCategory;
use crate::allocation::AllocationStrategy;
use crate::validator::{validate_positive, validate_product_code};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    StockIn,
    StockOut,
}

/// Audit record of a committed stock movement on one batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: String,
    pub transaction_type: TransactionType,
    pub batch_id: String,
    pub batch_number: String,
    pub product_code: String,
    pub category: BatchCategory,
    pub quantity: Decimal,
    pub balance_after: Decimal,
    pub reference: Option<String>,
    pub performed_by: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct TransactionFilter {
    pub batch_id: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub category: Option<BatchCategory>,
}

// ==================== ALLOCATION / STOCK-OUT REQUESTS ====================

/// Request body for previewing an allocation plan.
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct AllocationRequest {
    #[validate(length(min = 1, max = 50, message = "Category is required"))]
    pub category: String,
    pub requested_quantity: Decimal,
    pub strategy: Option<AllocationStrategy>,
    #[validate(custom(function = "validate_product_code"))]
    pub product_code: Option<String>,
}

/// One committed line of a previously previewed plan.
#[derive(Debug, Deserialize, Serialize, Validate, Clone)]
pub struct StockOutLine {
    #[validate(length(min = 1, message = "Batch ID is required"))]
    pub batch_id: String,
    #[validate(custom(function = "validate_positive"))]
    pub quantity: Decimal,
    /// Batch quantity the plan was computed from; checked again at commit time.
    pub expected_available: Decimal,
}

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CommitStockOutRequest {
    pub category: BatchCategory,
    #[validate(length(min = 1, max = 100, message = "Reference must be between 1 and 100 characters"))]
    pub reference: Option<String>,
    #[validate(length(min = 1, message = "At least one line is required"), nested)]
    pub lines: Vec<StockOutLine>,
}

/// Allocate and commit in one step.
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct IssueStockRequest {
    #[validate(nested)]
    pub allocation: AllocationRequest,
    #[validate(length(min = 1, max = 100, message = "Reference must be between 1 and 100 characters"))]
    pub reference: Option<String>,
    #[serde(default)]
    pub allow_partial: bool,
}
