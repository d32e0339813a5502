// src/models/batch.rs
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use validator::Validate;

use crate::validator::{validate_batch_number, validate_non_negative, validate_positive, validate_product_code};

// ==================== ENUMS ====================

/// Lifecycle status of a batch. Only `Available` batches are allocatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Available,
    Reserved,
    Expired,
    Recalled,
}

impl BatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Expired | BatchStatus::Recalled)
    }

    /// available <-> reserved, and either of them into expired or recalled.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        match (*self, next) {
            (from, to) if from == to => false,
            (Available, Reserved) | (Reserved, Available) => true,
            (Available | Reserved, Expired | Recalled) => true,
            _ => false,
        }
    }
}

/// Allocation pools are scoped to a single category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumString, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum BatchCategory {
    RawMaterial,
    SemiFinished,
    FinishedGoods,
}

impl BatchCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            BatchCategory::RawMaterial => "Raw material",
            BatchCategory::SemiFinished => "Semi-finished",
            BatchCategory::FinishedGoods => "Finished goods",
        }
    }
}

// ==================== BATCH ====================

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Batch {
    pub id: String,
    pub product_code: String,
    pub product_name: String,
    pub batch_number: String,
    pub quantity: Decimal,
    pub original_quantity: Decimal,
    pub unit: String,
    pub expiry_date: NaiveDate,
    pub manufacturing_date: NaiveDate,
    pub location: String,
    pub status: BatchStatus,
    pub category: BatchCategory,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    /// True when the batch may take part in an allocation on `today`.
    pub fn is_allocatable(&self, today: NaiveDate, exclude_expired: bool) -> bool {
        self.status == BatchStatus::Available
            && self.quantity > Decimal::ZERO
            && !(exclude_expired && self.is_expired_on(today))
    }

    /// Remaining share of the original quantity, in percent.
    pub fn remaining_percent(&self) -> Option<Decimal> {
        if self.original_quantity <= Decimal::ZERO {
            return None;
        }
        self.quantity
            .checked_div(self.original_quantity)?
            .checked_mul(Decimal::ONE_HUNDRED)
    }
}

// ==================== REQUESTS ====================

#[derive(Debug, Deserialize, Validate, Clone)]
pub struct CreateBatchRequest {
    #[validate(custom(function = "validate_product_code"))]
    pub product_code: String,
    #[validate(length(min = 1, max = 255, message = "Product name must be between 1 and 255 characters"))]
    pub product_name: String,
    #[validate(custom(function = "validate_batch_number"))]
    pub batch_number: String,
    #[validate(custom(function = "validate_positive"))]
    pub quantity: Decimal,
    #[validate(length(min = 1, max = 20, message = "Unit must be between 1 and 20 characters"))]
    pub unit: String,
    pub expiry_date: NaiveDate,
    pub manufacturing_date: NaiveDate,
    #[validate(length(min = 1, max = 255, message = "Location must be between 1 and 255 characters"))]
    pub location: String,
    pub category: BatchCategory,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

impl CreateBatchRequest {
    pub fn validate_dates(&self) -> Result<(), String> {
        if self.expiry_date <= self.manufacturing_date {
            return Err("Expiry date must be after manufacturing date".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Validate, Default)]
pub struct UpdateBatchRequest {
    #[validate(length(min = 1, max = 255, message = "Product name must be between 1 and 255 characters"))]
    pub product_name: Option<String>,
    #[validate(custom(function = "validate_non_negative"))]
    pub quantity: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 255, message = "Location must be between 1 and 255 characters"))]
    pub location: Option<String>,
    #[validate(length(max = 1000, message = "Notes cannot exceed 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: BatchStatus,
    pub reason: Option<String>,
}
