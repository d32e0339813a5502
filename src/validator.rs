// src/validator.rs - Centralized validation module
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::borrow::Cow;
use std::collections::HashMap;
use validator::ValidationError;

use crate::error::ApiError;
use crate::models::CreateBatchRequest;

lazy_static! {
    static ref PRODUCT_CODE_REGEX: Regex = Regex::new(r"^[A-Z]{2,4}-[A-Z0-9]{2,12}$").unwrap();
    static ref BATCH_NUMBER_REGEX: Regex = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9/_.-]{0,49}$").unwrap();
}

// ==================== VALIDATION RESULT ====================

#[derive(Debug, Default, Serialize)]
pub struct ValidationResult {
    pub errors: HashMap<String, Vec<String>>,
    pub warnings: HashMap<String, Vec<String>>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn warning_messages(&self) -> Vec<String> {
        let mut messages: Vec<String> = self
            .warnings
            .iter()
            .flat_map(|(field, warnings)| warnings.iter().map(move |w| format!("{}: {}", field, w)))
            .collect();
        messages.sort();
        messages
    }

    pub fn to_api_error(&self) -> ApiError {
        let mut parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, errors)| format!("{}: {}", field, errors.join(", ")))
            .collect();
        parts.sort();

        ApiError::ValidationError(parts.join("; "))
    }
}

// ==================== FIELD VALIDATORS ====================

fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

pub fn validate_product_code(value: &str) -> Result<(), ValidationError> {
    if PRODUCT_CODE_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(field_error("product_code", "Product code must look like RM-PCM01 (2-4 letter prefix, dash, code)"))
    }
}

pub fn validate_batch_number(value: &str) -> Result<(), ValidationError> {
    if BATCH_NUMBER_REGEX.is_match(value) {
        Ok(())
    } else {
        Err(field_error("batch_number", "Batch number must be 1-50 characters of letters, digits, '/', '_', '.' or '-'"))
    }
}

pub fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(field_error("positive", "Quantity must be positive"))
    }
}

pub fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        Err(field_error("non_negative", "Quantity cannot be negative"))
    }
}

// ==================== BATCH RULES ====================

/// Cross-field checks for a goods receipt that the derive cannot express.
pub fn validate_new_batch(request: &CreateBatchRequest, today: NaiveDate, warn_days: i64) -> ValidationResult {
    let mut result = ValidationResult::new();

    if let Err(e) = request.validate_dates() {
        result.add_error("expiry_date", e);
    }

    if request.manufacturing_date > today {
        result.add_error("manufacturing_date", "Manufacturing date cannot be in the future");
    }

    if let Err(e) = crate::error::validate_quantity(request.quantity) {
        result.add_error("quantity", e.to_string());
    }

    if let Err(e) = crate::error::validate_unit(&request.unit) {
        result.add_error("unit", e.to_string());
    }

    let days_until = (request.expiry_date - today).num_days();
    if days_until < 0 {
        result.add_error("expiry_date", "Batch has already expired");
    } else if days_until <= warn_days {
        result.add_warning("expiry_date", format!("Expires in {} days", days_until));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BatchCategory;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request() -> CreateBatchRequest {
        CreateBatchRequest {
            product_code: "RM-MCC".to_string(),
            product_name: "Microcrystalline cellulose".to_string(),
            batch_number: "MCC-2406".to_string(),
            quantity: dec!(500),
            unit: "kg".to_string(),
            expiry_date: date(2027, 6, 1),
            manufacturing_date: date(2025, 6, 1),
            location: "WH-A-03".to_string(),
            category: BatchCategory::RawMaterial,
            notes: None,
        }
    }

    #[test]
    fn test_product_code() {
        assert!(validate_product_code("RM-PCM").is_ok());
        assert!(validate_product_code("FG-PCM500").is_ok());
        assert!(validate_product_code("rm-pcm").is_err());
        assert!(validate_product_code("PCM").is_err());
    }

    #[test]
    fn test_batch_number() {
        assert!(validate_batch_number("PCM-2401").is_ok());
        assert!(validate_batch_number("L24/001.A").is_ok());
        assert!(validate_batch_number("").is_err());
        assert!(validate_batch_number("-leading").is_err());
    }

    #[test]
    fn test_decimal_validators() {
        assert!(validate_positive(&dec!(0.5)).is_ok());
        assert!(validate_positive(&dec!(0)).is_err());
        assert!(validate_non_negative(&dec!(0)).is_ok());
        assert!(validate_non_negative(&dec!(-1)).is_err());
    }

    #[test]
    fn test_validate_new_batch() {
        let today = date(2026, 1, 10);
        assert!(validate_new_batch(&request(), today, 30).is_valid());

        let mut expired = request();
        expired.expiry_date = date(2026, 1, 1);
        let result = validate_new_batch(&expired, today, 30);
        assert!(!result.is_valid());
        assert!(result.errors.contains_key("expiry_date"));

        let mut soon = request();
        soon.expiry_date = date(2026, 1, 20);
        let result = validate_new_batch(&soon, today, 30);
        assert!(result.is_valid());
        assert_eq!(result.warning_messages(), vec!["expiry_date: Expires in 10 days".to_string()]);

        let mut bad_unit = request();
        bad_unit.unit = "bucket".to_string();
        assert!(validate_new_batch(&bad_unit, today, 30).errors.contains_key("unit"));
    }

    #[test]
    fn test_receipt_quantity_is_capped() {
        let today = date(2026, 1, 10);
        let mut huge = request();
        huge.quantity = Decimal::MAX;
        assert!(validate_new_batch(&huge, today, 30).errors.contains_key("quantity"));

        let mut at_limit = request();
        at_limit.quantity = dec!(1000000000);
        assert!(validate_new_batch(&at_limit, today, 30).is_valid());
    }
}
