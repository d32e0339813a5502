use actix_web::{HttpResponse, ResponseError};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

use crate::allocation::InvalidRequestError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    InternalServerError(String),
    ValidationError(String),
    InvalidRequest(InvalidRequestError),
    AuthError(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::InvalidRequest(err) => write!(f, "Invalid Request: {}", err),
            ApiError::AuthError(msg) => write!(f, "Auth Error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        let error_response = ErrorResponse {
            success: false,
            message: self.to_string(),
        };

        match self {
            ApiError::BadRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::NotFound(_) => HttpResponse::NotFound().json(error_response),
            ApiError::Unauthorized(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::Forbidden(_) => HttpResponse::Forbidden().json(error_response),
            ApiError::Conflict(_) => HttpResponse::Conflict().json(error_response),
            ApiError::ValidationError(_) => HttpResponse::UnprocessableEntity().json(error_response),
            ApiError::InvalidRequest(_) => HttpResponse::BadRequest().json(error_response),
            ApiError::AuthError(_) => HttpResponse::Unauthorized().json(error_response),
            ApiError::InternalServerError(_) => HttpResponse::InternalServerError().json(error_response),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(err.to_string())
    }
}

impl From<InvalidRequestError> for ApiError {
    fn from(err: InvalidRequestError) -> Self {
        ApiError::InvalidRequest(err)
    }
}

impl From<csv::Error> for ApiError {
    fn from(err: csv::Error) -> Self {
        ApiError::InternalServerError(format!("CSV error: {}", err))
    }
}

// Domain-specific errors
impl ApiError {
    pub fn bad_request(msg: &str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }

    pub fn batch_not_found(id: &str) -> Self {
        ApiError::NotFound(format!("Batch with ID '{}' not found", id))
    }

    pub fn user_not_found(username: &str) -> Self {
        ApiError::NotFound(format!("User '{}' not found", username))
    }

    pub fn batch_already_exists(product_code: &str, batch_number: &str) -> Self {
        ApiError::BadRequest(format!(
            "Batch '{}' already exists for product '{}'",
            batch_number, product_code
        ))
    }

    pub fn insufficient_quantity(available: Decimal, requested: Decimal) -> Self {
        ApiError::Conflict(format!(
            "Insufficient quantity. Available: {}, Requested: {}",
            available, requested
        ))
    }

    pub fn stale_batch(batch_number: &str, expected: Decimal, actual: Decimal) -> Self {
        ApiError::Conflict(format!(
            "Batch '{}' changed since allocation (expected {}, found {}); request a new allocation",
            batch_number, expected, actual
        ))
    }

    pub fn batch_not_allocatable(batch_number: &str, reason: &str) -> Self {
        ApiError::Conflict(format!("Batch '{}' cannot be issued: {}", batch_number, reason))
    }

    pub fn invalid_status_transition(from: &str, to: &str) -> Self {
        ApiError::BadRequest(format!("Cannot change batch status from '{}' to '{}'", from, to))
    }

    pub fn quantity_exceeds_original(quantity: Decimal, original: Decimal) -> Self {
        ApiError::ValidationError(format!(
            "Quantity {} cannot exceed original quantity {}",
            quantity, original
        ))
    }

    pub fn permission_denied() -> Self {
        ApiError::Forbidden("Insufficient permissions".to_string())
    }
}

// Validation helpers
pub fn validate_quantity(quantity: Decimal) -> Result<(), ApiError> {
    if quantity < Decimal::ZERO {
        return Err(ApiError::ValidationError("Quantity cannot be negative".to_string()));
    }
    if quantity > Decimal::from(1_000_000_000i64) {
        return Err(ApiError::ValidationError("Quantity too large".to_string()));
    }
    Ok(())
}

pub fn validate_unit(unit: &str) -> Result<(), ApiError> {
    let valid_units = ["g", "kg", "mg", "L", "mL", "tablet", "capsule", "vial", "ampoule", "box", "pcs"];
    if !valid_units.contains(&unit) {
        return Err(ApiError::ValidationError(format!(
            "Invalid unit '{}'. Valid units: {}",
            unit,
            valid_units.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::batch_not_found("x").error_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::stale_batch("B-1", dec!(10), dec!(4)).error_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(InvalidRequestError::NonPositiveQuantity(dec!(-5)))
                .error_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::permission_denied().error_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(dec!(0)).is_ok());
        assert!(validate_quantity(dec!(12.5)).is_ok());
        assert!(validate_quantity(dec!(-0.001)).is_err());
        assert!(validate_quantity(dec!(2000000000)).is_err());
    }

    #[test]
    fn test_validate_unit() {
        assert!(validate_unit("kg").is_ok());
        assert!(validate_unit("tablet").is_ok());
        assert!(validate_unit("bucket").is_err());
    }
}
