// src/approval.rs
//! Procurement approval chain by purchase amount.

use actix_web::{web, HttpRequest, HttpResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{AsRefStr, Display};
use validator::Validate;

use crate::auth::{require_permission, Permission};
use crate::config::ApprovalConfig;
use crate::error::{ApiError, ApiResult};
use crate::handlers::ApiResponse;
use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    DepartmentHead,
    Director,
    GeneralDirector,
}

/// Sign-offs needed for a purchase of `amount`, in signing order.
pub fn required_approvals(amount: Decimal, limits: &ApprovalConfig) -> ApiResult<Vec<ApprovalLevel>> {
    if amount <= Decimal::ZERO {
        return Err(ApiError::BadRequest(format!(
            "Purchase amount must be positive, got {}",
            amount
        )));
    }

    let levels = if amount < limits.auto_approve_below {
        vec![]
    } else if amount <= limits.department_head_limit {
        vec![ApprovalLevel::DepartmentHead]
    } else if amount <= limits.director_limit {
        vec![ApprovalLevel::DepartmentHead, ApprovalLevel::Director]
    } else {
        vec![
            ApprovalLevel::DepartmentHead,
            ApprovalLevel::Director,
            ApprovalLevel::GeneralDirector,
        ]
    };
    Ok(levels)
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApprovalCheckRequest {
    pub amount: Decimal,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalCheckResponse {
    pub amount: Decimal,
    pub auto_approved: bool,
    pub required_approvals: Vec<ApprovalLevel>,
}

pub async fn check_approval(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<ApprovalCheckRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let ctx = require_permission(&http_request, Permission::CheckApproval)?;
    body.validate()?;

    let required = required_approvals(body.amount, &app_state.config.approval)?;
    log::debug!("{} checked approval for {}: {:?}", ctx.username, body.amount, required);

    Ok(HttpResponse::Ok().json(ApiResponse::success(ApprovalCheckResponse {
        amount: body.amount,
        auto_approved: required.is_empty(),
        required_approvals: required,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_thresholds() {
        let limits = ApprovalConfig::default();
        assert!(required_approvals(dec!(999.99), &limits).unwrap().is_empty());
        assert_eq!(
            required_approvals(dec!(1000), &limits).unwrap(),
            vec![ApprovalLevel::DepartmentHead]
        );
        assert_eq!(
            required_approvals(dec!(10000), &limits).unwrap(),
            vec![ApprovalLevel::DepartmentHead]
        );
        assert_eq!(
            required_approvals(dec!(10000.01), &limits).unwrap(),
            vec![ApprovalLevel::DepartmentHead, ApprovalLevel::Director]
        );
        assert_eq!(required_approvals(dec!(100000), &limits).unwrap().len(), 2);
        assert_eq!(
            required_approvals(dec!(250000), &limits).unwrap().last(),
            Some(&ApprovalLevel::GeneralDirector)
        );
    }

    #[test]
    fn test_non_positive_amount() {
        let limits = ApprovalConfig::default();
        assert!(matches!(required_approvals(dec!(0), &limits), Err(ApiError::BadRequest(_))));
        assert!(required_approvals(dec!(-50), &limits).is_err());
    }
}
