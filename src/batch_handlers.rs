// src/batch_handlers.rs
//! Batch maintenance: listing, goods receipt, edits, status changes and expiry views.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use validator::Validate;

use crate::audit::{client_ip, ChangeSet};
use crate::auth::{require_permission, Permission};
use crate::error::{validate_quantity, ApiError, ApiResult};
use crate::handlers::{today, ApiResponse, PaginatedResponse, PaginationQuery};
use crate::models::*;
use crate::repositories::BatchFilter;
use crate::AppState;

// ==================== RESPONSE STRUCTURES ====================

/// Batch with derived expiry and stock-level fields.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    #[serde(flatten)]
    pub batch: Batch,
    pub expiration_status: String,
    pub days_until_expiry: i64,
    pub remaining_percent: Option<Decimal>,
}

impl BatchResponse {
    pub fn new(batch: Batch, today: NaiveDate) -> Self {
        let (expiration_status, days_until_expiry) = calculate_expiration_status(batch.expiry_date, today);
        let remaining_percent = batch.remaining_percent().map(|p| p.round_dp(1));
        Self {
            batch,
            expiration_status,
            days_until_expiry,
            remaining_percent,
        }
    }
}

// ==================== EXPIRATION STATUS ====================

const EXPIRY_CRITICAL_DAYS: i64 = 7;
const EXPIRY_WARNING_DAYS: i64 = 30;

pub fn calculate_expiration_status(expiry_date: NaiveDate, today: NaiveDate) -> (String, i64) {
    let days = (expiry_date - today).num_days();
    let status = if days < 0 {
        "expired"
    } else if days <= EXPIRY_CRITICAL_DAYS {
        "expiring_critical"
    } else if days <= EXPIRY_WARNING_DAYS {
        "expiring_soon"
    } else {
        "ok"
    };
    (status.to_string(), days)
}

// ==================== BATCH QUERY ====================

#[derive(Debug, Deserialize, Default)]
pub struct BatchQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub product_code: Option<String>,
}

impl BatchQuery {
    pub(crate) fn to_filter(&self) -> ApiResult<BatchFilter> {
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(s) => Some(
                BatchStatus::from_str(s).map_err(|_| ApiError::BadRequest(format!("Unknown status '{}'", s)))?,
            ),
            None => None,
        };
        let category = match self.category.as_deref().filter(|s| !s.is_empty()) {
            Some(c) => Some(crate::allocation::parse_category(c)?),
            None => None,
        };

        Ok(BatchFilter {
            category,
            status,
            product_code: self.product_code.clone().filter(|s| !s.is_empty()),
            search: self.search.clone(),
        })
    }
}

// ==================== BATCH CRUD ====================

pub async fn get_all_batches(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<BatchQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Permission::ViewInventory)?;

    let pagination = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
    };
    let (page, per_page, _offset) = pagination.normalize();

    let filter = query.to_filter()?;
    let today = today();
    let batches: Vec<BatchResponse> = app_state
        .batches
        .list(&filter)
        .await?
        .into_iter()
        .map(|b| BatchResponse::new(b, today))
        .collect();

    let response = PaginatedResponse::from_items(batches, page, per_page);
    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

pub async fn get_batch(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Permission::ViewInventory)?;
    let batch_id = path.into_inner();

    let batch = app_state
        .batches
        .get(&batch_id)
        .await?
        .ok_or_else(|| ApiError::batch_not_found(&batch_id))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BatchResponse::new(batch, today()))))
}

/// Goods receipt: a new batch enters stock.
pub async fn create_batch(
    app_state: web::Data<Arc<AppState>>,
    batch_data: web::Json<CreateBatchRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let ctx = require_permission(&http_request, Permission::ManageBatches)?;

    let outcome = app_state
        .stock
        .receive(&ctx, batch_data.into_inner(), today())
        .await?;

    app_state
        .audit
        .audit(
            &ctx,
            "create",
            "batch",
            &outcome.batch.id,
            format!(
                "Received batch {} of {} ({} {})",
                outcome.batch.batch_number, outcome.batch.product_code, outcome.batch.quantity, outcome.batch.unit
            ),
            &http_request,
        )
        .await;

    let message = if outcome.warnings.is_empty() {
        "Batch received".to_string()
    } else {
        format!("Batch received with warnings: {}", outcome.warnings.join("; "))
    };

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
        BatchResponse::new(outcome.batch, today()),
        message,
    )))
}

pub async fn update_batch(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    batch_data: web::Json<UpdateBatchRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let ctx = require_permission(&http_request, Permission::ManageBatches)?;
    let batch_id = path.into_inner();
    batch_data.validate()?;

    let existing = app_state
        .batches
        .get(&batch_id)
        .await?
        .ok_or_else(|| ApiError::batch_not_found(&batch_id))?;

    let updated = apply_update(&existing, &batch_data, &ctx.user_id)?;

    let mut changes = ChangeSet::new();
    changes.add("product_name", &existing.product_name, &updated.product_name);
    changes.add("quantity", &existing.quantity, &updated.quantity);
    changes.add("expiry_date", &existing.expiry_date, &updated.expiry_date);
    changes.add("location", &existing.location, &updated.location);
    changes.add_opt("notes", &existing.notes, &updated.notes);

    if changes.is_empty() {
        return Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(
            BatchResponse::new(existing, today()),
            "No changes".to_string(),
        )));
    }

    let batch = app_state.stock.save_batch(&existing, updated).await?;

    log::info!("Batch {} updated by {}: {}", batch.batch_number, ctx.username, changes.describe());
    app_state
        .audit
        .record(
            Some(&ctx),
            "update",
            "batch",
            Some(&batch.id),
            Some(format!("Updated batch {}", batch.batch_number)),
            Some(changes),
            client_ip(&http_request),
        )
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BatchResponse::new(batch, today()))))
}

fn apply_update(existing: &Batch, request: &UpdateBatchRequest, user_id: &str) -> ApiResult<Batch> {
    let mut batch = existing.clone();

    if let Some(ref name) = request.product_name {
        batch.product_name = name.trim().to_string();
    }
    if let Some(ref location) = request.location {
        batch.location = location.trim().to_string();
    }
    if request.notes.is_some() {
        batch.notes = request.notes.clone();
    }

    let touches_stock = request.quantity.is_some() || request.expiry_date.is_some();
    if touches_stock && existing.status.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Quantity and expiry of a {} batch cannot be changed",
            existing.status
        )));
    }

    if let Some(quantity) = request.quantity {
        validate_quantity(quantity)?;
        if quantity > existing.original_quantity {
            return Err(ApiError::quantity_exceeds_original(quantity, existing.original_quantity));
        }
        batch.quantity = quantity;
    }
    if let Some(expiry_date) = request.expiry_date {
        if expiry_date <= existing.manufacturing_date {
            return Err(ApiError::ValidationError(
                "Expiry date must be after manufacturing date".to_string(),
            ));
        }
        batch.expiry_date = expiry_date;
    }

    batch.updated_by = Some(user_id.to_string());
    batch.updated_at = Utc::now();
    Ok(batch)
}

pub async fn delete_batch(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let ctx = require_permission(&http_request, Permission::DeleteBatches)?;
    let batch_id = path.into_inner();

    let batch = app_state.batches.delete(&batch_id).await?;

    log::info!("Batch {} deleted by {}", batch.batch_number, ctx.username);
    app_state
        .audit
        .audit(
            &ctx,
            "delete",
            "batch",
            &batch.id,
            format!("Deleted batch {} of {}", batch.batch_number, batch.product_code),
            &http_request,
        )
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::<()>::success_with_message(
        (),
        "Batch deleted successfully".to_string(),
    )))
}

// ==================== STATUS ====================

pub async fn change_batch_status(
    app_state: web::Data<Arc<AppState>>,
    path: web::Path<String>,
    body: web::Json<ChangeStatusRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let ctx = require_permission(&http_request, Permission::ChangeBatchStatus)?;
    let batch_id = path.into_inner();

    let existing = app_state
        .batches
        .get(&batch_id)
        .await?
        .ok_or_else(|| ApiError::batch_not_found(&batch_id))?;

    let from = existing.status;
    let to = body.status;
    if !from.can_transition_to(to) {
        return Err(ApiError::invalid_status_transition(from.as_ref(), to.as_ref()));
    }

    let mut updated = existing.clone();
    updated.status = to;
    updated.updated_by = Some(ctx.user_id.clone());
    updated.updated_at = Utc::now();
    let batch = app_state.stock.save_batch(&existing, updated).await?;

    let mut changes = ChangeSet::new();
    changes.add("status", &from, &to);
    let description = match body.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => format!("Status of {} changed: {}", batch.batch_number, reason),
        None => format!("Status of {} changed", batch.batch_number),
    };

    log::info!("Batch {} status {} -> {} by {}", batch.batch_number, from, to, ctx.username);
    app_state
        .audit
        .record(
            Some(&ctx),
            "status_change",
            "batch",
            Some(&batch.id),
            Some(description),
            Some(changes),
            client_ip(&http_request),
        )
        .await;

    Ok(HttpResponse::Ok().json(ApiResponse::success(BatchResponse::new(batch, today()))))
}

// ==================== EXPIRING BATCHES ====================

#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub days: Option<i64>,
    pub category: Option<String>,
}

/// Active batches expiring within `days` (already expired but unmarked ones included).
pub async fn get_expiring_batches(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<ExpiringQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Permission::ViewInventory)?;

    let days = query
        .days
        .unwrap_or(app_state.stock.settings().expiry_warning_days);
    if days < 0 {
        return Err(ApiError::bad_request("days cannot be negative"));
    }

    let filter = BatchFilter {
        category: match query.category.as_deref() {
            Some(c) => Some(crate::allocation::parse_category(c)?),
            None => None,
        },
        ..Default::default()
    };

    let today = today();
    let mut batches: Vec<Batch> = app_state
        .batches
        .list(&filter)
        .await?
        .into_iter()
        .filter(|b| !b.status.is_terminal() && (b.expiry_date - today).num_days() <= days)
        .collect();
    batches.sort_by(|a, b| a.expiry_date.cmp(&b.expiry_date).then_with(|| a.batch_number.cmp(&b.batch_number)));

    let response: Vec<BatchResponse> = batches.into_iter().map(|b| BatchResponse::new(b, today)).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

// ==================== LOW STOCK BATCHES ====================

#[derive(Debug, Deserialize)]
pub struct LowStockQuery {
    /// Remaining percent of original quantity.
    pub threshold: Option<u32>,
}

pub async fn get_low_stock_batches(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<LowStockQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Permission::ViewInventory)?;

    let threshold = query
        .threshold
        .unwrap_or(app_state.stock.settings().low_stock_percent);
    if threshold > 100 {
        return Err(ApiError::bad_request("threshold must be between 0 and 100"));
    }
    let limit = Decimal::from(threshold);

    let mut batches: Vec<(Decimal, Batch)> = app_state
        .batches
        .list(&BatchFilter::default())
        .await?
        .into_iter()
        .filter(|b| !b.status.is_terminal())
        .filter_map(|b| b.remaining_percent().filter(|p| *p <= limit).map(|p| (p, b)))
        .collect();
    batches.sort_by(|a, b| a.0.cmp(&b.0));

    let today = today();
    let response: Vec<BatchResponse> = batches
        .into_iter()
        .map(|(_, b)| BatchResponse::new(b, today))
        .collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn batch(status: BatchStatus) -> Batch {
        let now = Utc::now();
        Batch {
            id: "b-1".to_string(),
            product_code: "RM-PCM".to_string(),
            product_name: "Paracetamol API".to_string(),
            batch_number: "PCM-2401".to_string(),
            quantity: dec!(40),
            original_quantity: dec!(200),
            unit: "kg".to_string(),
            expiry_date: date(2026, 3, 1),
            manufacturing_date: date(2024, 3, 1),
            location: "WH-A-01".to_string(),
            status,
            category: BatchCategory::RawMaterial,
            notes: None,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_expiration_status() {
        let expiry = date(2026, 3, 1);
        assert_eq!(calculate_expiration_status(expiry, date(2026, 3, 2)), ("expired".to_string(), -1));
        assert_eq!(calculate_expiration_status(expiry, date(2026, 3, 1)).0, "expiring_critical");
        assert_eq!(calculate_expiration_status(expiry, date(2026, 2, 10)).0, "expiring_soon");
        assert_eq!(calculate_expiration_status(expiry, date(2025, 12, 1)).0, "ok");
    }

    #[test]
    fn test_apply_update() {
        let existing = batch(BatchStatus::Available);
        let request = UpdateBatchRequest {
            quantity: Some(dec!(25)),
            location: Some(" WH-B-07 ".to_string()),
            ..Default::default()
        };
        let updated = apply_update(&existing, &request, "u-1").unwrap();
        assert_eq!(updated.quantity, dec!(25));
        assert_eq!(updated.location, "WH-B-07");
        assert_eq!(updated.updated_by.as_deref(), Some("u-1"));

        let too_much = UpdateBatchRequest {
            quantity: Some(dec!(250)),
            ..Default::default()
        };
        assert!(matches!(apply_update(&existing, &too_much, "u-1"), Err(ApiError::ValidationError(_))));

        let bad_expiry = UpdateBatchRequest {
            expiry_date: Some(date(2024, 1, 1)),
            ..Default::default()
        };
        assert!(apply_update(&existing, &bad_expiry, "u-1").is_err());
    }

    #[test]
    fn test_apply_update_on_recalled_batch() {
        let existing = batch(BatchStatus::Recalled);
        let quantity = UpdateBatchRequest {
            quantity: Some(dec!(10)),
            ..Default::default()
        };
        assert!(matches!(apply_update(&existing, &quantity, "u"), Err(ApiError::BadRequest(_))));

        let notes = UpdateBatchRequest {
            notes: Some("Quarantine shelf".to_string()),
            ..Default::default()
        };
        assert!(apply_update(&existing, &notes, "u").is_ok());
    }

    #[test]
    fn test_batch_query_filter() {
        let query = BatchQuery {
            status: Some("RESERVED".to_string()),
            category: Some("finished_goods".to_string()),
            ..Default::default()
        };
        let filter = query.to_filter().unwrap();
        assert_eq!(filter.status, Some(BatchStatus::Reserved));
        assert_eq!(filter.category, Some(BatchCategory::FinishedGoods));

        let bad = BatchQuery {
            status: Some("lost".to_string()),
            ..Default::default()
        };
        assert!(bad.to_filter().is_err());
    }
}
