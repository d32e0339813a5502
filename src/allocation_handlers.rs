// src/allocation_handlers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

use crate::allocation::parse_category;
use crate::auth::{require_permission, Permission};
use crate::error::{ApiError, ApiResult};
use crate::handlers::{today, ApiResponse, PaginatedResponse, PaginationQuery};
use crate::models::{AllocationRequest, CommitStockOutRequest, IssueStockRequest, TransactionFilter, TransactionType};
use crate::AppState;

pub async fn preview_allocation(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<AllocationRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Permission::PreviewAllocation)?;

    let result = app_state.stock.preview(&body, today()).await?;
    let message = if result.is_fully_allocated() {
        format!("Allocated {} from {} batch(es)", result.allocated_total(), result.allocations.len())
    } else {
        format!("Insufficient stock: shortage of {}", result.shortage)
    };

    Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(result, message)))
}

pub async fn commit_stock_out(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<CommitStockOutRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let ctx = require_permission(&http_request, Permission::CommitStockOut)?;

    let receipt = app_state.stock.commit_stock_out(&ctx, body.into_inner(), today()).await?;

    for tx in &receipt.transactions {
        app_state
            .audit
            .audit(
                &ctx,
                "stock_out",
                "batch",
                &tx.batch_id,
                format!("Issued {} from {} (balance {})", tx.quantity, tx.batch_number, tx.balance_after),
                &http_request,
            )
            .await;
    }

    Ok(HttpResponse::Created().json(ApiResponse::success(receipt)))
}

pub async fn issue_stock(
    app_state: web::Data<Arc<AppState>>,
    body: web::Json<IssueStockRequest>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let ctx = require_permission(&http_request, Permission::CommitStockOut)?;

    let outcome = app_state.stock.issue(&ctx, body.into_inner(), today()).await?;

    for tx in &outcome.receipt.transactions {
        app_state
            .audit
            .audit(
                &ctx,
                "stock_out",
                "batch",
                &tx.batch_id,
                format!("Issued {} from {} (balance {})", tx.quantity, tx.batch_number, tx.balance_after),
                &http_request,
            )
            .await;
    }

    let message = if outcome.allocation.is_fully_allocated() {
        "Stock issued".to_string()
    } else {
        format!("Partially issued, shortage of {}", outcome.allocation.shortage)
    };

    Ok(HttpResponse::Created().json(ApiResponse::success_with_message(outcome, message)))
}

// ==================== TRANSACTIONS ====================

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub batch_id: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub category: Option<String>,
}

impl TransactionQuery {
    fn to_filter(&self) -> ApiResult<TransactionFilter> {
        let transaction_type = match self.transaction_type.as_deref() {
            Some(t) => Some(
                TransactionType::from_str(t)
                    .map_err(|_| ApiError::BadRequest(format!("Unknown transaction type '{}'", t)))?,
            ),
            None => None,
        };
        let category = match self.category.as_deref() {
            Some(c) => Some(parse_category(c)?),
            None => None,
        };

        Ok(TransactionFilter {
            batch_id: self.batch_id.clone(),
            transaction_type,
            category,
        })
    }
}

pub async fn get_transactions(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<TransactionQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Permission::ViewTransactions)?;

    let (page, per_page, _offset) = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
    }
    .normalize();

    let transactions = app_state.stock.list_transactions(&query.to_filter()?).await?;
    let response = PaginatedResponse::from_items(transactions, page, per_page);

    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}
