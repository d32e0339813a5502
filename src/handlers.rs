// src/handlers.rs
use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::{require_permission, Permission};
use crate::error::ApiResult;
use crate::config::InventoryConfig;
use crate::models::{Batch, BatchStatus, DashboardStats};
use crate::repositories::BatchFilter;
use crate::AppState;

// ==================== COMMON STRUCTURES ====================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl<T> PaginatedResponse<T> {
    /// Slices one page out of an already filtered and ordered list.
    pub fn from_items(items: Vec<T>, page: i64, per_page: i64) -> Self {
        let total = items.len() as i64;
        let offset = usize::try_from(page.saturating_sub(1).saturating_mul(per_page)).unwrap_or(usize::MAX);
        let data: Vec<T> = items.into_iter().skip(offset).take(per_page as usize).collect();
        let total_pages = (total + per_page - 1) / per_page;

        Self {
            data,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

const MAX_PAGE: i64 = 1_000_000;

#[derive(Debug, Deserialize, Default)]
pub struct PaginationQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl PaginationQuery {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).clamp(1, MAX_PAGE);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

/// Calendar date used for expiry decisions.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// ==================== DASHBOARD STATISTICS ====================

fn dashboard_stats(batches: &[Batch], settings: &InventoryConfig, today: NaiveDate) -> DashboardStats {
    let mut stats = DashboardStats {
        total_batches: batches.len(),
        quantity_by_category: BTreeMap::new(),
        ..Default::default()
    };

    let low_stock_limit = Decimal::from(settings.low_stock_percent);
    for batch in batches {
        match batch.status {
            BatchStatus::Available => stats.available_batches += 1,
            BatchStatus::Expired => stats.expired_batches += 1,
            BatchStatus::Recalled => stats.recalled_batches += 1,
            BatchStatus::Reserved => {}
        }

        if batch.status.is_terminal() {
            continue;
        }

        let days_left = (batch.expiry_date - today).num_days();
        if (0..=settings.expiry_warning_days).contains(&days_left) {
            stats.expiring_soon_batches += 1;
        }
        if batch.remaining_percent().map_or(false, |p| p <= low_stock_limit) {
            stats.low_stock_batches += 1;
        }
        if batch.status == BatchStatus::Available {
            let total = stats
                .quantity_by_category
                .entry(batch.category)
                .or_insert(Decimal::ZERO);
            *total = total.saturating_add(batch.quantity);
        }
    }
    stats
}


pub async fn get_dashboard_stats(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_permission(&http_request, Permission::ViewInventory)?;

    let batches = app_state.batches.list(&BatchFilter::default()).await?;
    let stats = dashboard_stats(&batches, app_state.stock.settings(), today());

    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}
