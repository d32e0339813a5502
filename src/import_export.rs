// src/import_export.rs
//! CSV exports of stock and stock movements.

use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;

use crate::auth::{require_permission, Permission};
use crate::batch_handlers::BatchQuery;
use crate::error::{ApiError, ApiResult};
use crate::models::{Batch, StockTransaction, TransactionFilter};
use crate::AppState;

const BATCH_HEADERS: [&str; 13] = [
    "Product Code",
    "Product Name",
    "Batch Number",
    "Category",
    "Quantity",
    "Original Quantity",
    "Unit",
    "Manufacturing Date",
    "Expiry Date",
    "Location",
    "Status",
    "Notes",
    "Updated At",
];

pub fn batches_to_csv(batches: &[Batch]) -> ApiResult<Vec<u8>> {
    let mut csv_data = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut csv_data);
        writer.write_record(BATCH_HEADERS)?;

        for batch in batches {
            writer.write_record([
                batch.product_code.clone(),
                batch.product_name.clone(),
                batch.batch_number.clone(),
                batch.category.to_string(),
                batch.quantity.to_string(),
                batch.original_quantity.to_string(),
                batch.unit.clone(),
                batch.manufacturing_date.to_string(),
                batch.expiry_date.to_string(),
                batch.location.clone(),
                batch.status.to_string(),
                batch.notes.clone().unwrap_or_default(),
                batch.updated_at.to_rfc3339(),
            ])?;
        }

        writer
            .flush()
            .map_err(|e| ApiError::InternalServerError(e.to_string()))?;
    }
    Ok(csv_data)
}

pub fn transactions_to_csv(transactions: &[StockTransaction]) -> ApiResult<Vec<u8>> {
    let mut csv_data = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut csv_data);
        writer.write_record([
            "Date",
            "Type",
            "Product Code",
            "Batch Number",
            "Category",
            "Quantity",
            "Balance After",
            "Reference",
            "Performed By",
        ])?;

        for tx in transactions {
            writer.write_record([
                tx.created_at.to_rfc3339(),
                tx.transaction_type.to_string(),
                tx.product_code.clone(),
                tx.batch_number.clone(),
                tx.category.to_string(),
                tx.quantity.to_string(),
                tx.balance_after.to_string(),
                tx.reference.clone().unwrap_or_default(),
                tx.performed_by.clone(),
            ])?;
        }

        writer
            .flush()
            .map_err(|e| ApiError::InternalServerError(e.to_string()))?;
    }
    Ok(csv_data)
}

fn csv_response(filename: &str, body: Vec<u8>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", filename),
        ))
        .body(body)
}

pub async fn export_batches(
    app_state: web::Data<Arc<AppState>>,
    query: web::Query<BatchQuery>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let ctx = require_permission(&http_request, Permission::ExportData)?;

    let batches = app_state.batches.list(&query.to_filter()?).await?;
    let body = batches_to_csv(&batches)?;

    log::info!("{} exported {} batches", ctx.username, batches.len());
    Ok(csv_response("batches.csv", body))
}

pub async fn export_transactions(
    app_state: web::Data<Arc<AppState>>,
    http_request: HttpRequest,
) -> ApiResult<HttpResponse> {
    let ctx = require_permission(&http_request, Permission::ExportData)?;

    let transactions = app_state
        .stock
        .list_transactions(&TransactionFilter::default())
        .await?;
    let body = transactions_to_csv(&transactions)?;

    log::info!("{} exported {} transactions", ctx.username, transactions.len());
    Ok(csv_response("stock_transactions.csv", body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::demo_batches;
    use chrono::NaiveDate;

    #[test]
    fn test_batches_to_csv() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let batches = demo_batches(today);
        let csv = String::from_utf8(batches_to_csv(&batches).unwrap()).unwrap();

        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("Product Code,Product Name,Batch Number"));
        assert_eq!(csv.lines().count(), batches.len() + 1);
        // product names with commas get quoted
        assert!(csv.contains("\"Paracetamol 500 mg tablets, 20 pcs\""));
        assert!(csv.contains("raw_material"));
    }

    #[test]
    fn test_empty_transactions_csv_has_header() {
        let csv = String::from_utf8(transactions_to_csv(&[]).unwrap()).unwrap();
        assert_eq!(csv.trim_end(), "Date,Type,Product Code,Batch Number,Category,Quantity,Balance After,Reference,Performed By");
    }
}
