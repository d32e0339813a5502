// src/repositories/memory.rs
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::{BatchFilter, BatchRepository, TransactionRepository};
use crate::error::{ApiError, ApiResult};
use crate::models::{Batch, BatchCategory, BatchStatus, StockOutLine, StockTransaction, TransactionFilter};

// ==================== BATCHES ====================

#[derive(Default)]
pub struct InMemoryBatchRepository {
    batches: RwLock<HashMap<String, Batch>>,
}

impl InMemoryBatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batches(batches: Vec<Batch>) -> Self {
        let map = batches.into_iter().map(|b| (b.id.clone(), b)).collect();
        Self {
            batches: RwLock::new(map),
        }
    }
}

fn check_stock_out_line(
    batch: Option<&Batch>,
    category: BatchCategory,
    line: &StockOutLine,
    expired_before: Option<NaiveDate>,
) -> ApiResult<()> {
    let batch = batch.ok_or_else(|| ApiError::batch_not_found(&line.batch_id))?;

    if batch.category != category {
        return Err(ApiError::batch_not_allocatable(
            &batch.batch_number,
            &format!("belongs to category '{}'", batch.category),
        ));
    }
    if batch.status != BatchStatus::Available {
        return Err(ApiError::batch_not_allocatable(
            &batch.batch_number,
            &format!("status is '{}'", batch.status),
        ));
    }
    if let Some(today) = expired_before {
        if batch.is_expired_on(today) {
            return Err(ApiError::batch_not_allocatable(
                &batch.batch_number,
                &format!("expired on {}", batch.expiry_date),
            ));
        }
    }
    if batch.quantity != line.expected_available {
        return Err(ApiError::stale_batch(
            &batch.batch_number,
            line.expected_available,
            batch.quantity,
        ));
    }
    Ok(())
}

#[async_trait]
impl BatchRepository for InMemoryBatchRepository {
    async fn list(&self, filter: &BatchFilter) -> ApiResult<Vec<Batch>> {
        let batches = self.batches.read().await;
        let mut result: Vec<Batch> = batches.values().filter(|b| filter.matches(b)).cloned().collect();
        result.sort_by(|a, b| {
            a.product_code
                .cmp(&b.product_code)
                .then_with(|| a.batch_number.cmp(&b.batch_number))
        });
        Ok(result)
    }

    async fn get(&self, id: &str) -> ApiResult<Option<Batch>> {
        Ok(self.batches.read().await.get(id).cloned())
    }

    async fn insert(&self, batch: Batch) -> ApiResult<Batch> {
        let mut batches = self.batches.write().await;

        let duplicate = batches
            .values()
            .any(|b| b.product_code == batch.product_code && b.batch_number == batch.batch_number);
        if duplicate {
            return Err(ApiError::batch_already_exists(&batch.product_code, &batch.batch_number));
        }
        if batches.contains_key(&batch.id) {
            return Err(ApiError::Conflict(format!("Batch ID '{}' already in use", batch.id)));
        }

        batches.insert(batch.id.clone(), batch.clone());
        Ok(batch)
    }

    async fn update(&self, batch: Batch) -> ApiResult<Batch> {
        let mut batches = self.batches.write().await;
        match batches.get_mut(&batch.id) {
            Some(existing) => {
                *existing = batch.clone();
                Ok(batch)
            }
            None => Err(ApiError::batch_not_found(&batch.id)),
        }
    }

    async fn delete(&self, id: &str) -> ApiResult<Batch> {
        self.batches
            .write()
            .await
            .remove(id)
            .ok_or_else(|| ApiError::batch_not_found(id))
    }

    async fn apply_stock_out(
        &self,
        category: BatchCategory,
        lines: &[StockOutLine],
        expired_before: Option<NaiveDate>,
        updated_by: &str,
    ) -> ApiResult<Vec<Batch>> {
        let mut batches = self.batches.write().await;

        let mut seen = HashSet::new();
        for line in lines {
            if !seen.insert(line.batch_id.as_str()) {
                return Err(ApiError::BadRequest(format!(
                    "Batch '{}' appears more than once in the request",
                    line.batch_id
                )));
            }
            check_stock_out_line(batches.get(&line.batch_id), category, line, expired_before)?;
            if line.quantity <= Decimal::ZERO || line.quantity > line.expected_available {
                return Err(ApiError::insufficient_quantity(line.expected_available, line.quantity));
            }
        }

        let now = Utc::now();
        let mut updated = Vec::with_capacity(lines.len());
        for line in lines {
            if let Some(batch) = batches.get_mut(&line.batch_id) {
                batch.quantity -= line.quantity;
                batch.updated_by = Some(updated_by.to_string());
                batch.updated_at = now;
                updated.push(batch.clone());
            }
        }
        Ok(updated)
    }

    async fn expire_due(&self, today: NaiveDate) -> ApiResult<Vec<Batch>> {
        let mut batches = self.batches.write().await;
        let now = Utc::now();
        let mut expired = Vec::new();

        for batch in batches.values_mut() {
            let active = matches!(batch.status, BatchStatus::Available | BatchStatus::Reserved);
            if active && batch.is_expired_on(today) {
                batch.status = BatchStatus::Expired;
                batch.updated_by = Some("system".to_string());
                batch.updated_at = now;
                expired.push(batch.clone());
            }
        }
        Ok(expired)
    }
}

// ==================== TRANSACTIONS ====================

#[derive(Default)]
pub struct InMemoryTransactionRepository {
    transactions: RwLock<Vec<StockTransaction>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn record(&self, transactions: Vec<StockTransaction>) -> ApiResult<()> {
        self.transactions.write().await.extend(transactions);
        Ok(())
    }

    async fn list(&self, filter: &TransactionFilter) -> ApiResult<Vec<StockTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .iter()
            .rev()
            .filter(|t| filter.batch_id.as_ref().map_or(true, |id| &t.batch_id == id))
            .filter(|t| filter.transaction_type.map_or(true, |ty| t.transaction_type == ty))
            .filter(|t| filter.category.map_or(true, |c| t.category == c))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TransactionType;
    use rust_decimal_macros::dec;

    fn batch(id: &str, number: &str, quantity: Decimal) -> Batch {
        let now = Utc::now();
        Batch {
            id: id.to_string(),
            product_code: "RM-PCM".to_string(),
            product_name: "Paracetamol API".to_string(),
            batch_number: number.to_string(),
            quantity,
            original_quantity: dec!(100),
            unit: "kg".to_string(),
            expiry_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            manufacturing_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            location: "WH-A".to_string(),
            status: BatchStatus::Available,
            category: BatchCategory::RawMaterial,
            notes: None,
            created_by: None,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(id: &str, quantity: Decimal, expected: Decimal) -> StockOutLine {
        StockOutLine {
            batch_id: id.to_string(),
            quantity,
            expected_available: expected,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_batch_number() {
        let repo = InMemoryBatchRepository::new();
        repo.insert(batch("1", "PCM-01", dec!(10))).await.unwrap();
        let err = repo.insert(batch("2", "PCM-01", dec!(10))).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let mut other_product = batch("3", "PCM-01", dec!(10));
        other_product.product_code = "RM-MCC".to_string();
        assert!(repo.insert(other_product).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_filters_and_orders() {
        let mut reserved = batch("2", "PCM-02", dec!(5));
        reserved.status = BatchStatus::Reserved;
        let repo = InMemoryBatchRepository::with_batches(vec![
            reserved,
            batch("1", "PCM-01", dec!(10)),
        ]);

        let all = repo.list(&BatchFilter::default()).await.unwrap();
        let numbers: Vec<_> = all.iter().map(|b| b.batch_number.as_str()).collect();
        assert_eq!(numbers, vec!["PCM-01", "PCM-02"]);

        let filter = BatchFilter {
            status: Some(BatchStatus::Reserved),
            ..Default::default()
        };
        assert_eq!(repo.list(&filter).await.unwrap().len(), 1);

        let filter = BatchFilter {
            search: Some("paracetamol".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.list(&filter).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_apply_stock_out_decrements() {
        let repo = InMemoryBatchRepository::with_batches(vec![
            batch("1", "PCM-01", dec!(10)),
            batch("2", "PCM-02", dec!(20)),
        ]);
        let updated = repo
            .apply_stock_out(
                BatchCategory::RawMaterial,
                &[line("1", dec!(10), dec!(10)), line("2", dec!(5), dec!(20))],
                None,
                "u-1",
            )
            .await
            .unwrap();

        assert_eq!(updated.len(), 2);
        assert_eq!(repo.get("1").await.unwrap().unwrap().quantity, dec!(0));
        assert_eq!(repo.get("2").await.unwrap().unwrap().quantity, dec!(15));
        assert_eq!(repo.get("2").await.unwrap().unwrap().updated_by.as_deref(), Some("u-1"));
    }

    #[tokio::test]
    async fn test_apply_stock_out_is_all_or_nothing() {
        let repo = InMemoryBatchRepository::with_batches(vec![
            batch("1", "PCM-01", dec!(10)),
            batch("2", "PCM-02", dec!(20)),
        ]);
        let err = repo
            .apply_stock_out(
                BatchCategory::RawMaterial,
                &[line("1", dec!(10), dec!(10)), line("2", dec!(5), dec!(25))],
                None,
                "u-1",
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(repo.get("1").await.unwrap().unwrap().quantity, dec!(10));
        assert_eq!(repo.get("2").await.unwrap().unwrap().quantity, dec!(20));
    }

    #[tokio::test]
    async fn test_apply_stock_out_checks_status_and_category() {
        let mut recalled = batch("1", "PCM-01", dec!(10));
        recalled.status = BatchStatus::Recalled;
        let repo = InMemoryBatchRepository::with_batches(vec![recalled, batch("2", "PCM-02", dec!(20))]);

        let err = repo
            .apply_stock_out(BatchCategory::RawMaterial, &[line("1", dec!(1), dec!(10))], None, "u")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err = repo
            .apply_stock_out(BatchCategory::FinishedGoods, &[line("2", dec!(1), dec!(20))], None, "u")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));

        let err = repo
            .apply_stock_out(
                BatchCategory::RawMaterial,
                &[line("2", dec!(1), dec!(20)), line("2", dec!(1), dec!(20))],
                None,
                "u",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = repo
            .apply_stock_out(BatchCategory::RawMaterial, &[line("missing", dec!(1), dec!(1))], None, "u")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expire_due() {
        let mut reserved = batch("2", "PCM-02", dec!(5));
        reserved.status = BatchStatus::Reserved;
        let mut recalled = batch("3", "PCM-03", dec!(5));
        recalled.status = BatchStatus::Recalled;
        let repo = InMemoryBatchRepository::with_batches(vec![batch("1", "PCM-01", dec!(10)), reserved, recalled]);

        let none = repo.expire_due(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()).await.unwrap();
        assert!(none.is_empty());

        let expired = repo.expire_due(NaiveDate::from_ymd_opt(2026, 6, 2).unwrap()).await.unwrap();
        assert_eq!(expired.len(), 2);
        assert_eq!(repo.get("3").await.unwrap().unwrap().status, BatchStatus::Recalled);
        assert_eq!(repo.get("1").await.unwrap().unwrap().status, BatchStatus::Expired);
    }

    #[tokio::test]
    async fn test_transactions_newest_first_and_filtered() {
        let repo = InMemoryTransactionRepository::new();
        let tx = |id: &str, ty: TransactionType| StockTransaction {
            id: id.to_string(),
            transaction_type: ty,
            batch_id: "1".to_string(),
            batch_number: "PCM-01".to_string(),
            product_code: "RM-PCM".to_string(),
            category: BatchCategory::RawMaterial,
            quantity: dec!(1),
            balance_after: dec!(9),
            reference: None,
            performed_by: "u".to_string(),
            created_at: Utc::now(),
        };
        repo.record(vec![tx("a", TransactionType::StockIn), tx("b", TransactionType::StockOut)])
            .await
            .unwrap();

        let all = repo.list(&TransactionFilter::default()).await.unwrap();
        assert_eq!(all.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["b", "a"]);

        let filter = TransactionFilter {
            transaction_type: Some(TransactionType::StockIn),
            ..Default::default()
        };
        assert_eq!(repo.list(&filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_stock_out_refuses_expired_batch() {
        let repo = InMemoryBatchRepository::with_batches(vec![batch("1", "PCM-01", dec!(10))]);
        let after_expiry = NaiveDate::from_ymd_opt(2026, 6, 2).unwrap();

        let err = repo
            .apply_stock_out(BatchCategory::RawMaterial, &[line("1", dec!(4), dec!(10))], Some(after_expiry), "u")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(repo.get("1").await.unwrap().unwrap().quantity, dec!(10));

        // expiry day itself is still usable
        let on_expiry = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        repo.apply_stock_out(BatchCategory::RawMaterial, &[line("1", dec!(4), dec!(10))], Some(on_expiry), "u")
            .await
            .unwrap();

        repo.apply_stock_out(BatchCategory::RawMaterial, &[line("1", dec!(6), dec!(6))], None, "u")
            .await
            .unwrap();
        assert_eq!(repo.get("1").await.unwrap().unwrap().quantity, dec!(0));
    }
}
