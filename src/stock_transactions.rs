// src/stock_transactions.rs
//! Goods receipt and stock-out commits.
//!
//! Commits for one category run one at a time behind that category's lock. Every
//! line is checked against the quantity its plan was computed from, so a plan that
//! went stale between preview and commit is refused instead of over-issuing.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;
use validator::Validate;

use crate::allocation::{allocatable_pool, allocate, parse_category, AllocationResult};
use crate::auth::AuthContext;
use crate::config::InventoryConfig;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AllocationRequest, Batch, BatchCategory, BatchStatus, CommitStockOutRequest, CreateBatchRequest,
    IssueStockRequest, StockOutLine, StockTransaction, TransactionFilter, TransactionType,
};
use crate::repositories::{BatchFilter, BatchRepository, TransactionRepository};
use crate::validator::validate_new_batch;

#[derive(Debug, Serialize)]
pub struct ReceiptOutcome {
    pub batch: Batch,
    pub transaction: StockTransaction,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StockOutReceipt {
    pub category: BatchCategory,
    pub reference: Option<String>,
    pub total_quantity: Decimal,
    pub transactions: Vec<StockTransaction>,
}

#[derive(Debug, Serialize)]
pub struct IssueOutcome {
    pub allocation: AllocationResult,
    pub receipt: StockOutReceipt,
}

#[derive(Default)]
struct CategoryLocks {
    raw_material: Mutex<()>,
    semi_finished: Mutex<()>,
    finished_goods: Mutex<()>,
}

impl CategoryLocks {
    fn get(&self, category: BatchCategory) -> &Mutex<()> {
        match category {
            BatchCategory::RawMaterial => &self.raw_material,
            BatchCategory::SemiFinished => &self.semi_finished,
            BatchCategory::FinishedGoods => &self.finished_goods,
        }
    }
}

pub struct StockTransactionService {
    batches: Arc<dyn BatchRepository>,
    transactions: Arc<dyn TransactionRepository>,
    settings: InventoryConfig,
    locks: CategoryLocks,
}

impl StockTransactionService {
    pub fn new(
        batches: Arc<dyn BatchRepository>,
        transactions: Arc<dyn TransactionRepository>,
        settings: InventoryConfig,
    ) -> Self {
        Self {
            batches,
            transactions,
            settings,
            locks: CategoryLocks::default(),
        }
    }

    pub fn settings(&self) -> &InventoryConfig {
        &self.settings
    }

    /// Books a new batch into stock and records the matching stock-in transaction.
    #[tracing::instrument(skip(self, ctx, request), fields(user = %ctx.username, batch = %request.batch_number))]
    pub async fn receive(
        &self,
        ctx: &AuthContext,
        request: CreateBatchRequest,
        today: NaiveDate,
    ) -> ApiResult<ReceiptOutcome> {
        request.validate()?;

        let checks = validate_new_batch(&request, today, self.settings.expiry_warning_days);
        if !checks.is_valid() {
            return Err(checks.to_api_error());
        }

        let now = Utc::now();
        let batch = Batch {
            id: Uuid::new_v4().to_string(),
            product_code: request.product_code,
            product_name: request.product_name.trim().to_string(),
            batch_number: request.batch_number,
            quantity: request.quantity,
            original_quantity: request.quantity,
            unit: request.unit,
            expiry_date: request.expiry_date,
            manufacturing_date: request.manufacturing_date,
            location: request.location.trim().to_string(),
            status: BatchStatus::Available,
            category: request.category,
            notes: request.notes,
            created_by: Some(ctx.user_id.clone()),
            updated_by: Some(ctx.user_id.clone()),
            created_at: now,
            updated_at: now,
        };

        let _guard = self.locks.get(batch.category).lock().await;
        let batch = self.batches.insert(batch).await?;

        let transaction = StockTransaction {
            id: Uuid::new_v4().to_string(),
            transaction_type: TransactionType::StockIn,
            batch_id: batch.id.clone(),
            batch_number: batch.batch_number.clone(),
            product_code: batch.product_code.clone(),
            category: batch.category,
            quantity: batch.quantity,
            balance_after: batch.quantity,
            reference: None,
            performed_by: ctx.username.clone(),
            created_at: now,
        };
        self.transactions.record(vec![transaction.clone()]).await?;

        log::info!(
            "Received batch {} of {} ({} {})",
            batch.batch_number,
            batch.product_code,
            batch.quantity,
            batch.unit
        );

        Ok(ReceiptOutcome {
            batch,
            transaction,
            warnings: checks.warning_messages(),
        })
    }

    /// Read-only allocation plan over the current stock.
    pub async fn preview(&self, request: &AllocationRequest, today: NaiveDate) -> ApiResult<AllocationResult> {
        request.validate()?;
        let category = parse_category(&request.category)?;
        let strategy = request.strategy.unwrap_or(self.settings.default_strategy);

        let filter = BatchFilter {
            category: Some(category),
            status: Some(BatchStatus::Available),
            product_code: request.product_code.clone(),
            search: None,
        };
        let candidates = self.batches.list(&filter).await?;
        let pool = allocatable_pool(
            &candidates,
            category,
            request.product_code.as_deref(),
            today,
            self.settings.exclude_expired,
        );

        let result = allocate(&pool, request.requested_quantity, strategy)?;
        log::debug!(
            "Allocation preview for {} {}: {} line(s), shortage {}",
            request.requested_quantity,
            category,
            result.allocations.len(),
            result.shortage
        );
        Ok(result)
    }

    /// Commits a previously previewed plan.
    #[tracing::instrument(skip(self, ctx, request), fields(user = %ctx.username, category = %request.category))]
    pub async fn commit_stock_out(
        &self,
        ctx: &AuthContext,
        request: CommitStockOutRequest,
        today: NaiveDate,
    ) -> ApiResult<StockOutReceipt> {
        request.validate()?;

        let _guard = self.locks.get(request.category).lock().await;
        self.apply_lines(ctx, request.category, request.reference, &request.lines, today)
            .await
    }

    /// Allocates and commits in one step under the category lock.
    #[tracing::instrument(skip(self, ctx, request), fields(user = %ctx.username))]
    pub async fn issue(
        &self,
        ctx: &AuthContext,
        request: IssueStockRequest,
        today: NaiveDate,
    ) -> ApiResult<IssueOutcome> {
        request.validate()?;
        let category = parse_category(&request.allocation.category)?;

        let _guard = self.locks.get(category).lock().await;
        let allocation = self.preview(&request.allocation, today).await?;

        if allocation.allocations.is_empty()
            || (!allocation.is_fully_allocated() && !request.allow_partial)
        {
            return Err(ApiError::insufficient_quantity(
                allocation.allocated_total(),
                allocation.requested_quantity,
            ));
        }

        let lines: Vec<StockOutLine> = allocation
            .allocations
            .iter()
            .map(|a| StockOutLine {
                batch_id: a.batch_id.clone(),
                quantity: a.allocated_quantity,
                expected_available: a.available_quantity,
            })
            .collect();

        let receipt = self
            .apply_lines(ctx, category, request.reference, &lines, today)
            .await?;

        Ok(IssueOutcome { allocation, receipt })
    }

    /// Writes an edited batch, provided nobody changed it since `previous` was read.
    pub async fn save_batch(&self, previous: &Batch, updated: Batch) -> ApiResult<Batch> {
        let _guard = self.locks.get(previous.category).lock().await;

        let current = self
            .batches
            .get(&previous.id)
            .await?
            .ok_or_else(|| ApiError::batch_not_found(&previous.id))?;
        if current.quantity != previous.quantity
            || current.status != previous.status
            || current.updated_at != previous.updated_at
        {
            return Err(ApiError::Conflict(format!(
                "Batch '{}' was modified concurrently; reload and retry",
                previous.batch_number
            )));
        }

        self.batches.update(updated).await
    }

    pub async fn list_transactions(&self, filter: &TransactionFilter) -> ApiResult<Vec<StockTransaction>> {
        self.transactions.list(filter).await
    }

    // Caller holds the category lock.
    async fn apply_lines(
        &self,
        ctx: &AuthContext,
        category: BatchCategory,
        reference: Option<String>,
        lines: &[StockOutLine],
        today: NaiveDate,
    ) -> ApiResult<StockOutReceipt> {
        let expired_before = self.settings.exclude_expired.then_some(today);
        let updated = match self
            .batches
            .apply_stock_out(category, lines, expired_before, &ctx.user_id)
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                log::warn!("Stock-out in {} rejected for {}: {}", category, ctx.username, e);
                return Err(e);
            }
        };

        let now = Utc::now();
        let transactions: Vec<StockTransaction> = lines
            .iter()
            .zip(updated.iter())
            .map(|(line, batch)| StockTransaction {
                id: Uuid::new_v4().to_string(),
                transaction_type: TransactionType::StockOut,
                batch_id: batch.id.clone(),
                batch_number: batch.batch_number.clone(),
                product_code: batch.product_code.clone(),
                category,
                quantity: line.quantity,
                balance_after: batch.quantity,
                reference: reference.clone(),
                performed_by: ctx.username.clone(),
                created_at: now,
            })
            .collect();
        self.transactions.record(transactions.clone()).await?;

        let total_quantity: Decimal = lines.iter().map(|l| l.quantity).sum();
        log::info!(
            "Stock-out of {} from {} batch(es) in {} by {}",
            total_quantity,
            transactions.len(),
            category,
            ctx.username
        );

        Ok(StockOutReceipt {
            category,
            reference,
            total_quantity,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::AllocationStrategy;
    use crate::auth::Role;
    use crate::repositories::{InMemoryBatchRepository, InMemoryTransactionRepository};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    fn ctx() -> AuthContext {
        AuthContext {
            user_id: "user-warehouse".to_string(),
            username: "warehouse".to_string(),
            role: Role::Warehouse,
        }
    }

    fn batch(id: &str, number: &str, quantity: Decimal, expires_in: i64) -> Batch {
        let now = Utc::now();
        Batch {
            id: id.to_string(),
            product_code: "RM-PCM".to_string(),
            product_name: "Paracetamol API".to_string(),
            batch_number: number.to_string(),
            quantity,
            original_quantity: quantity,
            unit: "kg".to_string(),
            expiry_date: today() + Duration::days(expires_in),
            manufacturing_date: today() - Duration::days(365),
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

    fn service(batches: Vec<Batch>) -> (StockTransactionService, Arc<InMemoryBatchRepository>) {
        let repo = Arc::new(InMemoryBatchRepository::with_batches(batches));
        let service = StockTransactionService::new(
            repo.clone(),
            Arc::new(InMemoryTransactionRepository::new()),
            InventoryConfig::default(),
        );
        (service, repo)
    }

    fn allocation_request(quantity: Decimal) -> AllocationRequest {
        AllocationRequest {
            category: "raw_material".to_string(),
            requested_quantity: quantity,
            strategy: None,
            product_code: None,
        }
    }

    #[tokio::test]
    async fn test_preview_excludes_expired_batches() {
        let (service, _) = service(vec![
            batch("old", "PCM-01", dec!(50), -1),
            batch("a", "PCM-02", dec!(30), 10),
            batch("b", "PCM-03", dec!(30), 20),
        ]);

        let result = service.preview(&allocation_request(dec!(40)), today()).await.unwrap();
        let ids: Vec<_> = result.allocations.iter().map(|a| a.batch_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(result.shortage, dec!(0));
        assert_eq!(result.strategy, AllocationStrategy::Fefo);
    }

    #[tokio::test]
    async fn test_preview_rejects_bad_input() {
        let (service, _) = service(vec![]);
        let err = service.preview(&allocation_request(dec!(0)), today()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));

        let mut request = allocation_request(dec!(5));
        request.category = "packaging".to_string();
        let err = service.preview(&request, today()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_commit_after_preview() {
        let (service, repo) = service(vec![batch("a", "PCM-02", dec!(30), 10), batch("b", "PCM-03", dec!(30), 20)]);
        let plan = service.preview(&allocation_request(dec!(40)), today()).await.unwrap();

        let request = CommitStockOutRequest {
            category: BatchCategory::RawMaterial,
            reference: Some("WO-1001".to_string()),
            lines: plan
                .allocations
                .iter()
                .map(|a| StockOutLine {
                    batch_id: a.batch_id.clone(),
                    quantity: a.allocated_quantity,
                    expected_available: a.available_quantity,
                })
                .collect(),
        };
        let receipt = service.commit_stock_out(&ctx(), request, today()).await.unwrap();

        assert_eq!(receipt.total_quantity, dec!(40));
        assert_eq!(receipt.transactions.len(), 2);
        assert_eq!(receipt.transactions[1].balance_after, dec!(20));
        assert_eq!(repo.get("a").await.unwrap().unwrap().quantity, dec!(0));

        let history = service.list_transactions(&TransactionFilter::default()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|t| t.reference.as_deref() == Some("WO-1001")));
    }

    #[tokio::test]
    async fn test_stale_plan_is_refused() {
        let (service, repo) = service(vec![batch("a", "PCM-02", dec!(30), 10)]);
        let plan = service.preview(&allocation_request(dec!(20)), today()).await.unwrap();

        let mut changed = repo.get("a").await.unwrap().unwrap();
        changed.quantity = dec!(25);
        repo.update(changed).await.unwrap();

        let request = CommitStockOutRequest {
            category: BatchCategory::RawMaterial,
            reference: None,
            lines: vec![StockOutLine {
                batch_id: plan.allocations[0].batch_id.clone(),
                quantity: plan.allocations[0].allocated_quantity,
                expected_available: plan.allocations[0].available_quantity,
            }],
        };
        let err = service.commit_stock_out(&ctx(), request, today()).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(repo.get("a").await.unwrap().unwrap().quantity, dec!(25));
        assert!(service
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_issue_refuses_shortage_unless_partial() {
        let (service, repo) = service(vec![batch("a", "PCM-02", dec!(30), 10)]);
        let mut request = IssueStockRequest {
            allocation: allocation_request(dec!(50)),
            reference: None,
            allow_partial: false,
        };

        let err = service.issue(&ctx(), request.clone(), today()).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(repo.get("a").await.unwrap().unwrap().quantity, dec!(30));

        request.allow_partial = true;
        let outcome = service.issue(&ctx(), request, today()).await.unwrap();
        assert_eq!(outcome.allocation.shortage, dec!(20));
        assert_eq!(outcome.receipt.total_quantity, dec!(30));
        assert_eq!(repo.get("a").await.unwrap().unwrap().quantity, dec!(0));
    }

    #[tokio::test]
    async fn test_issue_with_empty_pool_fails() {
        let (service, _) = service(vec![]);
        let request = IssueStockRequest {
            allocation: allocation_request(dec!(5)),
            reference: None,
            allow_partial: true,
        };
        assert!(matches!(
            service.issue(&ctx(), request, today()).await,
            Err(ApiError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_issues_never_oversell() {
        let (service, repo) = service(vec![batch("a", "PCM-02", dec!(10), 10), batch("b", "PCM-03", dec!(10), 20)]);
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let request = IssueStockRequest {
                    allocation: allocation_request(dec!(6)),
                    reference: None,
                    allow_partial: false,
                };
                service.issue(&ctx(), request, today()).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        // 20 units in stock, 6 per issue
        assert_eq!(succeeded, 3);
        let left: Decimal = repo
            .list(&BatchFilter::default())
            .await
            .unwrap()
            .iter()
            .map(|b| b.quantity)
            .sum();
        assert_eq!(left, dec!(2));
    }

    #[tokio::test]
    async fn test_save_batch_detects_concurrent_stock_out() {
        let (service, repo) = service(vec![batch("a", "PCM-02", dec!(30), 10)]);
        let read = repo.get("a").await.unwrap().unwrap();

        let request = IssueStockRequest {
            allocation: allocation_request(dec!(5)),
            reference: None,
            allow_partial: false,
        };
        service.issue(&ctx(), request, today()).await.unwrap();

        let mut edited = read.clone();
        edited.location = "WH-B".to_string();
        let err = service.save_batch(&read, edited).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(repo.get("a").await.unwrap().unwrap().quantity, dec!(25));

        let fresh = repo.get("a").await.unwrap().unwrap();
        let mut edited = fresh.clone();
        edited.location = "WH-B".to_string();
        assert_eq!(service.save_batch(&fresh, edited).await.unwrap().location, "WH-B");
    }

    #[tokio::test]
    async fn test_receive_creates_batch_and_transaction() {
        let (service, repo) = service(vec![]);
        let request = CreateBatchRequest {
            product_code: "RM-MCC".to_string(),
            product_name: "Microcrystalline cellulose".to_string(),
            batch_number: "MCC-2501".to_string(),
            quantity: dec!(250),
            unit: "kg".to_string(),
            expiry_date: today() + Duration::days(10),
            manufacturing_date: today() - Duration::days(30),
            location: "WH-A-03".to_string(),
            category: BatchCategory::RawMaterial,
            notes: None,
        };

        let outcome = service.receive(&ctx(), request.clone(), today()).await.unwrap();
        assert_eq!(outcome.batch.original_quantity, dec!(250));
        assert_eq!(outcome.transaction.transaction_type, TransactionType::StockIn);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(repo.get(&outcome.batch.id).await.unwrap().is_some());

        let err = service.receive(&ctx(), request, today()).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_commit_refuses_expired_batch_left_out_of_preview() {
        let (service, repo) = service(vec![batch("old", "PCM-01", dec!(40), -10)]);

        let plan = service.preview(&allocation_request(dec!(10)), today()).await.unwrap();
        assert!(plan.allocations.is_empty());
        assert_eq!(plan.shortage, dec!(10));

        let request = CommitStockOutRequest {
            category: BatchCategory::RawMaterial,
            reference: None,
            lines: vec![StockOutLine {
                batch_id: "old".to_string(),
                quantity: dec!(10),
                expected_available: dec!(40),
            }],
        };
        let err = service.commit_stock_out(&ctx(), request, today()).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(repo.get("old").await.unwrap().unwrap().quantity, dec!(40));
    }
}
