// src/models/mod.rs

pub mod batch;
pub mod transaction;

pub use batch::*;
pub use transaction::*;

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

// ==================== COMMON / SHARED ====================

/// Dashboard counters
#[derive(Debug, Serialize, Default)]
pub struct DashboardStats {
    pub total_batches: usize,
    pub available_batches: usize,
    pub expired_batches: usize,
    pub recalled_batches: usize,
    pub expiring_soon_batches: usize,
    pub low_stock_batches: usize,
    pub quantity_by_category: BTreeMap<BatchCategory, Decimal>,
}
